//! Core engine for the ratex linguistic-rating experiment platform.
//!
//! Everything in this crate is pure: no database, no async, no network.
//! The `ratex-db` crate loads entities, calls into these modules, and
//! persists the results.
//!
//! Module map:
//!
//! - [`slug`] / [`listing`] — identifier and text utilities
//! - [`dialect`] — CSV dialect sniffing and upload decoding
//! - [`item`] / [`materials`] — materials model and item validation
//! - [`distribution`] — Latin-square and all-to-all item-list assignment
//! - [`questionnaire`] — questionnaire construction and permutations
//! - [`randomize`] — per-block item randomization (none / true / pseudo)
//! - [`properties`] — per-slot question-order and scale-order metadata
//! - [`rating`] / [`trial`] — rating validation and participation state
//! - [`results`] — long/wide result tables and group-by aggregation
//! - [`csvio`] — CSV surfaces for items, lists, questionnaires, blocks,
//!   results, feedbacks, and rating proofs
//! - [`archive`] — study archive bundle (ZIP) codec
//! - [`steps`] — next-step planner

pub mod archive;
pub mod csvio;
pub mod dialect;
pub mod distribution;
pub mod error;
pub mod item;
pub mod listing;
pub mod materials;
pub mod properties;
pub mod questionnaire;
pub mod randomize;
pub mod rating;
pub mod results;
pub mod slug;
pub mod steps;
pub mod study;
pub mod trial;
pub mod types;

pub use error::CoreError;
