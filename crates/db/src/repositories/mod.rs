//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument. Replacement-style
//! writes run inside a single transaction.

pub mod item_repo;
pub mod materials_repo;
pub mod question_repo;
pub mod questionnaire_repo;
pub mod rating_repo;
pub mod study_repo;
pub mod trial_repo;

pub use item_repo::ItemRepo;
pub use materials_repo::MaterialsRepo;
pub use question_repo::QuestionRepo;
pub use questionnaire_repo::QuestionnaireRepo;
pub use rating_repo::RatingRepo;
pub use study_repo::StudyRepo;
pub use trial_repo::TrialRepo;
