//! Trials: participation state, abandonment, and proof codes.
//!
//! A trial walks `created → started → finished`; `abandoned` is always
//! derived from the last activity time, never stored, so it cannot
//! drift under clock skew.

use chrono::Duration;
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::questionnaire::Questionnaire;
use crate::study::Study;
use crate::types::{DbId, Timestamp};

/// Inactivity window after which an unfinished trial counts as
/// abandoned.
pub const ABANDONED_AFTER_HOURS: i64 = 1;

/// Stored trial status. [`effective_status`] adds the derived
/// `Abandoned` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialStatus {
    Created,
    Started,
    Finished,
    Abandoned,
}

impl TrialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrialStatus::Created => "created",
            TrialStatus::Started => "started",
            TrialStatus::Finished => "finished",
            TrialStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(TrialStatus::Created),
            "started" => Some(TrialStatus::Started),
            "finished" => Some(TrialStatus::Finished),
            "abandoned" => Some(TrialStatus::Abandoned),
            _ => None,
        }
    }
}

/// Resolve the status visible to callers: unfinished trials whose last
/// activity (creation, or the latest rating) is older than the window
/// are abandoned.
pub fn effective_status(
    stored: TrialStatus,
    created: Timestamp,
    last_rating: Option<Timestamp>,
    now: Timestamp,
) -> TrialStatus {
    if stored == TrialStatus::Finished {
        return stored;
    }
    let last_activity = last_rating.unwrap_or(created);
    if last_activity + Duration::hours(ABANDONED_AFTER_HOURS) < now {
        TrialStatus::Abandoned
    } else {
        stored
    }
}

/// Where the participation flow goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// The questionnaire was already completed.
    Taken,
    /// Serve this 0-based slot.
    Slot(usize),
    /// Serve the instructions of this block, then the requested slot.
    BlockInstructions(i32),
    /// All slots answered; show the outro.
    Outro,
}

/// Decide what to serve for "slot `requested` of this trial".
///
/// Clients cannot skip ahead or back: when the requested slot differs
/// from the count of completed slots, the flow redirects there. Block
/// instructions are served once at each block transition; the caller
/// tracks `instructions_seen` for the current block.
pub fn next_destination(
    study: &Study,
    questionnaire: &Questionnaire,
    status: TrialStatus,
    ratings_completed: usize,
    requested: usize,
    instructions_seen: bool,
) -> Destination {
    if status == TrialStatus::Finished {
        return Destination::Taken;
    }
    if requested != ratings_completed {
        return Destination::Slot(ratings_completed);
    }
    if requested >= questionnaire.slots.len() {
        return Destination::Outro;
    }
    if !instructions_seen {
        if let Some(block) = entering_block(study, questionnaire, requested) {
            let has_instructions = study
                .blocks
                .iter()
                .find(|settings| settings.block == block)
                .map(|settings| {
                    settings
                        .instructions
                        .as_deref()
                        .map(|text| !text.trim().is_empty())
                        .unwrap_or(false)
                })
                .unwrap_or(false);
            if has_instructions {
                return Destination::BlockInstructions(block);
            }
        }
    }
    Destination::Slot(requested)
}

/// The block a slot belongs to, when the slot starts it.
fn entering_block(study: &Study, questionnaire: &Questionnaire, slot: usize) -> Option<i32> {
    let block = slot_block(study, questionnaire, slot)?;
    if slot == 0 {
        return Some(block);
    }
    let previous = slot_block(study, questionnaire, slot - 1)?;
    (block != previous).then_some(block)
}

/// Effective block of a slot's item.
pub fn slot_block(study: &Study, questionnaire: &Questionnaire, slot: usize) -> Option<i32> {
    let slot = questionnaire.slots.get(slot)?;
    let materials = study.materials.get(slot.materials_index)?;
    let item_index = materials.find_item(slot.item_number, &slot.condition)?;
    Some(materials.effective_block(&materials.items[item_index]))
}

/// Destination after a successful slot submission.
pub fn after_submit(questionnaire: &Questionnaire, ratings_completed: usize) -> Destination {
    if ratings_completed >= questionnaire.slots.len() {
        Destination::Outro
    } else {
        Destination::Slot(ratings_completed)
    }
}

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LEN: usize = 16;

/// Deterministic participation proof: HMAC-SHA256 of the trial id
/// keyed by the study secret, rendered as 16 uppercase alphanumerics.
/// Stable across requests, opaque to participants, unforgeable without
/// the secret.
pub fn participation_code(trial_id: DbId, secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(trial_id.to_be_bytes().as_ref());
    let digest = mac.finalize().into_bytes();
    digest
        .iter()
        .take(CODE_LEN)
        .map(|byte| CODE_CHARSET[(*byte as usize) % CODE_CHARSET.len()] as char)
        .collect()
}

const PARTICIPANT_ID_LEN: usize = 8;

/// Random participant ID for studies that do not ask for one.
pub fn random_participant_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..PARTICIPANT_ID_LEN)
        .map(|_| CODE_CHARSET[rng.random_range(0..CODE_CHARSET.len())] as char)
        .collect()
}
