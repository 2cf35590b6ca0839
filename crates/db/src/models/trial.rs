//! Trial, rating, and demographic-value rows.

use ratex_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `trials` table. The stored status never includes
/// `abandoned`; that state is derived on read.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TrialRow {
    pub id: DbId,
    pub questionnaire_id: DbId,
    pub participant_id: String,
    pub is_test: bool,
    pub status: String,
    pub created_at: Timestamp,
    pub ended_at: Option<Timestamp>,
}

/// DTO for creating a trial.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTrial {
    pub questionnaire_id: DbId,
    pub participant_id: String,
    pub is_test: bool,
}

/// A row from the `ratings` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RatingRow {
    pub id: DbId,
    pub trial_id: DbId,
    pub slot_id: DbId,
    pub question: i32,
    pub scale_value: i32,
    pub comment: Option<String>,
    pub created_at: Timestamp,
}

/// DTO for recording a rating.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRating {
    pub trial_id: DbId,
    pub slot_id: DbId,
    pub question: i32,
    pub scale_value: i32,
    pub comment: Option<String>,
}

/// A row from the `demographic_values` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DemographicValueRow {
    pub id: DbId,
    pub trial_id: DbId,
    pub demographic_field_id: DbId,
    pub value: String,
}
