//! Study, question, and demographic-field rows.

use chrono::NaiveDate;
use ratex_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `studies` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StudyRow {
    pub id: DbId,
    pub slug: String,
    pub title: String,
    pub item_type: String,
    pub use_blocks: bool,
    pub pseudo_randomize_question_order: bool,
    pub require_participant_id: bool,
    pub generate_participation_code: bool,
    pub password: Option<String>,
    pub end_date: Option<NaiveDate>,
    pub trial_limit: Option<i32>,
    pub is_published: bool,
    pub is_archived: bool,
    pub instructions: Option<String>,
    pub outro: Option<String>,
    pub continue_label: String,
    pub secret: String,
    pub created_date: NaiveDate,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a new study.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateStudy {
    pub slug: String,
    pub title: String,
    pub item_type: String,
    /// Keyed into participation codes; generated by the caller.
    pub secret: String,
}

/// DTO for updating study settings. Only non-`None` fields are applied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateStudy {
    pub title: Option<String>,
    pub item_type: Option<String>,
    pub use_blocks: Option<bool>,
    pub pseudo_randomize_question_order: Option<bool>,
    pub require_participant_id: Option<bool>,
    pub generate_participation_code: Option<bool>,
    pub password: Option<String>,
    pub end_date: Option<NaiveDate>,
    pub trial_limit: Option<i32>,
    pub instructions: Option<String>,
    pub outro: Option<String>,
    pub continue_label: Option<String>,
}

/// A row from the `questions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuestionRow {
    pub id: DbId,
    pub study_id: DbId,
    pub number: i32,
    pub prompt: String,
    pub legend: Option<String>,
    pub randomize_scale: bool,
    pub rating_comment: String,
}

/// DTO for creating a question with its scale values.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateQuestion {
    pub number: i32,
    pub prompt: String,
    pub legend: Option<String>,
    pub randomize_scale: bool,
    pub rating_comment: String,
    pub scale_labels: Vec<String>,
}

/// A row from the `scale_values` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ScaleValueRow {
    pub id: DbId,
    pub question_id: DbId,
    pub number: i32,
    pub label: String,
}

/// A row from the `demographic_fields` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DemographicFieldRow {
    pub id: DbId,
    pub study_id: DbId,
    pub number: i32,
    pub prompt: String,
}
