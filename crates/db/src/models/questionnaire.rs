//! Questionnaire, slot, and block rows.

use ratex_core::types::DbId;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `questionnaires` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuestionnaireRow {
    pub id: DbId,
    pub study_id: DbId,
    pub number: i32,
    pub slug: String,
}

/// A row from the `slots` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SlotRow {
    pub id: DbId,
    pub questionnaire_id: DbId,
    pub number: i32,
    pub item_id: DbId,
    pub question_order: Option<String>,
}

/// A row from the `slot_question_properties` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SlotQuestionPropertyRow {
    pub id: DbId,
    pub slot_id: DbId,
    pub question: i32,
    pub scale_order: String,
}

/// A row from the `questionnaire_blocks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuestionnaireBlockRow {
    pub id: DbId,
    pub study_id: DbId,
    pub block: i32,
    pub instructions: Option<String>,
    pub short_instructions: Option<String>,
    pub randomization: String,
}
