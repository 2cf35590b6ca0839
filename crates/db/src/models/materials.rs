//! Materials, item, and item-list rows.

use ratex_core::types::DbId;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `materials` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MaterialsRow {
    pub id: DbId,
    pub study_id: DbId,
    pub title: String,
    pub list_distribution: String,
    pub is_filler: bool,
    pub is_example: bool,
    pub block: i32,
    pub items_validated: bool,
}

/// DTO for creating a materials set.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMaterials {
    pub title: String,
    pub list_distribution: String,
    pub is_filler: bool,
    pub is_example: bool,
    pub block: i32,
}

/// A row from the `items` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ItemRow {
    pub id: DbId,
    pub materials_id: DbId,
    pub number: i32,
    pub condition: String,
    pub block: i32,
    pub content: String,
    pub audio_description: Option<String>,
}

/// A row from the `item_questions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ItemQuestionRow {
    pub id: DbId,
    pub item_id: DbId,
    pub number: i32,
    pub prompt: Option<String>,
    pub scale_labels: Option<String>,
    pub legend: Option<String>,
}

/// A row from the `item_feedbacks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ItemFeedbackRow {
    pub id: DbId,
    pub item_id: DbId,
    pub question: i32,
    pub scale_values: String,
    pub feedback: String,
}

/// A row from the `item_lists` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ItemListRow {
    pub id: DbId,
    pub materials_id: DbId,
    pub number: i32,
}
