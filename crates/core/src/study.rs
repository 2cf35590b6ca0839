//! In-memory study snapshot.
//!
//! The core algorithms operate on a fully materialized `Study` loaded
//! by the caller (the db crate builds one from table rows, the archive
//! codec from a bundle). Question numbers are dense from 0; scale-value
//! numbers within a question are dense from 0.

use serde::{Deserialize, Serialize};

use crate::item::ItemType;
use crate::materials::Materials;
use crate::questionnaire::{Questionnaire, QuestionnaireBlockSettings};

/// How a participant must comment on a rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingCommentMode {
    None,
    Optional,
    Required,
}

/// A scale value owned by a question. Labels are capped at 50 chars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleValue {
    pub number: usize,
    pub label: String,
}

/// A rating question owned by a study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub number: usize,
    pub prompt: String,
    pub legend: Option<String>,
    pub randomize_scale: bool,
    pub rating_comment: RatingCommentMode,
    pub scale_values: Vec<ScaleValue>,
}

impl Question {
    pub fn scale_count(&self) -> usize {
        self.scale_values.len()
    }

    pub fn scale_labels(&self) -> Vec<&str> {
        self.scale_values
            .iter()
            .map(|value| value.label.as_str())
            .collect()
    }
}

/// An ordered demographic prompt shown after the questionnaire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemographicField {
    pub number: usize,
    pub prompt: String,
}

/// Study-level settings, the `02_settings.csv` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudySettings {
    pub title: String,
    pub item_type: ItemType,
    pub use_blocks: bool,
    pub pseudo_randomize_question_order: bool,
    pub require_participant_id: bool,
    pub generate_participation_code: bool,
    pub password: Option<String>,
    pub end_date: Option<chrono::NaiveDate>,
    pub trial_limit: Option<u32>,
    pub is_published: bool,
    pub is_archived: bool,
    pub instructions: Option<String>,
    pub outro: Option<String>,
    pub continue_label: String,
}

impl Default for StudySettings {
    fn default() -> Self {
        StudySettings {
            title: String::new(),
            item_type: ItemType::PlainText,
            use_blocks: false,
            pseudo_randomize_question_order: false,
            require_participant_id: false,
            generate_participation_code: false,
            password: None,
            end_date: None,
            trial_limit: None,
            is_published: false,
            is_archived: false,
            instructions: None,
            outro: None,
            continue_label: "Continue".into(),
        }
    }
}

/// A fully materialized study.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Study {
    pub settings: StudySettings,
    pub questions: Vec<Question>,
    pub demographic_fields: Vec<DemographicField>,
    pub materials: Vec<Materials>,
    pub questionnaires: Vec<Questionnaire>,
    pub blocks: Vec<QuestionnaireBlockSettings>,
}

impl Study {
    pub fn question(&self, number: usize) -> Option<&Question> {
        self.questions.iter().find(|q| q.number == number)
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    /// Whether any question presents its scale in randomized order.
    pub fn has_question_with_random_scale(&self) -> bool {
        self.questions.iter().any(|q| q.randomize_scale)
    }

    /// Whether any question accepts or requires rating comments.
    pub fn has_question_rating_comments(&self) -> bool {
        self.questions
            .iter()
            .any(|q| q.rating_comment != RatingCommentMode::None)
    }

    /// Whether any materials set is marked as filler.
    pub fn has_filler_materials(&self) -> bool {
        self.materials.iter().any(|m| m.is_filler)
    }

    /// Published, or carrying real (non-test) ratings: mutation of
    /// materials and questionnaires is refused while active.
    pub fn is_active(&self, has_non_test_ratings: bool) -> bool {
        self.settings.is_published || has_non_test_ratings
    }

    /// The distinct blocks of this study in presentation order.
    pub fn item_blocks(&self) -> Vec<i32> {
        let mut blocks: Vec<i32> = self
            .materials
            .iter()
            .flat_map(|materials| materials.item_blocks())
            .collect();
        blocks.sort_unstable();
        blocks.dedup();
        blocks
    }
}
