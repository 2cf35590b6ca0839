//! Study setup planner.
//!
//! Walks a study's configuration and emits the ordered list of actions
//! still needed before it can go live, study-level steps first, then
//! the pending steps of each materials set.

use serde::{Deserialize, Serialize};

use crate::materials::Materials;
use crate::study::Study;

/// A pending action on one materials set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaterialsStep {
    CreateItems,
    ValidateItems,
    GenerateLists,
}

impl MaterialsStep {
    pub fn description(&self) -> &'static str {
        match self {
            MaterialsStep::CreateItems => "create items",
            MaterialsStep::ValidateItems => "validate items",
            MaterialsStep::GenerateLists => "generate item lists",
        }
    }
}

/// A pending study-level action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum NextStep {
    CreateQuestion,
    CreateInstructions,
    CreateMaterials,
    GenerateQuestionnaires,
    DefineBlockInstructions,
    Publish,
    Materials {
        title: String,
        step: MaterialsStep,
    },
}

impl NextStep {
    pub fn description(&self) -> String {
        match self {
            NextStep::CreateQuestion => "create a question".into(),
            NextStep::CreateInstructions => "create the instructions".into(),
            NextStep::CreateMaterials => "create materials".into(),
            NextStep::GenerateQuestionnaires => "generate questionnaires".into(),
            NextStep::DefineBlockInstructions => "define block instructions".into(),
            NextStep::Publish => "publish the study".into(),
            NextStep::Materials { title, step } => {
                format!("{}: {}", title, step.description())
            }
        }
    }
}

/// The pending step of one materials set, if any.
pub fn materials_next_step(materials: &Materials) -> Option<MaterialsStep> {
    if materials.items.is_empty() {
        Some(MaterialsStep::CreateItems)
    } else if !materials.items_validated {
        Some(MaterialsStep::ValidateItems)
    } else if !materials.has_lists() {
        Some(MaterialsStep::GenerateLists)
    } else {
        None
    }
}

fn every_block_has_instructions(study: &Study) -> bool {
    study.item_blocks().into_iter().all(|block| {
        study
            .blocks
            .iter()
            .find(|settings| settings.block == block)
            .and_then(|settings| settings.instructions.as_deref())
            .map(|text| !text.trim().is_empty())
            .unwrap_or(false)
    })
}

/// Whether the study satisfies every publication precondition.
pub fn allowed_to_publish(study: &Study) -> bool {
    !study.questions.is_empty()
        && study.settings.instructions.is_some()
        && !study.materials.is_empty()
        && study.materials.iter().all(Materials::is_complete)
        && !study.questionnaires.is_empty()
}

/// The ordered list of actions still needed to take a study live.
pub fn next_steps(study: &Study) -> Vec<NextStep> {
    let mut steps = Vec::new();
    if study.questions.is_empty() {
        steps.push(NextStep::CreateQuestion);
    }
    if study.settings.instructions.is_none() {
        steps.push(NextStep::CreateInstructions);
    }
    if study.materials.is_empty() {
        steps.push(NextStep::CreateMaterials);
    }
    let all_complete =
        !study.materials.is_empty() && study.materials.iter().all(Materials::is_complete);
    if all_complete && study.questionnaires.is_empty() {
        steps.push(NextStep::GenerateQuestionnaires);
    }
    if study.settings.use_blocks
        && !study.questionnaires.is_empty()
        && !every_block_has_instructions(study)
    {
        steps.push(NextStep::DefineBlockInstructions);
    }
    if allowed_to_publish(study) && !study.settings.is_published {
        steps.push(NextStep::Publish);
    }
    for materials in &study.materials {
        if let Some(step) = materials_next_step(materials) {
            steps.push(NextStep::Materials {
                title: materials.title.clone(),
                step,
            });
        }
    }
    steps
}
