//! Study snapshot assembly.
//!
//! The core algorithms work on a fully materialized
//! [`ratex_core::study::Study`]; this module loads one from the
//! database and keeps the row-id maps needed to write derived data
//! back.

use std::collections::HashMap;

use ratex_core::item::{Item, ItemContent, ItemFeedback, ItemQuestion, ItemType};
use ratex_core::listing::split_int_list;
use ratex_core::materials::{ItemList, ListDistribution, Materials};
use ratex_core::questionnaire::{
    Questionnaire, QuestionnaireBlockSettings, QuestionProperty, Slot,
};
use ratex_core::randomize::Randomization;
use ratex_core::study::{
    DemographicField, Question, RatingCommentMode, ScaleValue, Study, StudySettings,
};
use ratex_core::types::DbId;
use sqlx::PgPool;

use crate::error::DbError;
use crate::models::study::StudyRow;
use crate::repositories::{ItemRepo, MaterialsRepo, QuestionRepo, QuestionnaireRepo, StudyRepo};

/// A loaded study plus the row ids behind each core entity, indexed
/// the same way as the core vectors.
#[derive(Debug, Clone)]
pub struct StudySnapshot {
    pub row: StudyRow,
    pub study: Study,
    pub materials_ids: Vec<DbId>,
    /// `item_ids[m][i]` backs `study.materials[m].items[i]`.
    pub item_ids: Vec<Vec<DbId>>,
    /// `list_ids[m][l]` backs `study.materials[m].lists[l]`.
    pub list_ids: Vec<Vec<DbId>>,
    pub questionnaire_ids: Vec<DbId>,
    /// `slot_ids[q][s]` backs `study.questionnaires[q].slots[s]`.
    pub slot_ids: Vec<Vec<DbId>>,
    pub demographic_field_ids: Vec<DbId>,
}

impl StudySnapshot {
    /// Load the full snapshot of one study.
    pub async fn load(pool: &PgPool, study_id: DbId) -> Result<Self, DbError> {
        let row = StudyRepo::find_by_id(pool, study_id)
            .await?
            .ok_or(DbError::NotFound("study"))?;
        let item_type = ItemType::parse(&row.item_type).unwrap_or(ItemType::PlainText);

        let settings = StudySettings {
            title: row.title.clone(),
            item_type,
            use_blocks: row.use_blocks,
            pseudo_randomize_question_order: row.pseudo_randomize_question_order,
            require_participant_id: row.require_participant_id,
            generate_participation_code: row.generate_participation_code,
            password: row.password.clone(),
            end_date: row.end_date,
            trial_limit: row.trial_limit.map(|limit| limit as u32),
            is_published: row.is_published,
            is_archived: row.is_archived,
            instructions: row.instructions.clone(),
            outro: row.outro.clone(),
            continue_label: row.continue_label.clone(),
        };

        let questions = load_questions(pool, study_id).await?;
        let demographic_rows = StudyRepo::list_demographic_fields(pool, study_id).await?;
        let demographic_field_ids: Vec<DbId> =
            demographic_rows.iter().map(|field| field.id).collect();
        let demographic_fields = demographic_rows
            .into_iter()
            .map(|field| DemographicField {
                number: field.number as usize,
                prompt: field.prompt,
            })
            .collect();

        let mut materials = Vec::new();
        let mut materials_ids = Vec::new();
        let mut item_ids = Vec::new();
        let mut list_ids = Vec::new();
        // Global map from item row id to (materials index, item index).
        let mut item_positions: HashMap<DbId, (usize, usize)> = HashMap::new();

        for materials_row in MaterialsRepo::list_by_study(pool, study_id).await? {
            let materials_index = materials.len();
            let loaded =
                load_materials_items(pool, materials_row.id, item_type, materials_index, &mut item_positions)
                    .await?;
            let (items, ids) = loaded;
            let id_to_index: HashMap<DbId, usize> =
                ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

            let mut lists = Vec::new();
            let mut this_list_ids = Vec::new();
            for list_row in ItemRepo::list_lists(pool, materials_row.id).await? {
                let entries = ItemRepo::list_entries(pool, list_row.id).await?;
                let indices = entries
                    .iter()
                    .filter_map(|id| id_to_index.get(id).copied())
                    .collect();
                lists.push(ItemList {
                    number: list_row.number as usize,
                    items: indices,
                });
                this_list_ids.push(list_row.id);
            }

            materials.push(Materials {
                title: materials_row.title,
                list_distribution: ListDistribution::parse(&materials_row.list_distribution)
                    .unwrap_or(ListDistribution::LatinSquare),
                is_filler: materials_row.is_filler,
                is_example: materials_row.is_example,
                block: materials_row.block,
                items_validated: materials_row.items_validated,
                items,
                lists,
            });
            materials_ids.push(materials_row.id);
            item_ids.push(ids);
            list_ids.push(this_list_ids);
        }

        let mut questionnaires = Vec::new();
        let mut questionnaire_ids = Vec::new();
        let mut slot_ids = Vec::new();
        for questionnaire_row in QuestionnaireRepo::list_by_study(pool, study_id).await? {
            let slots_rows = QuestionnaireRepo::list_slots(pool, questionnaire_row.id).await?;
            let properties =
                QuestionnaireRepo::list_slot_properties(pool, questionnaire_row.id).await?;
            let mut properties_by_slot: HashMap<DbId, Vec<QuestionProperty>> = HashMap::new();
            for property in properties {
                let scale_order = split_int_list(&property.scale_order).unwrap_or_default();
                properties_by_slot
                    .entry(property.slot_id)
                    .or_default()
                    .push(QuestionProperty {
                        question: property.question as usize,
                        scale_order,
                    });
            }

            let mut slots = Vec::new();
            let mut this_slot_ids = Vec::new();
            let mut list_numbers = vec![0usize; materials.len()];
            for slot_row in slots_rows {
                let &(materials_index, item_index) = item_positions
                    .get(&slot_row.item_id)
                    .ok_or(DbError::NotFound("slot item"))?;
                let item = &materials[materials_index].items[item_index];
                slots.push(Slot {
                    number: slot_row.number as usize,
                    materials_index,
                    item_number: item.number,
                    condition: item.condition.clone(),
                    question_order: slot_row
                        .question_order
                        .as_deref()
                        .and_then(split_int_list),
                    question_properties: properties_by_slot
                        .remove(&slot_row.id)
                        .unwrap_or_default(),
                });
                this_slot_ids.push(slot_row.id);
            }
            // Chosen lists, recovered from the join table.
            let chosen: Vec<(DbId,)> = sqlx::query_as(
                "SELECT item_list_id FROM questionnaire_lists WHERE questionnaire_id = $1",
            )
            .bind(questionnaire_row.id)
            .fetch_all(pool)
            .await?;
            for (list_id,) in chosen {
                for (materials_index, ids) in list_ids.iter().enumerate() {
                    if let Some(position) = ids.iter().position(|&id| id == list_id) {
                        list_numbers[materials_index] =
                            materials[materials_index].lists[position].number;
                    }
                }
            }

            questionnaires.push(Questionnaire {
                number: questionnaire_row.number as u32,
                slug: questionnaire_row.slug,
                list_numbers,
                slots,
            });
            questionnaire_ids.push(questionnaire_row.id);
            slot_ids.push(this_slot_ids);
        }

        let blocks = QuestionnaireRepo::list_blocks(pool, study_id)
            .await?
            .into_iter()
            .map(|block| QuestionnaireBlockSettings {
                block: block.block,
                instructions: block.instructions,
                short_instructions: block.short_instructions,
                randomization: Randomization::parse(&block.randomization)
                    .unwrap_or(Randomization::None),
            })
            .collect();

        Ok(StudySnapshot {
            row,
            study: Study {
                settings,
                questions,
                demographic_fields,
                materials,
                questionnaires,
                blocks,
            },
            materials_ids,
            item_ids,
            list_ids,
            questionnaire_ids,
            slot_ids,
            demographic_field_ids,
        })
    }

    /// The slot row id behind `study.questionnaires[q].slots[s]`.
    pub fn slot_id(&self, questionnaire_index: usize, slot_number: usize) -> Option<DbId> {
        self.slot_ids
            .get(questionnaire_index)
            .and_then(|ids| ids.get(slot_number))
            .copied()
    }

    pub fn questionnaire_index(&self, questionnaire_id: DbId) -> Option<usize> {
        self.questionnaire_ids
            .iter()
            .position(|&id| id == questionnaire_id)
    }
}

async fn load_questions(pool: &PgPool, study_id: DbId) -> Result<Vec<Question>, DbError> {
    let rows = QuestionRepo::list_by_study(pool, study_id).await?;
    let scale_rows = QuestionRepo::list_scale_values(pool, study_id).await?;
    let by_question_id: HashMap<DbId, usize> = rows
        .iter()
        .enumerate()
        .map(|(index, row)| (row.id, index))
        .collect();
    let mut questions: Vec<Question> = rows
        .into_iter()
        .map(|row| Question {
            number: row.number as usize,
            prompt: row.prompt,
            legend: row.legend,
            randomize_scale: row.randomize_scale,
            rating_comment: parse_rating_comment(&row.rating_comment),
            scale_values: Vec::new(),
        })
        .collect();
    for scale in scale_rows {
        if let Some(&index) = by_question_id.get(&scale.question_id) {
            questions[index].scale_values.push(ScaleValue {
                number: scale.number as usize,
                label: scale.label,
            });
        }
    }
    Ok(questions)
}

fn parse_rating_comment(value: &str) -> RatingCommentMode {
    match value {
        "optional" => RatingCommentMode::Optional,
        "required" => RatingCommentMode::Required,
        _ => RatingCommentMode::None,
    }
}

async fn load_materials_items(
    pool: &PgPool,
    materials_id: DbId,
    item_type: ItemType,
    materials_index: usize,
    item_positions: &mut HashMap<DbId, (usize, usize)>,
) -> Result<(Vec<Item>, Vec<DbId>), DbError> {
    let item_rows = ItemRepo::list_by_materials(pool, materials_id).await?;
    let question_rows = ItemRepo::list_item_questions(pool, materials_id).await?;
    let feedback_rows = ItemRepo::list_feedbacks(pool, materials_id).await?;

    let mut item_questions: HashMap<DbId, Vec<ItemQuestion>> = HashMap::new();
    for row in question_rows {
        item_questions.entry(row.item_id).or_default().push(ItemQuestion {
            number: row.number as usize,
            prompt: row.prompt,
            scale_labels: row.scale_labels,
            legend: row.legend,
        });
    }
    let mut feedbacks: HashMap<DbId, Vec<ItemFeedback>> = HashMap::new();
    for row in feedback_rows {
        feedbacks.entry(row.item_id).or_default().push(ItemFeedback {
            question: row.question as usize,
            scale_values: row.scale_values,
            feedback: row.feedback,
        });
    }

    let mut items = Vec::with_capacity(item_rows.len());
    let mut ids = Vec::with_capacity(item_rows.len());
    for (index, row) in item_rows.into_iter().enumerate() {
        item_positions.insert(row.id, (materials_index, index));
        items.push(Item {
            number: row.number as u32,
            condition: row.condition,
            block: row.block,
            content: ItemContent::from_cell(item_type, &row.content),
            audio_description: row.audio_description,
            item_questions: item_questions.remove(&row.id).unwrap_or_default(),
            feedbacks: feedbacks.remove(&row.id).unwrap_or_default(),
        });
        ids.push(row.id);
    }
    Ok((items, ids))
}
