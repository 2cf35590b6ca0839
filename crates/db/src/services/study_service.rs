//! Study lifecycle: creation, publication, results, archive, restore.

use rand::distr::Alphanumeric;
use rand::Rng;
use ratex_core::archive::{archive_study, restore_study};
use ratex_core::results::{results_long, LongRow, RatingInput, TrialRatings};
use ratex_core::slug::slugify_unique;
use ratex_core::steps::{allowed_to_publish, next_steps, NextStep};
use ratex_core::trial::TrialStatus;
use ratex_core::types::DbId;
use ratex_core::CoreError;
use sqlx::PgPool;
use tracing::info;

use crate::error::DbError;
use crate::models::study::{CreateQuestion, CreateStudy, StudyRow, UpdateStudy};
use crate::models::materials::CreateMaterials;
use crate::repositories::{
    ItemRepo, MaterialsRepo, QuestionRepo, QuestionnaireRepo, RatingRepo, StudyRepo, TrialRepo,
};
use crate::services::snapshot::StudySnapshot;

const SECRET_LEN: usize = 32;

fn new_secret() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

/// Orchestrates study-level operations.
pub struct StudyService;

impl StudyService {
    /// Create a study with a unique slug and a fresh secret.
    pub async fn create(
        pool: &PgPool,
        title: &str,
        item_type: &str,
    ) -> Result<StudyRow, DbError> {
        let taken = StudyRepo::list_slugs(pool).await?;
        let slug = slugify_unique(title, taken.iter().map(String::as_str), None);
        let row = StudyRepo::create(
            pool,
            &CreateStudy {
                slug,
                title: title.to_string(),
                item_type: item_type.to_string(),
                secret: new_secret(),
            },
        )
        .await?;
        info!(study = row.id, slug = %row.slug, "study created");
        Ok(row)
    }

    /// Publish a study once every precondition is met.
    pub async fn publish(pool: &PgPool, study_id: DbId) -> Result<(), DbError> {
        let snapshot = StudySnapshot::load(pool, study_id).await?;
        if !allowed_to_publish(&snapshot.study) {
            return Err(CoreError::NotAllowed(
                "the study is not ready to be published".into(),
            )
            .into());
        }
        StudyRepo::set_published(pool, study_id, true).await?;
        Ok(())
    }

    /// The ordered setup actions still pending for a study.
    pub async fn next_steps(pool: &PgPool, study_id: DbId) -> Result<Vec<NextStep>, DbError> {
        let snapshot = StudySnapshot::load(pool, study_id).await?;
        Ok(next_steps(&snapshot.study))
    }

    /// Long-format results of all non-test trials, subjects numbered
    /// by trial creation order.
    pub async fn results(pool: &PgPool, snapshot: &StudySnapshot) -> Result<Vec<LongRow>, DbError> {
        let mut trials = Vec::new();
        let mut subject = 0u32;
        for trial in TrialRepo::list_by_study(pool, snapshot.row.id).await? {
            if trial.is_test {
                continue;
            }
            subject += 1;
            let Some(questionnaire_index) = snapshot.questionnaire_index(trial.questionnaire_id)
            else {
                continue;
            };
            let questionnaire = &snapshot.study.questionnaires[questionnaire_index];
            let slot_ids = &snapshot.slot_ids[questionnaire_index];

            let ratings = RatingRepo::list_by_trial(pool, trial.id)
                .await?
                .into_iter()
                .filter_map(|rating| {
                    let slot_number = slot_ids.iter().position(|&id| id == rating.slot_id)?;
                    Some(RatingInput {
                        slot_number,
                        question: rating.question as usize,
                        scale_value: rating.scale_value as usize,
                        comment: rating.comment,
                    })
                })
                .collect();
            let demographics = TrialRepo::list_demographic_values(pool, trial.id)
                .await?
                .into_iter()
                .map(|value| value.value)
                .collect();

            trials.push(TrialRatings {
                subject,
                questionnaire_number: questionnaire.number,
                ratings,
                demographics,
            });
        }
        Ok(results_long(&snapshot.study, &trials))
    }

    /// Participation proofs of finished non-test trials.
    pub async fn rating_proofs(
        pool: &PgPool,
        snapshot: &StudySnapshot,
    ) -> Result<Vec<(String, String)>, DbError> {
        let mut proofs = Vec::new();
        let mut subject = 0u32;
        for trial in TrialRepo::list_by_study(pool, snapshot.row.id).await? {
            if trial.is_test {
                continue;
            }
            subject += 1;
            if TrialStatus::parse(&trial.status) == Some(TrialStatus::Finished) {
                let code = ratex_core::trial::participation_code(trial.id, &snapshot.row.secret);
                proofs.push((subject.to_string(), code));
            }
        }
        Ok(proofs)
    }

    /// Serialize a study to an archive bundle, then delete its live
    /// questionnaires and questions and mark it archived.
    pub async fn archive(pool: &PgPool, study_id: DbId) -> Result<Vec<u8>, DbError> {
        let snapshot = StudySnapshot::load(pool, study_id).await?;
        let results = Self::results(pool, &snapshot).await?;
        let bytes = archive_study(&snapshot.study, &results)?;

        QuestionnaireRepo::delete_by_study(pool, study_id).await?;
        QuestionRepo::replace_all(pool, study_id, &[]).await?;
        StudyRepo::set_archived(pool, study_id, true).await?;
        info!(study = study_id, bytes = bytes.len(), "study archived");
        Ok(bytes)
    }

    /// Materialize a new study from an archive bundle.
    ///
    /// The restored study gets a fresh slug, secret, and creation date,
    /// and always comes back unpublished.
    pub async fn restore(pool: &PgPool, bytes: &[u8]) -> Result<StudyRow, DbError> {
        let study = restore_study(bytes)?;

        let taken = StudyRepo::list_slugs(pool).await?;
        let slug = slugify_unique(&study.settings.title, taken.iter().map(String::as_str), None);
        let row = StudyRepo::create(
            pool,
            &CreateStudy {
                slug: slug.clone(),
                title: study.settings.title.clone(),
                item_type: study.settings.item_type.as_str().to_string(),
                secret: new_secret(),
            },
        )
        .await?;
        StudyRepo::update(
            pool,
            row.id,
            &UpdateStudy {
                use_blocks: Some(study.settings.use_blocks),
                pseudo_randomize_question_order: Some(
                    study.settings.pseudo_randomize_question_order,
                ),
                require_participant_id: Some(study.settings.require_participant_id),
                generate_participation_code: Some(study.settings.generate_participation_code),
                password: study.settings.password.clone(),
                end_date: study.settings.end_date,
                trial_limit: study.settings.trial_limit.map(|limit| limit as i32),
                instructions: study.settings.instructions.clone(),
                outro: study.settings.outro.clone(),
                continue_label: Some(study.settings.continue_label.clone()),
                ..UpdateStudy::default()
            },
        )
        .await?;

        let questions: Vec<CreateQuestion> = study
            .questions
            .iter()
            .map(|question| CreateQuestion {
                number: question.number as i32,
                prompt: question.prompt.clone(),
                legend: question.legend.clone(),
                randomize_scale: question.randomize_scale,
                rating_comment: "none".to_string(),
                scale_labels: question
                    .scale_values
                    .iter()
                    .map(|value| value.label.clone())
                    .collect(),
            })
            .collect();
        QuestionRepo::replace_all(pool, row.id, &questions).await?;

        let mut materials_ids = Vec::new();
        let mut item_ids_per_materials = Vec::new();
        let mut list_ids_per_materials = Vec::new();
        for materials in &study.materials {
            let materials_row = MaterialsRepo::create(
                pool,
                row.id,
                &CreateMaterials {
                    title: materials.title.clone(),
                    list_distribution: materials.list_distribution.as_str().to_string(),
                    is_filler: materials.is_filler,
                    is_example: materials.is_example,
                    block: materials.block,
                },
            )
            .await?;
            ItemRepo::replace_items(pool, materials_row.id, &materials.items).await?;
            let item_ids: Vec<DbId> = ItemRepo::list_by_materials(pool, materials_row.id)
                .await?
                .into_iter()
                .map(|item| item.id)
                .collect();
            ItemRepo::replace_lists(pool, materials_row.id, &item_ids, &materials.lists).await?;
            MaterialsRepo::set_items_validated(pool, materials_row.id, materials.items_validated)
                .await?;
            let list_ids: Vec<DbId> = ItemRepo::list_lists(pool, materials_row.id)
                .await?
                .into_iter()
                .map(|list| list.id)
                .collect();
            materials_ids.push(materials_row.id);
            item_ids_per_materials.push(item_ids);
            list_ids_per_materials.push(list_ids);
        }

        // Item rows come back in (number, condition) order; items were
        // also stored in that order, so indices line up.
        let mut questionnaires = study.questionnaires.clone();
        let mut slot_item_ids = Vec::new();
        let mut chosen_list_ids = Vec::new();
        for questionnaire in &mut questionnaires {
            questionnaire.slug = format!("{}-{}", slug, questionnaire.number);
            let mut this_slot_items = Vec::with_capacity(questionnaire.slots.len());
            for slot in &questionnaire.slots {
                let materials = &study.materials[slot.materials_index];
                let item_index = materials
                    .find_item(slot.item_number, &slot.condition)
                    .ok_or(DbError::NotFound("slot item"))?;
                // replace_items preserved input order.
                let sorted_position = materials
                    .item_order()
                    .iter()
                    .position(|&index| index == item_index)
                    .unwrap_or(item_index);
                this_slot_items
                    .push(item_ids_per_materials[slot.materials_index][sorted_position]);
            }
            slot_item_ids.push(this_slot_items);
            let this_lists: Vec<DbId> = questionnaire
                .list_numbers
                .iter()
                .enumerate()
                .filter_map(|(materials_index, &list_number)| {
                    study.materials[materials_index]
                        .lists
                        .iter()
                        .position(|list| list.number == list_number)
                        .map(|position| list_ids_per_materials[materials_index][position])
                })
                .collect();
            chosen_list_ids.push(this_lists);
        }
        QuestionnaireRepo::replace_all(pool, row.id, &questionnaires, &slot_item_ids, &chosen_list_ids)
            .await?;

        for block in &study.blocks {
            QuestionnaireRepo::upsert_block(
                pool,
                row.id,
                block.block,
                block.instructions.as_deref(),
                block.short_instructions.as_deref(),
                block.randomization.as_str(),
            )
            .await?;
        }

        info!(study = row.id, slug = %slug, "study restored from archive");
        StudyRepo::find_by_id(pool, row.id)
            .await?
            .ok_or(DbError::NotFound("study"))
    }

    /// Delete all trials and ratings of a study, unfreezing it.
    pub async fn delete_results(pool: &PgPool, study_id: DbId) -> Result<u64, DbError> {
        let deleted = TrialRepo::delete_by_study(pool, study_id).await?;
        info!(study = study_id, trials = deleted, "results deleted");
        Ok(deleted)
    }
}
