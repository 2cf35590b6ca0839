//! Questionnaire generation against the live database.

use rand::rngs::StdRng;
use rand::SeedableRng;
use ratex_core::questionnaire::{generate_questionnaires, DEFAULT_PERMUTATIONS};
use ratex_core::types::DbId;
use ratex_core::CoreError;
use sqlx::PgPool;
use tracing::info;

use crate::error::DbError;
use crate::repositories::{QuestionnaireRepo, RatingRepo};
use crate::services::snapshot::StudySnapshot;

/// Orchestrates questionnaire (re)generation.
pub struct QuestionnaireService;

impl QuestionnaireService {
    /// Generate the questionnaire set of a study, replacing any
    /// existing one.
    ///
    /// Destructive: existing trials hang off the old questionnaires and
    /// are deleted with them, so the operation is refused while the
    /// study is active (published, or holding real ratings).
    pub async fn generate(pool: &PgPool, study_id: DbId) -> Result<usize, DbError> {
        Self::generate_with_permutations(pool, study_id, DEFAULT_PERMUTATIONS).await
    }

    pub async fn generate_with_permutations(
        pool: &PgPool,
        study_id: DbId,
        permutations: u32,
    ) -> Result<usize, DbError> {
        let snapshot = StudySnapshot::load(pool, study_id).await?;
        if RatingRepo::study_has_non_test_ratings(pool, study_id).await? {
            return Err(CoreError::FrozenStudy.into());
        }
        if snapshot.study.settings.is_published {
            return Err(CoreError::NotAllowed(
                "unpublish the study before regenerating questionnaires".into(),
            )
            .into());
        }

        let mut rng = StdRng::from_os_rng();
        let questionnaires =
            generate_questionnaires(&snapshot.study, &snapshot.row.slug, permutations, &mut rng)?;

        let mut slot_item_ids = Vec::with_capacity(questionnaires.len());
        let mut list_ids = Vec::with_capacity(questionnaires.len());
        for questionnaire in &questionnaires {
            let mut this_slots = Vec::with_capacity(questionnaire.slots.len());
            for slot in &questionnaire.slots {
                let materials = &snapshot.study.materials[slot.materials_index];
                let item_index = materials
                    .find_item(slot.item_number, &slot.condition)
                    .ok_or(DbError::NotFound("slot item"))?;
                this_slots.push(snapshot.item_ids[slot.materials_index][item_index]);
            }
            slot_item_ids.push(this_slots);

            let this_lists = questionnaire
                .list_numbers
                .iter()
                .enumerate()
                .filter_map(|(materials_index, &list_number)| {
                    snapshot.study.materials[materials_index]
                        .lists
                        .iter()
                        .position(|list| list.number == list_number)
                        .map(|position| snapshot.list_ids[materials_index][position])
                })
                .collect();
            list_ids.push(this_lists);
        }

        QuestionnaireRepo::replace_all(pool, study_id, &questionnaires, &slot_item_ids, &list_ids)
            .await?;
        info!(
            study = study_id,
            questionnaires = questionnaires.len(),
            "questionnaires generated"
        );
        Ok(questionnaires.len())
    }
}
