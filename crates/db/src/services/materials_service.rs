//! Materials workflows: item uploads, validation, list generation.

use std::collections::HashMap;

use ratex_core::csvio::{parse_item_feedbacks, parse_items, ItemColumns};
use ratex_core::distribution::compute_item_lists;
use ratex_core::materials::{pregenerate_items, validate_items};
use ratex_core::types::DbId;
use ratex_core::CoreError;
use sqlx::PgPool;
use tracing::info;

use crate::error::DbError;
use crate::repositories::{ItemRepo, MaterialsRepo, QuestionnaireRepo, RatingRepo};
use crate::services::snapshot::StudySnapshot;

/// Orchestrates materials-level operations.
pub struct MaterialsService;

impl MaterialsService {
    /// Replace the items of a materials set from an uploaded CSV.
    ///
    /// Refused while the study has real results. Existing lists and
    /// questionnaires depend on the old items and are deleted.
    pub async fn upload_items(
        pool: &PgPool,
        study_id: DbId,
        materials_id: DbId,
        data: &[u8],
        columns: Option<ItemColumns>,
        forced_delimiter: Option<u8>,
    ) -> Result<usize, DbError> {
        let snapshot = StudySnapshot::load(pool, study_id).await?;
        if RatingRepo::study_has_non_test_ratings(pool, study_id).await? {
            return Err(CoreError::FrozenStudy.into());
        }
        let columns = columns.unwrap_or_else(|| ItemColumns::materials_upload(&snapshot.study));
        let parsed = parse_items(data, &columns, snapshot.study.settings.item_type, forced_delimiter)?;
        let items: Vec<_> = parsed.into_iter().map(|entry| entry.item).collect();

        QuestionnaireRepo::delete_by_study(pool, study_id).await?;
        ItemRepo::replace_lists(pool, materials_id, &[], &[]).await?;
        ItemRepo::replace_items(pool, materials_id, &items).await?;
        info!(materials = materials_id, items = items.len(), "items uploaded");
        Ok(items.len())
    }

    /// Replace the items of a materials set with empty placeholders,
    /// numbers `1..=n_items` with conditions `a, b, c, ...`.
    ///
    /// The set drops back to unvalidated; dependent lists and
    /// questionnaires are deleted.
    pub async fn pregenerate(
        pool: &PgPool,
        study_id: DbId,
        materials_id: DbId,
        n_items: usize,
        n_conditions: usize,
    ) -> Result<usize, DbError> {
        let snapshot = StudySnapshot::load(pool, study_id).await?;
        if RatingRepo::study_has_non_test_ratings(pool, study_id).await? {
            return Err(CoreError::FrozenStudy.into());
        }
        let items = pregenerate_items(n_items, n_conditions, snapshot.study.settings.item_type);

        QuestionnaireRepo::delete_by_study(pool, study_id).await?;
        ItemRepo::replace_lists(pool, materials_id, &[], &[]).await?;
        ItemRepo::replace_items(pool, materials_id, &items).await?;
        MaterialsRepo::set_items_validated(pool, materials_id, false).await?;
        info!(materials = materials_id, items = items.len(), "items pregenerated");
        Ok(items.len())
    }

    /// Validate a materials set and generate its item lists.
    ///
    /// Returns the validation warnings. On success the set is marked
    /// validated and its lists are rewritten.
    pub async fn validate_and_generate_lists(
        pool: &PgPool,
        study_id: DbId,
        materials_id: DbId,
    ) -> Result<Vec<String>, DbError> {
        let snapshot = StudySnapshot::load(pool, study_id).await?;
        if RatingRepo::study_has_non_test_ratings(pool, study_id).await? {
            return Err(CoreError::FrozenStudy.into());
        }
        let materials_index = snapshot
            .materials_ids
            .iter()
            .position(|&id| id == materials_id)
            .ok_or(DbError::NotFound("materials"))?;

        let mut materials = snapshot.study.materials[materials_index].clone();
        let warnings = validate_items(
            &materials,
            snapshot.study.settings.item_type,
            &snapshot.study.questions,
        )?;
        materials.items_validated = true;
        let lists = compute_item_lists(&materials)?;

        MaterialsRepo::set_items_validated(pool, materials_id, true).await?;
        ItemRepo::replace_lists(
            pool,
            materials_id,
            &snapshot.item_ids[materials_index],
            &lists,
        )
        .await?;
        info!(
            materials = materials_id,
            lists = lists.len(),
            warnings = warnings.len(),
            "items validated, lists generated"
        );
        Ok(warnings)
    }

    /// Replace per-item answer feedbacks from an uploaded CSV.
    pub async fn upload_feedbacks(
        pool: &PgPool,
        study_id: DbId,
        materials_id: DbId,
        data: &[u8],
        forced_delimiter: Option<u8>,
    ) -> Result<usize, DbError> {
        let snapshot = StudySnapshot::load(pool, study_id).await?;
        let materials_index = snapshot
            .materials_ids
            .iter()
            .position(|&id| id == materials_id)
            .ok_or(DbError::NotFound("materials"))?;
        let materials = &snapshot.study.materials[materials_index];

        let parsed = parse_item_feedbacks(
            data,
            snapshot.study.question_count(),
            false,
            forced_delimiter,
        )?;
        let mut by_item: HashMap<usize, Vec<ratex_core::item::ItemFeedback>> = HashMap::new();
        for entry in parsed {
            let item_index = materials
                .find_item(entry.item_number, &entry.item_condition)
                .ok_or_else(|| {
                    CoreError::Structural(format!(
                        "no item {}{} in {:?}",
                        entry.item_number, entry.item_condition, materials.title
                    ))
                })?;
            by_item.entry(item_index).or_default().push(entry.feedback);
        }

        let mut count = 0;
        for (item_index, feedbacks) in by_item {
            count += feedbacks.len();
            ItemRepo::replace_feedbacks(
                pool,
                snapshot.item_ids[materials_index][item_index],
                &feedbacks,
            )
            .await?;
        }
        Ok(count)
    }
}
