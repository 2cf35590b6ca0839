//! Repository for the `materials` table.

use ratex_core::types::DbId;
use sqlx::PgPool;

use crate::models::materials::{CreateMaterials, MaterialsRow};

const COLUMNS: &str =
    "id, study_id, title, list_distribution, is_filler, is_example, block, items_validated";

/// Provides CRUD operations for materials sets.
pub struct MaterialsRepo;

impl MaterialsRepo {
    pub async fn create(
        pool: &PgPool,
        study_id: DbId,
        input: &CreateMaterials,
    ) -> Result<MaterialsRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO materials
                (study_id, title, list_distribution, is_filler, is_example, block)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, MaterialsRow>(&query)
            .bind(study_id)
            .bind(&input.title)
            .bind(&input.list_distribution)
            .bind(input.is_filler)
            .bind(input.is_example)
            .bind(input.block)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<MaterialsRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM materials WHERE id = $1");
        sqlx::query_as::<_, MaterialsRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a study's materials sets in creation order.
    pub async fn list_by_study(
        pool: &PgPool,
        study_id: DbId,
    ) -> Result<Vec<MaterialsRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM materials WHERE study_id = $1 ORDER BY id");
        sqlx::query_as::<_, MaterialsRow>(&query)
            .bind(study_id)
            .fetch_all(pool)
            .await
    }

    pub async fn set_items_validated(
        pool: &PgPool,
        id: DbId,
        validated: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE materials SET items_validated = $2 WHERE id = $1")
            .bind(id)
            .bind(validated)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM materials WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
