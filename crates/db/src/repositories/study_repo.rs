//! Repository for the `studies` and `demographic_fields` tables.

use ratex_core::types::DbId;
use sqlx::PgPool;

use crate::models::study::{CreateStudy, DemographicFieldRow, StudyRow, UpdateStudy};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, slug, title, item_type, use_blocks, \
    pseudo_randomize_question_order, require_participant_id, \
    generate_participation_code, password, end_date, trial_limit, \
    is_published, is_archived, instructions, outro, continue_label, \
    secret, created_date, created_at, updated_at";

/// Provides CRUD operations for studies.
pub struct StudyRepo;

impl StudyRepo {
    /// Insert a new study, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateStudy) -> Result<StudyRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO studies (slug, title, item_type, secret)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, StudyRow>(&query)
            .bind(&input.slug)
            .bind(&input.title)
            .bind(&input.item_type)
            .bind(&input.secret)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<StudyRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM studies WHERE id = $1");
        sqlx::query_as::<_, StudyRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Option<StudyRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM studies WHERE slug = $1");
        sqlx::query_as::<_, StudyRow>(&query)
            .bind(slug)
            .fetch_optional(pool)
            .await
    }

    /// List all studies, newest first.
    pub async fn list_all(pool: &PgPool) -> Result<Vec<StudyRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM studies ORDER BY created_at DESC");
        sqlx::query_as::<_, StudyRow>(&query).fetch_all(pool).await
    }

    /// All slugs, for unique-slug computation.
    pub async fn list_slugs(pool: &PgPool) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT slug FROM studies")
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(|(slug,)| slug).collect())
    }

    /// Update study settings. Only non-`None` fields in `input` are applied.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateStudy,
    ) -> Result<Option<StudyRow>, sqlx::Error> {
        let query = format!(
            "UPDATE studies SET
                title = COALESCE($2, title),
                item_type = COALESCE($3, item_type),
                use_blocks = COALESCE($4, use_blocks),
                pseudo_randomize_question_order = COALESCE($5, pseudo_randomize_question_order),
                require_participant_id = COALESCE($6, require_participant_id),
                generate_participation_code = COALESCE($7, generate_participation_code),
                password = COALESCE($8, password),
                end_date = COALESCE($9, end_date),
                trial_limit = COALESCE($10, trial_limit),
                instructions = COALESCE($11, instructions),
                outro = COALESCE($12, outro),
                continue_label = COALESCE($13, continue_label),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, StudyRow>(&query)
            .bind(id)
            .bind(&input.title)
            .bind(&input.item_type)
            .bind(input.use_blocks)
            .bind(input.pseudo_randomize_question_order)
            .bind(input.require_participant_id)
            .bind(input.generate_participation_code)
            .bind(&input.password)
            .bind(input.end_date)
            .bind(input.trial_limit)
            .bind(&input.instructions)
            .bind(&input.outro)
            .bind(&input.continue_label)
            .fetch_optional(pool)
            .await
    }

    pub async fn set_published(
        pool: &PgPool,
        id: DbId,
        is_published: bool,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE studies SET is_published = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(is_published)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_archived(
        pool: &PgPool,
        id: DbId,
        is_archived: bool,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE studies SET is_archived = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(is_archived)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM studies WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_demographic_fields(
        pool: &PgPool,
        study_id: DbId,
    ) -> Result<Vec<DemographicFieldRow>, sqlx::Error> {
        sqlx::query_as::<_, DemographicFieldRow>(
            "SELECT id, study_id, number, prompt
             FROM demographic_fields WHERE study_id = $1 ORDER BY number",
        )
        .bind(study_id)
        .fetch_all(pool)
        .await
    }

    /// Replace the demographic fields of a study.
    pub async fn replace_demographic_fields(
        pool: &PgPool,
        study_id: DbId,
        prompts: &[String],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM demographic_fields WHERE study_id = $1")
            .bind(study_id)
            .execute(&mut *tx)
            .await?;
        for (number, prompt) in prompts.iter().enumerate() {
            sqlx::query(
                "INSERT INTO demographic_fields (study_id, number, prompt) VALUES ($1, $2, $3)",
            )
            .bind(study_id)
            .bind(number as i32)
            .bind(prompt)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }
}
