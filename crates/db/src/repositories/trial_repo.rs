//! Repository for the `trials` table.

use ratex_core::types::DbId;
use sqlx::PgPool;

use crate::models::trial::{CreateTrial, DemographicValueRow, TrialRow};

const COLUMNS: &str =
    "id, questionnaire_id, participant_id, is_test, status, created_at, ended_at";

/// Provides CRUD operations for trials.
pub struct TrialRepo;

impl TrialRepo {
    pub async fn create(pool: &PgPool, input: &CreateTrial) -> Result<TrialRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO trials (questionnaire_id, participant_id, is_test)
             VALUES ($1, $2, $3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TrialRow>(&query)
            .bind(input.questionnaire_id)
            .bind(&input.participant_id)
            .bind(input.is_test)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<TrialRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM trials WHERE id = $1");
        sqlx::query_as::<_, TrialRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All trials of a study in creation order.
    pub async fn list_by_study(pool: &PgPool, study_id: DbId) -> Result<Vec<TrialRow>, sqlx::Error> {
        sqlx::query_as::<_, TrialRow>(
            "SELECT t.id, t.questionnaire_id, t.participant_id, t.is_test,
                    t.status, t.created_at, t.ended_at
             FROM trials t
             JOIN questionnaires q ON q.id = t.questionnaire_id
             WHERE q.study_id = $1
             ORDER BY t.created_at, t.id",
        )
        .bind(study_id)
        .fetch_all(pool)
        .await
    }

    /// Trials per questionnaire, for round-robin assignment.
    pub async fn count_by_questionnaire(
        pool: &PgPool,
        questionnaire_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM trials WHERE questionnaire_id = $1")
                .bind(questionnaire_id)
                .fetch_one(pool)
                .await?;
        Ok(count)
    }

    pub async fn count_non_test_by_study(
        pool: &PgPool,
        study_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM trials t
             JOIN questionnaires q ON q.id = t.questionnaire_id
             WHERE q.study_id = $1 AND NOT t.is_test",
        )
        .bind(study_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    pub async fn set_status(pool: &PgPool, id: DbId, status: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE trials SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn finish(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE trials SET status = 'finished', ended_at = NOW() WHERE id = $1")
                .bind(id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM trials WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every trial of a study. Used when deleting results
    /// unfreezes the study for structural changes.
    pub async fn delete_by_study(pool: &PgPool, study_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM trials WHERE questionnaire_id IN
                (SELECT id FROM questionnaires WHERE study_id = $1)",
        )
        .bind(study_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete the test trials of a study, keeping real results.
    pub async fn delete_test_trials(pool: &PgPool, study_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM trials WHERE is_test AND questionnaire_id IN
                (SELECT id FROM questionnaires WHERE study_id = $1)",
        )
        .bind(study_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_demographic_values(
        pool: &PgPool,
        trial_id: DbId,
    ) -> Result<Vec<DemographicValueRow>, sqlx::Error> {
        sqlx::query_as::<_, DemographicValueRow>(
            "SELECT dv.id, dv.trial_id, dv.demographic_field_id, dv.value
             FROM demographic_values dv
             JOIN demographic_fields df ON df.id = dv.demographic_field_id
             WHERE dv.trial_id = $1
             ORDER BY df.number",
        )
        .bind(trial_id)
        .fetch_all(pool)
        .await
    }

    /// Record the demographic answers of a trial, one value per field.
    pub async fn save_demographic_values(
        pool: &PgPool,
        trial_id: DbId,
        values: &[(DbId, String)],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        for (field_id, value) in values {
            sqlx::query(
                "INSERT INTO demographic_values (trial_id, demographic_field_id, value)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (trial_id, demographic_field_id)
                 DO UPDATE SET value = EXCLUDED.value",
            )
            .bind(trial_id)
            .bind(field_id)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }
}
