//! Repository for the `ratings` table.

use ratex_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::trial::{CreateRating, RatingRow};

const COLUMNS: &str = "id, trial_id, slot_id, question, scale_value, comment, created_at";

/// Provides operations for ratings.
pub struct RatingRepo;

impl RatingRepo {
    /// Insert a rating, returning the stored row.
    ///
    /// Idempotent on `(trial, slot, question)`: a concurrent or repeated
    /// write returns the first writer's row unchanged.
    pub async fn record(pool: &PgPool, input: &CreateRating) -> Result<RatingRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO ratings (trial_id, slot_id, question, scale_value, comment)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (trial_id, slot_id, question) DO NOTHING
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, RatingRow>(&query)
            .bind(input.trial_id)
            .bind(input.slot_id)
            .bind(input.question)
            .bind(input.scale_value)
            .bind(&input.comment)
            .fetch_optional(pool)
            .await?;
        match inserted {
            Some(row) => Ok(row),
            None => {
                let query = format!(
                    "SELECT {COLUMNS} FROM ratings
                     WHERE trial_id = $1 AND slot_id = $2 AND question = $3"
                );
                sqlx::query_as::<_, RatingRow>(&query)
                    .bind(input.trial_id)
                    .bind(input.slot_id)
                    .bind(input.question)
                    .fetch_one(pool)
                    .await
            }
        }
    }

    pub async fn list_by_trial(pool: &PgPool, trial_id: DbId) -> Result<Vec<RatingRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM ratings WHERE trial_id = $1 ORDER BY created_at, id"
        );
        sqlx::query_as::<_, RatingRow>(&query)
            .bind(trial_id)
            .fetch_all(pool)
            .await
    }

    /// Completed slots of a trial: ratings for the first question.
    pub async fn count_first_question(pool: &PgPool, trial_id: DbId) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM ratings WHERE trial_id = $1 AND question = 0")
                .bind(trial_id)
                .fetch_one(pool)
                .await?;
        Ok(count)
    }

    pub async fn count_by_trial(pool: &PgPool, trial_id: DbId) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM ratings WHERE trial_id = $1")
                .bind(trial_id)
                .fetch_one(pool)
                .await?;
        Ok(count)
    }

    /// Time of the most recent rating, for abandonment detection.
    pub async fn last_rating_time(
        pool: &PgPool,
        trial_id: DbId,
    ) -> Result<Option<Timestamp>, sqlx::Error> {
        let row: Option<(Timestamp,)> =
            sqlx::query_as("SELECT MAX(created_at) FROM ratings WHERE trial_id = $1 HAVING MAX(created_at) IS NOT NULL")
                .bind(trial_id)
                .fetch_optional(pool)
                .await?;
        Ok(row.map(|(at,)| at))
    }

    /// Whether the study has any rating from a non-test trial. Such a
    /// study is frozen against structural mutation.
    pub async fn study_has_non_test_ratings(
        pool: &PgPool,
        study_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (
                SELECT 1 FROM ratings r
                JOIN trials t ON t.id = r.trial_id
                JOIN questionnaires q ON q.id = t.questionnaire_id
                WHERE q.study_id = $1 AND NOT t.is_test
             )",
        )
        .bind(study_id)
        .fetch_one(pool)
        .await?;
        Ok(exists)
    }

    /// Delete all ratings of a study's non-test trials, unfreezing it.
    pub async fn delete_by_study(pool: &PgPool, study_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM ratings WHERE trial_id IN (
                SELECT t.id FROM trials t
                JOIN questionnaires q ON q.id = t.questionnaire_id
                WHERE q.study_id = $1
             )",
        )
        .bind(study_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
