//! Repository for the `questions` and `scale_values` tables.

use ratex_core::types::DbId;
use sqlx::PgPool;

use crate::models::study::{CreateQuestion, QuestionRow, ScaleValueRow};

const COLUMNS: &str = "id, study_id, number, prompt, legend, randomize_scale, rating_comment";

/// Provides operations for questions and their scale values.
pub struct QuestionRepo;

impl QuestionRepo {
    /// List a study's questions in number order.
    pub async fn list_by_study(
        pool: &PgPool,
        study_id: DbId,
    ) -> Result<Vec<QuestionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM questions WHERE study_id = $1 ORDER BY number");
        sqlx::query_as::<_, QuestionRow>(&query)
            .bind(study_id)
            .fetch_all(pool)
            .await
    }

    /// Scale values of every question of a study, in `(question, number)`
    /// order.
    pub async fn list_scale_values(
        pool: &PgPool,
        study_id: DbId,
    ) -> Result<Vec<ScaleValueRow>, sqlx::Error> {
        sqlx::query_as::<_, ScaleValueRow>(
            "SELECT sv.id, sv.question_id, sv.number, sv.label
             FROM scale_values sv
             JOIN questions q ON q.id = sv.question_id
             WHERE q.study_id = $1
             ORDER BY q.number, sv.number",
        )
        .bind(study_id)
        .fetch_all(pool)
        .await
    }

    /// Replace all questions of a study. Question and scale-value
    /// numbers are renumbered densely from 0.
    pub async fn replace_all(
        pool: &PgPool,
        study_id: DbId,
        questions: &[CreateQuestion],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM questions WHERE study_id = $1")
            .bind(study_id)
            .execute(&mut *tx)
            .await?;
        for (number, question) in questions.iter().enumerate() {
            let (question_id,): (DbId,) = sqlx::query_as(
                "INSERT INTO questions
                    (study_id, number, prompt, legend, randomize_scale, rating_comment)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING id",
            )
            .bind(study_id)
            .bind(number as i32)
            .bind(&question.prompt)
            .bind(&question.legend)
            .bind(question.randomize_scale)
            .bind(&question.rating_comment)
            .fetch_one(&mut *tx)
            .await?;
            for (value_number, label) in question.scale_labels.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO scale_values (question_id, number, label) VALUES ($1, $2, $3)",
                )
                .bind(question_id)
                .bind(value_number as i32)
                .bind(label)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await
    }
}
