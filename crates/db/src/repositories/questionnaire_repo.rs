//! Repository for questionnaires, slots, and block settings.

use ratex_core::listing::to_int_list;
use ratex_core::questionnaire::Questionnaire;
use ratex_core::types::DbId;
use sqlx::PgPool;

use crate::models::questionnaire::{
    QuestionnaireBlockRow, QuestionnaireRow, SlotQuestionPropertyRow, SlotRow,
};

/// Provides operations for questionnaires and their slots.
pub struct QuestionnaireRepo;

impl QuestionnaireRepo {
    /// List a study's questionnaires in number order.
    pub async fn list_by_study(
        pool: &PgPool,
        study_id: DbId,
    ) -> Result<Vec<QuestionnaireRow>, sqlx::Error> {
        sqlx::query_as::<_, QuestionnaireRow>(
            "SELECT id, study_id, number, slug FROM questionnaires
             WHERE study_id = $1 ORDER BY number",
        )
        .bind(study_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<QuestionnaireRow>, sqlx::Error> {
        sqlx::query_as::<_, QuestionnaireRow>(
            "SELECT id, study_id, number, slug FROM questionnaires WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_slug(
        pool: &PgPool,
        slug: &str,
    ) -> Result<Option<QuestionnaireRow>, sqlx::Error> {
        sqlx::query_as::<_, QuestionnaireRow>(
            "SELECT id, study_id, number, slug FROM questionnaires WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(pool)
        .await
    }

    /// Slots of one questionnaire in position order.
    pub async fn list_slots(
        pool: &PgPool,
        questionnaire_id: DbId,
    ) -> Result<Vec<SlotRow>, sqlx::Error> {
        sqlx::query_as::<_, SlotRow>(
            "SELECT id, questionnaire_id, number, item_id, question_order
             FROM slots WHERE questionnaire_id = $1 ORDER BY number",
        )
        .bind(questionnaire_id)
        .fetch_all(pool)
        .await
    }

    pub async fn list_slot_properties(
        pool: &PgPool,
        questionnaire_id: DbId,
    ) -> Result<Vec<SlotQuestionPropertyRow>, sqlx::Error> {
        sqlx::query_as::<_, SlotQuestionPropertyRow>(
            "SELECT p.id, p.slot_id, p.question, p.scale_order
             FROM slot_question_properties p
             JOIN slots s ON s.id = p.slot_id
             WHERE s.questionnaire_id = $1
             ORDER BY s.number, p.question",
        )
        .bind(questionnaire_id)
        .fetch_all(pool)
        .await
    }

    /// Delete every questionnaire of a study. Trials and their ratings
    /// go with them via the foreign keys.
    pub async fn delete_by_study(pool: &PgPool, study_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM questionnaires WHERE study_id = $1")
            .bind(study_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Replace a study's questionnaires with freshly generated ones.
    ///
    /// `slot_item_ids[q][s]` is the item row id of questionnaire `q`'s
    /// slot `s`; `list_ids[q]` are the chosen item-list row ids.
    pub async fn replace_all(
        pool: &PgPool,
        study_id: DbId,
        questionnaires: &[Questionnaire],
        slot_item_ids: &[Vec<DbId>],
        list_ids: &[Vec<DbId>],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM questionnaires WHERE study_id = $1")
            .bind(study_id)
            .execute(&mut *tx)
            .await?;
        for (q, questionnaire) in questionnaires.iter().enumerate() {
            let (questionnaire_id,): (DbId,) = sqlx::query_as(
                "INSERT INTO questionnaires (study_id, number, slug)
                 VALUES ($1, $2, $3)
                 RETURNING id",
            )
            .bind(study_id)
            .bind(questionnaire.number as i32)
            .bind(&questionnaire.slug)
            .fetch_one(&mut *tx)
            .await?;
            for &list_id in &list_ids[q] {
                sqlx::query(
                    "INSERT INTO questionnaire_lists (questionnaire_id, item_list_id)
                     VALUES ($1, $2)",
                )
                .bind(questionnaire_id)
                .bind(list_id)
                .execute(&mut *tx)
                .await?;
            }
            for (s, slot) in questionnaire.slots.iter().enumerate() {
                let (slot_id,): (DbId,) = sqlx::query_as(
                    "INSERT INTO slots (questionnaire_id, number, item_id, question_order)
                     VALUES ($1, $2, $3, $4)
                     RETURNING id",
                )
                .bind(questionnaire_id)
                .bind(slot.number as i32)
                .bind(slot_item_ids[q][s])
                .bind(slot.question_order.as_deref().map(to_int_list))
                .fetch_one(&mut *tx)
                .await?;
                for property in &slot.question_properties {
                    sqlx::query(
                        "INSERT INTO slot_question_properties (slot_id, question, scale_order)
                         VALUES ($1, $2, $3)",
                    )
                    .bind(slot_id)
                    .bind(property.question as i32)
                    .bind(to_int_list(&property.scale_order))
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }
        tx.commit().await
    }

    pub async fn list_blocks(
        pool: &PgPool,
        study_id: DbId,
    ) -> Result<Vec<QuestionnaireBlockRow>, sqlx::Error> {
        sqlx::query_as::<_, QuestionnaireBlockRow>(
            "SELECT id, study_id, block, instructions, short_instructions, randomization
             FROM questionnaire_blocks WHERE study_id = $1 ORDER BY block",
        )
        .bind(study_id)
        .fetch_all(pool)
        .await
    }

    /// Insert or update the settings of one block.
    pub async fn upsert_block(
        pool: &PgPool,
        study_id: DbId,
        block: i32,
        instructions: Option<&str>,
        short_instructions: Option<&str>,
        randomization: &str,
    ) -> Result<QuestionnaireBlockRow, sqlx::Error> {
        sqlx::query_as::<_, QuestionnaireBlockRow>(
            "INSERT INTO questionnaire_blocks
                (study_id, block, instructions, short_instructions, randomization)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (study_id, block) DO UPDATE SET
                instructions = EXCLUDED.instructions,
                short_instructions = EXCLUDED.short_instructions,
                randomization = EXCLUDED.randomization
             RETURNING id, study_id, block, instructions, short_instructions, randomization",
        )
        .bind(study_id)
        .bind(block)
        .bind(instructions)
        .bind(short_instructions)
        .bind(randomization)
        .fetch_one(pool)
        .await
    }
}
