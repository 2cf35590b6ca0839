//! Repository for items, per-item overrides, and item lists.

use ratex_core::item::Item;
use ratex_core::materials::ItemList;
use ratex_core::types::DbId;
use sqlx::PgPool;

use crate::models::materials::{ItemFeedbackRow, ItemListRow, ItemQuestionRow, ItemRow};

const ITEM_COLUMNS: &str =
    "id, materials_id, number, condition, block, content, audio_description";

/// Provides operations for items and the lists built from them.
pub struct ItemRepo;

impl ItemRepo {
    /// Items of a materials set in `(number, condition)` order.
    pub async fn list_by_materials(
        pool: &PgPool,
        materials_id: DbId,
    ) -> Result<Vec<ItemRow>, sqlx::Error> {
        let query = format!(
            "SELECT {ITEM_COLUMNS} FROM items
             WHERE materials_id = $1 ORDER BY number, condition"
        );
        sqlx::query_as::<_, ItemRow>(&query)
            .bind(materials_id)
            .fetch_all(pool)
            .await
    }

    pub async fn list_item_questions(
        pool: &PgPool,
        materials_id: DbId,
    ) -> Result<Vec<ItemQuestionRow>, sqlx::Error> {
        sqlx::query_as::<_, ItemQuestionRow>(
            "SELECT iq.id, iq.item_id, iq.number, iq.prompt, iq.scale_labels, iq.legend
             FROM item_questions iq
             JOIN items i ON i.id = iq.item_id
             WHERE i.materials_id = $1
             ORDER BY iq.item_id, iq.number",
        )
        .bind(materials_id)
        .fetch_all(pool)
        .await
    }

    pub async fn list_feedbacks(
        pool: &PgPool,
        materials_id: DbId,
    ) -> Result<Vec<ItemFeedbackRow>, sqlx::Error> {
        sqlx::query_as::<_, ItemFeedbackRow>(
            "SELECT f.id, f.item_id, f.question, f.scale_values, f.feedback
             FROM item_feedbacks f
             JOIN items i ON i.id = f.item_id
             WHERE i.materials_id = $1
             ORDER BY f.item_id, f.question",
        )
        .bind(materials_id)
        .fetch_all(pool)
        .await
    }

    /// Replace all items of a materials set. Deleting the old items
    /// cascades to their overrides, feedbacks, list entries, and slots;
    /// the caller is responsible for having removed dependent
    /// questionnaires first. Resets the validated flag.
    pub async fn replace_items(
        pool: &PgPool,
        materials_id: DbId,
        items: &[Item],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM items WHERE materials_id = $1")
            .bind(materials_id)
            .execute(&mut *tx)
            .await?;
        for item in items {
            let (item_id,): (DbId,) = sqlx::query_as(
                "INSERT INTO items
                    (materials_id, number, condition, block, content, audio_description)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING id",
            )
            .bind(materials_id)
            .bind(item.number as i32)
            .bind(&item.condition)
            .bind(item.block)
            .bind(item.content.as_cell())
            .bind(&item.audio_description)
            .fetch_one(&mut *tx)
            .await?;
            for item_question in &item.item_questions {
                sqlx::query(
                    "INSERT INTO item_questions (item_id, number, prompt, scale_labels, legend)
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(item_id)
                .bind(item_question.number as i32)
                .bind(&item_question.prompt)
                .bind(&item_question.scale_labels)
                .bind(&item_question.legend)
                .execute(&mut *tx)
                .await?;
            }
            for feedback in &item.feedbacks {
                sqlx::query(
                    "INSERT INTO item_feedbacks (item_id, question, scale_values, feedback)
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(item_id)
                .bind(feedback.question as i32)
                .bind(&feedback.scale_values)
                .bind(&feedback.feedback)
                .execute(&mut *tx)
                .await?;
            }
        }
        sqlx::query("UPDATE materials SET items_validated = FALSE WHERE id = $1")
            .bind(materials_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await
    }

    /// Replace the feedbacks of one item.
    pub async fn replace_feedbacks(
        pool: &PgPool,
        item_id: DbId,
        feedbacks: &[ratex_core::item::ItemFeedback],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM item_feedbacks WHERE item_id = $1")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;
        for feedback in feedbacks {
            sqlx::query(
                "INSERT INTO item_feedbacks (item_id, question, scale_values, feedback)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(item_id)
            .bind(feedback.question as i32)
            .bind(&feedback.scale_values)
            .bind(&feedback.feedback)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }

    pub async fn list_lists(
        pool: &PgPool,
        materials_id: DbId,
    ) -> Result<Vec<ItemListRow>, sqlx::Error> {
        sqlx::query_as::<_, ItemListRow>(
            "SELECT id, materials_id, number FROM item_lists
             WHERE materials_id = $1 ORDER BY number",
        )
        .bind(materials_id)
        .fetch_all(pool)
        .await
    }

    /// Item ids of one list in position order.
    pub async fn list_entries(
        pool: &PgPool,
        item_list_id: DbId,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        let rows: Vec<(DbId,)> = sqlx::query_as(
            "SELECT item_id FROM item_list_items
             WHERE item_list_id = $1 ORDER BY position",
        )
        .bind(item_list_id)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Replace the item lists of a materials set. `lists` holds indices
    /// into `item_ids`, which must be in the same order the items were
    /// loaded in.
    pub async fn replace_lists(
        pool: &PgPool,
        materials_id: DbId,
        item_ids: &[DbId],
        lists: &[ItemList],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM item_lists WHERE materials_id = $1")
            .bind(materials_id)
            .execute(&mut *tx)
            .await?;
        for list in lists {
            let (list_id,): (DbId,) = sqlx::query_as(
                "INSERT INTO item_lists (materials_id, number) VALUES ($1, $2) RETURNING id",
            )
            .bind(materials_id)
            .bind(list.number as i32)
            .fetch_one(&mut *tx)
            .await?;
            for (position, &item_index) in list.items.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO item_list_items (item_list_id, item_id, position)
                     VALUES ($1, $2, $3)",
                )
                .bind(list_id)
                .bind(item_ids[item_index])
                .bind(position as i32)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await
    }
}
