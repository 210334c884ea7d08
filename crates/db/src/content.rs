// crates/db/src/content.rs
//! SQLite-backed [`ContentStore`]: one row per `(subject, item)`, upserted.

use async_trait::async_trait;
use taskforge_core::{ContentStore, ItemId, StoreError};

use crate::{now_millis, Database, DbResult};

/// Content store writing into the `task_items` table of a [`Database`].
#[derive(Debug, Clone)]
pub struct SqliteContentStore {
    db: Database,
}

impl SqliteContentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn save(&self, subject: &str, item: ItemId, content: &str) -> Result<(), StoreError> {
        self.db
            .upsert_item_content(subject, item, content)
            .await
            .map_err(|e| StoreError(e.to_string()))
    }
}

impl Database {
    /// Insert or replace the content of one item.
    pub async fn upsert_item_content(
        &self,
        subject: &str,
        item: ItemId,
        content: &str,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO task_items (subject, item_id, content, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(subject, item_id) DO UPDATE SET
                content = excluded.content,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(subject)
        .bind(item)
        .bind(content)
        .bind(now_millis())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_is_idempotent_upsert() {
        let db = Database::new_in_memory().await.unwrap();
        let store = SqliteContentStore::new(db.clone());

        store.save("bookA", 3, "first draft").await.unwrap();
        store.save("bookA", 3, "second draft").await.unwrap();
        store.save("bookA", 1, "one").await.unwrap();
        store.save("bookB", 3, "other book").await.unwrap();

        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT item_id, content FROM task_items WHERE subject = ?1 ORDER BY item_id",
        )
        .bind("bookA")
        .fetch_all(db.pool())
        .await
        .unwrap();
        assert_eq!(
            rows,
            vec![(1, "one".to_string()), (3, "second draft".to_string())]
        );
    }
}
