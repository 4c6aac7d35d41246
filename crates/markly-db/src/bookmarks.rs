//! Bookmark repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use markly_core::{BatchTarget, BookmarkEnrichment, BookmarkRepository, Error, Result, TagId};

/// PostgreSQL implementation of BookmarkRepository.
#[derive(Clone)]
pub struct PgBookmarkRepository {
    pool: Pool<Postgres>,
}

impl PgBookmarkRepository {
    /// Create a new PgBookmarkRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookmarkRepository for PgBookmarkRepository {
    async fn list_by_tag(
        &self,
        user_id: &str,
        tag_id: TagId,
        exclude_fetch_failed: bool,
    ) -> Result<Vec<BatchTarget>> {
        let rows = sqlx::query(
            "SELECT b.id, b.url
             FROM user_bookmark b
             JOIN user_bookmark_tag bt ON bt.bookmark_id = b.id
             WHERE b.user_id = $1
               AND bt.tag_id = $2
               AND (NOT $3 OR b.ai_html_fetch_failed = FALSE)
             ORDER BY b.id",
        )
        .bind(user_id)
        .bind(tag_id)
        .bind(exclude_fetch_failed)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| BatchTarget {
                id: row.get("id"),
                url: row.get("url"),
            })
            .collect())
    }

    async fn update_enrichment(&self, user_id: &str, update: &BookmarkEnrichment) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let updated = sqlx::query(
            "UPDATE user_bookmark
             SET name = $3, icon = $4, description = $5, updated_at = NOW()
             WHERE id = $1 AND user_id = $2",
        )
        .bind(update.id)
        .bind(user_id)
        .bind(&update.name)
        .bind(&update.icon)
        .bind(&update.description)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(format!("bookmark {}", update.id)));
        }

        sqlx::query("DELETE FROM user_bookmark_tag WHERE bookmark_id = $1")
            .bind(update.id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        // Only tags owned by the same user are linked; foreign ids are dropped.
        let linked = sqlx::query(
            "INSERT INTO user_bookmark_tag (bookmark_id, tag_id)
             SELECT $1, t.id FROM user_tag t
             WHERE t.user_id = $2 AND t.id = ANY($3::bigint[])
             ON CONFLICT DO NOTHING",
        )
        .bind(update.id)
        .bind(user_id)
        .bind(&update.related_tag_ids)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "bookmarks",
            op = "update_enrichment",
            bookmark_id = update.id,
            requested_tags = update.related_tag_ids.len(),
            linked_tags = linked,
            "Bookmark enrichment saved"
        );
        Ok(())
    }
}
