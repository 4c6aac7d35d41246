//! Tag repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use markly_core::{Error, Result, TagRepository, UserTag};

/// PostgreSQL implementation of TagRepository.
#[derive(Clone)]
pub struct PgTagRepository {
    pool: Pool<Postgres>,
}

impl PgTagRepository {
    /// Create a new PgTagRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_tag_row(row: sqlx::postgres::PgRow) -> UserTag {
        UserTag {
            id: row.get("id"),
            user_id: row.get("user_id"),
            name: row.get("name"),
        }
    }
}

#[async_trait]
impl TagRepository for PgTagRepository {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<UserTag>> {
        let rows = sqlx::query(
            "SELECT id, user_id, name FROM user_tag WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_tag_row).collect())
    }

    async fn find_by_name(&self, user_id: &str, name: &str) -> Result<Option<UserTag>> {
        let row = sqlx::query("SELECT id, user_id, name FROM user_tag WHERE user_id = $1 AND name = $2")
            .bind(user_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_tag_row))
    }

    async fn create_if_missing(&self, user_id: &str, names: &[String]) -> Result<Vec<UserTag>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let inserted = sqlx::query(
            "INSERT INTO user_tag (user_id, name)
             SELECT $1, name FROM UNNEST($2::text[]) AS name
             ON CONFLICT (user_id, name) DO NOTHING",
        )
        .bind(user_id)
        .bind(names)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        // Concurrent creators may have won the insert; read back every row.
        let rows = sqlx::query(
            "SELECT id, user_id, name FROM user_tag
             WHERE user_id = $1 AND name = ANY($2::text[])
             ORDER BY array_position($2::text[], name)",
        )
        .bind(user_id)
        .bind(names)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "tags",
            op = "create_if_missing",
            user_id,
            requested = names.len(),
            inserted,
            "Ensured tags exist"
        );
        Ok(rows.into_iter().map(Self::parse_tag_row).collect())
    }
}
