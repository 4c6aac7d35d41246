//! # markly-db
//!
//! PostgreSQL persistence for the markly batch-enrichment engine.
//!
//! This crate provides:
//! - Connection pool management
//! - Batch job storage with atomic counters and conditional transitions
//! - Tag and bookmark repositories scoped per user
//!
//! ## Example
//!
//! ```rust,ignore
//! use markly_db::{BatchJobRepository, Database};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/markly").await?;
//!     if let Some(job) = db.jobs.latest_for_user("user-1").await? {
//!         println!("latest job {} is {}", job.id, job.status);
//!     }
//!     Ok(())
//! }
//! ```

pub mod bookmarks;
pub mod jobs;
pub mod pool;
pub mod tags;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

pub use bookmarks::PgBookmarkRepository;
pub use jobs::PgBatchJobRepository;
pub use pool::{create_pool, PoolConfig};
pub use tags::PgTagRepository;

// Re-export core types
pub use markly_core::*;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Batch job repository.
    pub jobs: PgBatchJobRepository,
    /// Tag repository.
    pub tags: PgTagRepository,
    /// Bookmark repository.
    pub bookmarks: PgBookmarkRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            jobs: PgBatchJobRepository::new(pool.clone()),
            tags: PgTagRepository::new(pool.clone()),
            bookmarks: PgBookmarkRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect with the default pool configuration.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, PoolConfig::default()).await
    }

    /// Connect with a custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool(url, &config).await?;
        Ok(Self::new(pool))
    }

    /// Connect to `DATABASE_URL` with [`PoolConfig::from_env`].
    pub async fn from_env() -> Result<Self> {
        let url = database_url_from(std::env::var("DATABASE_URL").ok())?;
        Self::connect_with_config(&url, PoolConfig::from_env()).await
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

fn database_url_from(value: Option<String>) -> Result<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(url) if !url.is_empty() => Ok(url),
        _ => Err(Error::Config("DATABASE_URL is not set".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url_required() {
        assert!(matches!(database_url_from(None), Err(Error::Config(_))));
        assert!(matches!(
            database_url_from(Some("  ".to_string())),
            Err(Error::Config(_))
        ));
        assert_eq!(
            database_url_from(Some(" postgres://localhost/markly ".to_string())).unwrap(),
            "postgres://localhost/markly"
        );
    }
}
