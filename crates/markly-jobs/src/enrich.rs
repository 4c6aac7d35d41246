//! Per-bookmark enrichment: analyze, reconcile tags, persist.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, instrument};

use markly_core::{
    map_tag_names_to_ids, sanitize_tag_names, unmatched_tag_names, BatchTarget,
    BookmarkEnrichment, BookmarkRepository, Error, Result, TagId, TagRepository, UserTag,
    WebsiteAnalyzer,
};

/// Per-job cache of a user's tags.
///
/// Workers of one batch share the cache; a forced load replaces it for all
/// of them.
pub struct TagCache {
    user_id: String,
    store: Arc<dyn TagRepository>,
    cached: Mutex<Option<Arc<Vec<UserTag>>>>,
}

impl TagCache {
    pub fn new(user_id: impl Into<String>, store: Arc<dyn TagRepository>) -> Self {
        Self {
            user_id: user_id.into(),
            store,
            cached: Mutex::new(None),
        }
    }

    /// Current tag set, reading the store when empty or when `force` is set.
    pub async fn load(&self, force: bool) -> Result<Arc<Vec<UserTag>>> {
        let mut cached = self.cached.lock().await;
        if !force {
            if let Some(tags) = cached.as_ref() {
                return Ok(Arc::clone(tags));
            }
        }
        let tags = Arc::new(self.store.list_for_user(&self.user_id).await?);
        debug!(
            subsystem = "jobs",
            component = "tag_cache",
            user_id = %self.user_id,
            tag_count = tags.len(),
            forced = force,
            "Loaded user tags"
        );
        *cached = Some(Arc::clone(&tags));
        Ok(tags)
    }
}

/// Everything one batch's workers need to enrich bookmarks.
pub struct EnrichContext {
    pub user_id: String,
    pub target_tag_name: String,
    pub tag_cache: TagCache,
    pub tags: Arc<dyn TagRepository>,
    pub bookmarks: Arc<dyn BookmarkRepository>,
    pub analyzer: Arc<dyn WebsiteAnalyzer>,
}

impl EnrichContext {
    pub fn new(
        user_id: impl Into<String>,
        target_tag_name: impl Into<String>,
        tags: Arc<dyn TagRepository>,
        bookmarks: Arc<dyn BookmarkRepository>,
        analyzer: Arc<dyn WebsiteAnalyzer>,
    ) -> Self {
        let user_id = user_id.into();
        Self {
            tag_cache: TagCache::new(user_id.clone(), Arc::clone(&tags)),
            user_id,
            target_tag_name: target_tag_name.into(),
            tags,
            bookmarks,
            analyzer,
        }
    }

    /// Id of the fallback tag, creating it if the user does not have it yet.
    async fn fallback_tag_id(&self, known: &[UserTag]) -> Result<TagId> {
        if let Some(tag) = known.iter().find(|t| t.name == self.target_tag_name) {
            return Ok(tag.id);
        }
        let created = self
            .tags
            .create_if_missing(&self.user_id, std::slice::from_ref(&self.target_tag_name))
            .await?;
        self.tag_cache.load(true).await?;
        created
            .into_iter()
            .find(|t| t.name == self.target_tag_name)
            .map(|t| t.id)
            .ok_or_else(|| {
                Error::Internal(format!(
                    "fallback tag '{}' missing after creation",
                    self.target_tag_name
                ))
            })
    }
}

/// Analyze one bookmark and rewrite its metadata and tags.
#[instrument(skip(ctx, target), fields(subsystem = "jobs", component = "enrich", user_id = %ctx.user_id, bookmark_id = target.id))]
pub async fn enrich_bookmark(ctx: &EnrichContext, target: &BatchTarget) -> Result<()> {
    let mut known = ctx.tag_cache.load(false).await?;
    let known_names: Vec<String> = known.iter().map(|t| t.name.clone()).collect();

    let analysis = ctx
        .analyzer
        .analyze(&target.url, &known_names, &ctx.user_id)
        .await?;

    let suggested = sanitize_tag_names(&analysis.tags);
    let missing = unmatched_tag_names(&suggested, &known);
    if !missing.is_empty() {
        ctx.tags.create_if_missing(&ctx.user_id, &missing).await?;
        known = ctx.tag_cache.load(true).await?;
        debug!(created = missing.len(), "Created suggested tags");
    }

    let mut related = map_tag_names_to_ids(&suggested, &known);
    if related.is_empty() {
        related.push(ctx.fallback_tag_id(&known).await?);
    }

    ctx.bookmarks
        .update_enrichment(
            &ctx.user_id,
            &BookmarkEnrichment {
                id: target.id,
                name: analysis.title,
                icon: analysis.favicon,
                description: analysis.description,
                related_tag_ids: related,
            },
        )
        .await
}
