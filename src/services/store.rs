use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::core::ranking::rank_nearby;
use crate::models::{
    BlockedProvider, BoundingBox, Category, NearbyQuery, NewNotification, NewProvider, NewRating,
    NewReport, ProviderListing, ProviderResult,
};

/// Errors that can occur when talking to the backing store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Read side used by the proximity search
#[async_trait]
pub trait ProviderDirectory: Send + Sync {
    async fn category_exists(&self, category_id: Uuid) -> Result<bool, StoreError>;

    /// All categories ordered by name
    async fn list_categories(&self) -> Result<Vec<Category>, StoreError>;

    /// Providers of a category located inside `bbox`
    ///
    /// Implementations may return a superset of the search candidates; the
    /// in-process pipeline re-applies the candidate filter.
    async fn fetch_candidates(
        &self,
        category_id: Uuid,
        bbox: &BoundingBox,
    ) -> Result<Vec<ProviderListing>, StoreError>;

    /// Filter, annotate and order inside the store itself
    ///
    /// The default runs the in-process pipeline over `fetch_candidates`;
    /// stores with a server-side routine override it.
    async fn ranked_nearby(&self, query: &NearbyQuery) -> Result<Vec<ProviderResult>, StoreError> {
        let listings = self
            .fetch_candidates(query.category_id, &query.bounding_box())
            .await?;
        Ok(rank_nearby(query, listings).providers)
    }

    async fn health_check(&self) -> Result<bool, StoreError>;
}

/// Storage operations behind the blocked-account sweep
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    /// Blocked providers whose `blocked_at` is at or before `cutoff`
    async fn blocked_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<BlockedProvider>, StoreError>;

    /// Delete a provider only if it is still blocked since at or before `cutoff`
    ///
    /// Returns `false` when no record matched, e.g. because an overlapping
    /// sweep already purged it.
    async fn purge_blocked(&self, provider_id: Uuid, cutoff: DateTime<Utc>) -> Result<bool, StoreError>;

    async fn admin_ids(&self) -> Result<Vec<Uuid>, StoreError>;

    async fn create_notification(&self, notification: &NewNotification) -> Result<(), StoreError>;
}

/// Writes issued by marketplace collaborators
#[async_trait]
pub trait MarketplaceStore: Send + Sync {
    /// Insert the provider and update the owning user's contact fields atomically
    async fn create_provider(&self, provider: &NewProvider) -> Result<Uuid, StoreError>;

    /// Insert a rating and return the provider's recomputed average
    async fn add_rating(&self, provider_id: Uuid, rating: &NewRating) -> Result<f64, StoreError>;

    async fn add_report(&self, provider_id: Uuid, report: &NewReport) -> Result<Uuid, StoreError>;

    /// Mark a provider blocked, returning the effective `blocked_at`
    ///
    /// Blocking an already blocked provider keeps its original timestamp.
    async fn block_provider(&self, provider_id: Uuid, at: DateTime<Utc>) -> Result<DateTime<Utc>, StoreError>;
}
