use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::core::ranking::rank_nearby;
use crate::models::{Coordinates, NearbyQuery, ProviderResult, SearchParams};
use crate::services::cache::{CacheError, CacheKey, CacheManager};
use crate::services::store::{ProviderDirectory, StoreError};

/// Default search radius in kilometers
pub const DEFAULT_MAX_DISTANCE_KM: f64 = 50.0;

/// Errors returned by the proximity search
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Search backend unavailable: {0}")]
    Unavailable(String),
}

/// Where filtering, distance annotation and ordering are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMode {
    /// Fetch bounding-box candidates and rank them in Rust
    #[default]
    InProcess,
    /// Delegate to the store's ranked routine
    Database,
}

/// Search query interface used by the HTTP layer
///
/// Validates the caller's input before touching the store, checks the
/// category against cached reference data, then runs the configured ranking
/// backend.
pub struct SearchService {
    directory: Arc<dyn ProviderDirectory>,
    cache: Arc<CacheManager>,
    mode: RankingMode,
    default_max_distance_km: f64,
    max_results: Option<usize>,
}

impl SearchService {
    pub fn new(
        directory: Arc<dyn ProviderDirectory>,
        cache: Arc<CacheManager>,
        mode: RankingMode,
    ) -> Self {
        Self {
            directory,
            cache,
            mode,
            default_max_distance_km: DEFAULT_MAX_DISTANCE_KM,
            max_results: None,
        }
    }

    pub fn with_default_max_distance(mut self, max_distance_km: f64) -> Self {
        self.default_max_distance_km = max_distance_km;
        self
    }

    /// Upper bound on rows returned, applied after ordering
    pub fn with_max_results(mut self, max_results: Option<usize>) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn mode(&self) -> RankingMode {
        self.mode
    }

    /// Find visible providers of a category near the caller, nearest first
    ///
    /// An empty list is a valid answer. Store failures are surfaced as
    /// `Unavailable` and never turned into an empty result.
    pub async fn search_nearby_providers(
        &self,
        params: &SearchParams,
    ) -> Result<Vec<ProviderResult>, SearchError> {
        let query = self.build_query(params)?;

        tracing::debug!("Searching providers: {}", query);

        self.ensure_category(query.category_id).await?;

        let providers = match self.mode {
            RankingMode::InProcess => {
                let listings = self
                    .directory
                    .fetch_candidates(query.category_id, &query.bounding_box())
                    .await
                    .map_err(|e| unavailable(&query, e))?;

                let result = rank_nearby(&query, listings);

                tracing::debug!(
                    "Ranked {} of {} candidates for category {}",
                    result.providers.len(),
                    result.total_candidates,
                    query.category_id
                );

                result.providers
            }
            RankingMode::Database => self
                .directory
                .ranked_nearby(&query)
                .await
                .map_err(|e| unavailable(&query, e))?,
        };

        tracing::info!(
            "Found {} providers within {} km for category {}",
            providers.len(),
            query.max_distance_km,
            query.category_id
        );

        Ok(providers)
    }

    /// Turn raw parameters into a validated query without any I/O
    pub fn build_query(&self, params: &SearchParams) -> Result<NearbyQuery, SearchError> {
        let category_id = parse_category_id(params.category_id.as_deref())?;

        let origin = match (params.lat, params.lon) {
            (Some(lat), Some(lon)) => Coordinates::new(lat, lon),
            _ => {
                return Err(SearchError::InvalidArgument(
                    "lat and lon are required".to_string(),
                ))
            }
        };

        if !origin.is_finite() {
            return Err(SearchError::InvalidArgument(
                "lat and lon must be finite numbers".to_string(),
            ));
        }
        if !origin.is_in_range() {
            return Err(SearchError::InvalidArgument(
                "lat must be within [-90, 90] and lon within [-180, 180]".to_string(),
            ));
        }

        let max_distance_km = params.max_distance_km.unwrap_or(self.default_max_distance_km);
        if !max_distance_km.is_finite() || max_distance_km <= 0.0 {
            return Err(SearchError::InvalidArgument(
                "maxDistanceKm must be a positive number".to_string(),
            ));
        }

        if params.limit == Some(0) {
            return Err(SearchError::InvalidArgument(
                "limit must be at least 1".to_string(),
            ));
        }

        let limit = match (params.limit, self.max_results) {
            (Some(requested), Some(cap)) => Some(requested.min(cap)),
            (requested, cap) => requested.or(cap),
        };

        Ok(NearbyQuery {
            category_id,
            origin,
            max_distance_km,
            limit,
        })
    }

    /// Reject ids that name no category, consulting the cache first
    async fn ensure_category(&self, category_id: Uuid) -> Result<(), SearchError> {
        let key = CacheKey::category(category_id);

        match self.cache.get::<bool>(&key).await {
            Ok(true) => return Ok(()),
            Ok(false) | Err(CacheError::CacheMiss(_)) => {}
            Err(e) => tracing::warn!("Category cache lookup failed for {}: {}", category_id, e),
        }

        let exists = self.directory.category_exists(category_id).await.map_err(|e| {
            tracing::error!("Category lookup failed for {}: {}", category_id, e);
            SearchError::Unavailable(e.to_string())
        })?;

        if !exists {
            return Err(SearchError::InvalidArgument(format!(
                "unknown category {}",
                category_id
            )));
        }

        // Only existence is cached; a category created later is seen on the next miss
        if let Err(e) = self.cache.set(&key, &true).await {
            tracing::warn!("Failed to cache category {}: {}", category_id, e);
        }

        Ok(())
    }
}

fn parse_category_id(raw: Option<&str>) -> Result<Uuid, SearchError> {
    let raw = raw.map(str::trim).unwrap_or_default();

    if raw.is_empty() {
        return Err(SearchError::InvalidArgument(
            "categoryId is required".to_string(),
        ));
    }

    Uuid::parse_str(raw).map_err(|_| {
        SearchError::InvalidArgument(format!("categoryId '{}' is not a valid id", raw))
    })
}

fn unavailable(query: &NearbyQuery, err: StoreError) -> SearchError {
    tracing::error!("Provider search failed ({}): {}", query, err);
    SearchError::Unavailable(err.to_string())
}
