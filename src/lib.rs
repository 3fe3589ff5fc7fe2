//! Provider Finder - proximity search for a local services marketplace
//!
//! Finds active providers of a service category near a customer and ranks
//! them by distance, and purges provider accounts that stayed blocked past
//! their grace period.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{
    distance::{calculate_bounding_box, haversine_distance},
    RankingMode, SearchError, SearchService, SweepSummary, Sweeper,
};
pub use models::{NearbyQuery, ProviderResult, SearchParams};
