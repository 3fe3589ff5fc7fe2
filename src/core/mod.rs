// Core algorithm exports
pub mod distance;
pub mod filters;
pub mod lifecycle;
pub mod marketplace;
pub mod ranking;
pub mod search;

pub use distance::{calculate_bounding_box, haversine_distance, is_within_bounding_box};
pub use filters::{filter_candidates, is_candidate};
pub use lifecycle::{spawn_sweep_scheduler, ProviderState, SweepSummary, Sweeper};
pub use marketplace::{Marketplace, MarketplaceError};
pub use ranking::{rank_nearby, RankResult};
pub use search::{RankingMode, SearchError, SearchService};
