// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    BlockedProvider, BoundingBox, Category, Coordinates, NearbyQuery, NewNotification, NewProvider,
    NewRating, NewReport, Notification, ProviderListing, ProviderResult, ProviderType, ReportStatus,
    User, UserRole,
};
pub use requests::{RateProviderRequest, RegisterProviderRequest, ReportProviderRequest, SearchParams};
pub use responses::{
    BlockResponse, CategoriesResponse, ErrorResponse, HealthResponse, ProviderCreatedResponse,
    RatingResponse, ReportResponse, SearchResponse,
};
