use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::core::distance::{calculate_bounding_box, DISTANCE_ROUNDING_SLACK_KM};

/// A latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// Both components lie inside [-90, 90] / [-180, 180]
    pub fn is_in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Build from nullable columns; a location is present only when both are set
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => Some(Self::new(lat, lon)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Provider,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Provider => "provider",
            UserRole::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Individual,
    Business,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Individual => "individual",
            ProviderType::Business => "business",
        }
    }
}

impl FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "individual" => Ok(ProviderType::Individual),
            "business" => Ok(ProviderType::Business),
            other => Err(format!("unknown provider type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Resolved,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Resolved => "resolved",
        }
    }
}

/// Marketplace user (customer, provider or admin)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub role: UserRole,
    pub username: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub whatsapp_number: Option<String>,
    pub profile_image_url: Option<String>,
    pub location: Option<Coordinates>,
    pub location_text: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Service category reference data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// A provider record joined with its owning user and category, as search reads it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderListing {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub business_name: Option<String>,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub average_rating: f64,
    pub is_verified: bool,
    pub is_blocked: bool,
    pub blocked_at: Option<DateTime<Utc>>,
    pub location: Option<Coordinates>,
    pub location_text: Option<String>,
    pub whatsapp_number: Option<String>,
    pub phone_number: Option<String>,
    pub profile_image_url: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// One row of a proximity search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    pub id: Uuid,
    pub username: String,
    pub business_name: Option<String>,
    pub category_name: String,
    pub average_rating: f64,
    pub distance_km: f64,
    pub whatsapp_number: Option<String>,
    pub phone_number: Option<String>,
    pub profile_image_url: Option<String>,
    pub is_verified: bool,
    pub location_text: Option<String>,
}

/// A blocked provider as seen by the lifecycle sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedProvider {
    pub id: Uuid,
    pub user_id: Uuid,
    pub blocked_at: DateTime<Utc>,
    pub work_images: Vec<String>,
}

/// Notification to be stored for a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub provider_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub kind: String,
}

/// Stored notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Validated provider onboarding submission
#[derive(Debug, Clone)]
pub struct NewProvider {
    pub user_id: Uuid,
    pub provider_type: ProviderType,
    pub business_name: Option<String>,
    pub contact_number: Option<String>,
    pub whatsapp_number: Option<String>,
    pub category_id: Uuid,
    pub location: Coordinates,
    pub location_text: Option<String>,
    pub work_images: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewRating {
    pub user_id: Uuid,
    pub rating: u8,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub user_id: Option<Uuid>,
    pub report_text: String,
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// A validated proximity search
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyQuery {
    pub category_id: Uuid,
    pub origin: Coordinates,
    pub max_distance_km: f64,
    pub limit: Option<usize>,
}

impl NearbyQuery {
    /// Prefilter box for the search
    ///
    /// Widened by the rounding slack because the radius cut is applied to the
    /// reported two-decimal distance.
    pub fn bounding_box(&self) -> BoundingBox {
        calculate_bounding_box(
            self.origin.latitude,
            self.origin.longitude,
            self.max_distance_km + DISTANCE_ROUNDING_SLACK_KM,
        )
    }
}

impl fmt::Display for NearbyQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "category={} origin=({}, {}) max_distance_km={}",
            self.category_id, self.origin.latitude, self.origin.longitude, self.max_distance_km
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_coordinates_are_present() {
        let location = Coordinates::from_parts(Some(0.0), Some(0.0));
        assert_eq!(location, Some(Coordinates::new(0.0, 0.0)));
    }

    #[test]
    fn test_partial_coordinates_are_absent() {
        assert_eq!(Coordinates::from_parts(Some(6.5), None), None);
        assert_eq!(Coordinates::from_parts(None, Some(3.3)), None);
    }

    #[test]
    fn test_coordinate_range() {
        assert!(Coordinates::new(90.0, -180.0).is_in_range());
        assert!(!Coordinates::new(90.5, 0.0).is_in_range());
        assert!(!Coordinates::new(f64::NAN, 0.0).is_finite());
    }

    #[test]
    fn test_provider_type_parse() {
        assert_eq!("Business".parse::<ProviderType>(), Ok(ProviderType::Business));
        assert!("agency".parse::<ProviderType>().is_err());
    }
}
