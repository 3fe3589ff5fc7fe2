use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Query string of the proximity search endpoint
///
/// Every field is optional at the wire level so that presence is checked
/// explicitly by the search service; a literal `0` is a valid coordinate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(rename = "categoryId", alias = "category_id", default)]
    pub category_id: Option<String>,
    #[serde(alias = "latitude", default)]
    pub lat: Option<f64>,
    #[serde(alias = "longitude", default)]
    pub lon: Option<f64>,
    #[serde(rename = "maxDistanceKm", alias = "max_distance_km", default)]
    pub max_distance_km: Option<f64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SearchParams {
    pub fn new(category_id: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            category_id: Some(category_id.into()),
            lat: Some(lat),
            lon: Some(lon),
            max_distance_km: None,
            limit: None,
        }
    }

    pub fn with_max_distance(mut self, max_distance_km: f64) -> Self {
        self.max_distance_km = Some(max_distance_km);
        self
    }
}

/// Provider onboarding submitted in one piece
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterProviderRequest {
    #[serde(rename = "userId", alias = "user_id")]
    pub user_id: Uuid,
    #[serde(rename = "providerType", alias = "provider_type")]
    pub provider_type: String,
    #[validate(length(min = 1, max = 120))]
    #[serde(rename = "businessName", alias = "business_name", default)]
    pub business_name: Option<String>,
    #[validate(length(min = 5, max = 32))]
    #[serde(rename = "contactNumber", alias = "contact_number", default)]
    pub contact_number: Option<String>,
    #[validate(length(min = 5, max = 32))]
    #[serde(rename = "whatsappNumber", alias = "whatsapp_number", default)]
    pub whatsapp_number: Option<String>,
    #[serde(rename = "categoryId", alias = "category_id")]
    pub category_id: Uuid,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    #[validate(length(max = 255))]
    #[serde(rename = "locationText", alias = "location_text", default)]
    pub location_text: Option<String>,
    #[validate(length(max = 3))]
    #[serde(rename = "workImages", alias = "work_images", default)]
    pub work_images: Vec<String>,
}

/// Rating submission
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RateProviderRequest {
    #[serde(rename = "userId", alias = "user_id")]
    pub user_id: Uuid,
    #[validate(range(min = 1, max = 5))]
    pub rating: u8,
    #[validate(length(max = 1000))]
    #[serde(default)]
    pub comment: Option<String>,
}

/// Complaint against a provider
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReportProviderRequest {
    #[serde(rename = "userId", alias = "user_id", default)]
    pub user_id: Option<Uuid>,
    #[validate(length(min = 1, max = 2000))]
    #[serde(rename = "reportText", alias = "report_text")]
    pub report_text: String,
}
