use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    Category, Coordinates, NewProvider, NewRating, NewReport, ProviderType, RateProviderRequest,
    RegisterProviderRequest, ReportProviderRequest,
};
use crate::services::cache::{CacheError, CacheKey, CacheManager};
use crate::services::store::{MarketplaceStore, ProviderDirectory, StoreError};

/// Errors returned by marketplace writes
#[derive(Debug, Error)]
pub enum MarketplaceError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for MarketplaceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => MarketplaceError::NotFound(what),
            StoreError::Conflict(what) => MarketplaceError::Conflict(what),
            other => {
                tracing::error!("Marketplace store error: {}", other);
                MarketplaceError::Unavailable(other.to_string())
            }
        }
    }
}

impl From<validator::ValidationErrors> for MarketplaceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        MarketplaceError::Validation(errors.to_string())
    }
}

/// Writes made by the marketplace around the search core
pub struct Marketplace {
    store: Arc<dyn MarketplaceStore>,
    directory: Arc<dyn ProviderDirectory>,
    cache: Arc<CacheManager>,
}

impl Marketplace {
    pub fn new(
        store: Arc<dyn MarketplaceStore>,
        directory: Arc<dyn ProviderDirectory>,
        cache: Arc<CacheManager>,
    ) -> Self {
        Self {
            store,
            directory,
            cache,
        }
    }

    /// Create a provider profile in one step
    pub async fn register_provider(
        &self,
        req: &RegisterProviderRequest,
    ) -> Result<Uuid, MarketplaceError> {
        let provider = new_provider(req)?;

        let id = self.store.create_provider(&provider).await?;

        tracing::info!(
            "Provider {} registered in category {}",
            id,
            provider.category_id
        );

        Ok(id)
    }

    /// Store a rating and return the provider's new average
    pub async fn rate_provider(
        &self,
        provider_id: Uuid,
        req: &RateProviderRequest,
    ) -> Result<f64, MarketplaceError> {
        req.validate()?;

        let rating = NewRating {
            user_id: req.user_id,
            rating: req.rating,
            comment: non_blank(req.comment.as_deref()),
        };

        let average = self.store.add_rating(provider_id, &rating).await?;

        tracing::debug!("Provider {} average rating is now {:.2}", provider_id, average);

        Ok(average)
    }

    pub async fn report_provider(
        &self,
        provider_id: Uuid,
        req: &ReportProviderRequest,
    ) -> Result<Uuid, MarketplaceError> {
        req.validate()?;

        let report_text = non_blank(Some(req.report_text.as_str()))
            .ok_or_else(|| MarketplaceError::Validation("reportText must not be blank".to_string()))?;

        let id = self
            .store
            .add_report(
                provider_id,
                &NewReport {
                    user_id: req.user_id,
                    report_text,
                },
            )
            .await?;

        tracing::info!("Report {} filed against provider {}", id, provider_id);

        Ok(id)
    }

    /// Block a provider, starting its purge grace period
    pub async fn block_provider(
        &self,
        provider_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, MarketplaceError> {
        let blocked_at = self.store.block_provider(provider_id, now).await?;

        tracing::info!("Provider {} blocked since {}", provider_id, blocked_at);

        Ok(blocked_at)
    }

    /// Categories ordered by name
    pub async fn list_categories(&self) -> Result<Vec<Category>, MarketplaceError> {
        let key = CacheKey::categories();

        match self.cache.get::<Vec<Category>>(&key).await {
            Ok(categories) => return Ok(categories),
            Err(CacheError::CacheMiss(_)) => {}
            Err(e) => tracing::warn!("Category cache read failed: {}", e),
        }

        let categories = self.directory.list_categories().await?;

        if let Err(e) = self.cache.set(&key, &categories).await {
            tracing::warn!("Failed to cache categories: {}", e);
        }

        Ok(categories)
    }
}

/// Validate an onboarding submission into a provider record
fn new_provider(req: &RegisterProviderRequest) -> Result<NewProvider, MarketplaceError> {
    req.validate()?;

    let provider_type: ProviderType = req
        .provider_type
        .parse()
        .map_err(MarketplaceError::Validation)?;

    let business_name = non_blank(req.business_name.as_deref());
    if provider_type == ProviderType::Business && business_name.is_none() {
        return Err(MarketplaceError::Validation(
            "businessName is required for business providers".to_string(),
        ));
    }

    let location = Coordinates::new(req.latitude, req.longitude);
    if !location.is_finite() || !location.is_in_range() {
        return Err(MarketplaceError::Validation(
            "latitude and longitude must be valid coordinates".to_string(),
        ));
    }

    let work_images = req
        .work_images
        .iter()
        .filter_map(|path| non_blank(Some(path.as_str())))
        .collect();

    Ok(NewProvider {
        user_id: req.user_id,
        provider_type,
        business_name,
        contact_number: non_blank(req.contact_number.as_deref()),
        whatsapp_number: non_blank(req.whatsapp_number.as_deref()),
        category_id: req.category_id,
        location,
        location_text: non_blank(req.location_text.as_deref()),
        work_images,
    })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{User, UserRole};
    use crate::services::memory::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        marketplace: Marketplace,
        provider_user: User,
        customer: User,
        category: Category,
    }

    fn create_user(role: UserRole) -> User {
        User {
            id: Uuid::new_v4(),
            role,
            username: "chidi".to_string(),
            email: format!("{}@example.com", Uuid::new_v4()),
            phone_number: None,
            whatsapp_number: None,
            profile_image_url: None,
            location: None,
            location_text: None,
            deleted_at: None,
        }
    }

    fn setup() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let provider_user = create_user(UserRole::Provider);
        let customer = create_user(UserRole::User);
        let category = Category {
            id: Uuid::new_v4(),
            name: "Electrical".to_string(),
            description: Some("Wiring and repairs".to_string()),
        };
        store.insert_user(provider_user.clone());
        store.insert_user(customer.clone());
        store.insert_category(category.clone());

        let marketplace = Marketplace::new(
            store.clone(),
            store.clone(),
            Arc::new(CacheManager::in_memory(100, 60)),
        );

        Fixture {
            store,
            marketplace,
            provider_user,
            customer,
            category,
        }
    }

    fn register_request(user_id: Uuid, category_id: Uuid) -> RegisterProviderRequest {
        RegisterProviderRequest {
            user_id,
            provider_type: "individual".to_string(),
            business_name: None,
            contact_number: Some("+2348012345678".to_string()),
            whatsapp_number: None,
            category_id,
            latitude: 6.4550,
            longitude: 3.3841,
            location_text: Some("Lagos Island".to_string()),
            work_images: vec!["u/1.jpg".to_string(), "  ".to_string()],
        }
    }

    #[tokio::test]
    async fn test_register_provider() {
        let fx = setup();

        let id = fx
            .marketplace
            .register_provider(&register_request(fx.provider_user.id, fx.category.id))
            .await
            .unwrap();

        let listing = fx.store.provider(id).unwrap();
        assert_eq!(listing.user_id, fx.provider_user.id);
        assert_eq!(listing.phone_number.as_deref(), Some("+2348012345678"));
    }

    #[tokio::test]
    async fn test_business_requires_name() {
        let fx = setup();
        let mut req = register_request(fx.provider_user.id, fx.category.id);
        req.provider_type = "business".to_string();

        let result = fx.marketplace.register_provider(&req).await;
        assert!(matches!(result, Err(MarketplaceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_register_unknown_user() {
        let fx = setup();

        let result = fx
            .marketplace
            .register_provider(&register_request(Uuid::new_v4(), fx.category.id))
            .await;
        assert!(matches!(result, Err(MarketplaceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rating_average_converges() {
        let fx = setup();
        let id = fx
            .marketplace
            .register_provider(&register_request(fx.provider_user.id, fx.category.id))
            .await
            .unwrap();

        let mut average = 0.0;
        for rating in [5, 4, 3] {
            let req = RateProviderRequest {
                user_id: fx.customer.id,
                rating,
                comment: None,
            };
            average = fx.marketplace.rate_provider(id, &req).await.unwrap();
        }

        assert_eq!(average, 4.0);
        assert_eq!(fx.store.provider(id).unwrap().average_rating, 4.0);
    }

    #[tokio::test]
    async fn test_out_of_range_rating_rejected() {
        let fx = setup();
        let req = RateProviderRequest {
            user_id: fx.customer.id,
            rating: 9,
            comment: None,
        };

        let result = fx.marketplace.rate_provider(Uuid::new_v4(), &req).await;
        assert!(matches!(result, Err(MarketplaceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_blank_report_rejected() {
        let fx = setup();
        let req = ReportProviderRequest {
            user_id: None,
            report_text: "   ".to_string(),
        };

        let result = fx.marketplace.report_provider(Uuid::new_v4(), &req).await;
        assert!(matches!(result, Err(MarketplaceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_block_unknown_provider() {
        let fx = setup();

        let result = fx.marketplace.block_provider(Uuid::new_v4(), Utc::now()).await;
        assert!(matches!(result, Err(MarketplaceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_categories_are_cached() {
        let fx = setup();

        let first = fx.marketplace.list_categories().await.unwrap();
        let queries = fx.store.query_count();
        let second = fx.marketplace.list_categories().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0].name, "Electrical");
        assert_eq!(fx.store.query_count(), queries);
    }
}
