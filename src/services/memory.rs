use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::core::distance::is_within_bounding_box;
use crate::models::{
    BlockedProvider, BoundingBox, Category, NewNotification, NewProvider, NewRating, NewReport,
    Notification, ProviderListing, ReportStatus, User, UserRole,
};
use crate::services::storage::{MediaError, MediaStore};
use crate::services::store::{LifecycleStore, MarketplaceStore, ProviderDirectory, StoreError};

struct StoredProvider {
    listing: ProviderListing,
    work_images: Vec<String>,
}

struct StoredRating {
    provider_id: Uuid,
    rating: u8,
    deleted_at: Option<DateTime<Utc>>,
}

struct StoredReport {
    provider_id: Uuid,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    categories: HashMap<Uuid, Category>,
    providers: HashMap<Uuid, StoredProvider>,
    ratings: Vec<StoredRating>,
    reports: Vec<StoredReport>,
    notifications: Vec<Notification>,
}

impl MemoryState {
    /// Remove a provider and everything that references it
    fn cascade_delete(&mut self, provider_id: Uuid) {
        self.providers.remove(&provider_id);
        self.ratings.retain(|r| r.provider_id != provider_id);
        self.reports.retain(|r| r.provider_id != provider_id);
        self.notifications
            .retain(|n| n.provider_id != Some(provider_id));
    }
}

/// In-memory data access handle
///
/// Implements every store trait over a single lock so tests and local runs
/// can exercise the services without PostgreSQL. Foreign keys and cascades
/// follow the relational schema.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    failing: AtomicBool,
    failing_purges: AtomicBool,
    queries: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the database were unreachable
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make only `purge_blocked` fail
    pub fn set_failing_purges(&self, failing: bool) {
        self.failing_purges.store(failing, Ordering::SeqCst);
    }

    /// Number of store calls issued so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn insert_user(&self, user: User) {
        if let Ok(mut state) = self.state.write() {
            state.users.insert(user.id, user);
        }
    }

    pub fn insert_category(&self, category: Category) {
        if let Ok(mut state) = self.state.write() {
            state.categories.insert(category.id, category);
        }
    }

    /// Seed a provider listing along with its media object paths
    pub fn insert_provider(&self, listing: ProviderListing, work_images: Vec<String>) {
        if let Ok(mut state) = self.state.write() {
            state.providers.insert(
                listing.id,
                StoredProvider {
                    listing,
                    work_images,
                },
            );
        }
    }

    pub fn provider(&self, provider_id: Uuid) -> Option<ProviderListing> {
        self.state
            .read()
            .ok()?
            .providers
            .get(&provider_id)
            .map(|p| p.listing.clone())
    }

    pub fn user(&self, user_id: Uuid) -> Option<User> {
        self.state.read().ok()?.users.get(&user_id).cloned()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.state
            .read()
            .map(|state| state.notifications.clone())
            .unwrap_or_default()
    }

    pub fn report_count(&self, provider_id: Uuid) -> usize {
        self.state
            .read()
            .map(|state| state.reports.iter().filter(|r| r.provider_id == provider_id).count())
            .unwrap_or_default()
    }

    pub fn rating_count(&self, provider_id: Uuid) -> usize {
        self.state
            .read()
            .map(|state| state.ratings.iter().filter(|r| r.provider_id == provider_id).count())
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>, StoreError> {
        self.check_available()?;
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>, StoreError> {
        self.check_available()?;
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ProviderDirectory for MemoryStore {
    async fn category_exists(&self, category_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.read()?.categories.contains_key(&category_id))
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let mut categories: Vec<Category> = self.read()?.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn fetch_candidates(
        &self,
        category_id: Uuid,
        bbox: &BoundingBox,
    ) -> Result<Vec<ProviderListing>, StoreError> {
        let state = self.read()?;

        let listings = state
            .providers
            .values()
            .map(|p| &p.listing)
            .filter(|listing| listing.category_id == Some(category_id))
            .filter(|listing| {
                listing
                    .location
                    .map(|loc| is_within_bounding_box(loc.latitude, loc.longitude, bbox))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        Ok(listings)
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(true)
    }
}

#[async_trait]
impl LifecycleStore for MemoryStore {
    async fn blocked_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<BlockedProvider>, StoreError> {
        let state = self.read()?;

        let mut blocked: Vec<BlockedProvider> = state
            .providers
            .values()
            .filter_map(|p| {
                let blocked_at = p.listing.blocked_at?;
                (p.listing.is_blocked && blocked_at <= cutoff).then(|| BlockedProvider {
                    id: p.listing.id,
                    user_id: p.listing.user_id,
                    blocked_at,
                    work_images: p.work_images.clone(),
                })
            })
            .collect();

        blocked.sort_by_key(|p| p.blocked_at);
        Ok(blocked)
    }

    async fn purge_blocked(&self, provider_id: Uuid, cutoff: DateTime<Utc>) -> Result<bool, StoreError> {
        if self.failing_purges.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("delete timed out".to_string()));
        }

        let mut state = self.write()?;

        let eligible = state
            .providers
            .get(&provider_id)
            .map(|p| p.listing.is_blocked && p.listing.blocked_at.is_some_and(|at| at <= cutoff))
            .unwrap_or(false);

        if eligible {
            state.cascade_delete(provider_id);
        }

        Ok(eligible)
    }

    async fn admin_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let state = self.read()?;

        let mut ids: Vec<Uuid> = state
            .users
            .values()
            .filter(|u| u.role == UserRole::Admin && u.deleted_at.is_none())
            .map(|u| u.id)
            .collect();

        ids.sort();
        Ok(ids)
    }

    async fn create_notification(&self, notification: &NewNotification) -> Result<(), StoreError> {
        let mut state = self.write()?;

        if !state.users.contains_key(&notification.user_id) {
            return Err(StoreError::NotFound(format!("user {}", notification.user_id)));
        }
        if let Some(provider_id) = notification.provider_id {
            if !state.providers.contains_key(&provider_id) {
                return Err(StoreError::NotFound(format!("provider {}", provider_id)));
            }
        }

        state.notifications.push(Notification {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            provider_id: notification.provider_id,
            title: notification.title.clone(),
            message: notification.message.clone(),
            kind: notification.kind.clone(),
            is_read: false,
            created_at: Utc::now(),
        });

        Ok(())
    }
}

#[async_trait]
impl MarketplaceStore for MemoryStore {
    async fn create_provider(&self, provider: &NewProvider) -> Result<Uuid, StoreError> {
        let mut state = self.write()?;

        let user = state
            .users
            .get(&provider.user_id)
            .filter(|u| u.deleted_at.is_none())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {}", provider.user_id)))?;

        if state.providers.values().any(|p| p.listing.user_id == provider.user_id) {
            return Err(StoreError::Conflict("provider profile already exists".to_string()));
        }

        let category = state
            .categories
            .get(&provider.category_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("provider profile references a missing record".to_string()))?;

        let phone_number = provider.contact_number.clone().or(user.phone_number);
        let whatsapp_number = provider.whatsapp_number.clone().or(user.whatsapp_number);
        let location_text = provider.location_text.clone().or(user.location_text);

        if let Some(owner) = state.users.get_mut(&provider.user_id) {
            owner.phone_number = phone_number.clone();
            owner.whatsapp_number = whatsapp_number.clone();
            owner.location = Some(provider.location);
            owner.location_text = location_text.clone();
        }

        let id = Uuid::new_v4();
        let listing = ProviderListing {
            id,
            user_id: provider.user_id,
            username: user.username,
            business_name: provider.business_name.clone(),
            category_id: Some(category.id),
            category_name: Some(category.name),
            average_rating: 0.0,
            is_verified: false,
            is_blocked: false,
            blocked_at: None,
            location: Some(provider.location),
            location_text: provider.location_text.clone(),
            whatsapp_number,
            phone_number,
            profile_image_url: user.profile_image_url,
            deleted_at: None,
        };

        state.providers.insert(
            id,
            StoredProvider {
                listing,
                work_images: provider.work_images.clone(),
            },
        );

        Ok(id)
    }

    async fn add_rating(&self, provider_id: Uuid, rating: &NewRating) -> Result<f64, StoreError> {
        let mut state = self.write()?;

        let visible = state
            .providers
            .get(&provider_id)
            .is_some_and(|p| p.listing.deleted_at.is_none());
        if !visible {
            return Err(StoreError::NotFound(format!("provider {}", provider_id)));
        }
        if !state.users.contains_key(&rating.user_id) {
            return Err(StoreError::NotFound("rating references a missing record".to_string()));
        }

        state.ratings.push(StoredRating {
            provider_id,
            rating: rating.rating,
            deleted_at: None,
        });

        let scores: Vec<f64> = state
            .ratings
            .iter()
            .filter(|r| r.provider_id == provider_id && r.deleted_at.is_none())
            .map(|r| f64::from(r.rating))
            .collect();
        let average = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };

        if let Some(stored) = state.providers.get_mut(&provider_id) {
            stored.listing.average_rating = average;
        }

        Ok(average)
    }

    async fn add_report(&self, provider_id: Uuid, report: &NewReport) -> Result<Uuid, StoreError> {
        let mut state = self.write()?;

        if !state.providers.contains_key(&provider_id) {
            return Err(StoreError::NotFound("report references a missing record".to_string()));
        }

        let id = Uuid::new_v4();
        state.reports.push(StoredReport { provider_id });

        tracing::debug!(
            "Stored {} report {} from {:?}",
            ReportStatus::Pending.as_str(),
            id,
            report.user_id
        );

        Ok(id)
    }

    async fn block_provider(&self, provider_id: Uuid, at: DateTime<Utc>) -> Result<DateTime<Utc>, StoreError> {
        let mut state = self.write()?;

        let listing = state
            .providers
            .get_mut(&provider_id)
            .map(|p| &mut p.listing)
            .filter(|l| l.deleted_at.is_none())
            .ok_or_else(|| StoreError::NotFound(format!("provider {}", provider_id)))?;

        let blocked_at = match (listing.is_blocked, listing.blocked_at) {
            (true, Some(existing)) => existing,
            _ => at,
        };
        listing.is_blocked = true;
        listing.blocked_at = Some(blocked_at);

        Ok(blocked_at)
    }
}

/// In-memory media bucket
#[derive(Default)]
pub struct MemoryMediaStore {
    objects: Mutex<HashSet<String>>,
    removed: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::default();
        if let Ok(mut objects) = store.objects.lock() {
            objects.extend(paths.into_iter().map(Into::into));
        }
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects
            .lock()
            .map(|objects| objects.contains(path))
            .unwrap_or(false)
    }

    /// Every path a removal was requested for, in order
    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn remove_objects(&self, paths: &[String]) -> Result<(), MediaError> {
        // Suspend like a network call so concurrent sweeps interleave
        tokio::task::yield_now().await;

        if self.failing.load(Ordering::SeqCst) {
            return Err(MediaError::ApiError("bucket unavailable".to_string()));
        }

        let mut objects = self.objects.lock().map_err(poisoned)?;
        let mut removed = self.removed.lock().map_err(poisoned)?;

        for path in paths {
            objects.remove(path);
            removed.push(path.clone());
        }

        Ok(())
    }
}

fn poisoned<T>(_: T) -> MediaError {
    MediaError::ApiError("media store lock poisoned".to_string())
}
