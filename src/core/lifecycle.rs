use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use uuid::Uuid;

use crate::models::{BlockedProvider, NewNotification};
use crate::services::storage::MediaStore;
use crate::services::store::{LifecycleStore, StoreError};

/// Hours a provider stays blocked before it is purged
pub const DEFAULT_GRACE_PERIOD_HOURS: i64 = 24;

pub const PURGE_NOTIFICATION_TITLE: &str = "Provider Deleted";
pub const ADMIN_NOTIFICATION_KIND: &str = "admin";

/// Lifecycle of a provider account
///
/// `Active -> Blocked -> Purged`. There is no way back from `Blocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ProviderState {
    Active,
    Blocked { since: Option<DateTime<Utc>> },
    Purged,
}

impl ProviderState {
    pub fn of(is_blocked: bool, blocked_at: Option<DateTime<Utc>>) -> Self {
        if is_blocked {
            ProviderState::Blocked { since: blocked_at }
        } else {
            ProviderState::Active
        }
    }

    /// A block without a timestamp is never eligible
    pub fn is_purge_eligible(&self, now: DateTime<Utc>, grace_period: Duration) -> bool {
        match self {
            ProviderState::Blocked { since: Some(since) } => is_purge_eligible(*since, now, grace_period),
            _ => false,
        }
    }
}

#[inline]
pub fn is_purge_eligible(blocked_at: DateTime<Utc>, now: DateTime<Utc>, grace_period: Duration) -> bool {
    now - blocked_at >= grace_period
}

/// Latest `blocked_at` that is purge eligible at `now`
#[inline]
pub fn purge_cutoff(now: DateTime<Utc>, grace_period: Duration) -> DateTime<Utc> {
    now - grace_period
}

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub message: String,
    /// Providers this run actually purged
    pub deleted: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl SweepSummary {
    pub fn is_partial_failure(&self) -> bool {
        self.errors.as_ref().is_some_and(|errors| !errors.is_empty())
    }
}

/// Purges providers that stayed blocked past the grace period
pub struct Sweeper {
    store: Arc<dyn LifecycleStore>,
    media: Arc<dyn MediaStore>,
    grace_period: Duration,
}

impl Sweeper {
    pub fn new(store: Arc<dyn LifecycleStore>, media: Arc<dyn MediaStore>) -> Self {
        Self {
            store,
            media,
            grace_period: Duration::hours(DEFAULT_GRACE_PERIOD_HOURS),
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Run one sweep as of `now`
    ///
    /// Fails only when the eligible providers cannot be listed. Per-provider
    /// failures are collected into the summary and retried by the next sweep.
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> Result<SweepSummary, StoreError> {
        let cutoff = purge_cutoff(now, self.grace_period);

        let blocked = self.store.blocked_before(cutoff).await.map_err(|e| {
            tracing::error!("Failed to list blocked providers: {}", e);
            e
        })?;

        if blocked.is_empty() {
            tracing::debug!("No blocked providers older than {}", cutoff);
            return Ok(SweepSummary {
                message: "No providers to delete".to_string(),
                ..Default::default()
            });
        }

        tracing::info!("Sweeping {} blocked providers (cutoff {})", blocked.len(), cutoff);

        let mut deleted = 0;
        let mut errors = Vec::new();
        let mut admins: Option<Vec<Uuid>> = None;

        for provider in blocked {
            if !is_purge_eligible(provider.blocked_at, now, self.grace_period) {
                continue;
            }

            match self.purge(&provider, cutoff).await {
                Ok(true) => {
                    deleted += 1;
                    self.notify_admins(&mut admins, provider.id).await;
                }
                Ok(false) => {
                    tracing::debug!("Provider {} was already purged", provider.id);
                }
                Err(e) => {
                    tracing::warn!("Failed to delete provider {}: {}", provider.id, e);
                    errors.push(format!("Failed to delete provider {}: {}", provider.id, e));
                }
            }
        }

        tracing::info!("Sweep purged {} providers with {} errors", deleted, errors.len());

        Ok(SweepSummary {
            message: "Cleanup completed".to_string(),
            deleted,
            errors: (!errors.is_empty()).then_some(errors),
        })
    }

    /// Remove media, then the record; returns whether this call deleted it
    async fn purge(&self, provider: &BlockedProvider, cutoff: DateTime<Utc>) -> Result<bool, StoreError> {
        if !provider.work_images.is_empty() {
            if let Err(e) = self.media.remove_objects(&provider.work_images).await {
                tracing::warn!("Storage deletion error for provider {}: {}", provider.id, e);
            }
        }

        self.store.purge_blocked(provider.id, cutoff).await
    }

    async fn notify_admins(&self, admins: &mut Option<Vec<Uuid>>, provider_id: Uuid) {
        if admins.is_none() {
            let ids = self.store.admin_ids().await.unwrap_or_else(|e| {
                tracing::warn!("Failed to load admin users: {}", e);
                Vec::new()
            });
            *admins = Some(ids);
        }

        let message = format!(
            "Blocked provider {} has been permanently deleted after {} hours.",
            provider_id,
            self.grace_period.num_hours()
        );

        for admin_id in admins.iter().flatten() {
            // The provider row is gone, so the notification must not reference it
            let notification = NewNotification {
                user_id: *admin_id,
                provider_id: None,
                title: PURGE_NOTIFICATION_TITLE.to_string(),
                message: message.clone(),
                kind: ADMIN_NOTIFICATION_KIND.to_string(),
            };

            if let Err(e) = self.store.create_notification(&notification).await {
                tracing::warn!("Failed to notify admin {} about {}: {}", admin_id, provider_id, e);
            }
        }
    }
}

/// Run the sweep on a fixed interval until the task is aborted
pub fn spawn_sweep_scheduler(sweeper: Arc<Sweeper>, every: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match sweeper.run_sweep(Utc::now()).await {
                Ok(summary) => {
                    if summary.deleted > 0 || summary.is_partial_failure() {
                        tracing::info!(
                            deleted = summary.deleted,
                            errors = summary.errors.as_ref().map_or(0, Vec::len),
                            "Scheduled sweep finished"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Scheduled sweep failed");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coordinates, ProviderListing, User, UserRole};
    use crate::services::memory::{MemoryMediaStore, MemoryStore};

    fn create_user(role: UserRole) -> User {
        User {
            id: Uuid::new_v4(),
            role,
            username: format!("{}-user", role.as_str()),
            email: format!("{}@example.com", Uuid::new_v4()),
            phone_number: None,
            whatsapp_number: None,
            profile_image_url: None,
            location: None,
            location_text: None,
            deleted_at: None,
        }
    }

    fn blocked_listing(blocked_at: DateTime<Utc>) -> ProviderListing {
        ProviderListing {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            username: "blocked".to_string(),
            business_name: None,
            category_id: None,
            category_name: None,
            average_rating: 0.0,
            is_verified: false,
            is_blocked: true,
            blocked_at: Some(blocked_at),
            location: Some(Coordinates::new(6.5244, 3.3792)),
            location_text: None,
            whatsapp_number: None,
            phone_number: None,
            profile_image_url: None,
            deleted_at: None,
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        media: Arc<MemoryMediaStore>,
        sweeper: Sweeper,
        provider_id: Uuid,
        blocked_at: DateTime<Utc>,
    }

    fn setup(admins: usize) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        for _ in 0..admins {
            store.insert_user(create_user(UserRole::Admin));
        }
        store.insert_user(create_user(UserRole::User));

        let blocked_at = Utc::now() - Duration::days(2);
        let listing = blocked_listing(blocked_at);
        let provider_id = listing.id;
        let images = vec!["p/1.jpg".to_string(), "p/2.jpg".to_string()];
        store.insert_provider(listing, images.clone());

        let media = Arc::new(MemoryMediaStore::with_objects(images));
        let sweeper = Sweeper::new(store.clone(), media.clone());

        Fixture {
            store,
            media,
            sweeper,
            provider_id,
            blocked_at,
        }
    }

    #[test]
    fn test_state_transitions() {
        let now = Utc::now();
        let grace = Duration::hours(24);

        assert_eq!(ProviderState::of(false, None), ProviderState::Active);
        assert!(!ProviderState::Active.is_purge_eligible(now, grace));
        assert!(!ProviderState::of(true, None).is_purge_eligible(now, grace));
        assert!(ProviderState::of(true, Some(now - Duration::hours(24))).is_purge_eligible(now, grace));
        assert!(!ProviderState::of(true, Some(now - Duration::hours(23))).is_purge_eligible(now, grace));
    }

    #[tokio::test]
    async fn test_sweep_respects_grace_period() {
        let fx = setup(2);

        let early = fx.sweeper.run_sweep(fx.blocked_at + Duration::hours(23)).await.unwrap();
        assert_eq!(early.deleted, 0);
        assert!(fx.store.provider(fx.provider_id).is_some());
        assert!(fx.media.removed().is_empty());

        let late = fx.sweeper.run_sweep(fx.blocked_at + Duration::hours(25)).await.unwrap();
        assert_eq!(late.deleted, 1);
        assert_eq!(late.errors, None);
        assert!(fx.store.provider(fx.provider_id).is_none());
        assert!(!fx.media.contains("p/1.jpg"));
        assert!(!fx.media.contains("p/2.jpg"));

        let notifications = fx.store.notifications();
        assert_eq!(notifications.len(), 2);
        for n in &notifications {
            assert_eq!(n.title, PURGE_NOTIFICATION_TITLE);
            assert_eq!(n.kind, "admin");
            assert_eq!(n.provider_id, None);
            assert!(n.message.contains(&fx.provider_id.to_string()));
        }
    }

    #[tokio::test]
    async fn test_concurrent_sweeps_purge_once() {
        let fx = setup(3);
        let now = Utc::now();

        let (first, second) = tokio::join!(fx.sweeper.run_sweep(now), fx.sweeper.run_sweep(now));
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(first.deleted + second.deleted, 1);
        assert_eq!(first.errors, None);
        assert_eq!(second.errors, None);
        assert_eq!(fx.store.notifications().len(), 3);
    }

    #[tokio::test]
    async fn test_media_failure_does_not_abort() {
        let fx = setup(1);
        fx.media.set_failing(true);

        let summary = fx.sweeper.run_sweep(Utc::now()).await.unwrap();

        assert_eq!(summary.deleted, 1);
        assert!(fx.store.provider(fx.provider_id).is_none());
    }

    #[tokio::test]
    async fn test_delete_failure_is_partial_and_retried() {
        let fx = setup(1);
        fx.store.set_failing_purges(true);

        let summary = fx.sweeper.run_sweep(Utc::now()).await.unwrap();
        assert_eq!(summary.deleted, 0);
        assert!(summary.is_partial_failure());
        assert!(fx.store.provider(fx.provider_id).is_some());
        assert!(fx.store.notifications().is_empty());

        fx.store.set_failing_purges(false);
        let retry = fx.sweeper.run_sweep(Utc::now()).await.unwrap();
        assert_eq!(retry.deleted, 1);
    }

    #[tokio::test]
    async fn test_listing_failure_is_an_error() {
        let fx = setup(1);
        fx.store.set_failing(true);

        assert!(fx.sweeper.run_sweep(Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn test_summary_omits_empty_errors() {
        let fx = setup(0);

        let summary = fx.sweeper.run_sweep(Utc::now()).await.unwrap();
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["deleted"], 1);
        assert!(json.get("errors").is_none());
    }

    #[tokio::test]
    async fn test_scheduler_runs_sweeps() {
        let fx = setup(1);
        let store = fx.store.clone();
        let provider_id = fx.provider_id;

        let handle = spawn_sweep_scheduler(Arc::new(fx.sweeper), std::time::Duration::from_millis(10));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        handle.abort();

        assert!(store.provider(provider_id).is_none());
    }
}
