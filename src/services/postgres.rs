use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

use crate::core::ranking::clamp_rating;
use crate::models::{
    BlockedProvider, BoundingBox, Category, Coordinates, NearbyQuery, NewNotification, NewProvider,
    NewRating, NewReport, ProviderListing, ProviderResult, ReportStatus, UserRole,
};
use crate::services::store::{LifecycleStore, MarketplaceStore, ProviderDirectory, StoreError};

/// PostgreSQL-backed data access handle
///
/// Constructed once at startup and shared behind `Arc` by the search,
/// lifecycle and marketplace services.
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    /// Wrap an existing pool (migrations are assumed to have run)
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn listing_from_row(row: &PgRow) -> Result<ProviderListing, sqlx::Error> {
    Ok(ProviderListing {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        username: row.try_get("username")?,
        business_name: row.try_get("business_name")?,
        category_id: row.try_get("category_id")?,
        category_name: row.try_get("category_name")?,
        average_rating: row.try_get("average_rating")?,
        is_verified: row.try_get("is_verified")?,
        is_blocked: row.try_get("is_blocked")?,
        blocked_at: row.try_get("blocked_at")?,
        location: Coordinates::from_parts(row.try_get("latitude")?, row.try_get("longitude")?),
        location_text: row.try_get("location_text")?,
        whatsapp_number: row.try_get("whatsapp_number")?,
        phone_number: row.try_get("phone_number")?,
        profile_image_url: row.try_get("profile_image_url")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn result_from_row(row: &PgRow) -> Result<ProviderResult, sqlx::Error> {
    let category_name: Option<String> = row.try_get("category_name")?;

    Ok(ProviderResult {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        business_name: row.try_get("business_name")?,
        category_name: category_name.unwrap_or_default(),
        average_rating: clamp_rating(row.try_get("average_rating")?),
        distance_km: row.try_get("distance_km")?,
        whatsapp_number: row.try_get("whatsapp_number")?,
        phone_number: row.try_get("phone_number")?,
        profile_image_url: row.try_get("profile_image_url")?,
        is_verified: row.try_get("is_verified")?,
        location_text: row.try_get("location_text")?,
    })
}

/// Map constraint violations to domain errors, pass everything else through
fn classify_write_error(err: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::Conflict(format!("{} already exists", what));
        }
        if db.is_foreign_key_violation() {
            return StoreError::NotFound(format!("{} references a missing record", what));
        }
    }
    StoreError::SqlxError(err)
}

#[async_trait]
impl ProviderDirectory for PostgresClient {
    async fn category_exists(&self, category_id: Uuid) -> Result<bool, StoreError> {
        let query = r#"
            SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1) AS present
        "#;

        let row = sqlx::query(query).bind(category_id).fetch_one(&self.pool).await?;
        Ok(row.try_get("present")?)
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let query = r#"
            SELECT id, name, description
            FROM categories
            ORDER BY name
        "#;

        let rows = sqlx::query(query).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| -> Result<Category, StoreError> {
                Ok(Category {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    description: row.try_get("description")?,
                })
            })
            .collect()
    }

    async fn fetch_candidates(
        &self,
        category_id: Uuid,
        bbox: &BoundingBox,
    ) -> Result<Vec<ProviderListing>, StoreError> {
        let query = r#"
            SELECT sp.id, sp.user_id, u.username, sp.business_name, sp.category_id,
                   c.name AS category_name, sp.average_rating, sp.is_verified,
                   sp.is_blocked, sp.blocked_at, sp.latitude, sp.longitude,
                   sp.location_text, u.whatsapp_number, u.phone_number,
                   u.profile_image_url, sp.deleted_at
            FROM service_providers sp
            JOIN users u ON u.id = sp.user_id
            LEFT JOIN categories c ON c.id = sp.category_id
            WHERE sp.category_id = $1
              AND sp.deleted_at IS NULL
              AND sp.is_blocked = FALSE
              AND sp.latitude BETWEEN $2 AND $3
              AND sp.longitude BETWEEN $4 AND $5
        "#;

        let rows = sqlx::query(query)
            .bind(category_id)
            .bind(bbox.min_lat)
            .bind(bbox.max_lat)
            .bind(bbox.min_lon)
            .bind(bbox.max_lon)
            .fetch_all(&self.pool)
            .await?;

        let listings = rows
            .iter()
            .map(listing_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("Fetched {} candidates for category {}", listings.len(), category_id);

        Ok(listings)
    }

    /// Ranked search pushed down to the `search_nearby_providers` routine
    async fn ranked_nearby(&self, query: &NearbyQuery) -> Result<Vec<ProviderResult>, StoreError> {
        let sql = r#"
            SELECT id, username, business_name, category_name, average_rating,
                   distance_km, whatsapp_number, phone_number, profile_image_url,
                   is_verified, location_text
            FROM search_nearby_providers($1, $2, $3, $4)
            ORDER BY distance_km ASC, average_rating DESC, id ASC
        "#;

        let rows = sqlx::query(sql)
            .bind(query.category_id)
            .bind(query.origin.latitude)
            .bind(query.origin.longitude)
            .bind(query.max_distance_km)
            .fetch_all(&self.pool)
            .await?;

        let mut results = rows
            .iter()
            .map(result_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }

        Ok(results)
    }

    /// Health check for the database connection
    async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

#[async_trait]
impl LifecycleStore for PostgresClient {
    async fn blocked_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<BlockedProvider>, StoreError> {
        let query = r#"
            SELECT id, user_id, blocked_at, work_image_1, work_image_2, work_image_3
            FROM service_providers
            WHERE is_blocked = TRUE
              AND blocked_at <= $1
            ORDER BY blocked_at
        "#;

        let rows = sqlx::query(query).bind(cutoff).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| -> Result<BlockedProvider, StoreError> {
                let work_images = ["work_image_1", "work_image_2", "work_image_3"]
                    .into_iter()
                    .map(|column| row.try_get::<Option<String>, _>(column))
                    .collect::<Result<Vec<_>, _>>()?
                    .into_iter()
                    .flatten()
                    .collect();

                Ok(BlockedProvider {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    blocked_at: row.try_get("blocked_at")?,
                    work_images,
                })
            })
            .collect()
    }

    /// Conditional delete; ratings, reports and notifications cascade
    async fn purge_blocked(&self, provider_id: Uuid, cutoff: DateTime<Utc>) -> Result<bool, StoreError> {
        let query = r#"
            DELETE FROM service_providers
            WHERE id = $1
              AND is_blocked = TRUE
              AND blocked_at <= $2
        "#;

        let result = sqlx::query(query)
            .bind(provider_id)
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn admin_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let query = r#"
            SELECT id
            FROM users
            WHERE role = $1
              AND deleted_at IS NULL
        "#;

        let rows = sqlx::query(query)
            .bind(UserRole::Admin.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<Uuid, _>("id").map_err(StoreError::from))
            .collect()
    }

    async fn create_notification(&self, notification: &NewNotification) -> Result<(), StoreError> {
        let query = r#"
            INSERT INTO notifications (user_id, provider_id, title, message, type)
            VALUES ($1, $2, $3, $4, $5)
        "#;

        sqlx::query(query)
            .bind(notification.user_id)
            .bind(notification.provider_id)
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(&notification.kind)
            .execute(&self.pool)
            .await
            .map_err(|e| classify_write_error(e, "notification"))?;

        Ok(())
    }
}

#[async_trait]
impl MarketplaceStore for PostgresClient {
    async fn create_provider(&self, provider: &NewProvider) -> Result<Uuid, StoreError> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query("SELECT id FROM users WHERE id = $1 AND deleted_at IS NULL FOR UPDATE")
            .bind(provider.user_id)
            .fetch_optional(&mut *tx)
            .await?;

        if user.is_none() {
            return Err(StoreError::NotFound(format!("user {}", provider.user_id)));
        }

        let insert = r#"
            INSERT INTO service_providers (
                user_id, provider_type, business_name, contact_number, category_id,
                work_image_1, work_image_2, work_image_3, latitude, longitude, location_text
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
        "#;

        let row = sqlx::query(insert)
            .bind(provider.user_id)
            .bind(provider.provider_type.as_str())
            .bind(&provider.business_name)
            .bind(&provider.contact_number)
            .bind(provider.category_id)
            .bind(provider.work_images.first().cloned())
            .bind(provider.work_images.get(1).cloned())
            .bind(provider.work_images.get(2).cloned())
            .bind(provider.location.latitude)
            .bind(provider.location.longitude)
            .bind(&provider.location_text)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| classify_write_error(e, "provider profile"))?;

        let provider_id: Uuid = row.try_get("id")?;

        let update_user = r#"
            UPDATE users
            SET phone_number = COALESCE($2, phone_number),
                whatsapp_number = COALESCE($3, whatsapp_number),
                latitude = $4,
                longitude = $5,
                location_text = COALESCE($6, location_text)
            WHERE id = $1
        "#;

        sqlx::query(update_user)
            .bind(provider.user_id)
            .bind(&provider.contact_number)
            .bind(&provider.whatsapp_number)
            .bind(provider.location.latitude)
            .bind(provider.location.longitude)
            .bind(&provider.location_text)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!("Registered provider {} for user {}", provider_id, provider.user_id);

        Ok(provider_id)
    }

    async fn add_rating(&self, provider_id: Uuid, rating: &NewRating) -> Result<f64, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Lock the provider row so concurrent ratings recompute in sequence
        let provider = sqlx::query(
            "SELECT id FROM service_providers WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(provider_id)
        .fetch_optional(&mut *tx)
        .await?;

        if provider.is_none() {
            return Err(StoreError::NotFound(format!("provider {}", provider_id)));
        }

        sqlx::query("INSERT INTO ratings (user_id, provider_id, rating, comment) VALUES ($1, $2, $3, $4)")
            .bind(rating.user_id)
            .bind(provider_id)
            .bind(i16::from(rating.rating))
            .bind(&rating.comment)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify_write_error(e, "rating"))?;

        let recompute = r#"
            UPDATE service_providers
            SET average_rating = COALESCE((
                SELECT AVG(rating)::DOUBLE PRECISION
                FROM ratings
                WHERE provider_id = $1 AND deleted_at IS NULL
            ), 0)
            WHERE id = $1
            RETURNING average_rating
        "#;

        let row = sqlx::query(recompute).bind(provider_id).fetch_one(&mut *tx).await?;
        let average: f64 = row.try_get("average_rating")?;

        tx.commit().await?;

        Ok(average)
    }

    async fn add_report(&self, provider_id: Uuid, report: &NewReport) -> Result<Uuid, StoreError> {
        let query = r#"
            INSERT INTO reports (user_id, provider_id, report_text, status)
            VALUES ($1, $2, $3, $4)
            RETURNING id
        "#;

        let row = sqlx::query(query)
            .bind(report.user_id)
            .bind(provider_id)
            .bind(&report.report_text)
            .bind(ReportStatus::Pending.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify_write_error(e, "report"))?;

        Ok(row.try_get("id")?)
    }

    async fn block_provider(&self, provider_id: Uuid, at: DateTime<Utc>) -> Result<DateTime<Utc>, StoreError> {
        let query = r#"
            UPDATE service_providers
            SET blocked_at = CASE WHEN is_blocked THEN blocked_at ELSE $2 END,
                is_blocked = TRUE
            WHERE id = $1
              AND deleted_at IS NULL
            RETURNING blocked_at
        "#;

        let row = sqlx::query(query)
            .bind(provider_id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("provider {}", provider_id)))?;

        Ok(row.try_get("blocked_at")?)
    }
}
