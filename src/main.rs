use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use provider_finder::config::{LoggingSettings, Settings};
use provider_finder::core::{spawn_sweep_scheduler, Marketplace, SearchService, Sweeper};
use provider_finder::routes::{self, AppState};
use provider_finder::services::{CacheManager, MediaStore, PostgresClient, StorageClient};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logging(logging: &LoggingSettings) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if logging.format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, err);
    std::io::Error::other(format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            init_logging(&LoggingSettings::default());
            return Err(startup_error("Failed to load configuration", e));
        }
    };

    init_logging(&settings.logging);

    info!("Starting provider finder service...");

    // Initialize PostgreSQL client
    let postgres = Arc::new(
        PostgresClient::from_settings(
            &settings.database.url,
            settings.database.max_connections,
            settings.database.min_connections,
            settings.database.acquire_timeout_secs,
            settings.database.idle_timeout_secs,
        )
        .await
        .map_err(|e| startup_error("Failed to connect to PostgreSQL", e))?,
    );

    info!("PostgreSQL client initialized, migrations applied");

    // Initialize cache manager (Redis optional)
    let cache = Arc::new(
        CacheManager::connect_or_local(
            settings.cache.redis_url.as_deref(),
            settings.cache.l1_cache_size,
            settings.cache.ttl_secs,
        )
        .await,
    );

    info!(
        "Cache manager initialized (L1: {} entries, TTL: {}s, Redis: {})",
        settings.cache.l1_cache_size,
        settings.cache.ttl_secs,
        cache.stats().l2_enabled
    );

    // Initialize media store
    let storage_url = settings
        .storage
        .base_url
        .clone()
        .ok_or_else(|| startup_error("Invalid configuration", "storage.base_url is not set"))?;

    let media: Arc<dyn MediaStore> = Arc::new(
        StorageClient::new(
            storage_url,
            settings.storage.api_key.clone(),
            settings.storage.bucket.clone(),
            Duration::from_secs(settings.storage.timeout_secs),
        )
        .map_err(|e| startup_error("Failed to build storage client", e))?,
    );

    info!("Media store initialized (bucket: {})", settings.storage.bucket);

    let search = Arc::new(
        SearchService::new(postgres.clone(), cache.clone(), settings.search.ranking_mode)
            .with_default_max_distance(settings.search.max_distance_km)
            .with_max_results(settings.search.max_results),
    );

    info!("Search service initialized ({:?} ranking)", search.mode());

    let sweeper = Arc::new(
        Sweeper::new(postgres.clone(), media).with_grace_period(settings.lifecycle.grace_period()),
    );

    if settings.lifecycle.enabled {
        spawn_sweep_scheduler(sweeper.clone(), settings.lifecycle.sweep_interval());
        info!(
            "Blocked-provider sweep scheduled every {}s",
            settings.lifecycle.sweep_interval_secs
        );
    }

    let marketplace = Arc::new(Marketplace::new(postgres.clone(), postgres.clone(), cache.clone()));

    // Build application state
    let app_state = AppState {
        search,
        sweeper,
        marketplace,
        directory: postgres,
        cache,
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .configure(routes::configure_extractors)
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
