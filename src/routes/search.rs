use actix_web::{http::StatusCode, web, HttpResponse, Responder};

use crate::core::SearchError;
use crate::models::{CategoriesResponse, ErrorResponse, HealthResponse, SearchParams, SearchResponse};
use crate::routes::{providers::marketplace_error_response, AppState};

/// Configure search and reference-data routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/search", web::get().to(search_providers))
        .route("/categories", web::get().to(list_categories));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let store_healthy = state.directory.health_check().await.unwrap_or(false);

    let status = if store_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        cache_entries: state.cache.stats().l1_size,
    })
}

/// Proximity search endpoint
///
/// GET /api/v1/search?categoryId={uuid}&lat={f64}&lon={f64}[&maxDistanceKm={f64}]
async fn search_providers(
    state: web::Data<AppState>,
    params: web::Query<SearchParams>,
) -> impl Responder {
    match state.search.search_nearby_providers(&params).await {
        Ok(providers) => HttpResponse::Ok().json(SearchResponse { providers }),
        Err(e) => search_error_response(e),
    }
}

/// Category reference data
async fn list_categories(state: web::Data<AppState>) -> impl Responder {
    match state.marketplace.list_categories().await {
        Ok(categories) => HttpResponse::Ok().json(CategoriesResponse { categories }),
        Err(e) => marketplace_error_response(e),
    }
}

fn search_error_response(err: SearchError) -> HttpResponse {
    match err {
        SearchError::InvalidArgument(message) => {
            tracing::debug!("Rejected search: {}", message);
            ErrorResponse::new(StatusCode::BAD_REQUEST, "invalid_argument", message).into_response()
        }
        // Already logged by the search service
        SearchError::Unavailable(_) => ErrorResponse::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "search_unavailable",
            "Provider search is temporarily unavailable",
        )
        .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderResult;
    use crate::routes::{configure_extractors, configure_routes, test_support::*};
    use actix_web::{test, App};
    use serde_json::Value;

    #[actix_web::test]
    async fn test_search_returns_nearest_first() {
        let app_state = test_app();
        app_state.store.insert_provider(create_listing(&app_state.category, 6.60, 3.3792), vec![]);
        app_state.store.insert_provider(create_listing(&app_state.category, 6.53, 3.3792), vec![]);

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state.state.clone()))
                .configure(configure_extractors)
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!(
                "/api/v1/search?categoryId={}&lat=6.5244&lon=3.3792",
                app_state.category.id
            ))
            .to_request();
        let resp: SearchResponse = test::call_and_read_body_json(&app, req).await;

        let distances: Vec<f64> = resp.providers.iter().map(|p: &ProviderResult| p.distance_km).collect();
        assert_eq!(distances.len(), 2);
        assert!(distances[0] < distances[1]);
        assert_eq!(resp.providers[0].category_name, "Plumbing");
    }

    #[actix_web::test]
    async fn test_missing_category_is_bad_request() {
        let app_state = test_app();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state.state.clone()))
                .configure(configure_extractors)
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/v1/search?lat=6.5244&lon=3.3792")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "invalid_argument");
        assert_eq!(body["status_code"], 400);
        assert_eq!(app_state.store.query_count(), 0);
    }

    #[actix_web::test]
    async fn test_unparsable_coordinate_is_json_bad_request() {
        let app_state = test_app();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state.state.clone()))
                .configure(configure_extractors)
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/search?categoryId={}&lat=north&lon=3.3", app_state.category.id))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "invalid_query");
    }

    #[actix_web::test]
    async fn test_store_failure_is_server_error() {
        let app_state = test_app();
        app_state.store.set_failing(true);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state.state.clone()))
                .configure(configure_extractors)
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/search?categoryId={}&lat=0&lon=0", app_state.category.id))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "search_unavailable");
    }

    #[actix_web::test]
    async fn test_health_and_categories() {
        let app_state = test_app();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state.state.clone()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/health").to_request();
        let health: HealthResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(health.status, "healthy");

        let req = test::TestRequest::get().uri("/api/v1/categories").to_request();
        let categories: CategoriesResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(categories.categories, vec![app_state.category.clone()]);
    }
}
