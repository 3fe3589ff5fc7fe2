use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use chrono::Utc;
use uuid::Uuid;

use crate::core::MarketplaceError;
use crate::models::{
    BlockResponse, ErrorResponse, ProviderCreatedResponse, RateProviderRequest, RatingResponse,
    RegisterProviderRequest, ReportProviderRequest, ReportResponse, ReportStatus,
};
use crate::routes::AppState;

/// Configure provider write routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/providers", web::post().to(register_provider))
        .route("/providers/{id}/ratings", web::post().to(rate_provider))
        .route("/providers/{id}/reports", web::post().to(report_provider))
        .route("/providers/{id}/block", web::post().to(block_provider));
}

/// Provider onboarding endpoint
///
/// POST /api/v1/providers
///
/// Request body:
/// ```json
/// {
///   "userId": "uuid",
///   "providerType": "individual|business",
///   "businessName": "string",
///   "categoryId": "uuid",
///   "latitude": 6.5244,
///   "longitude": 3.3792,
///   "workImages": ["path"]
/// }
/// ```
async fn register_provider(
    state: web::Data<AppState>,
    req: web::Json<RegisterProviderRequest>,
) -> impl Responder {
    match state.marketplace.register_provider(&req).await {
        Ok(id) => HttpResponse::Created().json(ProviderCreatedResponse { id }),
        Err(e) => marketplace_error_response(e),
    }
}

async fn rate_provider(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<RateProviderRequest>,
) -> impl Responder {
    let provider_id = path.into_inner();

    match state.marketplace.rate_provider(provider_id, &req).await {
        Ok(average_rating) => HttpResponse::Ok().json(RatingResponse {
            provider_id,
            average_rating,
        }),
        Err(e) => marketplace_error_response(e),
    }
}

async fn report_provider(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<ReportProviderRequest>,
) -> impl Responder {
    match state.marketplace.report_provider(path.into_inner(), &req).await {
        Ok(id) => HttpResponse::Created().json(ReportResponse {
            id,
            status: ReportStatus::Pending.as_str().to_string(),
        }),
        Err(e) => marketplace_error_response(e),
    }
}

/// Admin action starting the purge grace period
async fn block_provider(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    let provider_id = path.into_inner();

    match state.marketplace.block_provider(provider_id, Utc::now()).await {
        Ok(blocked_at) => HttpResponse::Ok().json(BlockResponse {
            provider_id,
            blocked_at,
        }),
        Err(e) => marketplace_error_response(e),
    }
}

pub(crate) fn marketplace_error_response(err: MarketplaceError) -> HttpResponse {
    let (status, error) = match &err {
        MarketplaceError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
        MarketplaceError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        MarketplaceError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        MarketplaceError::Unavailable(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_unavailable"),
    };

    ErrorResponse::new(status, error, err.to_string()).into_response()
}
