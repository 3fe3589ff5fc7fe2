use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use chrono::Utc;

use crate::models::ErrorResponse;
use crate::routes::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/lifecycle/sweep", web::post().to(run_sweep));
}

/// Purge providers blocked for longer than the grace period
///
/// POST /api/v1/lifecycle/sweep
///
/// Response body:
/// ```json
/// { "message": "Cleanup completed", "deleted": 1, "errors": ["..."] }
/// ```
async fn run_sweep(state: web::Data<AppState>) -> impl Responder {
    match state.sweeper.run_sweep(Utc::now()).await {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(e) => ErrorResponse::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "sweep_failed",
            e.to_string(),
        )
        .into_response(),
    }
}
