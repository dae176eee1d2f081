use actix_web::http::StatusCode;
use actix_web::{HttpResponse, Result, error, web};
use chrono::Utc;
use std::sync::Arc;

use crate::error::ScrapeError;
use crate::models::{ScrapeRequest, ScrapeResponse};
use crate::scraper::WebScraper;

#[derive(Clone)]
pub struct AppState {
    pub scraper: Arc<WebScraper>,
}

/// Register every route. Shared by the server and the tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/", web::get().to(root))
        .route("/health", web::get().to(health_check))
        .route("/api/health", web::get().to(health_check))
        .route("/scrape", web::post().to(scrape_handler))
        .route("/api/scrape", web::post().to(scrape_handler));
}

/// Malformed bodies get the usual response envelope instead of a bare 400.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(256 * 1024)
        .error_handler(|err, _req| {
            let body = ScrapeResponse::rejected(&ScrapeError::Validation(err.to_string()));
            error::InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
        })
}

pub async fn root(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Article harvester is running",
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "engine": state.scraper.engine_name()
    })))
}

pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "article-harvester",
        "engine": state.scraper.engine_name(),
        "timestamp": Utc::now().to_rfc3339()
    })))
}

pub async fn scrape_handler(
    state: web::Data<AppState>,
    req: web::Json<ScrapeRequest>,
) -> Result<HttpResponse> {
    log::info!("Received scrape request for {} URL(s)", req.base_urls.len());

    match state.scraper.scrape(&req).await {
        Ok(response) => {
            log::info!(
                "Scraping complete: {} URL(s), {} articles found",
                response.total_urls_processed,
                response.total_articles_found
            );
            Ok(HttpResponse::Ok().json(response))
        }
        Err(e) => {
            let status = if e.is_fatal_to_batch() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::BAD_REQUEST
            };
            log::error!("Scrape request rejected: {}", e);
            Ok(HttpResponse::build(status).json(ScrapeResponse::rejected(&e)))
        }
    }
}
