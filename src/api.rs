//! # API Server Module
//!
//! ## Purpose
//! REST API server exposing the mandi rates lookup to the farmer-facing UI,
//! plus health and statistics endpoints for operations.
//!
//! ## Input/Output Specification
//! - **Input**: HTTP requests with commodity and district query parameters
//! - **Output**: JSON responses with aggregated rates, origin, and timing
//! - **Endpoints**: Rates lookup, health, stats, landing page
//!
//! ## Key Features
//! - `GET /api/rates` is the only outward interface of the rates core; the
//!   UI calls it on selection change
//! - CORS support for the web frontend
//! - Structured error responses

use crate::config::Config;
use crate::errors::{RatesError, Result};
use crate::service::{RateOrigin, RateReport};
use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer, Result as ActixResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// API server wrapping the shared application state
pub struct ApiServer {
    app_state: crate::AppState,
}

/// Query parameters for the rates endpoint
#[derive(Debug, Deserialize)]
pub struct RatesParams {
    pub commodity: String,
    pub district: String,
}

/// Rates response payload
#[derive(Debug, Serialize)]
pub struct RatesResponse {
    pub commodity: String,
    pub district: String,
    pub date: NaiveDate,
    pub origin: RateOrigin,
    pub rates: Vec<crate::AggregatedRate>,
    pub query_time_ms: u64,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub components: HealthComponents,
}

/// Component health status
#[derive(Debug, Serialize)]
pub struct HealthComponents {
    pub cache_store: String,
    pub price_source: String,
}

impl ApiServer {
    /// Create new API server
    pub fn new(app_state: crate::AppState) -> Self {
        Self { app_state }
    }

    /// Run the API server
    pub async fn run(self) -> Result<()> {
        let bind_addr = format!(
            "{}:{}",
            self.app_state.config.server.host, self.app_state.config.server.port
        );

        tracing::info!("Starting API server on {}", bind_addr);

        let app_state = self.app_state;
        let server = HttpServer::new(move || {
            App::new()
                .wrap(build_cors(&app_state.config))
                .app_data(web::Data::new(app_state.clone()))
                .route("/api/rates", web::get().to(rates_handler))
                .route("/health", web::get().to(health_handler))
                .route("/stats", web::get().to(stats_handler))
                .route("/", web::get().to(index_handler))
        })
        .bind(&bind_addr)
        .map_err(|e| RatesError::Internal {
            message: format!("Failed to bind server to {}: {}", bind_addr, e),
        })?
        .run();

        server.await.map_err(|e| RatesError::Internal {
            message: format!("Server error: {}", e),
        })?;

        Ok(())
    }
}

/// Build the CORS policy from configuration
fn build_cors(config: &Config) -> Cors {
    if !config.server.enable_cors {
        return Cors::default();
    }

    if config
        .server
        .allowed_origins
        .iter()
        .any(|origin| origin == "*")
    {
        return Cors::permissive();
    }

    let mut cors = Cors::default()
        .allowed_methods(vec!["GET"])
        .max_age(3600);
    for origin in &config.server.allowed_origins {
        cors = cors.allowed_origin(origin);
    }
    cors
}

/// Rates endpoint handler
async fn rates_handler(
    app_state: web::Data<crate::AppState>,
    params: web::Query<RatesParams>,
) -> ActixResult<HttpResponse> {
    let start_time = std::time::Instant::now();

    if params.commodity.is_empty() || params.district.is_empty() {
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Invalid request",
            "message": "commodity and district must be non-empty",
        })));
    }

    match app_state
        .service
        .get_rates(&params.commodity, &params.district)
        .await
    {
        Ok(RateReport { rates, origin, date }) => {
            let response = RatesResponse {
                commodity: params.commodity.clone(),
                district: params.district.clone(),
                date,
                origin,
                rates,
                query_time_ms: start_time.elapsed().as_millis() as u64,
            };
            Ok(HttpResponse::Ok().json(response))
        }
        Err(e) => {
            tracing::error!("Rates lookup error: {}", e);
            let mut builder = if e.is_recoverable() {
                HttpResponse::BadGateway()
            } else {
                HttpResponse::InternalServerError()
            };
            Ok(builder.json(serde_json::json!({
                "error": "Rates lookup failed",
                "category": e.category(),
                "message": e.to_string(),
            })))
        }
    }
}

/// Health check endpoint handler
async fn health_handler(
    app_state: web::Data<crate::AppState>,
) -> ActixResult<HttpResponse> {
    let store_status = match app_state.store.health_check().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    // The remote source has no probe endpoint worth hitting on every health
    // check; report whether it is configured with credentials.
    let source_status = if app_state.config.source.api_key.is_empty() {
        "unconfigured"
    } else {
        "configured"
    };

    let response = HealthResponse {
        status: if store_status == "healthy" {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        components: HealthComponents {
            cache_store: store_status.to_string(),
            price_source: source_status.to_string(),
        },
    };

    Ok(HttpResponse::Ok().json(response))
}

/// Statistics endpoint handler
async fn stats_handler(
    app_state: web::Data<crate::AppState>,
) -> ActixResult<HttpResponse> {
    let storage_stats = match app_state.store.stats() {
        Ok(stats) => Some(stats),
        Err(e) => {
            tracing::warn!("Storage stats unavailable: {}", e);
            None
        }
    };

    let response = serde_json::json!({
        "service": app_state.service.stats(),
        "source": app_state.source.stats(),
        "storage": storage_stats,
    });

    Ok(HttpResponse::Ok().json(response))
}

/// Landing page handler
async fn index_handler() -> ActixResult<HttpResponse> {
    let html = r#"
    <!DOCTYPE html>
    <html>
    <head>
        <title>Krishivedah Mandi Rates</title>
        <style>
            body { font-family: Arial, sans-serif; margin: 40px; }
            .header { color: #2c5e1a; }
            .endpoint { margin: 20px 0; padding: 15px; background: #f8f9fa; border-radius: 5px; }
            .method { font-weight: bold; color: #27ae60; }
        </style>
    </head>
    <body>
        <h1 class="header">Krishivedah Mandi Rates API</h1>
        <p>Live wholesale market (mandi) commodity rates, aggregated per market and cached per day.</p>

        <h2>Available Endpoints</h2>

        <div class="endpoint">
            <span class="method">GET</span> /api/rates?commodity=Tomato&amp;district=Sangli
            <p>Today's per-market min/max/modal prices for a commodity in a district.</p>
        </div>

        <div class="endpoint">
            <span class="method">GET</span> /health
            <p>Check the health status of system components.</p>
        </div>

        <div class="endpoint">
            <span class="method">GET</span> /stats
            <p>Cache, source, and storage statistics.</p>
        </div>
    </body>
    </html>
    "#;

    Ok(HttpResponse::Ok().content_type("text/html").body(html))
}
