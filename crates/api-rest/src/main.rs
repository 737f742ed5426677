//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the FHIR REST API on its own.
//!
//! ## Intended use
//! Useful for development and debugging of the REST layer. The workspace's main `medrec-run`
//! binary serves the same router.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use medrec_core::{CoreConfig, FhirService};

/// Main entry point for the medrec REST API server
///
/// # Environment Variables
/// - `MEDREC_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `MEDREC_API_TOKEN`: Bearer token required on `/fhir` routes (required)
/// - `MEDREC_BASE_URL`: Public base URL of the FHIR endpoints
/// - `MEDREC_PAGE_SIZE` / `MEDREC_MAX_PAGE_SIZE`: list paging defaults
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is missing or invalid,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Arc::new(CoreConfig::from_lookup(|key| std::env::var(key).ok())?);
    let addr = cfg.rest_addr().to_owned();

    tracing::info!("-- Starting medrec REST API on {}", addr);

    let app = api_rest::router(FhirService::new(cfg));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
