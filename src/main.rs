use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use medrec_core::{CoreConfig, FhirService};

/// Main entry point for the medrec application
///
/// Resolves configuration once, then serves the FHIR REST API:
/// - `/fhir/<ResourceType>/` endpoints (bearer token required)
/// - `/health`
/// - Swagger UI at `/swagger-ui`
///
/// # Environment Variables
/// A `.env` file in the working directory is loaded first, if present.
/// - `MEDREC_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `MEDREC_API_TOKEN`: Bearer token for the `/fhir` routes (required)
/// - `MEDREC_BASE_URL`: Public base URL used in Bundle links and `Location` headers
///   (default: "http://localhost:3000/fhir")
/// - `MEDREC_PAGE_SIZE`: Default list page size (default: 20)
/// - `MEDREC_MAX_PAGE_SIZE`: Largest accepted `_count` (default: 100)
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("medrec_run=info".parse()?)
                .add_directive("medrec_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Arc::new(CoreConfig::from_lookup(|key| std::env::var(key).ok())?);
    let rest_addr = cfg.rest_addr().to_owned();

    tracing::info!("++ Starting medrec REST on {}", rest_addr);
    tracing::info!("++ FHIR base URL {}", cfg.base_url());

    let app = api_rest::router(FhirService::new(cfg));

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
