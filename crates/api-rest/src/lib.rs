//! # API REST
//!
//! REST API for medrec records in FHIR R4 JSON.
//!
//! Handles:
//! - `/fhir/<ResourceType>/` and `/fhir/<ResourceType>/<id>/` endpoints with axum
//!   (the trailing slash is optional)
//! - Bearer-token authentication on the `/fhir` routes
//! - OperationOutcome error bodies and status codes
//! - OpenAPI/Swagger documentation
//!
//! Record semantics live in `medrec-core`; translation lives in `fhir`.

#![warn(rust_2018_idioms)]

pub mod auth;
pub mod error;
pub mod handlers;

pub use error::{ApiError, ApiResult, FHIR_JSON};

use axum::routing::get;
use axum::{middleware, Router};
use medrec_core::FhirService;
use tower_http::cors::CorsLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: FhirService,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::search,
        handlers::create,
        handlers::read,
        handlers::update,
        handlers::delete,
    ),
    components(schemas(handlers::HealthRes)),
    modifiers(&BearerAuth)
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// Builds the full REST router around `service`.
pub fn router(service: FhirService) -> Router {
    let state = AppState { service };

    let fhir = Router::new()
        .route(
            "/fhir/:resource_type",
            get(handlers::search).post(handlers::create),
        )
        .route(
            "/fhir/:resource_type/",
            get(handlers::search).post(handlers::create),
        )
        .route(
            "/fhir/:resource_type/:id",
            get(handlers::read)
                .put(handlers::update)
                .delete(handlers::delete),
        )
        .route(
            "/fhir/:resource_type/:id/",
            get(handlers::read)
                .put(handlers::update)
                .delete(handlers::delete),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(fhir)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
