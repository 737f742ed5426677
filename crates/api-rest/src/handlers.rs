//! Request handlers.
//!
//! Handlers only parse the HTTP envelope (path segments, paging query, JSON body) and hand
//! the FHIR document to [`medrec_core::FhirService`].

use crate::error::{ApiError, ApiResult, FHIR_JSON};
use crate::AppState;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use fhir::ResourceType;
use medrec_types::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// FHIR paging parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(rename = "_page")]
    pub page: Option<u32>,
    #[serde(rename = "_count")]
    pub count: Option<u32>,
}

/// A serialisable body served as `application/fhir+json`.
pub struct FhirJson<T>(pub T);

impl<T: Serialize> IntoResponse for FhirJson<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(body) => (
                [(header::CONTENT_TYPE, HeaderValue::from_static(FHIR_JSON))],
                body,
            )
                .into_response(),
            Err(e) => ApiError::Internal(format!("failed to serialise response: {e}")).into_response(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used by monitoring and load balancers; requires no token.
#[axum::debug_handler]
pub async fn health() -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "medrec REST API is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/fhir/{resource_type}/",
    params(
        ("resource_type" = String, Path, description = "FHIR resource type, e.g. Patient"),
        ("_page" = Option<u32>, Query, description = "Page number, starting at 1"),
        ("_count" = Option<u32>, Query, description = "Page size")
    ),
    responses(
        (status = 200, description = "searchset Bundle"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "Unknown resource type")
    ),
    security(("bearer" = []))
)]
/// List stored records of one kind as a `searchset` Bundle
///
/// # Errors
/// Returns `400 Bad Request` if the paging parameters are not numbers, and `404 Not Found`
/// for resource types without an endpoint.
#[axum::debug_handler]
pub async fn search(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Response> {
    let kind = resource_kind(&resource_type)?;
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let page = state.service.pagination(params.page, params.count);
    let bundle = state.service.list(kind, page)?;
    Ok(FhirJson(bundle).into_response())
}

#[utoipa::path(
    post,
    path = "/fhir/{resource_type}/",
    params(("resource_type" = String, Path, description = "FHIR resource type, e.g. Patient")),
    responses(
        (status = 201, description = "Record created; body is the stored resource"),
        (status = 400, description = "Document failed translation; body lists every problem"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "Unknown resource type"),
        (status = 422, description = "Document refers to a record that does not exist")
    ),
    security(("bearer" = []))
)]
/// Create a record from a FHIR document
///
/// The server assigns the id; the response carries a `Location` header pointing at the
/// new resource.
#[axum::debug_handler]
pub async fn create(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let kind = resource_kind(&resource_type)?;
    let document = parse_body(&body)?;

    let created = state.service.create(kind, &document)?;
    let id = created.get("id").and_then(Value::as_str).unwrap_or_default();
    let location = format!("{}/{kind}/{id}", state.service.config().base_url());
    let location = HeaderValue::from_str(&location)
        .map_err(|e| ApiError::Internal(format!("invalid Location header: {e}")))?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        FhirJson(created),
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/fhir/{resource_type}/{id}/",
    params(
        ("resource_type" = String, Path, description = "FHIR resource type, e.g. Patient"),
        ("id" = String, Path, description = "Server-assigned record id")
    ),
    responses(
        (status = 200, description = "The stored resource"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "Unknown resource type or id")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn read(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let kind = resource_kind(&resource_type)?;
    let id = record_id(kind, &id)?;
    Ok(FhirJson(state.service.read(kind, &id)?).into_response())
}

#[utoipa::path(
    put,
    path = "/fhir/{resource_type}/{id}/",
    params(
        ("resource_type" = String, Path, description = "FHIR resource type, e.g. Patient"),
        ("id" = String, Path, description = "Server-assigned record id")
    ),
    responses(
        (status = 200, description = "Record replaced; body is the stored resource"),
        (status = 400, description = "Document failed translation or its id differs from the path"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "Unknown resource type or id"),
        (status = 422, description = "Document refers to a record that does not exist")
    ),
    security(("bearer" = []))
)]
/// Replace a stored record
///
/// An `id` in the document is optional but must match the path when present.
#[axum::debug_handler]
pub async fn update(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Response> {
    let kind = resource_kind(&resource_type)?;
    let id = record_id(kind, &id)?;
    let document = parse_body(&body)?;
    Ok(FhirJson(state.service.update(kind, &id, &document)?).into_response())
}

#[utoipa::path(
    delete,
    path = "/fhir/{resource_type}/{id}/",
    params(
        ("resource_type" = String, Path, description = "FHIR resource type, e.g. Patient"),
        ("id" = String, Path, description = "Server-assigned record id")
    ),
    responses(
        (status = 204, description = "Record deleted"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "Unknown resource type or id"),
        (status = 409, description = "Other records still refer to this one")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn delete(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let kind = resource_kind(&resource_type)?;
    let id = record_id(kind, &id)?;
    state.service.delete(kind, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

// Helper functions

fn resource_kind(raw: &str) -> ApiResult<ResourceType> {
    match raw.parse::<ResourceType>() {
        Ok(kind) if kind.is_translated() => Ok(kind),
        _ => Err(ApiError::NotFound(format!("unknown resource type '{raw}'"))),
    }
}

/// An id that cannot be a record id cannot name a stored record either.
fn record_id(kind: ResourceType, raw: &str) -> ApiResult<RecordId> {
    RecordId::new(raw).map_err(|_| ApiError::NotFound(format!("{kind}/{raw} not found")))
}

fn parse_body(body: &[u8]) -> ApiResult<Value> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("request body is not valid JSON: {e}")))
}
