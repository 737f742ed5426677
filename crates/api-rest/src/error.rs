//! HTTP error mapping.
//!
//! Every error response is an `OperationOutcome` served as `application/fhir+json`.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use fhir::outcome::OutcomeIssue;
use fhir::{FhirError, OperationOutcome};
use medrec_core::CoreError;

pub const FHIR_JSON: &str = "application/fhir+json";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unprocessable entity at {path}: {message}")]
    Unprocessable { path: String, message: String },
    #[error(transparent)]
    Translation(FhirError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) | ApiError::Translation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_operation_outcome(&self) -> OperationOutcome {
        match self {
            ApiError::Unauthorized(msg) => OperationOutcome::error("login", msg.as_str()),
            ApiError::BadRequest(msg) => OperationOutcome::error("invalid", msg.as_str()),
            ApiError::NotFound(msg) => OperationOutcome::error("not-found", msg.as_str()),
            ApiError::Conflict(msg) => OperationOutcome::error("conflict", msg.as_str()),
            ApiError::Unprocessable { path, message } => OperationOutcome {
                resource_type: "OperationOutcome".to_owned(),
                issue: vec![OutcomeIssue {
                    severity: "error".to_owned(),
                    code: "not-found".to_owned(),
                    expression: vec![path.clone()],
                    diagnostics: message.clone(),
                }],
            },
            ApiError::Translation(err) => OperationOutcome::from_error(err),
            // Internal details stay in the logs.
            ApiError::Internal(_) => {
                let mut outcome = OperationOutcome::error("exception", "internal server error");
                outcome.issue[0].severity = "fatal".to_owned();
                outcome
            }
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Fhir(err) if err.is_defect() => ApiError::Internal(err.to_string()),
            CoreError::Fhir(err) => ApiError::Translation(err),
            err @ (CoreError::NotFound { .. } | CoreError::UnsupportedType { .. }) => {
                ApiError::NotFound(err.to_string())
            }
            CoreError::DanglingReference {
                path,
                resource_type,
                id,
            } => ApiError::Unprocessable {
                message: format!("{resource_type}/{id} does not exist"),
                path,
            },
            err @ CoreError::StillReferenced { .. } => ApiError::Conflict(err.to_string()),
            err @ CoreError::IdMismatch { .. } => ApiError::BadRequest(err.to_string()),
            err @ (CoreError::Storage(_) | CoreError::InvalidInput(_)) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        } else {
            tracing::warn!(status = status.as_u16(), "request rejected: {}", self);
        }

        let body = serde_json::to_vec(&self.to_operation_outcome()).unwrap_or_else(|_| {
            br#"{"resourceType":"OperationOutcome","issue":[{"severity":"fatal","code":"exception","diagnostics":"serialisation failure"}]}"#.to_vec()
        });

        (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static(FHIR_JSON))],
            body,
        )
            .into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use fhir::ResourceType;
    use medrec_types::RecordId;

    fn id(raw: &str) -> RecordId {
        RecordId::new(raw).expect("valid id")
    }

    #[test]
    fn core_errors_map_to_status_codes() {
        let cases: Vec<(CoreError, StatusCode)> = vec![
            (
                CoreError::NotFound {
                    resource_type: ResourceType::Patient,
                    id: id("p9"),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                CoreError::DanglingReference {
                    path: "subject".into(),
                    resource_type: ResourceType::Patient,
                    id: id("p9"),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                CoreError::StillReferenced {
                    resource_type: ResourceType::Patient,
                    id: id("p1"),
                    referrers: vec!["Appointment/a1".into()],
                },
                StatusCode::CONFLICT,
            ),
            (
                CoreError::Fhir(FhirError::RequiredField {
                    path: "status".into(),
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                CoreError::Fhir(FhirError::Invariant("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                CoreError::Storage("lock poisoned".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn response_is_fhir_json() {
        let resp = ApiError::NotFound("Patient/p9 not found".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE),
            Some(&HeaderValue::from_static(FHIR_JSON))
        );
    }

    #[test]
    fn dangling_reference_outcome_names_the_path() {
        let err = ApiError::from(CoreError::DanglingReference {
            path: "participant[1].actor".into(),
            resource_type: ResourceType::Practitioner,
            id: id("ghost"),
        });
        let outcome = err.to_operation_outcome();
        assert_eq!(outcome.issue[0].expression, vec!["participant[1].actor"]);
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let outcome = ApiError::Internal("lock poisoned at store.rs".into()).to_operation_outcome();
        assert_eq!(outcome.issue[0].severity, "fatal");
        assert!(!outcome.issue[0].diagnostics.contains("store.rs"));
    }
}
