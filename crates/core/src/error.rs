use fhir::{FhirError, ResourceType};
use medrec_types::RecordId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{resource_type}/{id} not found")]
    NotFound {
        resource_type: ResourceType,
        id: RecordId,
    },
    #[error("{resource_type} is not a stored resource type")]
    UnsupportedType { resource_type: ResourceType },
    #[error("{path} refers to {resource_type}/{id}, which does not exist")]
    DanglingReference {
        path: String,
        resource_type: ResourceType,
        id: RecordId,
    },
    #[error("{resource_type}/{id} is still referenced by {referrers:?}")]
    StillReferenced {
        resource_type: ResourceType,
        id: RecordId,
        referrers: Vec<String>,
    },
    #[error("resource id '{body}' does not match '{target}' in the request path")]
    IdMismatch { target: RecordId, body: RecordId },
    #[error("storage failure: {0}")]
    Storage(String),
    #[error(transparent)]
    Fhir(#[from] FhirError),
}

impl CoreError {
    /// True for failures caused by the server rather than the request.
    pub fn is_defect(&self) -> bool {
        match self {
            CoreError::Storage(_) => true,
            CoreError::Fhir(err) => err.is_defect(),
            _ => false,
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
