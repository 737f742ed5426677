//! The translator contract and the plumbing shared by every resource kind.

use crate::datatypes::{format_instant, parse_instant, MetaWire};
use crate::reference::{DisplayNames, ResourceType};
use crate::vocabulary::Vocabulary;
use crate::{FhirError, FhirResult};
use chrono::{DateTime, Utc};
use medrec_types::RecordId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Identity and lifecycle bookkeeping carried by every internal record.
///
/// `id`, `created_at` and `updated_at` are assigned by the persistence layer. `created_at`
/// has no FHIR counterpart and is not carried through a translation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordMeta {
    pub id: Option<RecordId>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RecordMeta {
    pub fn with_id(id: RecordId) -> Self {
        RecordMeta {
            id: Some(id),
            ..RecordMeta::default()
        }
    }
}

/// Bidirectional translation between an internal record and its FHIR R4 document.
///
/// Implementations are zero-sized types; both directions are pure functions.
pub trait FhirResource {
    type Record;

    const RESOURCE_TYPE: ResourceType;

    /// Builds the FHIR document for `record`.
    ///
    /// `names` supplies display text for outbound references.
    ///
    /// # Errors
    ///
    /// Only fails with [`FhirError::Invariant`] when the document cannot be serialised,
    /// which indicates a defect rather than bad input.
    fn to_fhir(record: &Self::Record, names: &dyn DisplayNames) -> FhirResult<Value>;

    /// Parses an inbound FHIR document.
    ///
    /// # Errors
    ///
    /// - [`FhirError::RequiredField`] / [`FhirError::TypeMismatch`] when `resourceType` is
    ///   missing or names another kind
    /// - [`FhirError::Schema`] when the document does not match the wire shape
    /// - otherwise every field-level problem found, as one error or [`FhirError::Invalid`]
    fn from_fhir(document: &Value) -> FhirResult<Self::Record>;
}

/// Checks the `resourceType` discriminator of an inbound document.
pub fn check_resource_type(document: &Value, expected: ResourceType) -> FhirResult<()> {
    match document.get("resourceType") {
        None | Some(Value::Null) => Err(FhirError::required("resourceType")),
        Some(Value::String(found)) if found == expected.as_str() => Ok(()),
        Some(Value::String(found)) => Err(FhirError::TypeMismatch {
            expected: expected.as_str().to_owned(),
            found: found.clone(),
        }),
        Some(other) => Err(FhirError::Schema {
            path: "resourceType".into(),
            message: format!("expected a string, got {other}"),
        }),
    }
}

/// Decodes `document` into the strict wire model `W` after checking its `resourceType`.
pub(crate) fn decode<W: DeserializeOwned>(document: &Value, expected: ResourceType) -> FhirResult<W> {
    if let Err(err) = check_resource_type(document, expected) {
        tracing::warn!(resource_type = %expected, error = %err, "rejected inbound document");
        return Err(err);
    }

    serde_path_to_error::deserialize::<_, W>(document).map_err(|err| {
        let path = err.path().to_string();
        let path = if path.is_empty() || path == "." {
            "<root>".to_owned()
        } else {
            path
        };
        let err = FhirError::Schema {
            path,
            message: err.into_inner().to_string(),
        };
        tracing::warn!(resource_type = %expected, error = %err, "rejected inbound document");
        err
    })
}

/// Logs the outcome of an inbound field-level translation.
pub(crate) fn finish<T>(kind: ResourceType, result: FhirResult<T>) -> FhirResult<T> {
    match &result {
        Ok(_) => tracing::debug!(resource_type = %kind, "translated inbound document"),
        Err(err) => tracing::warn!(
            resource_type = %kind,
            problems = err.problems().len(),
            error = %err,
            "rejected inbound document"
        ),
    }
    result
}

/// Serialises an outbound wire model.
pub(crate) fn encode<W: Serialize>(wire: &W, kind: ResourceType) -> FhirResult<Value> {
    match serde_json::to_value(wire) {
        Ok(value) => {
            tracing::debug!(resource_type = %kind, "translated record to FHIR");
            Ok(value)
        }
        Err(err) => {
            tracing::error!(resource_type = %kind, error = %err, "failed to serialise FHIR document");
            Err(FhirError::Invariant(format!(
                "{kind} document could not be serialised: {err}"
            )))
        }
    }
}

pub(crate) fn build_meta(meta: &RecordMeta) -> Option<MetaWire> {
    meta.updated_at.map(|updated| MetaWire {
        last_updated: Some(format_instant(updated)),
        ..MetaWire::default()
    })
}

pub(crate) fn extract_meta(id: Option<&str>, meta: Option<&MetaWire>) -> FhirResult<RecordMeta> {
    let id = id
        .map(|raw| RecordId::new(raw).map_err(|e| FhirError::format("id", e.to_string())))
        .transpose();
    let updated_at = meta
        .and_then(|m| m.last_updated.as_deref())
        .map(|raw| parse_instant("meta.lastUpdated", raw))
        .transpose();

    match (id, updated_at) {
        (Ok(id), Ok(updated_at)) => Ok(RecordMeta {
            id,
            created_at: None,
            updated_at,
        }),
        (Err(a), Err(b)) => Err(FhirError::Invalid(vec![a, b])),
        (Err(e), _) | (_, Err(e)) => Err(e),
    }
}

pub(crate) fn required<'a>(value: Option<&'a str>, path: &str) -> FhirResult<&'a str> {
    value.ok_or_else(|| FhirError::required(path))
}

pub(crate) fn required_code<V: Vocabulary>(value: Option<&str>, path: &str) -> FhirResult<V> {
    V::parse(path, required(value, path)?)
}
