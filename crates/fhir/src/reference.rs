//! Resource references (`"<ResourceType>/<id>"`).
//!
//! References are weak: they name a related record but never own it. This module only
//! marshals strings. Whether the referenced record exists is checked by the persistence
//! side, and display names come from an injected [`DisplayNames`] lookup so the
//! translators stay decoupled from storage.

use crate::datatypes::ReferenceWire;
use crate::{FhirError, FhirResult};
use medrec_types::RecordId;
use std::fmt;
use std::str::FromStr;

/// Resource kinds this crate translates or points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    Patient,
    Practitioner,
    Appointment,
    MedicationRequest,
    Observation,
    Invoice,
    /// Reference target only (`MedicationRequest.medicationReference`).
    Medication,
    /// Reference target only (`Invoice.lineItem.chargeItemReference`).
    ChargeItem,
}

impl ResourceType {
    /// The kinds that have a translator and a REST endpoint.
    pub const TRANSLATED: [ResourceType; 6] = [
        ResourceType::Patient,
        ResourceType::Practitioner,
        ResourceType::Appointment,
        ResourceType::MedicationRequest,
        ResourceType::Observation,
        ResourceType::Invoice,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Patient => "Patient",
            ResourceType::Practitioner => "Practitioner",
            ResourceType::Appointment => "Appointment",
            ResourceType::MedicationRequest => "MedicationRequest",
            ResourceType::Observation => "Observation",
            ResourceType::Invoice => "Invoice",
            ResourceType::Medication => "Medication",
            ResourceType::ChargeItem => "ChargeItem",
        }
    }

    pub fn is_translated(self) -> bool {
        Self::TRANSLATED.contains(&self)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = FhirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Patient" => Ok(ResourceType::Patient),
            "Practitioner" => Ok(ResourceType::Practitioner),
            "Appointment" => Ok(ResourceType::Appointment),
            "MedicationRequest" => Ok(ResourceType::MedicationRequest),
            "Observation" => Ok(ResourceType::Observation),
            "Invoice" => Ok(ResourceType::Invoice),
            "Medication" => Ok(ResourceType::Medication),
            "ChargeItem" => Ok(ResourceType::ChargeItem),
            other => Err(FhirError::Validation {
                field: "resourceType".into(),
                value: other.into(),
                allowed: &[
                    "Patient",
                    "Practitioner",
                    "Appointment",
                    "MedicationRequest",
                    "Observation",
                    "Invoice",
                    "Medication",
                    "ChargeItem",
                ],
            }),
        }
    }
}

/// Display-name lookup used when building outbound references.
pub trait DisplayNames {
    fn display_name(&self, resource_type: ResourceType, id: &RecordId) -> Option<String>;
}

/// A lookup that never provides display names.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDisplayNames;

impl DisplayNames for NoDisplayNames {
    fn display_name(&self, _resource_type: ResourceType, _id: &RecordId) -> Option<String> {
        None
    }
}

impl<F> DisplayNames for F
where
    F: Fn(ResourceType, &RecordId) -> Option<String>,
{
    fn display_name(&self, resource_type: ResourceType, id: &RecordId) -> Option<String> {
        self(resource_type, id)
    }
}

/// A reference string split into its two segments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedReference {
    pub resource_type: String,
    pub id: String,
}

/// Builds an outbound reference, asking `names` for the display text.
pub fn make_reference(
    resource_type: ResourceType,
    id: &RecordId,
    names: &dyn DisplayNames,
) -> ReferenceWire {
    ReferenceWire {
        reference: Some(format!("{resource_type}/{id}")),
        display: names.display_name(resource_type, id),
    }
}

/// Splits `"<Type>/<id>"`.
///
/// # Errors
///
/// Returns [`FhirError::MalformedReference`] unless the string has a non-empty type, a
/// non-empty id and exactly one `/` separator.
pub fn parse_reference(reference: &str) -> FhirResult<ParsedReference> {
    parse_reference_at(reference, "reference")
}

pub(crate) fn parse_reference_at(reference: &str, path: &str) -> FhirResult<ParsedReference> {
    let malformed = || FhirError::MalformedReference {
        path: path.to_owned(),
        reference: reference.to_owned(),
    };

    let (resource_type, id) = reference.split_once('/').ok_or_else(malformed)?;
    if resource_type.is_empty() || id.is_empty() || id.contains('/') {
        return Err(malformed());
    }

    Ok(ParsedReference {
        resource_type: resource_type.to_owned(),
        id: id.to_owned(),
    })
}

/// Parses a reference that must point at `expected`, returning the target id.
pub fn parse_typed_reference(
    reference: &str,
    expected: ResourceType,
    path: &str,
) -> FhirResult<RecordId> {
    let parsed = parse_reference_at(reference, path)?;
    if parsed.resource_type != expected.as_str() {
        return Err(FhirError::TypeMismatch {
            expected: expected.as_str().to_owned(),
            found: parsed.resource_type,
        });
    }
    RecordId::new(&parsed.id).map_err(|_| FhirError::MalformedReference {
        path: path.to_owned(),
        reference: reference.to_owned(),
    })
}

/// Reads the target id of a required reference element.
pub(crate) fn required_reference(
    wire: Option<&ReferenceWire>,
    expected: ResourceType,
    path: &str,
) -> FhirResult<RecordId> {
    let reference_path = format!("{path}.reference");
    let reference = wire
        .and_then(|r| r.reference.as_deref())
        .ok_or_else(|| FhirError::required(&reference_path))?;
    parse_typed_reference(reference, expected, &reference_path)
}
