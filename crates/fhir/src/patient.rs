//! FHIR-aligned patient wire model and translation.
//!
//! Responsibilities:
//! - Define the flat domain-level patient record
//! - Define a strict wire model for serialisation/deserialisation
//! - Translate between the two, enforcing required fields and vocabularies
//!
//! Notes:
//! - The record keeps a single preferred name, written and read at `name[0]`
//! - Addresses and contact points keep their order; index 0 is the primary entry
//! - `active` defaults to `true` when an inbound document omits it

use crate::datatypes::{
    build_addresses, build_human_name, build_telecom, extract_addresses, extract_human_name,
    extract_telecom, format_date, parse_date, primary_contact, AddressWire, ContactPointWire,
    HumanNameWire, MetaWire, PersonName, PostalAddress, Telecom,
};
use crate::error::Problems;
use crate::reference::{DisplayNames, ResourceType};
use crate::resource::{
    build_meta, decode, encode, extract_meta, finish, required, required_code, FhirResource,
    RecordMeta,
};
use crate::vocabulary::{AdministrativeGender, ContactPointSystem, Vocabulary};
use crate::{FhirError, FhirResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Public domain-level types
// ============================================================================

/// Domain-level carrier for patient data (flat structure).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientData {
    pub meta: RecordMeta,
    pub name: PersonName,
    pub gender: AdministrativeGender,
    pub birth_date: NaiveDate,
    pub active: bool,
    pub addresses: Vec<PostalAddress>,
    pub telecom: Vec<Telecom>,
}

impl PatientData {
    pub fn primary_address(&self) -> Option<&PostalAddress> {
        self.addresses.first()
    }

    pub fn phone(&self) -> Option<&str> {
        primary_contact(&self.telecom, ContactPointSystem::Phone)
    }

    pub fn email(&self) -> Option<&str> {
        primary_contact(&self.telecom, ContactPointSystem::Email)
    }
}

// ============================================================================
// Public Patient operations
// ============================================================================

/// Patient resource operations.
///
/// This is a zero-sized type used for namespacing patient-related operations.
pub struct Patient;

impl FhirResource for Patient {
    type Record = PatientData;

    const RESOURCE_TYPE: ResourceType = ResourceType::Patient;

    fn to_fhir(record: &PatientData, _names: &dyn DisplayNames) -> FhirResult<Value> {
        encode(&domain_to_wire(record), Self::RESOURCE_TYPE)
    }

    fn from_fhir(document: &Value) -> FhirResult<PatientData> {
        let wire: PatientWire = decode(document, Self::RESOURCE_TYPE)?;
        finish(Self::RESOURCE_TYPE, wire_to_domain(wire))
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct PatientWire {
    resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<MetaWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    active: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    name: Vec<HumanNameWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    telecom: Vec<ContactPointWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    gender: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    birth_date: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    address: Vec<AddressWire>,
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn domain_to_wire(record: &PatientData) -> PatientWire {
    PatientWire {
        resource_type: Patient::RESOURCE_TYPE.as_str().to_owned(),
        id: record.meta.id.as_ref().map(ToString::to_string),
        meta: build_meta(&record.meta),
        active: Some(record.active),
        name: vec![build_human_name(&record.name)],
        telecom: build_telecom(&record.telecom),
        gender: Some(record.gender.code().to_owned()),
        birth_date: Some(format_date(record.birth_date)),
        address: build_addresses(&record.addresses),
    }
}

fn wire_to_domain(wire: PatientWire) -> FhirResult<PatientData> {
    let mut problems = Problems::default();

    let meta = problems.field(extract_meta(wire.id.as_deref(), wire.meta.as_ref()));
    let name = problems.field(required_name(&wire.name));
    let gender = problems.field(required_code(wire.gender.as_deref(), "gender"));
    let birth_date = problems.field(
        required(wire.birth_date.as_deref(), "birthDate").and_then(|s| parse_date("birthDate", s)),
    );
    let addresses = problems.field(extract_addresses(&wire.address, "address"));
    let telecom = problems.field(extract_telecom(&wire.telecom, "telecom"));

    match (meta, name, gender, birth_date, addresses, telecom) {
        (Some(meta), Some(name), Some(gender), Some(birth_date), Some(addresses), Some(telecom)) => {
            Ok(PatientData {
                meta,
                name,
                gender,
                birth_date,
                active: wire.active.unwrap_or(true),
                addresses,
                telecom,
            })
        }
        _ => Err(problems.into_error()),
    }
}

pub(crate) fn required_name(names: &[HumanNameWire]) -> FhirResult<PersonName> {
    if names.is_empty() {
        return Err(FhirError::required("name"));
    }
    extract_human_name(names, "name")?.into_person_name("name")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::NoDisplayNames;
    use crate::vocabulary::{AddressUse, ContactPointUse, NameUse};
    use medrec_types::RecordId;
    use serde_json::json;

    fn john_doe() -> PatientData {
        PatientData {
            meta: RecordMeta::default(),
            name: PersonName {
                name_use: NameUse::Official,
                family: "Doe".into(),
                given: vec!["John".into(), "Michael".into()],
                prefix: Vec::new(),
            },
            gender: AdministrativeGender::Male,
            birth_date: NaiveDate::from_ymd_opt(1990, 1, 1).expect("valid date"),
            active: true,
            addresses: Vec::new(),
            telecom: Vec::new(),
        }
    }

    #[test]
    fn john_doe_round_trip() {
        let record = john_doe();
        let document = Patient::to_fhir(&record, &NoDisplayNames).expect("to_fhir");

        assert_eq!(
            document,
            json!({
                "resourceType": "Patient",
                "active": true,
                "name": [{ "use": "official", "family": "Doe", "given": ["John", "Michael"] }],
                "gender": "male",
                "birthDate": "1990-01-01"
            })
        );

        let parsed = Patient::from_fhir(&document).expect("from_fhir");
        assert_eq!(parsed, record);
    }

    #[test]
    fn full_record_round_trips() {
        let mut record = john_doe();
        record.meta = RecordMeta {
            id: Some(RecordId::new("550e8400-e29b-41d4-a716-446655440000").expect("valid id")),
            created_at: None,
            updated_at: Some(
                crate::datatypes::parse_instant("t", "2024-01-01T09:00:00Z").expect("valid"),
            ),
        };
        record.active = false;
        record.addresses = vec![PostalAddress {
            address_use: Some(AddressUse::Home),
            lines: vec!["1 Main Street".into(), "Flat 2".into()],
            city: Some("Springfield".into()),
            postal_code: Some("12345".into()),
            country: Some("US".into()),
            ..PostalAddress::default()
        }];
        record.telecom = vec![Telecom {
            system: ContactPointSystem::Email,
            value: "john@example.org".into(),
            contact_use: Some(ContactPointUse::Home),
        }];

        let document = Patient::to_fhir(&record, &NoDisplayNames).expect("to_fhir");
        assert_eq!(document["id"], "550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(document["meta"]["lastUpdated"], "2024-01-01T09:00:00Z");
        assert_eq!(Patient::from_fhir(&document).expect("from_fhir"), record);
        assert_eq!(record.email(), Some("john@example.org"));
        assert_eq!(record.phone(), None);
    }

    #[test]
    fn active_defaults_to_true_and_use_to_official() {
        let document = json!({
            "resourceType": "Patient",
            "name": [{ "family": "Roe", "given": ["Jane"] }],
            "gender": "female",
            "birthDate": "1985-06-15"
        });
        let parsed = Patient::from_fhir(&document).expect("valid");
        assert!(parsed.active);
        assert_eq!(parsed.name.name_use, NameUse::Official);
    }

    #[test]
    fn document_from_another_server_keeps_last_updated_only() {
        let document = json!({
            "resourceType": "Patient",
            "id": "p1",
            "meta": {
                "versionId": "7",
                "lastUpdated": "2024-02-03T04:05:06Z",
                "profile": ["http://hl7.org/fhir/us/core/StructureDefinition/us-core-patient"]
            },
            "name": [{ "family": "Roe", "given": ["Jane"], "prefix": ["Dr.", "Prof."] }],
            "gender": "female",
            "birthDate": "1985-06-15"
        });
        let parsed = Patient::from_fhir(&document).expect("standard meta keys are accepted");
        assert_eq!(parsed.name.prefix, vec!["Dr.".to_string(), "Prof.".to_string()]);

        let back = Patient::to_fhir(&parsed, &NoDisplayNames).expect("to_fhir");
        assert_eq!(back["meta"], json!({ "lastUpdated": "2024-02-03T04:05:06Z" }));
        assert_eq!(back["name"][0]["prefix"], json!(["Dr.", "Prof."]));
    }

    #[test]
    fn wrong_resource_type_is_rejected_before_schema() {
        let document = json!({ "resourceType": "Practitioner", "qualification": [] });
        let err = Patient::from_fhir(&document).expect_err("wrong type");
        assert!(matches!(err, FhirError::TypeMismatch { .. }));
    }

    #[test]
    fn unknown_field_is_schema_error_with_path() {
        let document = json!({
            "resourceType": "Patient",
            "name": [{ "family": "Doe", "given": ["John"], "nickname": "JD" }],
            "gender": "male",
            "birthDate": "1990-01-01"
        });
        match Patient::from_fhir(&document) {
            Err(FhirError::Schema { path, .. }) => assert!(path.starts_with("name[0]"), "{path}"),
            other => panic!("expected Schema, got {other:?}"),
        }
    }

    #[test]
    fn every_problem_is_reported() {
        let document = json!({
            "resourceType": "Patient",
            "gender": "robot",
            "birthDate": "01/01/1990",
            "telecom": [{ "system": "pigeon", "value": "coo" }]
        });
        let err = Patient::from_fhir(&document).expect_err("invalid");
        let problems = err.problems();
        assert_eq!(problems.len(), 4, "{problems:?}");
        assert!(problems.contains(&&FhirError::required("name")));
        assert!(problems
            .iter()
            .any(|p| matches!(p, FhirError::Validation { field, .. } if field == "gender")));
        assert!(problems
            .iter()
            .any(|p| matches!(p, FhirError::InvalidFormat { path, .. } if path == "birthDate")));
        assert!(problems
            .iter()
            .any(|p| matches!(p, FhirError::Validation { field, .. } if field == "telecom[0].system")));
    }

    #[test]
    fn name_without_given_is_required_field() {
        let document = json!({
            "resourceType": "Patient",
            "name": [{ "family": "Doe" }],
            "gender": "male",
            "birthDate": "1990-01-01"
        });
        let err = Patient::from_fhir(&document).expect_err("no given");
        assert_eq!(err, FhirError::required("name[0].given"));
    }
}
