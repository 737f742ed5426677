//! FHIR-aligned practitioner wire model and translation.
//!
//! Responsibilities:
//! - Define the flat domain-level practitioner record
//! - Map NPI and licence numbers to `identifier` entries keyed by system
//! - Map qualification to `qualification[0].code.text`
//! - Carry specialisation and years of experience as extensions
//!
//! Only the name is required inbound; everything else is optional.

use crate::datatypes::{
    build_addresses, build_extension, build_human_name, build_identifier, build_telecom,
    concept_text, extension_path, extract_addresses, extract_telecom, find_identifier,
    format_date, parse_date, primary_contact, AddressWire, CodeableConceptWire, ContactPointWire,
    ExtensionValue, ExtensionWire, HumanNameWire, IdentifierWire, MetaWire, PersonName,
    PostalAddress, Telecom, typed_extension,
};
use crate::error::Problems;
use crate::patient::required_name;
use crate::reference::{DisplayNames, ResourceType};
use crate::resource::{build_meta, decode, encode, extract_meta, finish, FhirResource, RecordMeta};
use crate::vocabulary::{validate_optional, AdministrativeGender, ContactPointSystem, Vocabulary};
use crate::{FhirError, FhirResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier system for US National Provider Identifiers.
pub const NPI_SYSTEM: &str = "http://hl7.org/fhir/sid/us-npi";

/// Identifier system for hospital-issued practising licences.
pub const LICENSE_SYSTEM: &str = "http://hospital.example.org/practitioners/license";

pub const SPECIALIZATION_URL: &str =
    "http://hospital.example.org/fhir/StructureDefinition/practitioner-specialization";

pub const YEARS_OF_EXPERIENCE_URL: &str =
    "http://hospital.example.org/fhir/StructureDefinition/practitioner-years-of-experience";

// ============================================================================
// Public domain-level types
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PractitionerData {
    pub meta: RecordMeta,
    pub name: PersonName,
    pub gender: Option<AdministrativeGender>,
    pub birth_date: Option<NaiveDate>,
    pub active: bool,
    pub npi: Option<String>,
    pub license_number: Option<String>,
    pub qualification: Option<String>,
    pub specialization: Option<String>,
    pub years_of_experience: Option<u32>,
    pub addresses: Vec<PostalAddress>,
    pub telecom: Vec<Telecom>,
}

impl PractitionerData {
    pub fn phone(&self) -> Option<&str> {
        primary_contact(&self.telecom, ContactPointSystem::Phone)
    }

    pub fn email(&self) -> Option<&str> {
        primary_contact(&self.telecom, ContactPointSystem::Email)
    }
}

// ============================================================================
// Public Practitioner operations
// ============================================================================

/// Practitioner resource operations.
pub struct Practitioner;

impl FhirResource for Practitioner {
    type Record = PractitionerData;

    const RESOURCE_TYPE: ResourceType = ResourceType::Practitioner;

    fn to_fhir(record: &PractitionerData, _names: &dyn DisplayNames) -> FhirResult<Value> {
        encode(&domain_to_wire(record), Self::RESOURCE_TYPE)
    }

    fn from_fhir(document: &Value) -> FhirResult<PractitionerData> {
        let wire: PractitionerWire = decode(document, Self::RESOURCE_TYPE)?;
        finish(Self::RESOURCE_TYPE, wire_to_domain(wire))
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct PractitionerWire {
    resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<MetaWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    extension: Vec<ExtensionWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    identifier: Vec<IdentifierWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    active: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    name: Vec<HumanNameWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    telecom: Vec<ContactPointWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    address: Vec<AddressWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    gender: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    birth_date: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    qualification: Vec<QualificationWire>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct QualificationWire {
    code: CodeableConceptWire,
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn domain_to_wire(record: &PractitionerData) -> PractitionerWire {
    let mut extension = Vec::new();
    if let Some(specialization) = &record.specialization {
        extension.push(build_extension(
            SPECIALIZATION_URL,
            ExtensionValue::String(specialization.clone()),
        ));
    }
    if let Some(years) = record.years_of_experience {
        extension.push(build_extension(
            YEARS_OF_EXPERIENCE_URL,
            ExtensionValue::Integer(i64::from(years)),
        ));
    }

    let mut identifier = Vec::new();
    if let Some(npi) = &record.npi {
        identifier.push(build_identifier(NPI_SYSTEM, npi));
    }
    if let Some(license) = &record.license_number {
        identifier.push(build_identifier(LICENSE_SYSTEM, license));
    }

    PractitionerWire {
        resource_type: Practitioner::RESOURCE_TYPE.as_str().to_owned(),
        id: record.meta.id.as_ref().map(ToString::to_string),
        meta: build_meta(&record.meta),
        extension,
        identifier,
        active: Some(record.active),
        name: vec![build_human_name(&record.name)],
        telecom: build_telecom(&record.telecom),
        address: build_addresses(&record.addresses),
        gender: record.gender.map(|g| g.code().to_owned()),
        birth_date: record.birth_date.map(format_date),
        qualification: record
            .qualification
            .iter()
            .map(|text| QualificationWire {
                code: CodeableConceptWire {
                    coding: Vec::new(),
                    text: Some(text.clone()),
                },
            })
            .collect(),
    }
}

fn wire_to_domain(wire: PractitionerWire) -> FhirResult<PractitionerData> {
    let mut problems = Problems::default();

    let meta = problems.field(extract_meta(wire.id.as_deref(), wire.meta.as_ref()));
    let name = problems.field(required_name(&wire.name));
    let gender = problems.field(validate_optional(
        "gender",
        wire.gender.as_deref(),
    ));
    let birth_date = problems.field(
        wire.birth_date
            .as_deref()
            .map(|s| parse_date("birthDate", s))
            .transpose(),
    );
    let addresses = problems.field(extract_addresses(&wire.address, "address"));
    let telecom = problems.field(extract_telecom(&wire.telecom, "telecom"));

    let specialization = problems
        .field(typed_extension(
            &wire.extension,
            SPECIALIZATION_URL,
            "valueString",
            |value| match value {
                ExtensionValue::String(s) => Some(s),
                _ => None,
            },
        ))
        .flatten();
    let years_of_experience = problems
        .field(typed_extension(
            &wire.extension,
            YEARS_OF_EXPERIENCE_URL,
            "valueInteger",
            |value| match value {
                ExtensionValue::Integer(years) => Some(years),
                _ => None,
            },
        ))
        .flatten()
        .and_then(|years| match u32::try_from(years) {
            Ok(years) => Some(years),
            Err(_) => {
                problems.push(FhirError::format(
                    extension_path(&wire.extension, YEARS_OF_EXPERIENCE_URL),
                    format!("{years} is not a valid number of years"),
                ));
                None
            }
        });

    let license_number = find_identifier(&wire.identifier, LICENSE_SYSTEM).or_else(|| {
        wire.identifier
            .iter()
            .find(|i| {
                i.system
                    .as_deref()
                    .is_some_and(|s| s.to_ascii_lowercase().contains("license"))
            })
            .and_then(|i| i.value.clone())
    });

    match (meta, name, gender, birth_date, addresses, telecom) {
        (Some(meta), Some(name), Some(gender), Some(birth_date), Some(addresses), Some(telecom))
            if problems.is_empty() =>
        {
            Ok(PractitionerData {
                meta,
                name,
                gender,
                birth_date,
                active: wire.active.unwrap_or(true),
                npi: find_identifier(&wire.identifier, NPI_SYSTEM),
                license_number,
                qualification: wire.qualification.first().and_then(|q| concept_text(&q.code)),
                specialization,
                years_of_experience,
                addresses,
                telecom,
            })
        }
        _ => Err(problems.into_error()),
    }
}
