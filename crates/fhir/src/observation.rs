//! FHIR-aligned clinical record (Observation) wire model and translation.
//!
//! Clinical records (conditions, observations, allergies, procedures, family history) are
//! all exchanged as Observations. The record type travels as a coding in `category[0]`.
//!
//! Responsibilities:
//! - Define the flat domain-level clinical record
//! - Translate the `value[x]` choice into a tagged [`ObservationValue`]
//! - Translate `effective[x]` into a [`DateSpan`]
//! - Carry clinical status, severity and description as extensions; the record title is
//!   `code.text` and the recording time is `issued`

use crate::datatypes::{
    build_annotations, build_concept, build_extension, build_period, build_quantity,
    build_text_concepts, choose_variant, coded_extension, concept_text, extract_annotations,
    extract_concept, extract_period, extract_quantity, format_instant, parse_date,
    parse_instant, typed_extension, Amount, AnnotationWire, CodeableConceptWire, CodingWire,
    Concept, DateSpan, ExtensionValue, ExtensionWire, MetaWire, PeriodWire, QuantityWire,
    ReferenceWire,
};
use crate::error::Problems;
use crate::reference::{make_reference, required_reference, DisplayNames, ResourceType};
use crate::resource::{
    build_meta, decode, encode, extract_meta, finish, required_code, FhirResource, RecordMeta,
};
use crate::vocabulary::{ClinicalRecordType, ClinicalStatus, ObservationStatus, Severity, Vocabulary};
use crate::{FhirError, FhirResult};
use chrono::{DateTime, Utc};
use medrec_types::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Code system for the record type carried in `category`.
pub const RECORD_TYPE_SYSTEM: &str =
    "http://hospital.example.org/fhir/CodeSystem/clinical-record-type";

pub const CLINICAL_STATUS_URL: &str =
    "http://hospital.example.org/fhir/StructureDefinition/clinical-status";

pub const SEVERITY_URL: &str = "http://hospital.example.org/fhir/StructureDefinition/clinical-severity";

pub const DESCRIPTION_URL: &str =
    "http://hospital.example.org/fhir/StructureDefinition/clinical-description";

// ============================================================================
// Public domain-level types
// ============================================================================

/// The observed value (`value[x]`).
#[derive(Clone, Debug, PartialEq)]
pub enum ObservationValue {
    Quantity(Amount),
    CodeableConcept(Concept),
    String(String),
    Boolean(bool),
    Integer(i64),
}

/// Domain-level carrier for clinical record data (flat structure).
#[derive(Clone, Debug, PartialEq)]
pub struct ClinicalRecordData {
    pub meta: RecordMeta,
    pub status: ObservationStatus,
    pub record_type: ClinicalRecordType,
    pub clinical_status: Option<ClinicalStatus>,
    pub severity: Option<Severity>,
    /// Free-text category shown alongside the record type.
    pub category: Option<String>,
    /// What was recorded. `code.text` is the record title.
    pub code: Concept,
    pub description: Option<String>,
    pub patient: RecordId,
    pub recorded_by: Option<RecordId>,
    pub recorded_at: Option<DateTime<Utc>>,
    pub value: Option<ObservationValue>,
    /// Onset and resolution dates.
    pub effective: DateSpan,
    pub body_site: Option<String>,
    pub notes: Vec<String>,
}

impl ClinicalRecordData {
    /// Title of the record: the code text, or the display of its first coding.
    pub fn title(&self) -> Option<&str> {
        self.code
            .text
            .as_deref()
            .or_else(|| self.code.codings.first().and_then(|c| c.display.as_deref()))
    }

    /// Whether the condition is active, recurring or relapsing.
    pub fn is_active(&self) -> bool {
        self.clinical_status.is_some_and(ClinicalStatus::is_active)
    }
}

// ============================================================================
// Public Observation operations
// ============================================================================

/// Observation resource operations.
pub struct Observation;

impl FhirResource for Observation {
    type Record = ClinicalRecordData;

    const RESOURCE_TYPE: ResourceType = ResourceType::Observation;

    fn to_fhir(record: &ClinicalRecordData, names: &dyn DisplayNames) -> FhirResult<Value> {
        encode(&domain_to_wire(record, names), Self::RESOURCE_TYPE)
    }

    fn from_fhir(document: &Value) -> FhirResult<ClinicalRecordData> {
        let wire: ObservationWire = decode(document, Self::RESOURCE_TYPE)?;
        finish(Self::RESOURCE_TYPE, wire_to_domain(wire))
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct ObservationWire {
    resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<MetaWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    extension: Vec<ExtensionWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    category: Vec<CodeableConceptWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<CodeableConceptWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<ReferenceWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    effective_period: Option<PeriodWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    effective_date_time: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    issued: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    performer: Vec<ReferenceWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    value_quantity: Option<QuantityWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    value_codeable_concept: Option<CodeableConceptWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    value_string: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    value_boolean: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    value_integer: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    note: Vec<AnnotationWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    body_site: Option<CodeableConceptWire>,
}

/// Borrowed view of the populated `value[x]` variant.
enum ValueChoice<'a> {
    Quantity(&'a QuantityWire),
    CodeableConcept(&'a CodeableConceptWire),
    String(&'a str),
    Boolean(bool),
    Integer(i64),
}

enum EffectiveChoice<'a> {
    Period(&'a PeriodWire),
    DateTime(&'a str),
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn domain_to_wire(record: &ClinicalRecordData, names: &dyn DisplayNames) -> ObservationWire {
    let mut extension = Vec::new();
    if let Some(status) = record.clinical_status {
        extension.push(build_extension(
            CLINICAL_STATUS_URL,
            ExtensionValue::Code(status.code().to_owned()),
        ));
    }
    if let Some(severity) = record.severity {
        extension.push(build_extension(
            SEVERITY_URL,
            ExtensionValue::Code(severity.code().to_owned()),
        ));
    }
    if let Some(description) = &record.description {
        extension.push(build_extension(
            DESCRIPTION_URL,
            ExtensionValue::String(description.clone()),
        ));
    }

    let mut wire = ObservationWire {
        resource_type: Observation::RESOURCE_TYPE.as_str().to_owned(),
        id: record.meta.id.as_ref().map(ToString::to_string),
        meta: build_meta(&record.meta),
        extension,
        status: Some(record.status.code().to_owned()),
        category: vec![CodeableConceptWire {
            coding: vec![CodingWire {
                system: Some(RECORD_TYPE_SYSTEM.to_owned()),
                code: Some(record.record_type.code().to_owned()),
                display: None,
            }],
            text: record.category.clone(),
        }],
        code: Some(build_concept(&record.code)),
        subject: Some(make_reference(ResourceType::Patient, &record.patient, names)),
        effective_period: build_period(&record.effective),
        effective_date_time: None,
        issued: record.recorded_at.map(format_instant),
        performer: record
            .recorded_by
            .iter()
            .map(|id| make_reference(ResourceType::Practitioner, id, names))
            .collect(),
        value_quantity: None,
        value_codeable_concept: None,
        value_string: None,
        value_boolean: None,
        value_integer: None,
        note: build_annotations(&record.notes),
        body_site: build_text_concepts(record.body_site.as_deref()).into_iter().next(),
    };

    match &record.value {
        Some(ObservationValue::Quantity(q)) => wire.value_quantity = Some(build_quantity(q)),
        Some(ObservationValue::CodeableConcept(c)) => {
            wire.value_codeable_concept = Some(build_concept(c))
        }
        Some(ObservationValue::String(s)) => wire.value_string = Some(s.clone()),
        Some(ObservationValue::Boolean(b)) => wire.value_boolean = Some(*b),
        Some(ObservationValue::Integer(i)) => wire.value_integer = Some(*i),
        None => {}
    }

    wire
}

fn wire_to_domain(wire: ObservationWire) -> FhirResult<ClinicalRecordData> {
    let mut problems = Problems::default();

    let meta = problems.field(extract_meta(wire.id.as_deref(), wire.meta.as_ref()));
    let status = problems.field(required_code(wire.status.as_deref(), "status"));
    let record_type = problems.field(extract_record_type(&wire.category));
    let code = wire.code.as_ref().map(extract_concept);
    if code.is_none() {
        problems.push(FhirError::required("code"));
    }
    let patient = problems.field(required_reference(
        wire.subject.as_ref(),
        ResourceType::Patient,
        "subject",
    ));
    let recorded_by = match wire.performer.first() {
        Some(performer) => problems
            .field(required_reference(
                Some(performer),
                ResourceType::Practitioner,
                "performer[0]",
            ))
            .map(Some),
        None => Some(None),
    };
    let value = problems.field(extract_value(&wire));
    let effective = problems.field(extract_effective(&wire));
    let recorded_at = problems.field(
        wire.issued
            .as_deref()
            .map(|s| parse_instant("issued", s))
            .transpose(),
    );
    let clinical_status =
        problems.field(coded_extension::<ClinicalStatus>(&wire.extension, CLINICAL_STATUS_URL));
    let severity = problems.field(coded_extension::<Severity>(&wire.extension, SEVERITY_URL));
    let description = problems.field(typed_extension(
        &wire.extension,
        DESCRIPTION_URL,
        "valueString",
        |value| match value {
            ExtensionValue::String(s) => Some(s),
            _ => None,
        },
    ));

    match (
        (meta, status, record_type, code, patient, recorded_by),
        (value, effective, recorded_at, clinical_status, severity, description),
    ) {
        (
            (
                Some(meta),
                Some(status),
                Some(record_type),
                Some(code),
                Some(patient),
                Some(recorded_by),
            ),
            (
                Some(value),
                Some(effective),
                Some(recorded_at),
                Some(clinical_status),
                Some(severity),
                Some(description),
            ),
        ) if problems.is_empty() => Ok(ClinicalRecordData {
            meta,
            status,
            record_type,
            clinical_status,
            severity,
            category: wire.category.first().and_then(|c| c.text.clone()),
            code,
            description,
            patient,
            recorded_by,
            recorded_at,
            value,
            effective,
            body_site: wire.body_site.as_ref().and_then(concept_text),
            notes: extract_annotations(&wire.note),
        }),
        _ => Err(problems.into_error()),
    }
}

/// Reads the record type from `category[0]`. A category without the record-type coding
/// is a plain observation.
fn extract_record_type(category: &[CodeableConceptWire]) -> FhirResult<ClinicalRecordType> {
    let coding = category.first().and_then(|c| {
        c.coding
            .iter()
            .position(|coding| coding.system.as_deref() == Some(RECORD_TYPE_SYSTEM))
            .map(|i| (i, &c.coding[i]))
    });

    match coding {
        None => Ok(ClinicalRecordType::Observation),
        Some((i, coding)) => {
            let path = format!("category[0].coding[{i}].code");
            match coding.code.as_deref() {
                Some(code) => ClinicalRecordType::parse(&path, code),
                None => Err(FhirError::required(path)),
            }
        }
    }
}

fn extract_value(wire: &ObservationWire) -> FhirResult<Option<ObservationValue>> {
    let choice = choose_variant(
        "value[x]",
        vec![
            ("valueQuantity", wire.value_quantity.as_ref().map(ValueChoice::Quantity)),
            (
                "valueCodeableConcept",
                wire.value_codeable_concept.as_ref().map(ValueChoice::CodeableConcept),
            ),
            ("valueString", wire.value_string.as_deref().map(ValueChoice::String)),
            ("valueBoolean", wire.value_boolean.map(ValueChoice::Boolean)),
            ("valueInteger", wire.value_integer.map(ValueChoice::Integer)),
        ],
    )?;

    Ok(match choice {
        None => None,
        Some(ValueChoice::Quantity(q)) => {
            Some(ObservationValue::Quantity(extract_quantity(q, "valueQuantity")?))
        }
        Some(ValueChoice::CodeableConcept(c)) => {
            Some(ObservationValue::CodeableConcept(extract_concept(c)))
        }
        Some(ValueChoice::String(s)) => Some(ObservationValue::String(s.to_owned())),
        Some(ValueChoice::Boolean(b)) => Some(ObservationValue::Boolean(b)),
        Some(ValueChoice::Integer(i)) => Some(ObservationValue::Integer(i)),
    })
}

fn extract_effective(wire: &ObservationWire) -> FhirResult<DateSpan> {
    let choice = choose_variant(
        "effective[x]",
        vec![
            ("effectivePeriod", wire.effective_period.as_ref().map(EffectiveChoice::Period)),
            (
                "effectiveDateTime",
                wire.effective_date_time.as_deref().map(EffectiveChoice::DateTime),
            ),
        ],
    )?;

    match choice {
        None => Ok(DateSpan::default()),
        Some(EffectiveChoice::Period(period)) => extract_period(Some(period), "effectivePeriod"),
        Some(EffectiveChoice::DateTime(value)) => Ok(DateSpan {
            start: Some(parse_date("effectiveDateTime", value)?),
            end: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::Coding;
    use crate::reference::NoDisplayNames;
    use chrono::NaiveDate;
    use serde_json::json;

    fn id(s: &str) -> RecordId {
        RecordId::new(s).expect("valid id")
    }

    fn blood_pressure() -> ClinicalRecordData {
        ClinicalRecordData {
            meta: RecordMeta::with_id(id("o1")),
            status: ObservationStatus::Final,
            record_type: ClinicalRecordType::Observation,
            clinical_status: None,
            severity: None,
            category: Some("Vital signs".into()),
            code: Concept::coded("http://loinc.org", "8480-6", Some("Systolic blood pressure".into())),
            description: None,
            patient: id("p1"),
            recorded_by: Some(id("pr1")),
            recorded_at: None,
            value: Some(ObservationValue::Quantity(Amount {
                value: 120.0,
                unit: Some("mmHg".into()),
                system: Some("http://unitsofmeasure.org".into()),
                code: Some("mm[Hg]".into()),
            })),
            effective: DateSpan {
                start: NaiveDate::from_ymd_opt(2024, 4, 2),
                end: None,
            },
            body_site: Some("Left arm".into()),
            notes: vec!["Seated, after 5 minutes rest".into()],
        }
    }

    #[test]
    fn quantity_observation_round_trips() {
        let record = blood_pressure();
        let document = Observation::to_fhir(&record, &NoDisplayNames).expect("to_fhir");

        assert_eq!(document["category"][0]["coding"][0]["code"], "observation");
        assert_eq!(document["valueQuantity"]["value"], 120.0);
        assert!(document.get("valueString").is_none());
        assert_eq!(document["effectivePeriod"], json!({ "start": "2024-04-02" }));

        assert_eq!(Observation::from_fhir(&document).expect("from_fhir"), record);
    }

    #[test]
    fn every_value_variant_round_trips() {
        let values = [
            ObservationValue::CodeableConcept(Concept::text("Positive")),
            ObservationValue::String("Penicillin: hives".into()),
            ObservationValue::Boolean(true),
            ObservationValue::Integer(3),
        ];
        for value in values {
            let mut record = blood_pressure();
            record.record_type = ClinicalRecordType::Allergy;
            record.value = Some(value);
            let document = Observation::to_fhir(&record, &NoDisplayNames).expect("to_fhir");
            assert_eq!(Observation::from_fhir(&document).expect("from_fhir"), record);
        }
    }

    #[test]
    fn condition_details_round_trip() {
        let mut record = blood_pressure();
        record.record_type = ClinicalRecordType::Condition;
        record.clinical_status = Some(ClinicalStatus::Relapse);
        record.severity = Some(Severity::LifeThreatening);
        record.code = Concept {
            codings: vec![Coding {
                system: Some("http://hl7.org/fhir/sid/icd-10".into()),
                code: Some("J45".into()),
                display: None,
            }],
            text: Some("Asthma".into()),
        };
        record.description = Some("Exercise-induced, worse in winter".into());
        record.recorded_at = Some(parse_instant("t", "2024-04-02T10:15:00Z").expect("valid"));
        record.value = None;

        let document = Observation::to_fhir(&record, &NoDisplayNames).expect("to_fhir");
        assert_eq!(
            document["extension"],
            json!([
                { "url": CLINICAL_STATUS_URL, "valueCode": "relapse" },
                { "url": SEVERITY_URL, "valueCode": "life-threatening" },
                { "url": DESCRIPTION_URL, "valueString": "Exercise-induced, worse in winter" }
            ])
        );
        assert_eq!(document["issued"], "2024-04-02T10:15:00Z");

        let parsed = Observation::from_fhir(&document).expect("from_fhir");
        assert_eq!(parsed, record);
        assert_eq!(parsed.title(), Some("Asthma"));
        assert!(parsed.is_active());
    }

    #[test]
    fn severity_outside_vocabulary_is_rejected() {
        let document = json!({
            "resourceType": "Observation",
            "extension": [
                { "url": DESCRIPTION_URL, "valueString": "Peanut allergy" },
                { "url": SEVERITY_URL, "valueCode": "catastrophic" }
            ],
            "status": "final",
            "code": { "text": "Peanut" },
            "subject": { "reference": "Patient/p1" },
            "issued": "yesterday"
        });
        let err = Observation::from_fhir(&document).expect_err("invalid");
        let problems = err.problems();
        assert_eq!(problems.len(), 2, "{problems:?}");
        assert!(problems.iter().any(|p| matches!(
            p,
            FhirError::Validation { field, value, .. }
                if field == "extension[1].valueCode" && value == "catastrophic"
        )));
        assert!(problems
            .iter()
            .any(|p| matches!(p, FhirError::InvalidFormat { path, .. } if path == "issued")));
    }

    #[test]
    fn resolved_condition_is_not_active() {
        let mut record = blood_pressure();
        assert!(!record.is_active());
        record.clinical_status = Some(ClinicalStatus::Resolved);
        assert!(!record.is_active());
        assert_eq!(record.title(), Some("Systolic blood pressure"));
    }

    #[test]
    fn ambiguous_value_is_rejected() {
        let document = json!({
            "resourceType": "Observation",
            "status": "final",
            "code": { "text": "Smoking status" },
            "subject": { "reference": "Patient/p1" },
            "valueString": "never",
            "valueQuantity": { "value": 0, "unit": "packs" }
        });
        match Observation::from_fhir(&document) {
            Err(FhirError::MultipleValueVariants { field, variants }) => {
                assert_eq!(field, "value[x]");
                assert_eq!(variants, vec!["valueQuantity", "valueString"]);
            }
            other => panic!("expected MultipleValueVariants, got {other:?}"),
        }
    }

    #[test]
    fn category_without_record_type_is_an_observation() {
        let document = json!({
            "resourceType": "Observation",
            "status": "preliminary",
            "category": [{ "text": "Lab" }],
            "code": { "text": "Glucose" },
            "subject": { "reference": "Patient/p1" },
            "effectiveDateTime": "2024-04-02T08:00:00Z"
        });
        let parsed = Observation::from_fhir(&document).expect("valid");
        assert_eq!(parsed.record_type, ClinicalRecordType::Observation);
        assert_eq!(parsed.category.as_deref(), Some("Lab"));
        assert_eq!(parsed.effective.start, NaiveDate::from_ymd_opt(2024, 4, 2));
        assert_eq!(parsed.value, None);
    }

    #[test]
    fn unknown_record_type_is_validation_error() {
        let document = json!({
            "resourceType": "Observation",
            "status": "final",
            "category": [{ "coding": [{ "system": RECORD_TYPE_SYSTEM, "code": "diagnosis" }] }],
            "code": { "text": "Asthma" },
            "subject": { "reference": "Patient/p1" }
        });
        match Observation::from_fhir(&document) {
            Err(FhirError::Validation { field, value, .. }) => {
                assert_eq!(field, "category[0].coding[0].code");
                assert_eq!(value, "diagnosis");
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn missing_code_and_bad_performer_are_reported() {
        let document = json!({
            "resourceType": "Observation",
            "status": "final",
            "subject": { "reference": "Patient/p1" },
            "performer": [{ "reference": "Patient/p1" }]
        });
        let err = Observation::from_fhir(&document).expect_err("invalid");
        let problems = err.problems();
        assert_eq!(problems.len(), 2);
        assert!(problems.contains(&&FhirError::required("code")));
        assert!(problems
            .iter()
            .any(|p| matches!(p, FhirError::TypeMismatch { found, .. } if found == "Patient")));
    }
}
