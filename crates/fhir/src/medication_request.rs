//! FHIR-aligned prescription (MedicationRequest) wire model and translation.
//!
//! Responsibilities:
//! - Define the flat domain-level prescription record
//! - Translate the `medication[x]` choice into a tagged [`Medication`] value
//! - Map dosage to `dosageInstruction[0]` and dispensing to `dispenseRequest`
//!
//! Notes:
//! - Only the first dosage instruction is read; outbound at most one is written
//! - `expectedSupplyDuration` is always expressed in days

use crate::datatypes::{
    build_annotations, build_concept, build_period, build_quantity, build_text_concepts,
    choose_variant, concept_text, extract_annotations, extract_concept, extract_period,
    extract_quantity, extract_text, format_instant, parse_instant, Amount, AnnotationWire,
    CodeableConceptWire, Concept, DateSpan, MetaWire, PeriodWire, QuantityWire, ReferenceWire,
};
use crate::error::Problems;
use crate::reference::{make_reference, required_reference, DisplayNames, ResourceType};
use crate::resource::{
    build_meta, decode, encode, extract_meta, finish, required_code, FhirResource, RecordMeta,
};
use crate::vocabulary::{
    validate_optional, MedicationRequestIntent, MedicationRequestStatus, RequestPriority,
    Vocabulary,
};
use crate::{FhirError, FhirResult};
use chrono::{DateTime, Utc};
use medrec_types::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const UCUM_SYSTEM: &str = "http://unitsofmeasure.org";

// ============================================================================
// Public domain-level types
// ============================================================================

/// The prescribed medication (`medication[x]`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Medication {
    /// An inline coded medication (`medicationCodeableConcept`).
    Coded(Concept),
    /// A separately stored Medication resource (`medicationReference`).
    Reference(RecordId),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dosage {
    pub text: Option<String>,
    pub route: Option<String>,
    /// Free-text timing, e.g. "twice daily".
    pub frequency: Option<String>,
    pub dose: Option<Amount>,
}

impl Dosage {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.route.is_none() && self.frequency.is_none() && self.dose.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dispense {
    pub quantity: Option<Amount>,
    pub refills: Option<u32>,
    pub supply_days: Option<u32>,
    pub validity: DateSpan,
}

impl Dispense {
    pub fn is_empty(&self) -> bool {
        self.quantity.is_none()
            && self.refills.is_none()
            && self.supply_days.is_none()
            && self.validity.is_empty()
    }
}

/// Domain-level carrier for prescription data (flat structure).
#[derive(Clone, Debug, PartialEq)]
pub struct PrescriptionData {
    pub meta: RecordMeta,
    pub status: MedicationRequestStatus,
    pub intent: MedicationRequestIntent,
    pub priority: Option<RequestPriority>,
    pub medication: Medication,
    pub patient: RecordId,
    pub prescriber: Option<RecordId>,
    pub authored_on: Option<DateTime<Utc>>,
    pub dosage: Dosage,
    pub dispense: Dispense,
    pub reason: Option<String>,
    pub notes: Vec<String>,
}

// ============================================================================
// Public MedicationRequest operations
// ============================================================================

/// MedicationRequest resource operations.
pub struct MedicationRequest;

impl FhirResource for MedicationRequest {
    type Record = PrescriptionData;

    const RESOURCE_TYPE: ResourceType = ResourceType::MedicationRequest;

    fn to_fhir(record: &PrescriptionData, names: &dyn DisplayNames) -> FhirResult<Value> {
        encode(&domain_to_wire(record, names), Self::RESOURCE_TYPE)
    }

    fn from_fhir(document: &Value) -> FhirResult<PrescriptionData> {
        let wire: MedicationRequestWire = decode(document, Self::RESOURCE_TYPE)?;
        finish(Self::RESOURCE_TYPE, wire_to_domain(wire))
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct MedicationRequestWire {
    resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<MetaWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    intent: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    medication_codeable_concept: Option<CodeableConceptWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    medication_reference: Option<ReferenceWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<ReferenceWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    authored_on: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    requester: Option<ReferenceWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    reason_code: Vec<CodeableConceptWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    note: Vec<AnnotationWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    dosage_instruction: Vec<DosageWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    dispense_request: Option<DispenseRequestWire>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct DosageWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    timing: Option<TimingWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    route: Option<CodeableConceptWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    dose_and_rate: Vec<DoseAndRateWire>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct TimingWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<CodeableConceptWire>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct DoseAndRateWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    dose_quantity: Option<QuantityWire>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct DispenseRequestWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    validity_period: Option<PeriodWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    number_of_repeats_allowed: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    quantity: Option<QuantityWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    expected_supply_duration: Option<QuantityWire>,
}

/// Borrowed view of the populated `medication[x]` variant.
enum MedicationChoice<'a> {
    Coded(&'a CodeableConceptWire),
    Reference(&'a ReferenceWire),
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn domain_to_wire(record: &PrescriptionData, names: &dyn DisplayNames) -> MedicationRequestWire {
    let (medication_codeable_concept, medication_reference) = match &record.medication {
        Medication::Coded(concept) => (Some(build_concept(concept)), None),
        Medication::Reference(id) => (
            None,
            Some(make_reference(ResourceType::Medication, id, names)),
        ),
    };

    MedicationRequestWire {
        resource_type: MedicationRequest::RESOURCE_TYPE.as_str().to_owned(),
        id: record.meta.id.as_ref().map(ToString::to_string),
        meta: build_meta(&record.meta),
        status: Some(record.status.code().to_owned()),
        intent: Some(record.intent.code().to_owned()),
        priority: record.priority.map(|p| p.code().to_owned()),
        medication_codeable_concept,
        medication_reference,
        subject: Some(make_reference(ResourceType::Patient, &record.patient, names)),
        authored_on: record.authored_on.map(format_instant),
        requester: record
            .prescriber
            .as_ref()
            .map(|id| make_reference(ResourceType::Practitioner, id, names)),
        reason_code: build_text_concepts(record.reason.as_deref()),
        note: build_annotations(&record.notes),
        dosage_instruction: build_dosage(&record.dosage).into_iter().collect(),
        dispense_request: build_dispense(&record.dispense),
    }
}

fn build_dosage(dosage: &Dosage) -> Option<DosageWire> {
    if dosage.is_empty() {
        return None;
    }
    Some(DosageWire {
        text: dosage.text.clone(),
        timing: dosage.frequency.as_ref().map(|f| TimingWire {
            code: Some(CodeableConceptWire {
                coding: Vec::new(),
                text: Some(f.clone()),
            }),
        }),
        route: build_text_concepts(dosage.route.as_deref()).into_iter().next(),
        dose_and_rate: dosage
            .dose
            .iter()
            .map(|dose| DoseAndRateWire {
                dose_quantity: Some(build_quantity(dose)),
            })
            .collect(),
    })
}

fn build_dispense(dispense: &Dispense) -> Option<DispenseRequestWire> {
    if dispense.is_empty() {
        return None;
    }
    Some(DispenseRequestWire {
        validity_period: build_period(&dispense.validity),
        number_of_repeats_allowed: dispense.refills,
        quantity: dispense.quantity.as_ref().map(build_quantity),
        expected_supply_duration: dispense.supply_days.map(|days| QuantityWire {
            value: Some(f64::from(days)),
            unit: Some("days".into()),
            system: Some(UCUM_SYSTEM.into()),
            code: Some("d".into()),
        }),
    })
}

fn wire_to_domain(wire: MedicationRequestWire) -> FhirResult<PrescriptionData> {
    let mut problems = Problems::default();

    let meta = problems.field(extract_meta(wire.id.as_deref(), wire.meta.as_ref()));
    let status = problems.field(required_code(wire.status.as_deref(), "status"));
    let intent = problems.field(required_code(wire.intent.as_deref(), "intent"));
    let priority = problems.field(validate_optional("priority", wire.priority.as_deref()));
    let medication = extract_medication(&wire, &mut problems);
    let patient = problems.field(required_reference(
        wire.subject.as_ref(),
        ResourceType::Patient,
        "subject",
    ));
    let prescriber = match &wire.requester {
        Some(requester) => problems
            .field(required_reference(
                Some(requester),
                ResourceType::Practitioner,
                "requester",
            ))
            .map(Some),
        None => Some(None),
    };
    let authored_on = problems.field(
        wire.authored_on
            .as_deref()
            .map(|s| parse_instant("authoredOn", s))
            .transpose(),
    );
    let dosage = problems.field(extract_dosage(wire.dosage_instruction.first()));
    let dispense = problems.field(extract_dispense(wire.dispense_request.as_ref()));

    match (
        meta, status, intent, priority, medication, patient, prescriber, authored_on, dosage,
        dispense,
    ) {
        (
            Some(meta),
            Some(status),
            Some(intent),
            Some(priority),
            Some(medication),
            Some(patient),
            Some(prescriber),
            Some(authored_on),
            Some(dosage),
            Some(dispense),
        ) => Ok(PrescriptionData {
            meta,
            status,
            intent,
            priority,
            medication,
            patient,
            prescriber,
            authored_on,
            dosage,
            dispense,
            reason: extract_text(&wire.reason_code),
            notes: extract_annotations(&wire.note),
        }),
        _ => Err(problems.into_error()),
    }
}

fn extract_medication(wire: &MedicationRequestWire, problems: &mut Problems) -> Option<Medication> {
    let choice = choose_variant(
        "medication[x]",
        vec![
            (
                "medicationCodeableConcept",
                wire.medication_codeable_concept.as_ref().map(MedicationChoice::Coded),
            ),
            (
                "medicationReference",
                wire.medication_reference.as_ref().map(MedicationChoice::Reference),
            ),
        ],
    );

    match problems.field(choice)? {
        Some(MedicationChoice::Coded(concept)) => Some(Medication::Coded(extract_concept(concept))),
        Some(MedicationChoice::Reference(reference)) => problems
            .field(required_reference(
                Some(reference),
                ResourceType::Medication,
                "medicationReference",
            ))
            .map(Medication::Reference),
        None => {
            problems.push(FhirError::required("medication[x]"));
            None
        }
    }
}

fn extract_dosage(dosage: Option<&DosageWire>) -> FhirResult<Dosage> {
    let Some(dosage) = dosage else {
        return Ok(Dosage::default());
    };

    let dose = dosage
        .dose_and_rate
        .first()
        .and_then(|d| d.dose_quantity.as_ref())
        .map(|q| extract_quantity(q, "dosageInstruction[0].doseAndRate[0].doseQuantity"))
        .transpose()?;

    Ok(Dosage {
        text: dosage.text.clone(),
        route: dosage.route.as_ref().and_then(concept_text),
        frequency: dosage
            .timing
            .as_ref()
            .and_then(|t| t.code.as_ref())
            .and_then(concept_text),
        dose,
    })
}

fn extract_dispense(dispense: Option<&DispenseRequestWire>) -> FhirResult<Dispense> {
    let Some(dispense) = dispense else {
        return Ok(Dispense::default());
    };

    let mut problems = Problems::default();
    let validity = problems.field(extract_period(
        dispense.validity_period.as_ref(),
        "dispenseRequest.validityPeriod",
    ));
    let quantity = problems.field(
        dispense
            .quantity
            .as_ref()
            .map(|q| extract_quantity(q, "dispenseRequest.quantity"))
            .transpose(),
    );
    let supply_days = problems.field(
        dispense
            .expected_supply_duration
            .as_ref()
            .map(supply_days)
            .transpose(),
    );

    match (validity, quantity, supply_days) {
        (Some(validity), Some(quantity), Some(supply_days)) => Ok(Dispense {
            quantity,
            refills: dispense.number_of_repeats_allowed,
            supply_days,
            validity,
        }),
        _ => Err(problems.into_error()),
    }
}

fn supply_days(duration: &QuantityWire) -> FhirResult<u32> {
    const PATH: &str = "dispenseRequest.expectedSupplyDuration";

    let in_days = match (duration.code.as_deref(), duration.unit.as_deref()) {
        (Some(code), _) => code == "d",
        (None, Some(unit)) => matches!(unit, "d" | "day" | "days"),
        (None, None) => true,
    };
    if !in_days {
        return Err(FhirError::format(PATH, "supply duration must be expressed in days"));
    }

    let value = duration
        .value
        .ok_or_else(|| FhirError::required(format!("{PATH}.value")))?;
    if value.fract() != 0.0 || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(FhirError::format(
            format!("{PATH}.value"),
            format!("{value} is not a whole number of days"),
        ));
    }
    // Range and integrality were checked above.
    Ok(value as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::NoDisplayNames;
    use chrono::NaiveDate;
    use serde_json::json;

    fn id(s: &str) -> RecordId {
        RecordId::new(s).expect("valid id")
    }

    fn amoxicillin() -> PrescriptionData {
        PrescriptionData {
            meta: RecordMeta::with_id(id("rx1")),
            status: MedicationRequestStatus::Active,
            intent: MedicationRequestIntent::Order,
            priority: Some(RequestPriority::Routine),
            medication: Medication::Coded(Concept {
                codings: vec![crate::datatypes::Coding {
                    system: Some("http://www.nlm.nih.gov/research/umls/rxnorm".into()),
                    code: Some("723".into()),
                    display: Some("Amoxicillin".into()),
                }],
                text: Some("Amoxicillin 500mg capsule".into()),
            }),
            patient: id("p1"),
            prescriber: Some(id("pr1")),
            authored_on: Some(parse_instant("t", "2024-02-10T14:00:00Z").expect("valid")),
            dosage: Dosage {
                text: Some("One capsule three times a day".into()),
                route: Some("oral".into()),
                frequency: Some("three times daily".into()),
                dose: Some(Amount::new(500.0, "mg")),
            },
            dispense: Dispense {
                quantity: Some(Amount::new(21.0, "capsule")),
                refills: Some(0),
                supply_days: Some(7),
                validity: DateSpan {
                    start: NaiveDate::from_ymd_opt(2024, 2, 10),
                    end: NaiveDate::from_ymd_opt(2024, 3, 10),
                },
            },
            reason: Some("Chest infection".into()),
            notes: vec!["Complete the full course".into()],
        }
    }

    #[test]
    fn coded_prescription_round_trips() {
        let record = amoxicillin();
        let document = MedicationRequest::to_fhir(&record, &NoDisplayNames).expect("to_fhir");

        assert!(document.get("medicationReference").is_none());
        assert_eq!(document["subject"]["reference"], "Patient/p1");
        assert_eq!(document["requester"]["reference"], "Practitioner/pr1");
        assert_eq!(document["dispenseRequest"]["expectedSupplyDuration"]["code"], "d");
        assert_eq!(document["dosageInstruction"][0]["timing"]["code"]["text"], "three times daily");

        assert_eq!(MedicationRequest::from_fhir(&document).expect("from_fhir"), record);
    }

    #[test]
    fn referenced_medication_round_trips() {
        let mut record = amoxicillin();
        record.medication = Medication::Reference(id("med-7"));
        record.dosage = Dosage::default();
        record.dispense = Dispense::default();

        let document = MedicationRequest::to_fhir(&record, &NoDisplayNames).expect("to_fhir");
        assert!(document.get("medicationCodeableConcept").is_none());
        assert!(document.get("dosageInstruction").is_none());
        assert!(document.get("dispenseRequest").is_none());
        assert_eq!(document["medicationReference"]["reference"], "Medication/med-7");

        assert_eq!(MedicationRequest::from_fhir(&document).expect("from_fhir"), record);
    }

    #[test]
    fn both_medication_variants_is_ambiguous() {
        let document = json!({
            "resourceType": "MedicationRequest",
            "status": "active",
            "intent": "order",
            "subject": { "reference": "Patient/p1" },
            "medicationCodeableConcept": { "text": "Aspirin" },
            "medicationReference": { "reference": "Medication/m1" }
        });
        match MedicationRequest::from_fhir(&document) {
            Err(FhirError::MultipleValueVariants { field, variants }) => {
                assert_eq!(field, "medication[x]");
                assert_eq!(variants.len(), 2);
            }
            other => panic!("expected MultipleValueVariants, got {other:?}"),
        }
    }

    #[test]
    fn missing_medication_and_subject_are_reported() {
        let document = json!({
            "resourceType": "MedicationRequest",
            "status": "active",
            "intent": "order"
        });
        let err = MedicationRequest::from_fhir(&document).expect_err("incomplete");
        assert_eq!(
            err,
            FhirError::Invalid(vec![
                FhirError::required("medication[x]"),
                FhirError::required("subject.reference"),
            ])
        );
    }

    #[test]
    fn subject_must_reference_a_patient() {
        let document = json!({
            "resourceType": "MedicationRequest",
            "status": "active",
            "intent": "order",
            "subject": { "reference": "Practitioner/pr1" },
            "medicationCodeableConcept": { "text": "Aspirin" }
        });
        let err = MedicationRequest::from_fhir(&document).expect_err("wrong subject kind");
        assert!(matches!(err, FhirError::TypeMismatch { .. }));
    }

    #[test]
    fn supply_duration_must_be_whole_days() {
        let weeks = QuantityWire {
            value: Some(2.0),
            code: Some("wk".into()),
            ..QuantityWire::default()
        };
        assert!(supply_days(&weeks).is_err());

        let fractional = QuantityWire {
            value: Some(2.5),
            ..QuantityWire::default()
        };
        assert!(supply_days(&fractional).is_err());

        let ok = QuantityWire {
            value: Some(30.0),
            unit: Some("days".into()),
            ..QuantityWire::default()
        };
        assert_eq!(supply_days(&ok).expect("whole days"), 30);
    }

    #[test]
    fn unknown_intent_is_validation_error() {
        let document = json!({
            "resourceType": "MedicationRequest",
            "status": "active",
            "intent": "suggestion",
            "subject": { "reference": "Patient/p1" },
            "medicationCodeableConcept": { "text": "Aspirin" }
        });
        match MedicationRequest::from_fhir(&document) {
            Err(FhirError::Validation { field, .. }) => assert_eq!(field, "intent"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }
}
