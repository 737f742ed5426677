//! FHIR-aligned appointment wire model and translation.
//!
//! Responsibilities:
//! - Define the flat domain-level appointment record
//! - Locate the primary patient and practitioner among `participant` entries
//! - Keep every other participant, in order, with its codes validated
//!
//! Notes:
//! - The first `Patient/` actor and the first `Practitioner/` actor are authoritative;
//!   later participants of the same kind are kept as additional participants
//! - Outbound, the patient participant is written first and the practitioner second,
//!   followed by the additional participants
//! - The primary participants keep their status and `required` code only. Their `type`
//!   is not stored, and the actor `display` is rebuilt from the display-name lookup.
//! - Additional participants keep `type` and actor `display` as given
//! - Free-text concepts (service category, service type, specialty, reason) are read
//!   from and written to `[0].text`

use crate::datatypes::{
    build_concept, build_text_concepts, concept_text, extract_concept, extract_text,
    format_instant, parse_instant, CodeableConceptWire, Concept, MetaWire, ReferenceWire,
};
use crate::error::Problems;
use crate::reference::{
    make_reference, parse_reference_at, DisplayNames, ParsedReference, ResourceType,
};
use crate::resource::{
    build_meta, decode, encode, extract_meta, finish, required, required_code, FhirResource,
    RecordMeta,
};
use crate::vocabulary::{
    validate_optional, AppointmentStatus, ParticipantRequired, ParticipationStatus, Vocabulary,
};
use crate::{FhirError, FhirResult};
use chrono::{DateTime, Utc};
use medrec_types::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Public domain-level types
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientParticipant {
    pub id: RecordId,
    pub status: ParticipationStatus,
    /// Absent unless the inbound document set it.
    pub required: Option<ParticipantRequired>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PractitionerParticipant {
    pub id: RecordId,
    pub status: ParticipationStatus,
    pub required: ParticipantRequired,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParticipantActor {
    /// Any resource kind, e.g. `RelatedPerson/r9` or `Location/room-4`.
    pub reference: Option<ParsedReference>,
    pub display: Option<String>,
}

/// A participant other than the primary patient and practitioner.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OtherParticipant {
    /// Participant roles (`type`).
    pub roles: Vec<Concept>,
    pub actor: Option<ParticipantActor>,
    pub required: Option<ParticipantRequired>,
    pub status: Option<ParticipationStatus>,
}

/// Domain-level carrier for appointment data (flat structure).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppointmentData {
    pub meta: RecordMeta,
    pub status: AppointmentStatus,
    pub service_category: Option<String>,
    pub service_type: Option<String>,
    pub specialty: Option<String>,
    pub appointment_type: Option<String>,
    pub reason: Option<String>,
    pub priority: Option<u32>,
    pub description: Option<String>,
    pub comment: Option<String>,
    pub patient_instruction: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub minutes_duration: Option<u32>,
    pub patient: PatientParticipant,
    pub practitioner: PractitionerParticipant,
    pub additional_participants: Vec<OtherParticipant>,
    pub cancellation_reason: Option<String>,
}

impl AppointmentData {
    /// Duration in minutes, from `minutes_duration` or derived from start and end.
    pub fn duration_minutes(&self) -> i64 {
        self.minutes_duration
            .map(i64::from)
            .unwrap_or_else(|| (self.end - self.start).num_minutes())
    }
}

// ============================================================================
// Public Appointment operations
// ============================================================================

/// Appointment resource operations.
pub struct Appointment;

impl FhirResource for Appointment {
    type Record = AppointmentData;

    const RESOURCE_TYPE: ResourceType = ResourceType::Appointment;

    fn to_fhir(record: &AppointmentData, names: &dyn DisplayNames) -> FhirResult<Value> {
        encode(&domain_to_wire(record, names)?, Self::RESOURCE_TYPE)
    }

    fn from_fhir(document: &Value) -> FhirResult<AppointmentData> {
        let wire: AppointmentWire = decode(document, Self::RESOURCE_TYPE)?;
        finish(Self::RESOURCE_TYPE, wire_to_domain(wire))
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct AppointmentWire {
    resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<MetaWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    cancelation_reason: Option<CodeableConceptWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    service_category: Vec<CodeableConceptWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    service_type: Vec<CodeableConceptWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    specialty: Vec<CodeableConceptWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    appointment_type: Option<CodeableConceptWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    reason_code: Vec<CodeableConceptWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    minutes_duration: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    patient_instruction: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    participant: Vec<ParticipantWire>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct ParticipantWire {
    #[serde(rename = "type", default, skip_serializing_if = "Vec::is_empty")]
    type_: Vec<CodeableConceptWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    actor: Option<ReferenceWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    required: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
}

/// Result of scanning the participant list.
#[derive(Default)]
struct Participants {
    patient: Option<PatientParticipant>,
    practitioner: Option<PractitionerParticipant>,
    additional: Vec<OtherParticipant>,
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn text_concept(text: Option<&str>) -> Option<CodeableConceptWire> {
    build_text_concepts(text).into_iter().next()
}

fn domain_to_wire(
    record: &AppointmentData,
    names: &dyn DisplayNames,
) -> FhirResult<AppointmentWire> {
    let mut participant = Vec::with_capacity(2 + record.additional_participants.len());
    participant.push(ParticipantWire {
        type_: Vec::new(),
        actor: Some(make_reference(
            ResourceType::Patient,
            &record.patient.id,
            names,
        )),
        required: record.patient.required.map(|r| r.code().to_owned()),
        status: Some(record.patient.status.code().to_owned()),
    });
    participant.push(ParticipantWire {
        type_: Vec::new(),
        actor: Some(make_reference(
            ResourceType::Practitioner,
            &record.practitioner.id,
            names,
        )),
        required: Some(record.practitioner.required.code().to_owned()),
        status: Some(record.practitioner.status.code().to_owned()),
    });
    for (i, other) in record.additional_participants.iter().enumerate() {
        participant.push(build_other_participant(other, i + 2)?);
    }

    Ok(AppointmentWire {
        resource_type: Appointment::RESOURCE_TYPE.as_str().to_owned(),
        id: record.meta.id.as_ref().map(ToString::to_string),
        meta: build_meta(&record.meta),
        status: Some(record.status.code().to_owned()),
        cancelation_reason: text_concept(record.cancellation_reason.as_deref()),
        service_category: build_text_concepts(record.service_category.as_deref()),
        service_type: build_text_concepts(record.service_type.as_deref()),
        specialty: build_text_concepts(record.specialty.as_deref()),
        appointment_type: text_concept(record.appointment_type.as_deref()),
        reason_code: build_text_concepts(record.reason.as_deref()),
        priority: record.priority,
        description: record.description.clone(),
        start: Some(format_instant(record.start)),
        end: Some(format_instant(record.end)),
        minutes_duration: record.minutes_duration,
        comment: record.comment.clone(),
        patient_instruction: record.patient_instruction.clone(),
        participant,
    })
}

/// Writes an additional participant at `participant[index]`.
///
/// # Errors
///
/// [`FhirError::Invariant`] when the actor reference would not parse back.
fn build_other_participant(other: &OtherParticipant, index: usize) -> FhirResult<ParticipantWire> {
    let actor = match &other.actor {
        None => None,
        Some(actor) => {
            let reference = match &actor.reference {
                None => None,
                Some(target) => {
                    let reference = format!("{}/{}", target.resource_type, target.id);
                    let path = format!("participant[{index}].actor.reference");
                    match parse_reference_at(&reference, &path) {
                        Ok(parsed) if &parsed == target => Some(reference),
                        _ => {
                            return Err(FhirError::Invariant(format!(
                                "{path}: '{reference}' is not a valid reference"
                            )));
                        }
                    }
                }
            };
            Some(ReferenceWire {
                reference,
                display: actor.display.clone(),
            })
        }
    };

    Ok(ParticipantWire {
        type_: other.roles.iter().map(build_concept).collect(),
        actor,
        required: other.required.map(|r| r.code().to_owned()),
        status: other.status.map(|s| s.code().to_owned()),
    })
}

fn wire_to_domain(wire: AppointmentWire) -> FhirResult<AppointmentData> {
    let mut problems = Problems::default();

    let meta = problems.field(extract_meta(wire.id.as_deref(), wire.meta.as_ref()));
    let status = problems.field(required_code(wire.status.as_deref(), "status"));
    let start = problems.field(
        required(wire.start.as_deref(), "start").and_then(|s| parse_instant("start", s)),
    );
    let end =
        problems.field(required(wire.end.as_deref(), "end").and_then(|s| parse_instant("end", s)));

    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            problems.push(FhirError::format("end", "appointment ends before it starts"));
        }
    }

    let participants = scan_participants(wire.participant, &mut problems);

    match (meta, status, start, end, participants) {
        (
            Some(meta),
            Some(status),
            Some(start),
            Some(end),
            Participants {
                patient: Some(patient),
                practitioner: Some(practitioner),
                additional,
            },
        ) if problems.is_empty() => Ok(AppointmentData {
            meta,
            status,
            service_category: extract_text(&wire.service_category),
            service_type: extract_text(&wire.service_type),
            specialty: extract_text(&wire.specialty),
            appointment_type: wire.appointment_type.as_ref().and_then(concept_text),
            reason: extract_text(&wire.reason_code),
            priority: wire.priority,
            description: wire.description,
            comment: wire.comment,
            patient_instruction: wire.patient_instruction,
            start,
            end,
            minutes_duration: wire.minutes_duration,
            patient,
            practitioner,
            additional_participants: additional,
            cancellation_reason: wire.cancelation_reason.as_ref().and_then(concept_text),
        }),
        _ => Err(problems.into_error()),
    }
}

/// Splits the participant list into the primary patient, the primary practitioner and the rest.
///
/// Every participant's codes and actor reference are validated, including the ones that are
/// only carried through.
fn scan_participants(participants: Vec<ParticipantWire>, problems: &mut Problems) -> Participants {
    let mut found = Participants::default();

    if participants.is_empty() {
        problems.push(FhirError::required("participant"));
        return found;
    }

    for (i, participant) in participants.into_iter().enumerate() {
        let status = problems.field(validate_optional::<ParticipationStatus>(
            &format!("participant[{i}].status"),
            participant.status.as_deref(),
        ));
        let required = problems.field(validate_optional::<ParticipantRequired>(
            &format!("participant[{i}].required"),
            participant.required.as_deref(),
        ));

        let reference_path = format!("participant[{i}].actor.reference");
        let parsed = participant
            .actor
            .as_ref()
            .and_then(|actor| actor.reference.as_deref())
            .and_then(|reference| problems.field(parse_reference_at(reference, &reference_path)));

        let kind = parsed.as_ref().map(|p| p.resource_type.as_str());
        let claims_patient = kind == Some("Patient") && found.patient.is_none();
        let claims_practitioner = kind == Some("Practitioner") && found.practitioner.is_none();

        if !(claims_patient || claims_practitioner) {
            if let (Some(status), Some(required)) = (status, required) {
                found.additional.push(OtherParticipant {
                    roles: participant.type_.iter().map(extract_concept).collect(),
                    actor: participant.actor.map(|actor| ParticipantActor {
                        reference: parsed,
                        display: actor.display,
                    }),
                    required,
                    status,
                });
            }
            continue;
        }

        let Some(id) = parsed.and_then(|p| {
            problems.field(
                RecordId::new(&p.id).map_err(|e| FhirError::format(&reference_path, e.to_string())),
            )
        }) else {
            continue;
        };
        let (Some(status), Some(required)) = (status, required) else {
            continue;
        };
        let status = status.unwrap_or(ParticipationStatus::NeedsAction);

        if claims_patient {
            found.patient = Some(PatientParticipant {
                id,
                status,
                required,
            });
        } else {
            found.practitioner = Some(PractitionerParticipant {
                id,
                status,
                required: required.unwrap_or(ParticipantRequired::Required),
            });
        }
    }

    if found.patient.is_none() {
        problems.push(FhirError::required("participant:Patient"));
    }
    if found.practitioner.is_none() {
        problems.push(FhirError::required("participant:Practitioner"));
    }

    found
}
