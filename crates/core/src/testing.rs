//! Record fixtures shared by the unit tests.

use chrono::{NaiveDate, TimeZone, Utc};
use fhir::vocabulary::{
    AdministrativeGender, AppointmentStatus, InvoiceStatus, NameUse, ParticipantRequired,
    ParticipationStatus,
};
use fhir::{
    AppointmentData, InvoiceData, PatientData, PatientParticipant, PersonName, PractitionerData,
    PractitionerParticipant, RecordMeta,
};
use medrec_types::RecordId;
use serde_json::{json, Value};

pub(crate) fn patient() -> PatientData {
    PatientData {
        meta: RecordMeta::default(),
        name: PersonName {
            name_use: NameUse::Official,
            family: "Doe".into(),
            given: vec!["John".into()],
            prefix: Vec::new(),
        },
        gender: AdministrativeGender::Male,
        birth_date: NaiveDate::from_ymd_opt(1980, 5, 1).expect("valid date"),
        active: true,
        addresses: Vec::new(),
        telecom: Vec::new(),
    }
}

pub(crate) fn practitioner() -> PractitionerData {
    PractitionerData {
        meta: RecordMeta::default(),
        name: PersonName {
            name_use: NameUse::Official,
            family: "Roe".into(),
            given: vec!["Jane".into()],
            prefix: vec!["Dr.".into()],
        },
        gender: None,
        birth_date: None,
        active: true,
        npi: None,
        license_number: None,
        qualification: None,
        specialization: None,
        years_of_experience: None,
        addresses: Vec::new(),
        telecom: Vec::new(),
    }
}

pub(crate) fn appointment(patient: &RecordId, practitioner: &RecordId) -> AppointmentData {
    AppointmentData {
        meta: RecordMeta::default(),
        status: AppointmentStatus::Booked,
        service_category: None,
        service_type: None,
        specialty: None,
        appointment_type: None,
        reason: None,
        priority: None,
        description: None,
        comment: None,
        patient_instruction: None,
        start: Utc
            .with_ymd_and_hms(2024, 3, 1, 9, 0, 0)
            .single()
            .expect("valid start"),
        end: Utc
            .with_ymd_and_hms(2024, 3, 1, 9, 30, 0)
            .single()
            .expect("valid end"),
        minutes_duration: None,
        patient: PatientParticipant {
            id: patient.clone(),
            status: ParticipationStatus::Accepted,
            required: None,
        },
        practitioner: PractitionerParticipant {
            id: practitioner.clone(),
            status: ParticipationStatus::Accepted,
            required: ParticipantRequired::Required,
        },
        additional_participants: Vec::new(),
        cancellation_reason: None,
    }
}

pub(crate) fn invoice(patient: &RecordId) -> InvoiceData {
    InvoiceData {
        meta: RecordMeta::default(),
        status: InvoiceStatus::Draft,
        invoice_number: None,
        patient: patient.clone(),
        appointment: None,
        issue_date: None,
        due_date: None,
        service_date: None,
        line_items: Vec::new(),
        total_net: None,
        total_gross: None,
        amount_paid: None,
        payment_method: None,
        payment_date: None,
        payment_terms: None,
        notes: Vec::new(),
    }
}

pub(crate) fn patient_document() -> Value {
    json!({
        "resourceType": "Patient",
        "name": [{ "use": "official", "family": "Doe", "given": ["John"] }],
        "gender": "male",
        "birthDate": "1980-05-01"
    })
}

pub(crate) fn practitioner_document() -> Value {
    json!({
        "resourceType": "Practitioner",
        "name": [{ "use": "official", "family": "Roe", "given": ["Jane"], "prefix": ["Dr."] }]
    })
}

pub(crate) fn appointment_document(patient: &str, practitioner: &str) -> Value {
    json!({
        "resourceType": "Appointment",
        "status": "booked",
        "start": "2024-03-01T09:00:00Z",
        "end": "2024-03-01T09:30:00Z",
        "participant": [
            { "actor": { "reference": format!("Patient/{patient}") }, "status": "accepted" },
            { "actor": { "reference": format!("Practitioner/{practitioner}") }, "status": "accepted" }
        ]
    })
}
