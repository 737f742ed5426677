//! FHIR R4 translation layer for medrec records.
//!
//! This crate provides **wire models** and **translation helpers** between the flat
//! internal records stored by medrec and nested FHIR R4 JSON documents:
//! - Patient, Practitioner, Appointment, MedicationRequest, Observation, Invoice
//! - searchset Bundles for list responses
//! - OperationOutcome bodies for rejected input
//!
//! This crate focuses on:
//! - strict wire shapes (unknown keys are rejected)
//! - closed vocabularies for every enumerated field
//! - lossless round trips for every field FHIR can represent
//!
//! Translation is pure: no I/O, no shared state. Reference existence checks and display
//! names are supplied by the caller (see [`reference::DisplayNames`]).

pub mod appointment;
pub mod bundle;
pub mod datatypes;
pub mod error;
pub mod invoice;
pub mod medication_request;
pub mod observation;
pub mod outcome;
pub mod patient;
pub mod practitioner;
pub mod reference;
pub mod resource;
pub mod vocabulary;

// Re-export facades
pub use appointment::Appointment;
pub use invoice::Invoice;
pub use medication_request::MedicationRequest;
pub use observation::Observation;
pub use patient::Patient;
pub use practitioner::Practitioner;
pub use resource::{FhirResource, RecordMeta};

// Re-export public domain-level types
pub use appointment::{
    AppointmentData, OtherParticipant, ParticipantActor, PatientParticipant, PractitionerParticipant,
};
pub use bundle::{wrap, Bundle, BundleEntry, BundleLink, Pagination};
pub use datatypes::{
    Amount, Coding, Concept, DateSpan, Money, NameForm, PersonName, PostalAddress, Telecom,
};
pub use error::{FhirError, FhirResult};
pub use invoice::{ChargeItem, InvoiceData, InvoiceLine, PriceComponent};
pub use medication_request::{Dispense, Dosage, Medication, PrescriptionData};
pub use observation::{ClinicalRecordData, ObservationValue};
pub use outcome::OperationOutcome;
pub use patient::PatientData;
pub use practitioner::PractitionerData;
pub use reference::{
    make_reference, parse_reference, parse_typed_reference, DisplayNames, NoDisplayNames,
    ParsedReference, ResourceType,
};
