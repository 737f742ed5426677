//! One record store per resource kind, plus the reference bookkeeping between them.
//!
//! Responsibilities:
//! - Own the six [`RecordStore`]s
//! - Answer "does `<Type>/<id>` exist" for referential integrity checks
//! - Supply display names for outbound references (see [`fhir::DisplayNames`])
//! - Map each translator to its store and to the references its records make
//! - Serialise writes so a reference check and the write it guards see the same state

use crate::store::{RecordStore, StoredRecord};
use crate::{CoreError, CoreResult};
use fhir::{
    AppointmentData, ClinicalRecordData, DisplayNames, FhirResource, InvoiceData, PatientData,
    PractitionerData, PrescriptionData, ResourceType,
};
use medrec_types::RecordId;
use std::sync::{Mutex, MutexGuard};

/// A reference from one record to another stored record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordLink {
    /// Where the reference sits in the FHIR document, e.g. `subject` or `participant[1].actor`.
    pub path: String,
    pub resource_type: ResourceType,
    pub id: RecordId,
}

impl RecordLink {
    fn new(path: impl Into<String>, resource_type: ResourceType, id: &RecordId) -> Self {
        Self {
            path: path.into(),
            resource_type,
            id: id.clone(),
        }
    }

    pub fn points_at(&self, resource_type: ResourceType, id: &RecordId) -> bool {
        self.resource_type == resource_type && &self.id == id
    }
}

#[derive(Default)]
pub struct Repository {
    pub patients: RecordStore<PatientData>,
    pub practitioners: RecordStore<PractitionerData>,
    pub appointments: RecordStore<AppointmentData>,
    pub prescriptions: RecordStore<PrescriptionData>,
    pub clinical_records: RecordStore<ClinicalRecordData>,
    pub invoices: RecordStore<InvoiceData>,
    writes: Mutex<()>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive access for a check-then-write sequence.
    ///
    /// Every create, update and delete holds this guard from its reference check until its
    /// store write, so no write can observe a check made stale by another.
    pub fn write_lock(&self) -> CoreResult<MutexGuard<'_, ()>> {
        self.writes
            .lock()
            .map_err(|e| CoreError::Storage(format!("repository write lock poisoned: {e}")))
    }

    /// Whether a record of `resource_type` with `id` is stored.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnsupportedType`] for kinds that are only reference targets
    /// (`Medication`, `ChargeItem`).
    pub fn contains(&self, resource_type: ResourceType, id: &RecordId) -> CoreResult<bool> {
        match resource_type {
            ResourceType::Patient => self.patients.contains(id),
            ResourceType::Practitioner => self.practitioners.contains(id),
            ResourceType::Appointment => self.appointments.contains(id),
            ResourceType::MedicationRequest => self.prescriptions.contains(id),
            ResourceType::Observation => self.clinical_records.contains(id),
            ResourceType::Invoice => self.invoices.contains(id),
            other => Err(CoreError::UnsupportedType {
                resource_type: other,
            }),
        }
    }

    /// Fails with [`CoreError::DanglingReference`] on the first link whose target is not stored.
    ///
    /// Links to kinds without a store are not checked.
    pub fn check_links(&self, links: &[RecordLink]) -> CoreResult<()> {
        for link in links.iter().filter(|l| l.resource_type.is_translated()) {
            if !self.contains(link.resource_type, &link.id)? {
                return Err(CoreError::DanglingReference {
                    path: link.path.clone(),
                    resource_type: link.resource_type,
                    id: link.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Every stored record that refers to `<resource_type>/<id>`, as `"<Type>/<id>"` strings.
    pub fn referrers(&self, resource_type: ResourceType, id: &RecordId) -> CoreResult<Vec<String>> {
        let mut found = Vec::new();
        collect_referrers::<fhir::Appointment>(self, resource_type, id, &mut found)?;
        collect_referrers::<fhir::MedicationRequest>(self, resource_type, id, &mut found)?;
        collect_referrers::<fhir::Observation>(self, resource_type, id, &mut found)?;
        collect_referrers::<fhir::Invoice>(self, resource_type, id, &mut found)?;
        Ok(found)
    }
}

impl DisplayNames for Repository {
    fn display_name(&self, resource_type: ResourceType, id: &RecordId) -> Option<String> {
        match resource_type {
            ResourceType::Patient => self.patients.get(id).ok().flatten().map(|p| p.name.display()),
            ResourceType::Practitioner => self
                .practitioners
                .get(id)
                .ok()
                .flatten()
                .map(|p| p.name.display()),
            _ => None,
        }
    }
}

/// A translator whose records are kept in a [`Repository`].
pub trait StoredResource: FhirResource
where
    Self::Record: StoredRecord,
{
    fn store(repository: &Repository) -> &RecordStore<Self::Record>;

    /// References `record` makes to other records.
    fn links(record: &Self::Record) -> Vec<RecordLink>;
}

impl StoredResource for fhir::Patient {
    fn store(repository: &Repository) -> &RecordStore<PatientData> {
        &repository.patients
    }

    fn links(_record: &PatientData) -> Vec<RecordLink> {
        Vec::new()
    }
}

impl StoredResource for fhir::Practitioner {
    fn store(repository: &Repository) -> &RecordStore<PractitionerData> {
        &repository.practitioners
    }

    fn links(_record: &PractitionerData) -> Vec<RecordLink> {
        Vec::new()
    }
}

impl StoredResource for fhir::Appointment {
    fn store(repository: &Repository) -> &RecordStore<AppointmentData> {
        &repository.appointments
    }

    fn links(record: &AppointmentData) -> Vec<RecordLink> {
        let mut links = vec![
            RecordLink::new(
                "participant[0].actor",
                ResourceType::Patient,
                &record.patient.id,
            ),
            RecordLink::new(
                "participant[1].actor",
                ResourceType::Practitioner,
                &record.practitioner.id,
            ),
        ];

        // Other participants may point anywhere; only kinds we store are tracked.
        for (i, participant) in record.additional_participants.iter().enumerate() {
            let Some(parsed) = participant.actor.as_ref().and_then(|a| a.reference.as_ref())
            else {
                continue;
            };
            let kind = parsed.resource_type.parse::<ResourceType>();
            let id = RecordId::new(&parsed.id);
            if let (Ok(kind), Ok(id)) = (kind, id) {
                links.push(RecordLink::new(
                    format!("participant[{}].actor", i + 2),
                    kind,
                    &id,
                ));
            }
        }
        links
    }
}

impl StoredResource for fhir::MedicationRequest {
    fn store(repository: &Repository) -> &RecordStore<PrescriptionData> {
        &repository.prescriptions
    }

    fn links(record: &PrescriptionData) -> Vec<RecordLink> {
        let mut links = vec![RecordLink::new(
            "subject",
            ResourceType::Patient,
            &record.patient,
        )];
        if let Some(prescriber) = &record.prescriber {
            links.push(RecordLink::new(
                "requester",
                ResourceType::Practitioner,
                prescriber,
            ));
        }
        links
    }
}

impl StoredResource for fhir::Observation {
    fn store(repository: &Repository) -> &RecordStore<ClinicalRecordData> {
        &repository.clinical_records
    }

    fn links(record: &ClinicalRecordData) -> Vec<RecordLink> {
        let mut links = vec![RecordLink::new(
            "subject",
            ResourceType::Patient,
            &record.patient,
        )];
        if let Some(recorded_by) = &record.recorded_by {
            links.push(RecordLink::new(
                "performer[0]",
                ResourceType::Practitioner,
                recorded_by,
            ));
        }
        links
    }
}

impl StoredResource for fhir::Invoice {
    fn store(repository: &Repository) -> &RecordStore<InvoiceData> {
        &repository.invoices
    }

    fn links(record: &InvoiceData) -> Vec<RecordLink> {
        let mut links = vec![RecordLink::new(
            "subject",
            ResourceType::Patient,
            &record.patient,
        )];
        // Written first among the extensions.
        if let Some(appointment) = &record.appointment {
            links.push(RecordLink::new(
                "extension[0].valueReference",
                ResourceType::Appointment,
                appointment,
            ));
        }
        links
    }
}

fn collect_referrers<K>(
    repository: &Repository,
    resource_type: ResourceType,
    id: &RecordId,
    found: &mut Vec<String>,
) -> CoreResult<()>
where
    K: StoredResource,
    K::Record: StoredRecord,
{
    for record in K::store(repository).snapshot()? {
        if K::links(&record).iter().any(|l| l.points_at(resource_type, id)) {
            if let Some(referrer) = &record.meta().id {
                found.push(format!("{}/{referrer}", K::RESOURCE_TYPE));
            }
        }
    }
    Ok(())
}
