//! In-memory record storage.
//!
//! Responsibilities:
//! - Hold the records of one resource kind behind a `RwLock`
//! - Assign server-side ids (UUID v4, simple form) on insert
//! - Stamp `created_at` and `updated_at`; callers never set them
//! - Keep insertion order so list pages are stable
//!
//! This is the persistence stand-in for the record API: nothing is written to disk.

use crate::{CoreError, CoreResult};
use chrono::Utc;
use fhir::{
    AppointmentData, ClinicalRecordData, InvoiceData, PatientData, PractitionerData,
    PrescriptionData, RecordMeta,
};
use medrec_types::RecordId;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// A record type that carries [`RecordMeta`] and can live in a [`RecordStore`].
pub trait StoredRecord: Clone + Send + Sync + 'static {
    fn meta(&self) -> &RecordMeta;
    fn meta_mut(&mut self) -> &mut RecordMeta;
}

macro_rules! stored_record {
    ($($ty:ty),* $(,)?) => {
        $(
            impl StoredRecord for $ty {
                fn meta(&self) -> &RecordMeta {
                    &self.meta
                }

                fn meta_mut(&mut self) -> &mut RecordMeta {
                    &mut self.meta
                }
            }
        )*
    };
}

stored_record!(
    PatientData,
    PractitionerData,
    AppointmentData,
    PrescriptionData,
    ClinicalRecordData,
    InvoiceData,
);

struct Entries<R> {
    order: Vec<RecordId>,
    records: HashMap<RecordId, R>,
}

/// Records of one kind, keyed by id.
pub struct RecordStore<R> {
    entries: RwLock<Entries<R>>,
}

impl<R> Default for RecordStore<R> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Entries {
                order: Vec::new(),
                records: HashMap::new(),
            }),
        }
    }
}

impl<R: StoredRecord> RecordStore<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `record` under a fresh id and returns the stored copy.
    ///
    /// Any id or timestamps already on the record are replaced.
    pub fn insert(&self, mut record: R) -> CoreResult<R> {
        let id = new_record_id()?;
        let now = Utc::now();
        *record.meta_mut() = RecordMeta {
            id: Some(id.clone()),
            created_at: Some(now),
            updated_at: Some(now),
        };

        let mut entries = self.write()?;
        entries.order.push(id.clone());
        entries.records.insert(id, record.clone());
        Ok(record)
    }

    pub fn get(&self, id: &RecordId) -> CoreResult<Option<R>> {
        Ok(self.read()?.records.get(id).cloned())
    }

    pub fn contains(&self, id: &RecordId) -> CoreResult<bool> {
        Ok(self.read()?.records.contains_key(id))
    }

    /// Replaces the record stored under `id`, keeping its `created_at`.
    ///
    /// Returns `None` when no record has that id.
    pub fn replace(&self, id: &RecordId, mut record: R) -> CoreResult<Option<R>> {
        let mut entries = self.write()?;
        let Some(current) = entries.records.get_mut(id) else {
            return Ok(None);
        };

        *record.meta_mut() = RecordMeta {
            id: Some(id.clone()),
            created_at: current.meta().created_at,
            updated_at: Some(Utc::now()),
        };
        *current = record.clone();
        Ok(Some(record))
    }

    pub fn remove(&self, id: &RecordId) -> CoreResult<Option<R>> {
        let mut entries = self.write()?;
        let removed = entries.records.remove(id);
        if removed.is_some() {
            entries.order.retain(|existing| existing != id);
        }
        Ok(removed)
    }

    pub fn len(&self) -> CoreResult<usize> {
        Ok(self.read()?.order.len())
    }

    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns up to `limit` records starting at `offset`, in insertion order, together
    /// with the total number of stored records.
    pub fn page(&self, offset: usize, limit: usize) -> CoreResult<(Vec<R>, usize)> {
        let entries = self.read()?;
        let records = entries
            .order
            .iter()
            .skip(offset)
            .take(limit)
            .filter_map(|id| entries.records.get(id).cloned())
            .collect();
        Ok((records, entries.order.len()))
    }

    /// Clones every stored record, in insertion order.
    pub fn snapshot(&self) -> CoreResult<Vec<R>> {
        let entries = self.read()?;
        Ok(entries
            .order
            .iter()
            .filter_map(|id| entries.records.get(id).cloned())
            .collect())
    }

    fn read(&self) -> CoreResult<RwLockReadGuard<'_, Entries<R>>> {
        self.entries
            .read()
            .map_err(|e| CoreError::Storage(format!("record store lock poisoned: {e}")))
    }

    fn write(&self) -> CoreResult<RwLockWriteGuard<'_, Entries<R>>> {
        self.entries
            .write()
            .map_err(|e| CoreError::Storage(format!("record store lock poisoned: {e}")))
    }
}

fn new_record_id() -> CoreResult<RecordId> {
    RecordId::new(Uuid::new_v4().simple().to_string())
        .map_err(|e| CoreError::Storage(format!("generated id rejected: {e}")))
}
