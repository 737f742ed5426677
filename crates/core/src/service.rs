//! Record operations over FHIR documents.
//!
//! Every write runs the same pipeline: inbound translation, referential integrity check,
//! store, outbound translation of the stored record. Reads translate the stored record with
//! the repository as the display-name lookup, so outbound references carry names.
//!
//! The reference check and the store write of each create, update and delete run under
//! [`Repository::write_lock`]; a delete cannot slip between another write's check and insert.

use crate::config::CoreConfig;
use crate::repository::{Repository, StoredResource};
use crate::store::StoredRecord;
use crate::{CoreError, CoreResult};
use fhir::{wrap, Bundle, Pagination, ResourceType};
use medrec_types::RecordId;
use serde_json::Value;
use std::sync::Arc;

/// Runs `$body` with `$k` bound to the translator for a runtime [`ResourceType`].
macro_rules! dispatch {
    ($kind:expr, $k:ident => $body:expr) => {
        match $kind {
            ResourceType::Patient => {
                type $k = fhir::Patient;
                $body
            }
            ResourceType::Practitioner => {
                type $k = fhir::Practitioner;
                $body
            }
            ResourceType::Appointment => {
                type $k = fhir::Appointment;
                $body
            }
            ResourceType::MedicationRequest => {
                type $k = fhir::MedicationRequest;
                $body
            }
            ResourceType::Observation => {
                type $k = fhir::Observation;
                $body
            }
            ResourceType::Invoice => {
                type $k = fhir::Invoice;
                $body
            }
            other => Err(CoreError::UnsupportedType {
                resource_type: other,
            }),
        }
    };
}

#[derive(Clone)]
pub struct FhirService {
    cfg: Arc<CoreConfig>,
    repository: Arc<Repository>,
}

impl FhirService {
    /// Creates a service over an empty repository.
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self::with_repository(cfg, Arc::new(Repository::new()))
    }

    pub fn with_repository(cfg: Arc<CoreConfig>, repository: Arc<Repository>) -> Self {
        Self { cfg, repository }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Normalises list paging parameters.
    ///
    /// `page` defaults to 1; `count` defaults to the configured page size and is clamped to
    /// `1..=max_page_size`.
    pub fn pagination(&self, page: Option<u32>, count: Option<u32>) -> Pagination {
        Pagination {
            page: page.unwrap_or(1).max(1),
            count: count
                .unwrap_or(self.cfg.page_size())
                .clamp(1, self.cfg.max_page_size()),
        }
    }

    pub fn create(&self, kind: ResourceType, document: &Value) -> CoreResult<Value> {
        dispatch!(kind, K => self.create_resource::<K>(document))
    }

    pub fn read(&self, kind: ResourceType, id: &RecordId) -> CoreResult<Value> {
        dispatch!(kind, K => self.read_resource::<K>(id))
    }

    pub fn update(&self, kind: ResourceType, id: &RecordId, document: &Value) -> CoreResult<Value> {
        dispatch!(kind, K => self.update_resource::<K>(id, document))
    }

    pub fn delete(&self, kind: ResourceType, id: &RecordId) -> CoreResult<()> {
        dispatch!(kind, K => self.delete_resource::<K>(id))
    }

    pub fn list(&self, kind: ResourceType, page: Pagination) -> CoreResult<Bundle> {
        dispatch!(kind, K => self.list_resources::<K>(page))
    }

    /// Stores a new record from `document` and returns its FHIR form.
    ///
    /// Any `id` or `meta` in the document is replaced by server-assigned values.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Fhir`] when the document does not translate
    /// - [`CoreError::DanglingReference`] when it refers to a record that is not stored
    pub fn create_resource<K>(&self, document: &Value) -> CoreResult<Value>
    where
        K: StoredResource,
        K::Record: StoredRecord,
    {
        let record = K::from_fhir(document)?;

        let stored = {
            let _writes = self.repository.write_lock()?;
            self.repository.check_links(&K::links(&record))?;
            K::store(&self.repository).insert(record)?
        };
        if let Some(id) = &stored.meta().id {
            tracing::info!(resource_type = %K::RESOURCE_TYPE, %id, "record created");
        }
        self.outbound::<K>(&stored)
    }

    pub fn read_resource<K>(&self, id: &RecordId) -> CoreResult<Value>
    where
        K: StoredResource,
        K::Record: StoredRecord,
    {
        let record = K::store(&self.repository)
            .get(id)?
            .ok_or_else(|| not_found(K::RESOURCE_TYPE, id))?;
        self.outbound::<K>(&record)
    }

    /// Replaces the record stored under `id` with the contents of `document`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] when no record has that id
    /// - [`CoreError::IdMismatch`] when the document carries a different `id`
    /// - translation and reference errors as for [`FhirService::create_resource`]
    pub fn update_resource<K>(&self, id: &RecordId, document: &Value) -> CoreResult<Value>
    where
        K: StoredResource,
        K::Record: StoredRecord,
    {
        let record = K::from_fhir(document)?;
        if let Some(body) = &record.meta().id {
            if body != id {
                return Err(CoreError::IdMismatch {
                    target: id.clone(),
                    body: body.clone(),
                });
            }
        }
        let stored = {
            let _writes = self.repository.write_lock()?;
            self.repository.check_links(&K::links(&record))?;
            K::store(&self.repository)
                .replace(id, record)?
                .ok_or_else(|| not_found(K::RESOURCE_TYPE, id))?
        };
        tracing::info!(resource_type = %K::RESOURCE_TYPE, %id, "record updated");
        self.outbound::<K>(&stored)
    }

    /// Removes the record stored under `id`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] when no record has that id
    /// - [`CoreError::StillReferenced`] when other records still point at it
    pub fn delete_resource<K>(&self, id: &RecordId) -> CoreResult<()>
    where
        K: StoredResource,
        K::Record: StoredRecord,
    {
        let store = K::store(&self.repository);
        let _writes = self.repository.write_lock()?;
        if !store.contains(id)? {
            return Err(not_found(K::RESOURCE_TYPE, id));
        }

        let referrers = self.repository.referrers(K::RESOURCE_TYPE, id)?;
        if !referrers.is_empty() {
            return Err(CoreError::StillReferenced {
                resource_type: K::RESOURCE_TYPE,
                id: id.clone(),
                referrers,
            });
        }

        store
            .remove(id)?
            .ok_or_else(|| not_found(K::RESOURCE_TYPE, id))?;
        tracing::info!(resource_type = %K::RESOURCE_TYPE, %id, "record deleted");
        Ok(())
    }

    /// One page of stored records as a `searchset` Bundle with paging links.
    pub fn list_resources<K>(&self, page: Pagination) -> CoreResult<Bundle>
    where
        K: StoredResource,
        K::Record: StoredRecord,
    {
        let (records, total) =
            K::store(&self.repository).page(page.offset(), page.count as usize)?;
        let documents = records
            .iter()
            .map(|record| self.outbound::<K>(record))
            .collect::<CoreResult<Vec<_>>>()?;

        let total = total as u64;
        let url = format!("{}/{}/", self.cfg.base_url(), K::RESOURCE_TYPE);
        tracing::debug!(resource_type = %K::RESOURCE_TYPE, total, page = page.page, "listing records");

        Ok(wrap(documents, total, page.links(&url, total)).with_full_urls(self.cfg.base_url()))
    }

    fn outbound<K>(&self, record: &K::Record) -> CoreResult<Value>
    where
        K: StoredResource,
        K::Record: StoredRecord,
    {
        Ok(K::to_fhir(record, &*self.repository)?)
    }
}

fn not_found(resource_type: ResourceType, id: &RecordId) -> CoreError {
    CoreError::NotFound {
        resource_type,
        id: id.clone(),
    }
}
