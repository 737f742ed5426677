//! # medrec Core
//!
//! Core record handling for the medrec FHIR API:
//! - Startup configuration ([`CoreConfig`])
//! - In-memory record stores with server-assigned ids and timestamps
//! - Referential integrity between records and display-name lookup for references
//! - Create/read/update/delete/list over FHIR documents ([`FhirService`])
//!
//! **No API concerns**: authentication, HTTP routing and status codes belong in `api-rest`.
//! Translation between records and FHIR documents lives in the `fhir` crate.

pub mod config;
pub mod error;
pub mod repository;
pub mod service;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::CoreConfig;
pub use error::{CoreError, CoreResult};
pub use repository::{RecordLink, Repository, StoredResource};
pub use service::FhirService;
pub use store::{RecordStore, StoredRecord};
