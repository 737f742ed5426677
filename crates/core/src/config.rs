//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the core services,
//! so request handling never reads process-wide environment variables.

use crate::{CoreError, CoreResult};

pub const REST_ADDR_VAR: &str = "MEDREC_REST_ADDR";
pub const API_TOKEN_VAR: &str = "MEDREC_API_TOKEN";
pub const BASE_URL_VAR: &str = "MEDREC_BASE_URL";
pub const PAGE_SIZE_VAR: &str = "MEDREC_PAGE_SIZE";
pub const MAX_PAGE_SIZE_VAR: &str = "MEDREC_MAX_PAGE_SIZE";

pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/fhir";
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    rest_addr: String,
    api_token: String,
    base_url: String,
    page_size: u32,
    max_page_size: u32,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] if:
    /// - `api_token` is blank,
    /// - `base_url` is not an `http(s)://` URL, or
    /// - `page_size` is zero or larger than `max_page_size`.
    pub fn new(
        rest_addr: String,
        api_token: String,
        base_url: String,
        page_size: u32,
        max_page_size: u32,
    ) -> CoreResult<Self> {
        if api_token.trim().is_empty() {
            return Err(CoreError::InvalidInput("api_token cannot be empty".into()));
        }

        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(CoreError::InvalidInput(format!(
                "base_url must start with http:// or https://, got '{base_url}'"
            )));
        }

        if page_size == 0 || page_size > max_page_size {
            return Err(CoreError::InvalidInput(format!(
                "page_size must be between 1 and max_page_size ({max_page_size}), got {page_size}"
            )));
        }

        Ok(Self {
            rest_addr,
            api_token,
            base_url: base_url.trim_end_matches('/').to_owned(),
            page_size,
            max_page_size,
        })
    }

    /// Build a `CoreConfig` from a variable lookup, applying the documented defaults.
    ///
    /// Binaries pass `|key| std::env::var(key).ok()`; tests pass a map.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] when `MEDREC_API_TOKEN` is unset, a page size is
    /// not a number, or [`CoreConfig::new`] rejects the values.
    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_token = lookup(API_TOKEN_VAR)
            .ok_or_else(|| CoreError::InvalidInput(format!("{API_TOKEN_VAR} must be set")))?;

        Self::new(
            lookup(REST_ADDR_VAR).unwrap_or_else(|| DEFAULT_REST_ADDR.into()),
            api_token,
            lookup(BASE_URL_VAR).unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            parse_size(PAGE_SIZE_VAR, lookup(PAGE_SIZE_VAR), DEFAULT_PAGE_SIZE)?,
            parse_size(
                MAX_PAGE_SIZE_VAR,
                lookup(MAX_PAGE_SIZE_VAR),
                DEFAULT_MAX_PAGE_SIZE,
            )?,
        )
    }

    pub fn rest_addr(&self) -> &str {
        &self.rest_addr
    }

    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    /// Base URL of the FHIR endpoints, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn max_page_size(&self) -> u32 {
        self.max_page_size
    }
}

fn parse_size(name: &str, value: Option<String>, default: u32) -> CoreResult<u32> {
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            CoreError::InvalidInput(format!("{name} must be a positive integer, got '{raw}'"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_token_is_set() {
        let cfg = CoreConfig::from_lookup(lookup(&[(API_TOKEN_VAR, "secret")]))
            .expect("config should resolve");
        assert_eq!(cfg.rest_addr(), DEFAULT_REST_ADDR);
        assert_eq!(cfg.base_url(), DEFAULT_BASE_URL);
        assert_eq!(cfg.page_size(), 20);
        assert_eq!(cfg.max_page_size(), 100);
    }

    #[test]
    fn missing_token_is_rejected() {
        let err = CoreConfig::from_lookup(lookup(&[])).expect_err("token is required");
        assert!(matches!(err, CoreError::InvalidInput(msg) if msg.contains(API_TOKEN_VAR)));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let cfg = CoreConfig::new(
            DEFAULT_REST_ADDR.into(),
            "t".into(),
            "https://records.example.org/fhir/".into(),
            10,
            50,
        )
        .expect("valid config");
        assert_eq!(cfg.base_url(), "https://records.example.org/fhir");
    }

    #[test]
    fn page_size_above_maximum_is_rejected() {
        let err = CoreConfig::from_lookup(lookup(&[
            (API_TOKEN_VAR, "t"),
            (PAGE_SIZE_VAR, "500"),
        ]))
        .expect_err("page size exceeds max");
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn non_numeric_page_size_is_rejected() {
        let err = CoreConfig::from_lookup(lookup(&[(API_TOKEN_VAR, "t"), (PAGE_SIZE_VAR, "lots")]))
            .expect_err("not a number");
        assert!(matches!(err, CoreError::InvalidInput(msg) if msg.contains("lots")));
    }
}
