//! Validated primitives shared across the medrec crates.
//!
//! These wrappers are constructed once at a trust boundary (an inbound FHIR document, a
//! storage allocation, a CLI argument) and can then be passed around without re-checking.

use std::fmt;

/// Errors that can occur when validating a record id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TextError {
    /// The input text was empty
    #[error("text cannot be empty")]
    Empty,

    /// The input cannot be used as a record identifier
    #[error("invalid record id '{0}': must not contain '/' or whitespace")]
    InvalidRecordId(String),
}

/// Opaque, server-assigned identifier of a stored record.
///
/// A record id is the `<id>` segment of a FHIR reference (`Patient/<id>`), so it must be
/// non-empty and must not contain the `/` separator or whitespace. No other format is
/// imposed: the persistence layer decides what ids look like.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    /// Validates `input` as a record id.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] for an empty string and [`TextError::InvalidRecordId`]
    /// if the input contains `/` or whitespace.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let input = input.as_ref();
        if input.is_empty() {
            return Err(TextError::Empty);
        }
        if input.contains('/') || input.chars().any(char::is_whitespace) {
            return Err(TextError::InvalidRecordId(input.to_owned()));
        }
        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for RecordId {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl serde::Serialize for RecordId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RecordId::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_accepts_uuid_and_short_ids() {
        assert!(RecordId::new("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert_eq!(RecordId::new("p1").expect("valid id").as_str(), "p1");
    }

    #[test]
    fn record_id_rejects_separator_and_whitespace() {
        assert_eq!(RecordId::new(""), Err(TextError::Empty));
        assert!(matches!(
            RecordId::new("Patient/p1"),
            Err(TextError::InvalidRecordId(_))
        ));
        assert!(matches!(
            RecordId::new("p 1"),
            Err(TextError::InvalidRecordId(_))
        ));
    }

    #[test]
    fn record_id_deserialize_validates() {
        let ok: RecordId = serde_json::from_str("\"abc-123\"").expect("valid id");
        assert_eq!(ok.to_string(), "abc-123");
        assert!(serde_json::from_str::<RecordId>("\"a/b\"").is_err());
    }
}
