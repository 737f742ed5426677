//! Translation errors.
//!
//! Inbound translation reports every field-level problem it finds, not just the first one.
//! A single problem is returned as-is; several are wrapped in [`FhirError::Invalid`].

/// Errors returned by the `fhir` translation crate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FhirError {
    #[error("expected resourceType '{expected}', got '{found}'")]
    TypeMismatch { expected: String, found: String },

    #[error("missing required field: {path}")]
    RequiredField { path: String },

    #[error("invalid value '{value}' for {field}; expected one of: {}", .allowed.join(", "))]
    Validation {
        field: String,
        value: String,
        allowed: &'static [&'static str],
    },

    #[error("malformed reference at {path}: '{reference}' (expected '<ResourceType>/<id>')")]
    MalformedReference { path: String, reference: String },

    #[error("more than one value variant populated for {field}: {}", .variants.join(", "))]
    MultipleValueVariants {
        field: String,
        variants: Vec<String>,
    },

    #[error("schema mismatch at {path}: {message}")]
    Schema { path: String, message: String },

    #[error("invalid format at {path}: {message}")]
    InvalidFormat { path: String, message: String },

    /// Invalid state reached the outbound boundary. This is a server defect, not a client error.
    #[error("internal invariant violated: {0}")]
    Invariant(String),

    #[error("{} problems in resource", .0.len())]
    Invalid(Vec<FhirError>),
}

impl FhirError {
    pub(crate) fn required(path: impl Into<String>) -> Self {
        FhirError::RequiredField { path: path.into() }
    }

    pub(crate) fn format(path: impl Into<String>, message: impl Into<String>) -> Self {
        FhirError::InvalidFormat {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True when the error indicates a server-side defect rather than a bad request.
    pub fn is_defect(&self) -> bool {
        match self {
            FhirError::Invariant(_) => true,
            FhirError::Invalid(errors) => errors.iter().any(FhirError::is_defect),
            _ => false,
        }
    }

    /// Flattens nested [`FhirError::Invalid`] lists into individual problems.
    pub fn problems(&self) -> Vec<&FhirError> {
        match self {
            FhirError::Invalid(errors) => errors.iter().flat_map(FhirError::problems).collect(),
            other => vec![other],
        }
    }
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;

/// Accumulates field-level problems while an inbound document is translated.
#[derive(Debug, Default)]
pub(crate) struct Problems(Vec<FhirError>);

impl Problems {
    /// Records the error of a failed result and returns the value of a successful one.
    pub(crate) fn field<T>(&mut self, result: FhirResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.push(err);
                None
            }
        }
    }

    pub(crate) fn push(&mut self, err: FhirError) {
        match err {
            FhirError::Invalid(errors) => self.0.extend(errors),
            other => self.0.push(other),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Converts the collected problems into a single error.
    pub(crate) fn into_error(mut self) -> FhirError {
        match self.0.len() {
            0 => FhirError::Invariant("translation failed without reporting a problem".into()),
            1 => self.0.remove(0),
            _ => FhirError::Invalid(self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_problem_is_returned_unwrapped() {
        let mut problems = Problems::default();
        assert_eq!(problems.field::<()>(Err(FhirError::required("gender"))), None);
        assert_eq!(problems.into_error(), FhirError::required("gender"));
    }

    #[test]
    fn several_problems_are_flattened_into_invalid() {
        let mut problems = Problems::default();
        problems.push(FhirError::required("gender"));
        problems.push(FhirError::Invalid(vec![
            FhirError::required("birthDate"),
            FhirError::format("start", "bad date"),
        ]));

        let err = problems.into_error();
        match &err {
            FhirError::Invalid(errors) => assert_eq!(errors.len(), 3),
            other => panic!("expected Invalid, got {other:?}"),
        }
        assert_eq!(err.problems().len(), 3);
        assert!(!err.is_defect());
    }

    #[test]
    fn empty_collector_is_an_invariant_violation() {
        assert!(Problems::default().into_error().is_defect());
    }

    #[test]
    fn validation_message_lists_allowed_codes() {
        let err = FhirError::Validation {
            field: "gender".into(),
            value: "robot".into(),
            allowed: &["male", "female"],
        };
        assert_eq!(
            err.to_string(),
            "invalid value 'robot' for gender; expected one of: male, female"
        );
    }
}
