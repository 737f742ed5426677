//! OperationOutcome bodies for rejected requests.
//!
//! A translation error is flattened into one issue per field-level problem, each carrying
//! the offending path in `expression`, so a client can fix everything in one resubmission.

use crate::FhirError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct OperationOutcome {
    pub resource_type: String,
    pub issue: Vec<OutcomeIssue>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct OutcomeIssue {
    pub severity: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expression: Vec<String>,
    pub diagnostics: String,
}

impl OperationOutcome {
    /// A single-issue outcome with severity `error`.
    pub fn error(code: &str, diagnostics: impl Into<String>) -> Self {
        OperationOutcome {
            resource_type: "OperationOutcome".to_owned(),
            issue: vec![OutcomeIssue {
                severity: "error".to_owned(),
                code: code.to_owned(),
                expression: Vec::new(),
                diagnostics: diagnostics.into(),
            }],
        }
    }

    pub fn from_error(err: &FhirError) -> Self {
        OperationOutcome {
            resource_type: "OperationOutcome".to_owned(),
            issue: err.problems().into_iter().map(issue).collect(),
        }
    }
}

fn issue(problem: &FhirError) -> OutcomeIssue {
    let (severity, code, expression) = match problem {
        FhirError::TypeMismatch { .. } => ("error", "invalid", Some("resourceType")),
        FhirError::RequiredField { path } => ("error", "required", Some(path.as_str())),
        FhirError::Validation { field, .. } => ("error", "code-invalid", Some(field.as_str())),
        FhirError::MalformedReference { path, .. } => ("error", "value", Some(path.as_str())),
        FhirError::MultipleValueVariants { field, .. } => {
            ("error", "invariant", Some(field.as_str()))
        }
        FhirError::Schema { path, .. } => ("error", "structure", Some(path.as_str())),
        FhirError::InvalidFormat { path, .. } => ("error", "value", Some(path.as_str())),
        FhirError::Invariant(_) => ("fatal", "exception", None),
        FhirError::Invalid(_) => ("error", "invalid", None),
    };

    OutcomeIssue {
        severity: severity.to_owned(),
        code: code.to_owned(),
        expression: expression.map(str::to_owned).into_iter().collect(),
        diagnostics: problem.to_string(),
    }
}
