use anyhow::Context;
use clap::{Parser, Subcommand};
use fhir::vocabulary::tables;
use fhir::{
    parse_reference, Appointment, FhirResource, FhirResult, Invoice, MedicationRequest,
    NoDisplayNames, Observation, OperationOutcome, Patient, Practitioner, ResourceType,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "medrec")]
#[command(about = "medrec FHIR translation CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a FHIR document translates; prints an OperationOutcome when it does not
    Validate {
        /// Resource type, e.g. Patient
        kind: ResourceType,
        /// JSON or YAML (.yaml/.yml) file
        file: PathBuf,
    },
    /// Translate a FHIR document in and back out, printing the canonical JSON
    Normalise {
        /// Resource type, e.g. Patient
        kind: ResourceType,
        /// JSON or YAML (.yaml/.yml) file
        file: PathBuf,
    },
    /// Split a reference such as Patient/123
    Reference {
        reference: String,
    },
    /// List the accepted codes of every vocabulary
    Codes {
        /// Only show this vocabulary
        name: Option<String>,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Validate { kind, file }) => {
            let document = load_document(&file)?;
            match round_trip(kind, &document)? {
                Ok(_) => println!("{}: valid {kind}", file.display()),
                Err(err) => {
                    let outcome = OperationOutcome::from_error(&err);
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Some(Commands::Normalise { kind, file }) => {
            let document = load_document(&file)?;
            match round_trip(kind, &document)? {
                Ok(normalised) => println!("{}", serde_json::to_string_pretty(&normalised)?),
                Err(err) => {
                    eprintln!("Error normalising {}: {}", file.display(), err);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Some(Commands::Reference { reference }) => match parse_reference(&reference) {
            Ok(parsed) => {
                let served = parsed
                    .resource_type
                    .parse::<ResourceType>()
                    .map(ResourceType::is_translated)
                    .unwrap_or(false);
                println!("type: {}", parsed.resource_type);
                println!("id: {}", parsed.id);
                println!("served: {}", if served { "yes" } else { "no" });
            }
            Err(err) => {
                eprintln!("Error: {err}");
                return Ok(ExitCode::FAILURE);
            }
        },
        Some(Commands::Codes { name }) => {
            let selected: Vec<_> = tables()
                .into_iter()
                .filter(|(table, _)| name.as_deref().map_or(true, |n| n == *table))
                .collect();
            if selected.is_empty() {
                eprintln!("No vocabulary named {}", name.unwrap_or_default());
                return Ok(ExitCode::FAILURE);
            }
            for (table, codes) in selected {
                println!("{table}: {}", codes.join(", "));
            }
        }
        None => {
            println!("Use 'medrec --help' for commands");
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Reads a document, as YAML when the extension says so and as JSON otherwise.
fn load_document(path: &Path) -> anyhow::Result<Value> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_document(path, &text).with_context(|| format!("parsing {}", path.display()))
}

fn parse_document(path: &Path, text: &str) -> anyhow::Result<Value> {
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    if is_yaml {
        Ok(serde_yaml::from_str(text)?)
    } else {
        Ok(serde_json::from_str(text)?)
    }
}

/// Translates `document` inbound and back out.
///
/// The outer error is for kinds without a translator; the inner result is the translation.
fn round_trip(kind: ResourceType, document: &Value) -> anyhow::Result<FhirResult<Value>> {
    Ok(match kind {
        ResourceType::Patient => normalise::<Patient>(document),
        ResourceType::Practitioner => normalise::<Practitioner>(document),
        ResourceType::Appointment => normalise::<Appointment>(document),
        ResourceType::MedicationRequest => normalise::<MedicationRequest>(document),
        ResourceType::Observation => normalise::<Observation>(document),
        ResourceType::Invoice => normalise::<Invoice>(document),
        other => anyhow::bail!("{other} is a reference target only and has no translator"),
    })
}

fn normalise<K: FhirResource>(document: &Value) -> FhirResult<Value> {
    let record = K::from_fhir(document)?;
    K::to_fhir(&record, &NoDisplayNames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn yaml_files_are_read_as_yaml() {
        let yaml = "resourceType: Patient\ngender: female\n";
        let value = parse_document(Path::new("patient.yml"), yaml).expect("yaml parses");
        assert_eq!(value, json!({ "resourceType": "Patient", "gender": "female" }));
    }

    #[test]
    fn other_files_are_read_as_json() {
        let err = parse_document(Path::new("patient.txt"), "resourceType: Patient");
        assert!(err.is_err());
    }

    #[test]
    fn normalise_fills_defaults() {
        let document = json!({
            "resourceType": "Patient",
            "name": [{ "family": "Doe", "given": ["John"] }],
            "gender": "male",
            "birthDate": "1980-05-01"
        });
        let normalised = round_trip(ResourceType::Patient, &document)
            .expect("translatable kind")
            .expect("valid patient");
        assert_eq!(normalised["active"], true);
        assert_eq!(normalised["name"][0]["use"], "official");
    }

    #[test]
    fn reference_only_kinds_have_no_translator() {
        let document = json!({ "resourceType": "Medication" });
        assert!(round_trip(ResourceType::Medication, &document).is_err());
    }
}
