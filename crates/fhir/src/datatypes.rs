//! Shared FHIR datatypes: wire models plus the builders and extractors that map them
//! to the flat internal fields used by the resource translators.
//!
//! Responsibilities:
//! - Define strict wire models for the nested composites (HumanName, Address, ContactPoint,
//!   CodeableConcept, Reference, Period, Quantity, Money, Identifier, Annotation, Extension, Meta)
//! - Build wire values from internal fields, omitting absent sub-fields entirely
//! - Extract internal fields from wire arrays, reading element 0 as the primary entry
//! - Parse and format FHIR `date` and `instant` strings
//!
//! Notes:
//! - `build_*` never emits `null` and never emits an empty array
//! - `extract_*` on an absent or empty array yields defaulted fields; only a problem inside a
//!   present element (bad code, bad format, missing required sub-field) is an error

use crate::error::Problems;
use crate::vocabulary::{
    AddressType, AddressUse, ContactPointSystem, ContactPointUse, NameUse, Vocabulary,
    validate_optional,
};
use crate::{FhirError, FhirResult};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Wire types
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct HumanNameWire {
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub given: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefix: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AddressWire {
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub line: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ContactPointWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CodingWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CodeableConceptWire {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<CodingWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ReferenceWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PeriodWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct QuantityWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct MoneyWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct IdentifierWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AnnotationWire {
    pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ExtensionWire {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_integer: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_boolean: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_money: Option<MoneyWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_reference: Option<ReferenceWire>,
}

/// Resource metadata. Only `lastUpdated` is kept; `versionId` and `profile` from other
/// servers are accepted and dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct MetaWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default, skip_serializing)]
    pub version_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub profile: Vec<String>,
}

// ============================================================================
// Public domain-level types
// ============================================================================

/// A person's preferred name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersonName {
    pub name_use: NameUse,
    pub family: String,
    /// Given names in order. Index 0 is the first name, index 1 the middle name.
    pub given: Vec<String>,
    /// Prefixes in order, e.g. `["Dr.", "Prof."]`.
    pub prefix: Vec<String>,
}

/// Given/middle/family projection of a [`PersonName`], for forms that only know those three.
///
/// Given names past the middle name are kept in `additional` rather than dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NameForm {
    pub given: Option<String>,
    pub middle: Option<String>,
    pub family: String,
    pub additional: Vec<String>,
}

impl PersonName {
    pub fn form(&self) -> NameForm {
        let mut given = self.given.iter().cloned();
        NameForm {
            given: given.next(),
            middle: given.next(),
            family: self.family.clone(),
            additional: given.collect(),
        }
    }

    /// Display text: prefixes, first given name and family name.
    pub fn display(&self) -> String {
        self.prefix
            .iter()
            .chain(self.given.first())
            .chain(std::iter::once(&self.family))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl NameForm {
    /// Restores the ordered given-name sequence.
    pub fn into_given(self) -> Vec<String> {
        self.given
            .into_iter()
            .chain(self.middle)
            .chain(self.additional)
            .collect()
    }
}

/// Fields extracted from the primary `HumanName`, before required-field checks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NameFields {
    pub name_use: Option<NameUse>,
    pub family: Option<String>,
    pub given: Vec<String>,
    pub prefix: Vec<String>,
}

impl NameFields {
    /// Requires a family name and at least one given name. `use` defaults to `official`.
    pub fn into_person_name(self, path: &str) -> FhirResult<PersonName> {
        let mut problems = Problems::default();
        if self.family.is_none() {
            problems.push(FhirError::required(format!("{path}[0].family")));
        }
        if self.given.is_empty() {
            problems.push(FhirError::required(format!("{path}[0].given")));
        }

        match self.family {
            Some(family) if problems.is_empty() => Ok(PersonName {
                name_use: self.name_use.unwrap_or(NameUse::Official),
                family,
                given: self.given,
                prefix: self.prefix,
            }),
            _ => Err(problems.into_error()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PostalAddress {
    pub address_use: Option<AddressUse>,
    pub address_type: Option<AddressType>,
    pub lines: Vec<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Telecom {
    pub system: ContactPointSystem,
    pub value: String,
    pub contact_use: Option<ContactPointUse>,
}

/// First contact point of the given system, e.g. the primary phone number.
pub fn primary_contact(telecom: &[Telecom], system: ContactPointSystem) -> Option<&str> {
    telecom
        .iter()
        .find(|t| t.system == system)
        .map(|t| t.value.as_str())
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Coding {
    pub system: Option<String>,
    pub code: Option<String>,
    pub display: Option<String>,
}

/// A coded value with an optional free-text fallback.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Concept {
    pub codings: Vec<Coding>,
    pub text: Option<String>,
}

impl Concept {
    pub fn text(text: impl Into<String>) -> Self {
        Concept {
            codings: Vec::new(),
            text: Some(text.into()),
        }
    }

    pub fn coded(system: impl Into<String>, code: impl Into<String>, display: Option<String>) -> Self {
        Concept {
            codings: vec![Coding {
                system: Some(system.into()),
                code: Some(code.into()),
                display,
            }],
            text: None,
        }
    }
}

/// A date range where either end may be open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DateSpan {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateSpan {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// A measured amount (FHIR `Quantity`).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Amount {
    pub value: f64,
    pub unit: Option<String>,
    pub system: Option<String>,
    pub code: Option<String>,
}

impl Amount {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Amount {
            value,
            unit: Some(unit.into()),
            system: None,
            code: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Money {
    pub value: f64,
    pub currency: Option<String>,
}

/// A typed extension value (`Extension.value[x]`).
#[derive(Clone, Debug, PartialEq)]
pub enum ExtensionValue {
    String(String),
    Code(String),
    Integer(i64),
    Boolean(bool),
    Date(NaiveDate),
    Money(Money),
    Reference(ReferenceWire),
}

// ============================================================================
// Builders and extractors
// ============================================================================

pub fn build_human_name(name: &PersonName) -> HumanNameWire {
    HumanNameWire {
        use_: Some(name.name_use.code().to_owned()),
        family: Some(name.family.clone()),
        given: name.given.clone(),
        prefix: name.prefix.clone(),
    }
}

/// Extracts the primary (index 0) name.
///
/// An absent or empty array yields default [`NameFields`].
pub fn extract_human_name(names: &[HumanNameWire], path: &str) -> FhirResult<NameFields> {
    let Some(primary) = names.first() else {
        return Ok(NameFields::default());
    };

    Ok(NameFields {
        name_use: validate_optional(&format!("{path}[0].use"), primary.use_.as_deref())?,
        family: primary.family.clone(),
        given: primary.given.clone(),
        prefix: primary.prefix.clone(),
    })
}

pub fn build_addresses(addresses: &[PostalAddress]) -> Vec<AddressWire> {
    addresses
        .iter()
        .map(|a| AddressWire {
            use_: a.address_use.map(|u| u.code().to_owned()),
            type_: a.address_type.map(|t| t.code().to_owned()),
            line: a.lines.clone(),
            city: a.city.clone(),
            state: a.state.clone(),
            postal_code: a.postal_code.clone(),
            country: a.country.clone(),
        })
        .collect()
}

/// Extracts every address in order; index 0 stays the primary address.
pub fn extract_addresses(addresses: &[AddressWire], path: &str) -> FhirResult<Vec<PostalAddress>> {
    let mut problems = Problems::default();
    let mut out = Vec::with_capacity(addresses.len());

    for (i, a) in addresses.iter().enumerate() {
        let address_use = problems.field(validate_optional(
            &format!("{path}[{i}].use"),
            a.use_.as_deref(),
        ));
        let address_type = problems.field(validate_optional(
            &format!("{path}[{i}].type"),
            a.type_.as_deref(),
        ));
        if let (Some(address_use), Some(address_type)) = (address_use, address_type) {
            out.push(PostalAddress {
                address_use,
                address_type,
                lines: a.line.clone(),
                city: a.city.clone(),
                state: a.state.clone(),
                postal_code: a.postal_code.clone(),
                country: a.country.clone(),
            });
        }
    }

    if problems.is_empty() {
        Ok(out)
    } else {
        Err(problems.into_error())
    }
}

pub fn build_telecom(telecom: &[Telecom]) -> Vec<ContactPointWire> {
    telecom
        .iter()
        .map(|t| ContactPointWire {
            system: Some(t.system.code().to_owned()),
            value: Some(t.value.clone()),
            use_: t.contact_use.map(|u| u.code().to_owned()),
        })
        .collect()
}

/// Extracts every contact point in order. A present contact point needs both `system` and `value`.
pub fn extract_telecom(telecom: &[ContactPointWire], path: &str) -> FhirResult<Vec<Telecom>> {
    let mut problems = Problems::default();
    let mut out = Vec::with_capacity(telecom.len());

    for (i, t) in telecom.iter().enumerate() {
        let system = match t.system.as_deref() {
            Some(code) => problems.field(ContactPointSystem::parse(&format!("{path}[{i}].system"), code)),
            None => {
                problems.push(FhirError::required(format!("{path}[{i}].system")));
                None
            }
        };
        let value = t.value.clone();
        if value.is_none() {
            problems.push(FhirError::required(format!("{path}[{i}].value")));
        }
        let contact_use = problems.field(validate_optional(
            &format!("{path}[{i}].use"),
            t.use_.as_deref(),
        ));

        if let (Some(system), Some(value), Some(contact_use)) = (system, value, contact_use) {
            out.push(Telecom {
                system,
                value,
                contact_use,
            });
        }
    }

    if problems.is_empty() {
        Ok(out)
    } else {
        Err(problems.into_error())
    }
}

pub fn build_concept(concept: &Concept) -> CodeableConceptWire {
    CodeableConceptWire {
        coding: concept
            .codings
            .iter()
            .map(|c| CodingWire {
                system: c.system.clone(),
                code: c.code.clone(),
                display: c.display.clone(),
            })
            .collect(),
        text: concept.text.clone(),
    }
}

pub fn extract_concept(wire: &CodeableConceptWire) -> Concept {
    Concept {
        codings: wire
            .coding
            .iter()
            .map(|c| Coding {
                system: c.system.clone(),
                code: c.code.clone(),
                display: c.display.clone(),
            })
            .collect(),
        text: wire.text.clone(),
    }
}

/// Builds a single-element concept array, or an empty one when `concept` is absent.
pub fn build_concepts(concept: Option<&Concept>) -> Vec<CodeableConceptWire> {
    concept.map(build_concept).into_iter().collect()
}

pub fn extract_first_concept(concepts: &[CodeableConceptWire]) -> Option<Concept> {
    concepts.first().map(extract_concept)
}

/// Builds `[{ "text": ... }]` for free-text concepts.
pub fn build_text_concepts(text: Option<&str>) -> Vec<CodeableConceptWire> {
    text.map(|t| CodeableConceptWire {
        coding: Vec::new(),
        text: Some(t.to_owned()),
    })
    .into_iter()
    .collect()
}

/// Reads the text of the first concept, falling back to its first coding's display.
pub fn extract_text(concepts: &[CodeableConceptWire]) -> Option<String> {
    concepts.first().and_then(concept_text)
}

pub fn concept_text(concept: &CodeableConceptWire) -> Option<String> {
    concept
        .text
        .clone()
        .or_else(|| concept.coding.first().and_then(|c| c.display.clone()))
}

pub fn build_period(span: &DateSpan) -> Option<PeriodWire> {
    if span.is_empty() {
        return None;
    }
    Some(PeriodWire {
        start: span.start.map(format_date),
        end: span.end.map(format_date),
    })
}

pub fn extract_period(period: Option<&PeriodWire>, path: &str) -> FhirResult<DateSpan> {
    let Some(period) = period else {
        return Ok(DateSpan::default());
    };

    let mut problems = Problems::default();
    let start = problems.field(
        period
            .start
            .as_deref()
            .map(|s| parse_date(&format!("{path}.start"), s))
            .transpose(),
    );
    let end = problems.field(
        period
            .end
            .as_deref()
            .map(|s| parse_date(&format!("{path}.end"), s))
            .transpose(),
    );

    match (start, end) {
        (Some(start), Some(end)) if problems.is_empty() => Ok(DateSpan { start, end }),
        _ => Err(problems.into_error()),
    }
}

pub fn build_quantity(amount: &Amount) -> QuantityWire {
    QuantityWire {
        value: Some(amount.value),
        unit: amount.unit.clone(),
        system: amount.system.clone(),
        code: amount.code.clone(),
    }
}

pub fn extract_quantity(wire: &QuantityWire, path: &str) -> FhirResult<Amount> {
    let value = wire
        .value
        .ok_or_else(|| FhirError::required(format!("{path}.value")))?;
    Ok(Amount {
        value,
        unit: wire.unit.clone(),
        system: wire.system.clone(),
        code: wire.code.clone(),
    })
}

pub fn build_money(money: &Money) -> MoneyWire {
    MoneyWire {
        value: Some(money.value),
        currency: money.currency.clone(),
    }
}

pub fn extract_money(wire: &MoneyWire, path: &str) -> FhirResult<Money> {
    let value = wire
        .value
        .ok_or_else(|| FhirError::required(format!("{path}.value")))?;
    Ok(Money {
        value,
        currency: wire.currency.clone(),
    })
}

pub fn build_identifier(system: &str, value: &str) -> IdentifierWire {
    IdentifierWire {
        system: Some(system.to_owned()),
        value: Some(value.to_owned()),
    }
}

/// Value of the first identifier issued by `system`.
pub fn find_identifier(identifiers: &[IdentifierWire], system: &str) -> Option<String> {
    identifiers
        .iter()
        .find(|i| i.system.as_deref() == Some(system))
        .and_then(|i| i.value.clone())
}

pub fn build_annotations(notes: &[String]) -> Vec<AnnotationWire> {
    notes
        .iter()
        .map(|text| AnnotationWire { text: text.clone() })
        .collect()
}

pub fn extract_annotations(notes: &[AnnotationWire]) -> Vec<String> {
    notes.iter().map(|n| n.text.clone()).collect()
}

pub fn build_extension(url: &str, value: ExtensionValue) -> ExtensionWire {
    let mut wire = ExtensionWire {
        url: url.to_owned(),
        ..ExtensionWire::default()
    };
    match value {
        ExtensionValue::String(s) => wire.value_string = Some(s),
        ExtensionValue::Code(c) => wire.value_code = Some(c),
        ExtensionValue::Integer(i) => wire.value_integer = Some(i),
        ExtensionValue::Boolean(b) => wire.value_boolean = Some(b),
        ExtensionValue::Date(d) => wire.value_date = Some(format_date(d)),
        ExtensionValue::Money(m) => wire.value_money = Some(build_money(&m)),
        ExtensionValue::Reference(r) => wire.value_reference = Some(r),
    }
    wire
}

/// Value of the first extension with `url`. More than one populated `value[x]` is rejected.
pub fn extension_value(
    extensions: &[ExtensionWire],
    url: &str,
    path: &str,
) -> FhirResult<Option<ExtensionValue>> {
    let Some((i, ext)) = extensions.iter().enumerate().find(|(_, e)| e.url == url) else {
        return Ok(None);
    };

    let value_date = ext
        .value_date
        .as_deref()
        .map(|d| parse_date(&format!("{path}[{i}].valueDate"), d))
        .transpose()?;
    let value_money = ext
        .value_money
        .as_ref()
        .map(|m| extract_money(m, &format!("{path}[{i}].valueMoney")))
        .transpose()?;

    choose_variant(
        &format!("{path}[{i}].value[x]"),
        vec![
            ("valueString", ext.value_string.clone().map(ExtensionValue::String)),
            ("valueCode", ext.value_code.clone().map(ExtensionValue::Code)),
            ("valueInteger", ext.value_integer.map(ExtensionValue::Integer)),
            ("valueBoolean", ext.value_boolean.map(ExtensionValue::Boolean)),
            ("valueDate", value_date.map(ExtensionValue::Date)),
            ("valueMoney", value_money.map(ExtensionValue::Money)),
            (
                "valueReference",
                ext.value_reference.clone().map(ExtensionValue::Reference),
            ),
        ],
    )
}

/// Position of the first extension with `url`, as a document path.
pub(crate) fn extension_path(extensions: &[ExtensionWire], url: &str) -> String {
    let index = extensions.iter().position(|e| e.url == url).unwrap_or(0);
    format!("extension[{index}]")
}

/// Reads the extension at `url` and narrows its value with `pick`.
///
/// # Errors
///
/// Returns [`FhirError::Schema`] naming `expected` when the extension carries another
/// `value[x]` type.
pub(crate) fn typed_extension<T>(
    extensions: &[ExtensionWire],
    url: &str,
    expected: &str,
    pick: impl FnOnce(ExtensionValue) -> Option<T>,
) -> FhirResult<Option<T>> {
    let Some(value) = extension_value(extensions, url, "extension")? else {
        return Ok(None);
    };
    pick(value).map(Some).ok_or_else(|| FhirError::Schema {
        path: extension_path(extensions, url),
        message: format!("extension {url} must carry {expected}"),
    })
}

/// Reads a `valueCode` extension and validates the code against vocabulary `V`.
pub(crate) fn coded_extension<V: Vocabulary>(
    extensions: &[ExtensionWire],
    url: &str,
) -> FhirResult<Option<V>> {
    let code = typed_extension(extensions, url, "valueCode", |value| match value {
        ExtensionValue::Code(code) => Some(code),
        _ => None,
    })?;
    code.map(|code| V::parse(&format!("{}.valueCode", extension_path(extensions, url)), &code))
        .transpose()
}

/// Picks the single populated variant of a FHIR choice type (`value[x]`).
///
/// Returns `Ok(None)` when no variant is present.
///
/// # Errors
///
/// Returns [`FhirError::MultipleValueVariants`] when more than one variant is populated.
pub(crate) fn choose_variant<T>(
    field: &str,
    variants: Vec<(&str, Option<T>)>,
) -> FhirResult<Option<T>> {
    let mut present: Vec<(&str, T)> = variants
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect();

    if present.len() > 1 {
        return Err(FhirError::MultipleValueVariants {
            field: field.to_owned(),
            variants: present.iter().map(|(name, _)| (*name).to_owned()).collect(),
        });
    }
    Ok(present.pop().map(|(_, value)| value))
}

// ============================================================================
// Dates and instants
// ============================================================================

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parses a FHIR `date`. A full `dateTime` is accepted and truncated to its date part.
pub fn parse_date(path: &str, value: &str) -> FhirResult<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.date_naive())
        .map_err(|_| FhirError::format(path, format!("'{value}' is not a date (YYYY-MM-DD)")))
}

pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parses a FHIR `instant`. A timezone offset is required; the result is normalised to UTC.
pub fn parse_instant(path: &str, value: &str) -> FhirResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            FhirError::format(
                path,
                format!("'{value}' is not an instant (RFC 3339 with timezone)"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn john_doe() -> PersonName {
        PersonName {
            name_use: NameUse::Official,
            family: "Doe".into(),
            given: vec!["John".into()],
            prefix: Vec::new(),
        }
    }

    #[test]
    fn human_name_without_middle_name_has_single_given() {
        let wire = build_human_name(&john_doe());
        let value = serde_json::to_value(&wire).expect("serialise");
        assert_eq!(
            value,
            json!({ "use": "official", "family": "Doe", "given": ["John"] })
        );
    }

    #[test]
    fn human_name_with_no_given_omits_the_array() {
        let mut name = john_doe();
        name.given.clear();
        let value = serde_json::to_value(build_human_name(&name)).expect("serialise");
        assert!(value.get("given").is_none());
        assert!(value.get("prefix").is_none());
    }

    #[test]
    fn extract_name_from_empty_array_is_default() {
        let fields = extract_human_name(&[], "name").expect("absent is not an error");
        assert_eq!(fields, NameFields::default());
    }

    #[test]
    fn extract_name_reads_primary_only() {
        let names = vec![
            HumanNameWire {
                use_: Some("usual".into()),
                family: Some("Doe".into()),
                given: vec!["Johnny".into()],
                prefix: vec![],
            },
            HumanNameWire {
                use_: Some("old".into()),
                family: Some("Smith".into()),
                given: vec!["John".into()],
                prefix: vec![],
            },
        ];
        let fields = extract_human_name(&names, "name").expect("valid");
        assert_eq!(fields.name_use, Some(NameUse::Usual));
        assert_eq!(fields.family.as_deref(), Some("Doe"));
    }

    #[test]
    fn extract_name_rejects_unknown_use() {
        let names = vec![HumanNameWire {
            use_: Some("formal".into()),
            ..HumanNameWire::default()
        }];
        match extract_human_name(&names, "name") {
            Err(FhirError::Validation { field, value, .. }) => {
                assert_eq!(field, "name[0].use");
                assert_eq!(value, "formal");
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn missing_family_and_given_are_both_reported() {
        let err = NameFields::default()
            .into_person_name("name")
            .expect_err("both required");
        assert_eq!(
            err,
            FhirError::Invalid(vec![
                FhirError::required("name[0].family"),
                FhirError::required("name[0].given"),
            ])
        );
    }

    #[test]
    fn name_form_keeps_extra_given_names() {
        let name = PersonName {
            given: vec!["John".into(), "Michael".into(), "Paul".into(), "George".into()],
            ..john_doe()
        };
        let form = name.form();
        assert_eq!(form.given.as_deref(), Some("John"));
        assert_eq!(form.middle.as_deref(), Some("Michael"));
        assert_eq!(form.additional, vec!["Paul".to_string(), "George".to_string()]);
        assert_eq!(form.into_given(), name.given);
    }

    #[test]
    fn display_joins_prefix_first_and_family() {
        let mut name = john_doe();
        assert_eq!(name.display(), "John Doe");
        name.prefix = vec!["Dr.".into()];
        assert_eq!(name.display(), "Dr. John Doe");
    }

    #[test]
    fn every_prefix_is_kept() {
        let names = vec![HumanNameWire {
            use_: None,
            family: Some("Smith".into()),
            given: vec!["Alice".into()],
            prefix: vec!["Dr.".into(), "Prof.".into()],
        }];
        let fields = extract_human_name(&names, "name").expect("valid");
        assert_eq!(fields.prefix, vec!["Dr.".to_string(), "Prof.".to_string()]);

        let name = fields.into_person_name("name").expect("complete name");
        assert_eq!(name.display(), "Dr. Prof. Alice Smith");
        assert_eq!(build_human_name(&name).prefix, names[0].prefix);
    }

    #[test]
    fn foreign_meta_keys_are_accepted_and_not_echoed() {
        let wire: MetaWire = serde_json::from_value(json!({
            "versionId": "3",
            "lastUpdated": "2024-05-01T12:00:00Z",
            "profile": ["http://hl7.org/fhir/StructureDefinition/Patient"]
        }))
        .expect("standard meta keys");
        assert_eq!(wire.last_updated.as_deref(), Some("2024-05-01T12:00:00Z"));

        let value = serde_json::to_value(&wire).expect("serialise");
        assert_eq!(value, json!({ "lastUpdated": "2024-05-01T12:00:00Z" }));

        assert!(serde_json::from_value::<MetaWire>(json!({ "source": "x" })).is_err());
    }

    #[test]
    fn typed_extensions_check_the_value_type() {
        let extensions = vec![
            build_extension("http://example.org/due", ExtensionValue::Date(
                NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date"),
            )),
            build_extension("http://example.org/severity", ExtensionValue::Code("severe".into())),
        ];

        let due = typed_extension(&extensions, "http://example.org/due", "valueDate", |v| match v {
            ExtensionValue::Date(d) => Some(d),
            _ => None,
        })
        .expect("date extension");
        assert_eq!(due, NaiveDate::from_ymd_opt(2024, 6, 1));

        let err = typed_extension(&extensions, "http://example.org/severity", "valueDate", |v| {
            match v {
                ExtensionValue::Date(d) => Some(d),
                _ => None,
            }
        })
        .expect_err("code is not a date");
        assert!(matches!(err, FhirError::Schema { path, .. } if path == "extension[1]"));

        let err = coded_extension::<NameUse>(&extensions, "http://example.org/severity")
            .expect_err("not a name use");
        assert!(
            matches!(err, FhirError::Validation { field, .. } if field == "extension[1].valueCode")
        );
    }

    #[test]
    fn telecom_requires_system_and_value() {
        let wire = vec![ContactPointWire::default()];
        let err = extract_telecom(&wire, "telecom").expect_err("missing fields");
        assert_eq!(err.problems().len(), 2);
    }

    #[test]
    fn telecom_round_trips_in_order() {
        let telecom = vec![
            Telecom {
                system: ContactPointSystem::Phone,
                value: "+44 20 7946 0000".into(),
                contact_use: Some(ContactPointUse::Home),
            },
            Telecom {
                system: ContactPointSystem::Email,
                value: "john@example.org".into(),
                contact_use: None,
            },
        ];
        let back = extract_telecom(&build_telecom(&telecom), "telecom").expect("valid");
        assert_eq!(back, telecom);
        assert_eq!(
            primary_contact(&back, ContactPointSystem::Email),
            Some("john@example.org")
        );
    }

    #[test]
    fn address_errors_carry_index() {
        let wire = vec![
            AddressWire::default(),
            AddressWire {
                use_: Some("holiday".into()),
                ..AddressWire::default()
            },
        ];
        match extract_addresses(&wire, "address") {
            Err(FhirError::Validation { field, .. }) => assert_eq!(field, "address[1].use"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn empty_period_is_omitted() {
        assert_eq!(build_period(&DateSpan::default()), None);
        assert_eq!(
            extract_period(None, "validityPeriod").expect("absent ok"),
            DateSpan::default()
        );
    }

    #[test]
    fn period_reports_bad_dates() {
        let wire = PeriodWire {
            start: Some("yesterday".into()),
            end: Some("2024-13-01".into()),
        };
        let err = extract_period(Some(&wire), "effectivePeriod").expect_err("bad dates");
        assert_eq!(err.problems().len(), 2);
    }

    #[test]
    fn date_accepts_datetime_and_truncates() {
        let date = parse_date("birthDate", "1990-01-01T08:30:00Z").expect("datetime accepted");
        assert_eq!(format_date(date), "1990-01-01");
    }

    #[test]
    fn instant_normalises_to_utc() {
        let instant = parse_instant("start", "2024-03-01T10:00:00+01:00").expect("valid");
        assert_eq!(format_instant(instant), "2024-03-01T09:00:00Z");
        assert!(parse_instant("start", "2024-03-01T10:00:00").is_err());
    }

    #[test]
    fn quantity_requires_value() {
        let err = extract_quantity(&QuantityWire::default(), "valueQuantity").expect_err("no value");
        assert_eq!(err, FhirError::required("valueQuantity.value"));
    }

    #[test]
    fn extension_with_two_values_is_ambiguous() {
        let ext = ExtensionWire {
            url: "http://example.org/years".into(),
            value_string: Some("ten".into()),
            value_integer: Some(10),
            ..ExtensionWire::default()
        };
        match extension_value(&[ext], "http://example.org/years", "extension") {
            Err(FhirError::MultipleValueVariants { field, variants }) => {
                assert_eq!(field, "extension[0].value[x]");
                assert_eq!(variants, vec!["valueString", "valueInteger"]);
            }
            other => panic!("expected MultipleValueVariants, got {other:?}"),
        }
    }

    #[test]
    fn text_concepts_fall_back_to_display() {
        assert!(build_text_concepts(None).is_empty());
        let coded = vec![CodeableConceptWire {
            coding: vec![CodingWire {
                system: None,
                code: Some("X".into()),
                display: Some("Check-up".into()),
            }],
            text: None,
        }];
        assert_eq!(extract_text(&coded).as_deref(), Some("Check-up"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_value::<ReferenceWire>(json!({
            "reference": "Patient/p1",
            "identifier": {}
        }));
        assert!(result.is_err());
    }
}
