//! FHIR-aligned invoice wire model and translation.
//!
//! Responsibilities:
//! - Define the flat domain-level invoice record
//! - Carry the invoice number as an identifier keyed by [`INVOICE_NUMBER_SYSTEM`]
//! - Translate each line item's `chargeItem[x]` choice into a tagged [`ChargeItem`]
//! - Carry the billed appointment, due/service/payment dates, amount paid and payment
//!   method as extensions
//!
//! The service billed for is a line item's coded charge: its `text` is the service
//! description and its coding the service code (CPT, HCPCS).

use crate::datatypes::{
    build_annotations, build_concept, build_extension, build_identifier, build_money,
    choose_variant, extension_path, extract_annotations, extract_concept, extract_money,
    find_identifier, format_date, parse_date, typed_extension, AnnotationWire,
    CodeableConceptWire, Concept, ExtensionValue, ExtensionWire, IdentifierWire, MetaWire, Money,
    MoneyWire, ReferenceWire,
};
use crate::error::Problems;
use crate::reference::{make_reference, required_reference, DisplayNames, ResourceType};
use crate::resource::{
    build_meta, decode, encode, extract_meta, finish, required_code, FhirResource, RecordMeta,
};
use crate::vocabulary::{InvoiceStatus, PriceComponentType, Vocabulary};
use crate::{FhirError, FhirResult};
use chrono::NaiveDate;
use medrec_types::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier system for invoice numbers.
pub const INVOICE_NUMBER_SYSTEM: &str = "http://hospital.example.org/fhir/invoice-number";

pub const APPOINTMENT_URL: &str =
    "http://hospital.example.org/fhir/StructureDefinition/invoice-appointment";
pub const DUE_DATE_URL: &str = "http://hospital.example.org/fhir/StructureDefinition/invoice-due-date";
pub const SERVICE_DATE_URL: &str =
    "http://hospital.example.org/fhir/StructureDefinition/invoice-service-date";
pub const PAYMENT_DATE_URL: &str =
    "http://hospital.example.org/fhir/StructureDefinition/invoice-payment-date";
pub const AMOUNT_PAID_URL: &str =
    "http://hospital.example.org/fhir/StructureDefinition/invoice-amount-paid";
pub const PAYMENT_METHOD_URL: &str =
    "http://hospital.example.org/fhir/StructureDefinition/invoice-payment-method";

// ============================================================================
// Public domain-level types
// ============================================================================

/// What a line item charges for (`chargeItem[x]`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChargeItem {
    /// A stored ChargeItem resource.
    Reference(RecordId),
    /// An inline billing code, e.g. a CPT code.
    Coded(Concept),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PriceComponent {
    pub kind: PriceComponentType,
    pub amount: Option<Money>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InvoiceLine {
    pub sequence: Option<u32>,
    pub charge_item: ChargeItem,
    pub price_components: Vec<PriceComponent>,
}

impl InvoiceLine {
    /// The coded service this line bills for, if it is not a stored ChargeItem.
    pub fn service(&self) -> Option<&Concept> {
        match &self.charge_item {
            ChargeItem::Coded(concept) => Some(concept),
            ChargeItem::Reference(_) => None,
        }
    }
}

/// Domain-level carrier for invoice data (flat structure).
#[derive(Clone, Debug, PartialEq)]
pub struct InvoiceData {
    pub meta: RecordMeta,
    pub status: InvoiceStatus,
    pub invoice_number: Option<String>,
    pub patient: RecordId,
    /// The appointment being billed.
    pub appointment: Option<RecordId>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub service_date: Option<NaiveDate>,
    pub line_items: Vec<InvoiceLine>,
    pub total_net: Option<Money>,
    pub total_gross: Option<Money>,
    pub amount_paid: Option<Money>,
    pub payment_method: Option<String>,
    pub payment_date: Option<NaiveDate>,
    pub payment_terms: Option<String>,
    pub notes: Vec<String>,
}

impl InvoiceData {
    /// Sum of every `tax` price component across all line items.
    pub fn tax_total(&self) -> f64 {
        self.line_items
            .iter()
            .flat_map(|line| &line.price_components)
            .filter(|c| c.kind == PriceComponentType::Tax)
            .filter_map(|c| c.amount.as_ref())
            .map(|m| m.value)
            .sum()
    }

    /// Gross total less the amount paid, in the gross total's currency.
    pub fn balance_due(&self) -> Money {
        Money {
            value: self.gross_value() - self.paid_value(),
            currency: self.total_gross.as_ref().and_then(|m| m.currency.clone()),
        }
    }

    pub fn is_paid(&self) -> bool {
        self.paid_value() >= self.gross_value()
    }

    /// Unpaid after the due date. An invoice without a due date is never overdue.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.due_date.is_some_and(|due| today > due) && !self.is_paid()
    }

    fn gross_value(&self) -> f64 {
        self.total_gross.as_ref().map_or(0.0, |m| m.value)
    }

    fn paid_value(&self) -> f64 {
        self.amount_paid.as_ref().map_or(0.0, |m| m.value)
    }
}

// ============================================================================
// Public Invoice operations
// ============================================================================

/// Invoice resource operations.
pub struct Invoice;

impl FhirResource for Invoice {
    type Record = InvoiceData;

    const RESOURCE_TYPE: ResourceType = ResourceType::Invoice;

    fn to_fhir(record: &InvoiceData, names: &dyn DisplayNames) -> FhirResult<Value> {
        encode(&domain_to_wire(record, names), Self::RESOURCE_TYPE)
    }

    fn from_fhir(document: &Value) -> FhirResult<InvoiceData> {
        let wire: InvoiceWire = decode(document, Self::RESOURCE_TYPE)?;
        finish(Self::RESOURCE_TYPE, wire_to_domain(wire))
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct InvoiceWire {
    resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<MetaWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    extension: Vec<ExtensionWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    identifier: Vec<IdentifierWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<ReferenceWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    line_item: Vec<LineItemWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    total_net: Option<MoneyWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    total_gross: Option<MoneyWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    payment_terms: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    note: Vec<AnnotationWire>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct LineItemWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    charge_item_reference: Option<ReferenceWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    charge_item_codeable_concept: Option<CodeableConceptWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    price_component: Vec<PriceComponentWire>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct PriceComponentWire {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    type_: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<MoneyWire>,
}

enum ChargeItemChoice<'a> {
    Reference(&'a ReferenceWire),
    Coded(&'a CodeableConceptWire),
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn domain_to_wire(record: &InvoiceData, names: &dyn DisplayNames) -> InvoiceWire {
    InvoiceWire {
        resource_type: Invoice::RESOURCE_TYPE.as_str().to_owned(),
        id: record.meta.id.as_ref().map(ToString::to_string),
        meta: build_meta(&record.meta),
        extension: build_extensions(record, names),
        identifier: record
            .invoice_number
            .iter()
            .map(|n| build_identifier(INVOICE_NUMBER_SYSTEM, n))
            .collect(),
        status: Some(record.status.code().to_owned()),
        subject: Some(make_reference(ResourceType::Patient, &record.patient, names)),
        date: record.issue_date.map(format_date),
        line_item: record
            .line_items
            .iter()
            .map(|line| build_line_item(line, names))
            .collect(),
        total_net: record.total_net.as_ref().map(build_money),
        total_gross: record.total_gross.as_ref().map(build_money),
        payment_terms: record.payment_terms.clone(),
        note: build_annotations(&record.notes),
    }
}

fn build_extensions(record: &InvoiceData, names: &dyn DisplayNames) -> Vec<ExtensionWire> {
    let mut extension = Vec::new();
    if let Some(appointment) = &record.appointment {
        extension.push(build_extension(
            APPOINTMENT_URL,
            ExtensionValue::Reference(make_reference(ResourceType::Appointment, appointment, names)),
        ));
    }
    let dates = [
        (DUE_DATE_URL, record.due_date),
        (SERVICE_DATE_URL, record.service_date),
        (PAYMENT_DATE_URL, record.payment_date),
    ];
    for (url, date) in dates {
        if let Some(date) = date {
            extension.push(build_extension(url, ExtensionValue::Date(date)));
        }
    }
    if let Some(paid) = &record.amount_paid {
        extension.push(build_extension(AMOUNT_PAID_URL, ExtensionValue::Money(paid.clone())));
    }
    if let Some(method) = &record.payment_method {
        extension.push(build_extension(
            PAYMENT_METHOD_URL,
            ExtensionValue::String(method.clone()),
        ));
    }
    extension
}

fn date_extension(extensions: &[ExtensionWire], url: &str) -> FhirResult<Option<NaiveDate>> {
    typed_extension(extensions, url, "valueDate", |value| match value {
        ExtensionValue::Date(date) => Some(date),
        _ => None,
    })
}

fn extract_appointment(extensions: &[ExtensionWire]) -> FhirResult<Option<RecordId>> {
    let reference = typed_extension(extensions, APPOINTMENT_URL, "valueReference", |value| {
        match value {
            ExtensionValue::Reference(reference) => Some(reference),
            _ => None,
        }
    })?;
    reference
        .map(|reference| {
            let path = format!("{}.valueReference", extension_path(extensions, APPOINTMENT_URL));
            required_reference(Some(&reference), ResourceType::Appointment, &path)
        })
        .transpose()
}

fn build_line_item(line: &InvoiceLine, names: &dyn DisplayNames) -> LineItemWire {
    let (charge_item_reference, charge_item_codeable_concept) = match &line.charge_item {
        ChargeItem::Reference(id) => (Some(make_reference(ResourceType::ChargeItem, id, names)), None),
        ChargeItem::Coded(concept) => (None, Some(build_concept(concept))),
    };

    LineItemWire {
        sequence: line.sequence,
        charge_item_reference,
        charge_item_codeable_concept,
        price_component: line
            .price_components
            .iter()
            .map(|c| PriceComponentWire {
                type_: Some(c.kind.code().to_owned()),
                amount: c.amount.as_ref().map(build_money),
            })
            .collect(),
    }
}

fn wire_to_domain(wire: InvoiceWire) -> FhirResult<InvoiceData> {
    let mut problems = Problems::default();

    let meta = problems.field(extract_meta(wire.id.as_deref(), wire.meta.as_ref()));
    let status = problems.field(required_code(wire.status.as_deref(), "status"));
    let patient = problems.field(required_reference(
        wire.subject.as_ref(),
        ResourceType::Patient,
        "subject",
    ));
    let issue_date = problems.field(wire.date.as_deref().map(|d| parse_date("date", d)).transpose());
    let appointment = problems.field(extract_appointment(&wire.extension));
    let due_date = problems.field(date_extension(&wire.extension, DUE_DATE_URL));
    let service_date = problems.field(date_extension(&wire.extension, SERVICE_DATE_URL));
    let payment_date = problems.field(date_extension(&wire.extension, PAYMENT_DATE_URL));
    let amount_paid = problems.field(typed_extension(
        &wire.extension,
        AMOUNT_PAID_URL,
        "valueMoney",
        |value| match value {
            ExtensionValue::Money(money) => Some(money),
            _ => None,
        },
    ));
    let payment_method = problems.field(typed_extension(
        &wire.extension,
        PAYMENT_METHOD_URL,
        "valueString",
        |value| match value {
            ExtensionValue::String(method) => Some(method),
            _ => None,
        },
    ));

    let line_items: Vec<Option<InvoiceLine>> = wire
        .line_item
        .iter()
        .enumerate()
        .map(|(i, line)| problems.field(extract_line_item(line, i)))
        .collect();

    let total_net = problems.field(
        wire.total_net
            .as_ref()
            .map(|m| extract_money(m, "totalNet"))
            .transpose(),
    );
    let total_gross = problems.field(
        wire.total_gross
            .as_ref()
            .map(|m| extract_money(m, "totalGross"))
            .transpose(),
    );

    match (
        (meta, status, patient, appointment, issue_date, due_date),
        (service_date, total_net, total_gross, amount_paid, payment_method, payment_date),
    ) {
        (
            (
                Some(meta),
                Some(status),
                Some(patient),
                Some(appointment),
                Some(issue_date),
                Some(due_date),
            ),
            (
                Some(service_date),
                Some(total_net),
                Some(total_gross),
                Some(amount_paid),
                Some(payment_method),
                Some(payment_date),
            ),
        ) if problems.is_empty() => Ok(InvoiceData {
            meta,
            status,
            invoice_number: find_identifier(&wire.identifier, INVOICE_NUMBER_SYSTEM),
            patient,
            appointment,
            issue_date,
            due_date,
            service_date,
            line_items: line_items.into_iter().flatten().collect(),
            total_net,
            total_gross,
            amount_paid,
            payment_method,
            payment_date,
            payment_terms: wire.payment_terms,
            notes: extract_annotations(&wire.note),
        }),
        _ => Err(problems.into_error()),
    }
}

fn extract_line_item(line: &LineItemWire, index: usize) -> FhirResult<InvoiceLine> {
    let path = format!("lineItem[{index}]");
    let mut problems = Problems::default();

    let choice = problems.field(choose_variant(
        &format!("{path}.chargeItem[x]"),
        vec![
            (
                "chargeItemReference",
                line.charge_item_reference.as_ref().map(ChargeItemChoice::Reference),
            ),
            (
                "chargeItemCodeableConcept",
                line.charge_item_codeable_concept
                    .as_ref()
                    .map(ChargeItemChoice::Coded),
            ),
        ],
    ));
    let charge_item = match choice {
        Some(Some(ChargeItemChoice::Reference(reference))) => problems
            .field(required_reference(
                Some(reference),
                ResourceType::ChargeItem,
                &format!("{path}.chargeItemReference"),
            ))
            .map(ChargeItem::Reference),
        Some(Some(ChargeItemChoice::Coded(concept))) => {
            Some(ChargeItem::Coded(extract_concept(concept)))
        }
        Some(None) => {
            problems.push(FhirError::required(format!("{path}.chargeItem[x]")));
            None
        }
        None => None,
    };

    let mut price_components = Vec::with_capacity(line.price_component.len());
    for (j, component) in line.price_component.iter().enumerate() {
        let component_path = format!("{path}.priceComponent[{j}]");
        let kind = problems.field(required_code::<PriceComponentType>(
            component.type_.as_deref(),
            &format!("{component_path}.type"),
        ));
        let amount = problems.field(
            component
                .amount
                .as_ref()
                .map(|m| extract_money(m, &format!("{component_path}.amount")))
                .transpose(),
        );
        if let (Some(kind), Some(amount)) = (kind, amount) {
            price_components.push(PriceComponent { kind, amount });
        }
    }

    match charge_item {
        Some(charge_item) if problems.is_empty() => Ok(InvoiceLine {
            sequence: line.sequence,
            charge_item,
            price_components,
        }),
        _ => Err(problems.into_error()),
    }
}
