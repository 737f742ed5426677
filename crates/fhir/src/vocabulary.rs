//! Closed FHIR R4 vocabularies.
//!
//! Every enumerated field in the supported resources is backed by one of the enums below.
//! Inbound codes are validated with [`Vocabulary::parse`], which fails with a
//! field-qualified [`FhirError::Validation`] listing the allowed set. Outbound codes come
//! from [`Vocabulary::code`] on a typed value, so a code outside the set cannot be emitted.
//!
//! The tables are `'static` data; nothing here is initialised at runtime.

use crate::{FhirError, FhirResult};

/// A closed set of codes from a FHIR value set.
pub trait Vocabulary: Sized + Copy + 'static {
    /// Name of the value set, as shown by `medrec codes`.
    const NAME: &'static str;

    /// Every accepted code, in value-set order.
    const CODES: &'static [&'static str];

    /// The wire code for this value.
    fn code(self) -> &'static str;

    /// Looks up a wire code. Matching is exact (FHIR codes are case-sensitive).
    fn from_code(code: &str) -> Option<Self>;

    /// Validates `value` for the field at `field`.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::Validation`] naming the field, the offending value and the allowed set.
    fn parse(field: &str, value: &str) -> FhirResult<Self> {
        Self::from_code(value).ok_or_else(|| FhirError::Validation {
            field: field.to_owned(),
            value: value.to_owned(),
            allowed: Self::CODES,
        })
    }
}

/// Validates `value` against vocabulary `V`.
pub fn validate<V: Vocabulary>(field: &str, value: &str) -> FhirResult<V> {
    V::parse(field, value)
}

/// Validates an optional code; an absent code is not an error.
pub fn validate_optional<V: Vocabulary>(field: &str, value: Option<&str>) -> FhirResult<Option<V>> {
    value.map(|v| V::parse(field, v)).transpose()
}

macro_rules! code_enum {
    (
        $(#[$meta:meta])*
        $name:ident = $label:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $code:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl Vocabulary for $name {
            const NAME: &'static str = $label;
            const CODES: &'static [&'static str] = &[$($code),+];

            fn code(self) -> &'static str {
                match self {
                    $( $name::$variant => $code, )+
                }
            }

            fn from_code(code: &str) -> Option<Self> {
                match code {
                    $( $code => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.code())
            }
        }
    };
}

code_enum! {
    /// Administrative gender of a person.
    AdministrativeGender = "administrative-gender" {
        Male => "male",
        Female => "female",
        Other => "other",
        Unknown => "unknown",
    }
}

code_enum! {
    /// Purpose of a human name.
    NameUse = "name-use" {
        Usual => "usual",
        Official => "official",
        Temp => "temp",
        Nickname => "nickname",
        Anonymous => "anonymous",
        Old => "old",
        Maiden => "maiden",
    }
}

code_enum! {
    AddressUse = "address-use" {
        Home => "home",
        Work => "work",
        Temp => "temp",
        Old => "old",
        Billing => "billing",
    }
}

code_enum! {
    AddressType = "address-type" {
        Postal => "postal",
        Physical => "physical",
        Both => "both",
    }
}

code_enum! {
    /// Telecommunications form of a contact point.
    ContactPointSystem = "contact-point-system" {
        Phone => "phone",
        Fax => "fax",
        Email => "email",
        Pager => "pager",
        Url => "url",
        Sms => "sms",
        Other => "other",
    }
}

code_enum! {
    ContactPointUse = "contact-point-use" {
        Home => "home",
        Work => "work",
        Temp => "temp",
        Old => "old",
        Mobile => "mobile",
    }
}

code_enum! {
    /// Lifecycle of an appointment.
    AppointmentStatus = "appointmentstatus" {
        Proposed => "proposed",
        Pending => "pending",
        Booked => "booked",
        Arrived => "arrived",
        Fulfilled => "fulfilled",
        Cancelled => "cancelled",
        Noshow => "noshow",
        EnteredInError => "entered-in-error",
        CheckedIn => "checked-in",
        Waitlist => "waitlist",
    }
}

code_enum! {
    /// A participant's response to an appointment.
    ParticipationStatus = "participationstatus" {
        Accepted => "accepted",
        Declined => "declined",
        Tentative => "tentative",
        NeedsAction => "needs-action",
    }
}

code_enum! {
    ParticipantRequired = "participantrequired" {
        Required => "required",
        Optional => "optional",
        InformationOnly => "information-only",
    }
}

code_enum! {
    MedicationRequestStatus = "medicationrequest-status" {
        Active => "active",
        OnHold => "on-hold",
        Cancelled => "cancelled",
        Completed => "completed",
        EnteredInError => "entered-in-error",
        Stopped => "stopped",
        Draft => "draft",
        Unknown => "unknown",
    }
}

code_enum! {
    MedicationRequestIntent = "medicationrequest-intent" {
        Proposal => "proposal",
        Plan => "plan",
        Order => "order",
        OriginalOrder => "original-order",
        ReflexOrder => "reflex-order",
        FillerOrder => "filler-order",
        InstanceOrder => "instance-order",
        Option => "option",
    }
}

code_enum! {
    RequestPriority = "request-priority" {
        Routine => "routine",
        Urgent => "urgent",
        Asap => "asap",
        Stat => "stat",
    }
}

code_enum! {
    ObservationStatus = "observation-status" {
        Registered => "registered",
        Preliminary => "preliminary",
        Final => "final",
        Amended => "amended",
        Corrected => "corrected",
        Cancelled => "cancelled",
        EnteredInError => "entered-in-error",
        Unknown => "unknown",
    }
}

code_enum! {
    /// Kind of clinical record, carried as the Observation category coding.
    ClinicalRecordType = "clinical-record-type" {
        Condition => "condition",
        Observation => "observation",
        Allergy => "allergy",
        Procedure => "procedure",
        FamilyHistory => "family-history",
    }
}

code_enum! {
    /// Clinical status of a condition-like record.
    ClinicalStatus = "condition-clinical" {
        Active => "active",
        Recurrence => "recurrence",
        Relapse => "relapse",
        Inactive => "inactive",
        Remission => "remission",
        Resolved => "resolved",
    }
}

impl ClinicalStatus {
    /// Whether the condition is currently affecting the patient.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ClinicalStatus::Active | ClinicalStatus::Recurrence | ClinicalStatus::Relapse
        )
    }
}

code_enum! {
    Severity = "clinical-severity" {
        Mild => "mild",
        Moderate => "moderate",
        Severe => "severe",
        LifeThreatening => "life-threatening",
    }
}

code_enum! {
    InvoiceStatus = "invoice-status" {
        Draft => "draft",
        Issued => "issued",
        Balanced => "balanced",
        Cancelled => "cancelled",
        EnteredInError => "entered-in-error",
    }
}

code_enum! {
    PriceComponentType = "invoice-priceComponentType" {
        Base => "base",
        Surcharge => "surcharge",
        Deduction => "deduction",
        Discount => "discount",
        Tax => "tax",
        Informational => "informational",
    }
}

fn table<V: Vocabulary>() -> (&'static str, &'static [&'static str]) {
    (V::NAME, V::CODES)
}

/// Every vocabulary table as `(name, codes)`.
pub fn tables() -> Vec<(&'static str, &'static [&'static str])> {
    vec![
        table::<AdministrativeGender>(),
        table::<NameUse>(),
        table::<AddressUse>(),
        table::<AddressType>(),
        table::<ContactPointSystem>(),
        table::<ContactPointUse>(),
        table::<AppointmentStatus>(),
        table::<ParticipationStatus>(),
        table::<ParticipantRequired>(),
        table::<MedicationRequestStatus>(),
        table::<MedicationRequestIntent>(),
        table::<RequestPriority>(),
        table::<ObservationStatus>(),
        table::<ClinicalRecordType>(),
        table::<ClinicalStatus>(),
        table::<Severity>(),
        table::<InvoiceStatus>(),
        table::<PriceComponentType>(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_closed<V: Vocabulary + PartialEq + std::fmt::Debug>() {
        for code in V::CODES {
            let value = V::parse("field", code).expect("listed code must parse");
            assert_eq!(value.code(), *code);
        }
        for bad in ["", "UNKNOWN-CODE", "Male ", "not a code"] {
            match V::parse("field", bad) {
                Err(FhirError::Validation { field, value, allowed }) => {
                    assert_eq!(field, "field");
                    assert_eq!(value, bad);
                    assert_eq!(allowed, V::CODES);
                }
                other => panic!("{}: expected Validation for '{bad}', got {other:?}", V::NAME),
            }
        }
    }

    #[test]
    fn every_table_is_closed() {
        assert_closed::<AdministrativeGender>();
        assert_closed::<NameUse>();
        assert_closed::<AddressUse>();
        assert_closed::<AddressType>();
        assert_closed::<ContactPointSystem>();
        assert_closed::<ContactPointUse>();
        assert_closed::<AppointmentStatus>();
        assert_closed::<ParticipationStatus>();
        assert_closed::<ParticipantRequired>();
        assert_closed::<MedicationRequestStatus>();
        assert_closed::<MedicationRequestIntent>();
        assert_closed::<RequestPriority>();
        assert_closed::<ObservationStatus>();
        assert_closed::<ClinicalRecordType>();
        assert_closed::<ClinicalStatus>();
        assert_closed::<Severity>();
        assert_closed::<InvoiceStatus>();
        assert_closed::<PriceComponentType>();
    }

    #[test]
    fn codes_are_case_sensitive() {
        assert!(validate::<AdministrativeGender>("gender", "Male").is_err());
        assert_eq!(
            validate::<AdministrativeGender>("gender", "male").expect("valid"),
            AdministrativeGender::Male
        );
    }

    #[test]
    fn optional_codes_allow_absence() {
        assert_eq!(
            validate_optional::<RequestPriority>("priority", None).expect("absent ok"),
            None
        );
        assert!(validate_optional::<RequestPriority>("priority", Some("whenever")).is_err());
    }

    #[test]
    fn tables_are_listed_once_each() {
        let tables = tables();
        assert_eq!(tables.len(), 18);
        let mut names: Vec<_> = tables.iter().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 18);
    }

    #[test]
    fn recurring_conditions_count_as_active() {
        let active: Vec<_> = ClinicalStatus::CODES
            .iter()
            .filter_map(|code| ClinicalStatus::from_code(code))
            .filter(|status| status.is_active())
            .map(ClinicalStatus::code)
            .collect();
        assert_eq!(active, ["active", "recurrence", "relapse"]);
    }

    #[test]
    fn display_uses_wire_code() {
        assert_eq!(AppointmentStatus::EnteredInError.to_string(), "entered-in-error");
        assert_eq!(ParticipationStatus::NeedsAction.to_string(), "needs-action");
    }
}
