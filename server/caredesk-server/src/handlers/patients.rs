//! Patient registry

use async_trait::async_trait;
use database_layer::Document;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Page;
use crate::error::ApiError;
use crate::handlers::common::{CodeSpec, Gender, RecordMeta, Resource, SortOrder};
use crate::utils::age_from_birth_date;
use crate::validation::{
    is_valid_date, is_valid_email, is_valid_identity_card, is_valid_phone, FieldErrors, RequestValidation,
};

// ============================================================================
// DATA STRUCTURES
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum PatientStatus {
    #[default]
    Active,
    Inactive,
    Deceased,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
    pub relationship: String,
}

/// Patient record
///
/// `age` is not stored; responses carry it computed from `dateOfBirth`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Allocated on create (`PT000001`)
    pub patient_code: Option<String>,
    pub full_name: String,
    /// `YYYY-MM-DD`
    pub date_of_birth: String,
    pub gender: Gender,
    pub phone: String,
    pub email: Option<String>,
    /// National identity card number
    pub identity_card: Option<String>,
    #[serde(default)]
    pub address: String,
    pub blood_type: Option<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub chronic_conditions: Vec<String>,
    pub emergency_contact: Option<EmergencyContact>,
    pub insurance_number: Option<String>,
    pub insurance_provider_id: Option<String>,
    #[serde(default)]
    pub status: PatientStatus,
    pub notes: Option<String>,
}

impl RequestValidation for Patient {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.required("fullName", &self.full_name);
        errors.check(
            "dateOfBirth",
            is_valid_date(&self.date_of_birth),
            "dateOfBirth must be a date in YYYY-MM-DD format",
        );
        errors.check("phone", is_valid_phone(&self.phone), "phone must contain 10-11 digits");
        errors.check_optional(
            "identityCard",
            self.identity_card.as_deref(),
            is_valid_identity_card,
            "identityCard must contain 9-12 digits",
        );
        errors.check_optional("email", self.email.as_deref(), is_valid_email, "email is not a valid address");
        if let Some(contact) = &self.emergency_contact {
            errors.required("emergencyContact.name", &contact.name);
            errors.check(
                "emergencyContact.phone",
                is_valid_phone(&contact.phone),
                "emergencyContact.phone must contain 10-11 digits",
            );
            errors.required("emergencyContact.relationship", &contact.relationship);
        }
        errors.into_result()
    }
}

// ============================================================================
// RESOURCE
// ============================================================================

pub struct Patients;

#[async_trait]
impl Resource for Patients {
    type Record = Patient;

    const COLLECTION: &'static str = "patients";
    const LABEL: &'static str = "Patient";
    const PAGES: &'static [Page] = &[Page::Patients];
    const FILTERS: &'static [&'static str] = &["status", "gender", "bloodType"];
    const SEARCH: &'static [&'static str] = &["fullName", "patientCode", "phone", "identityCard"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("createdAt", SortOrder::Desc);
    const SORTABLE: &'static [&'static str] = &["dateOfBirth"];
    const CODE: Option<CodeSpec> = Some(CodeSpec {
        field: "patientCode",
        prefix: "PT",
    });

    fn present(mut document: Document) -> Document {
        let age = document
            .get("dateOfBirth")
            .and_then(|v| v.as_str())
            .and_then(age_from_birth_date);
        if let Some(age) = age {
            document.insert("age".to_string(), age.into());
        }
        document
    }
}
