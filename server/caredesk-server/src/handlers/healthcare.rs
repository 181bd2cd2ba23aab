//! Appointments and medical records

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::Json;
use database_layer::{DocumentQuery, SortKey};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Page;
use crate::error::{api_success, ApiError, ApiErrorResponse, ApiResponse, ApiResult};
use crate::handlers::common::crud::respond;
use crate::handlers::common::{fill_display_name, CodeSpec, RecordMeta, Resource, SortOrder};
use crate::server::CareDeskServer;
use crate::validation::{is_valid_date, is_valid_time, FieldErrors, RequestValidation};
use database_layer::Document;

// ============================================================================
// APPOINTMENTS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentType {
    #[default]
    Consultation,
    FollowUp,
    Emergency,
    CheckUp,
    Procedure,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

/// Appointment record
///
/// `patientName` and `doctorName` are copies taken when the appointment is
/// written; they are filled from the referenced records when omitted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub appointment_code: Option<String>,
    pub patient_id: String,
    pub patient_name: Option<String>,
    pub doctor_id: Option<String>,
    pub doctor_name: Option<String>,
    pub department: Option<String>,
    /// `YYYY-MM-DD`
    pub appointment_date: String,
    /// `HH:MM`
    pub appointment_time: String,
    /// Minutes
    pub duration: Option<u32>,
    #[serde(default, rename = "type")]
    pub appointment_type: AppointmentType,
    #[serde(default)]
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    pub notes: Option<String>,
}

impl RequestValidation for Appointment {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.required("patientId", &self.patient_id);
        errors.check(
            "appointmentDate",
            is_valid_date(&self.appointment_date),
            "appointmentDate must be a date in YYYY-MM-DD format",
        );
        errors.check(
            "appointmentTime",
            is_valid_time(&self.appointment_time),
            "appointmentTime must be a time in HH:MM format",
        );
        errors.into_result()
    }
}

pub struct Appointments;

#[async_trait]
impl Resource for Appointments {
    type Record = Appointment;

    const COLLECTION: &'static str = "appointments";
    const LABEL: &'static str = "Appointment";
    const PAGES: &'static [Page] = &[Page::Appointments];
    const FILTERS: &'static [&'static str] = &[
        "status",
        "type",
        "department",
        "doctorId",
        "patientId",
        "appointmentDate",
    ];
    const SEARCH: &'static [&'static str] = &["patientName", "doctorName", "reason", "appointmentCode"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("appointmentDate", SortOrder::Desc);
    const SORTABLE: &'static [&'static str] = &["appointmentTime"];
    const CODE: Option<CodeSpec> = Some(CodeSpec {
        field: "appointmentCode",
        prefix: "AP",
    });

    async fn enrich(server: &CareDeskServer, record: &mut Appointment) -> ApiResult<()> {
        fill_display_name(
            server,
            &mut record.patient_name,
            "patients",
            Some(&record.patient_id),
            "fullName",
        )
        .await?;
        fill_display_name(
            server,
            &mut record.doctor_name,
            "users",
            record.doctor_id.as_deref(),
            "fullName",
        )
        .await
    }
}

// ============================================================================
// MEDICAL RECORDS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum MedicalRecordStatus {
    #[default]
    Active,
    Archived,
}

/// Vital signs as recorded at the visit, free-form strings ("37.2", "120/80")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VitalSigns {
    pub temperature: String,
    pub blood_pressure: String,
    pub heart_rate: String,
    pub respiratory_rate: String,
    pub weight: String,
    pub height: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MedicalRecord {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub record_code: Option<String>,
    pub patient_id: String,
    pub patient_name: Option<String>,
    pub doctor_id: Option<String>,
    pub doctor_name: Option<String>,
    pub appointment_id: Option<String>,
    /// `YYYY-MM-DD`
    pub visit_date: String,
    pub chief_complaint: Option<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    pub diagnosis: String,
    pub treatment: Option<String>,
    pub vital_signs: Option<VitalSigns>,
    #[serde(default)]
    pub prescription_ids: Vec<String>,
    pub follow_up_date: Option<String>,
    #[serde(default)]
    pub status: MedicalRecordStatus,
    pub notes: Option<String>,
}

impl RequestValidation for MedicalRecord {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.required("patientId", &self.patient_id);
        errors.required("diagnosis", &self.diagnosis);
        errors.check(
            "visitDate",
            is_valid_date(&self.visit_date),
            "visitDate must be a date in YYYY-MM-DD format",
        );
        errors.check_optional(
            "followUpDate",
            self.follow_up_date.as_deref(),
            is_valid_date,
            "followUpDate must be a date in YYYY-MM-DD format",
        );
        if let Some(vitals) = &self.vital_signs {
            for (field, value) in [
                ("vitalSigns.temperature", &vitals.temperature),
                ("vitalSigns.bloodPressure", &vitals.blood_pressure),
                ("vitalSigns.heartRate", &vitals.heart_rate),
                ("vitalSigns.respiratoryRate", &vitals.respiratory_rate),
                ("vitalSigns.weight", &vitals.weight),
                ("vitalSigns.height", &vitals.height),
            ] {
                errors.required(field, value);
            }
        }
        errors.into_result()
    }
}

pub struct MedicalRecords;

#[async_trait]
impl Resource for MedicalRecords {
    type Record = MedicalRecord;

    const COLLECTION: &'static str = "medical-records";
    const LABEL: &'static str = "Medical record";
    const PAGES: &'static [Page] = &[Page::MedicalRecords];
    const FILTERS: &'static [&'static str] = &["patientId", "doctorId", "appointmentId", "status"];
    const SEARCH: &'static [&'static str] = &["patientName", "doctorName", "diagnosis", "chiefComplaint"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("visitDate", SortOrder::Desc);
    const CODE: Option<CodeSpec> = Some(CodeSpec {
        field: "recordCode",
        prefix: "MR",
    });

    async fn enrich(server: &CareDeskServer, record: &mut MedicalRecord) -> ApiResult<()> {
        fill_display_name(
            server,
            &mut record.patient_name,
            "patients",
            Some(&record.patient_id),
            "fullName",
        )
        .await?;
        fill_display_name(
            server,
            &mut record.doctor_name,
            "users",
            record.doctor_id.as_deref(),
            "fullName",
        )
        .await
    }
}

/// Get the medical record written for an appointment
#[utoipa::path(
    get,
    path = "/medical-records/appointment/{appointment_id}",
    params(("appointment_id" = String, Path, description = "Appointment id")),
    responses(
        (status = 200, description = "Medical record for the appointment", body = MedicalRecord),
        (status = 404, description = "No record for this appointment", body = ApiErrorResponse)
    ),
    tag = "medical-records",
    security(("bearer_auth" = []))
)]
pub async fn get_medical_record_by_appointment(
    State(server): State<CareDeskServer>,
    Path(appointment_id): Path<String>,
) -> ApiResult<Json<ApiResponse<Document>>> {
    let query = DocumentQuery::new()
        .filter_eq("appointmentId", appointment_id)
        .order_by(SortKey::desc("createdAt"))
        .window(Some(1), 0);
    let page = server.store.find(MedicalRecords::COLLECTION, &query).await?;
    let record = page
        .documents
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found(MedicalRecords::LABEL))?;

    Ok(Json(api_success(respond::<MedicalRecords>(&server, record).await?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_appointment_enums() {
        let appointment: Appointment = serde_json::from_value(json!({
            "patientId": "p1",
            "appointmentDate": "2024-05-01",
            "appointmentTime": "09:30",
            "type": "follow-up",
            "status": "no-show"
        }))
        .expect("deserializes");
        assert_eq!(appointment.appointment_type, AppointmentType::FollowUp);
        assert_eq!(appointment.status, AppointmentStatus::NoShow);
        assert!(appointment.validate().is_ok());

        let bad: Result<Appointment, _> = serde_json::from_value(json!({
            "patientId": "p1",
            "appointmentDate": "2024-05-01",
            "appointmentTime": "09:30",
            "status": "postponed"
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn test_medical_record_requires_vitals_fields() {
        let record: MedicalRecord = serde_json::from_value(json!({
            "patientId": "p1",
            "visitDate": "2024-05-01",
            "diagnosis": "Influenza",
            "vitalSigns": {
                "temperature": "38.5",
                "bloodPressure": "120/80",
                "heartRate": "",
                "respiratoryRate": "18",
                "weight": "60",
                "height": "165"
            }
        }))
        .expect("deserializes");
        assert!(record.validate().is_err());
    }
}
