//! Pharmacy: medicines, suppliers, stock movements, stock alerts and
//! prescriptions

use async_trait::async_trait;
use billing_service::extended_amount;
use database_layer::Document;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Page;
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{
    fill_display_name, number_field, ActiveStatus, CodeSpec, RecordMeta, Resource, SortOrder,
};
use crate::server::CareDeskServer;
use crate::validation::{is_valid_date, is_valid_email, is_valid_phone, FieldErrors, RequestValidation};

/// Whether a medicine document is at or below its minimum stock level.
pub fn is_low_stock(medicine: &Document) -> bool {
    match (
        number_field(medicine, "stockQuantity"),
        number_field(medicine, "minStockLevel"),
    ) {
        (Some(stock), Some(minimum)) => stock <= minimum,
        _ => false,
    }
}

// ============================================================================
// MEDICINES
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum MedicineStatus {
    #[default]
    Active,
    Inactive,
    Discontinued,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Medicine {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub code: String,
    pub name: String,
    pub generic_name: Option<String>,
    pub category: Option<String>,
    pub manufacturer: Option<String>,
    pub supplier_id: Option<String>,
    /// Dispensing unit ("tablet", "bottle", ...)
    pub unit: Option<String>,
    pub unit_price: f64,
    #[serde(default)]
    pub stock_quantity: f64,
    #[serde(default)]
    pub min_stock_level: f64,
    pub max_stock_level: Option<f64>,
    pub batch_number: Option<String>,
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub requires_prescription: bool,
    pub storage_conditions: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub status: MedicineStatus,
}

impl RequestValidation for Medicine {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.required("code", &self.code);
        errors.required("name", &self.name);
        errors.non_negative("unitPrice", self.unit_price);
        errors.non_negative("stockQuantity", self.stock_quantity);
        errors.non_negative("minStockLevel", self.min_stock_level);
        if let Some(max) = self.max_stock_level {
            errors.check(
                "maxStockLevel",
                max >= self.min_stock_level,
                "maxStockLevel must not be below minStockLevel",
            );
        }
        errors.check_optional(
            "expiryDate",
            self.expiry_date.as_deref(),
            is_valid_date,
            "expiryDate must be a date in YYYY-MM-DD format",
        );
        errors.into_result()
    }
}

pub struct Medicines;

#[async_trait]
impl Resource for Medicines {
    type Record = Medicine;

    const COLLECTION: &'static str = "medicines";
    const LABEL: &'static str = "Medicine";
    const PAGES: &'static [Page] = &[Page::Pharmacy];
    const FILTERS: &'static [&'static str] = &["category", "status", "supplierId", "requiresPrescription"];
    const SEARCH: &'static [&'static str] = &["name", "genericName", "code", "manufacturer"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("name", SortOrder::Asc);
    const SORTABLE: &'static [&'static str] = &["stockQuantity", "expiryDate", "unitPrice"];
    const UNIQUE: &'static [&'static str] = &["code"];

    fn present(mut document: Document) -> Document {
        let low = is_low_stock(&document);
        document.insert("isLowStock".to_string(), low.into());
        document
    }
}

// ============================================================================
// SUPPLIERS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub code: String,
    pub name: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub tax_code: Option<String>,
    #[serde(default)]
    pub status: ActiveStatus,
    pub notes: Option<String>,
}

impl RequestValidation for Supplier {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.required("code", &self.code);
        errors.required("name", &self.name);
        errors.check_optional("phone", self.phone.as_deref(), is_valid_phone, "phone must contain 10-11 digits");
        errors.check_optional("email", self.email.as_deref(), is_valid_email, "email is not a valid address");
        errors.into_result()
    }
}

pub struct Suppliers;

#[async_trait]
impl Resource for Suppliers {
    type Record = Supplier;

    const COLLECTION: &'static str = "suppliers";
    const LABEL: &'static str = "Supplier";
    const PAGES: &'static [Page] = &[Page::Pharmacy];
    const FILTERS: &'static [&'static str] = &["status"];
    const SEARCH: &'static [&'static str] = &["name", "code", "contactPerson", "phone"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("name", SortOrder::Asc);
    const UNIQUE: &'static [&'static str] = &["code"];
}

// ============================================================================
// STOCK TRANSACTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum StockTransactionType {
    Import,
    Export,
    Adjustment,
    Return,
    Disposal,
}

/// Record of a stock movement
///
/// Movements are a ledger; they do not change `stockQuantity` on the
/// medicine, which is maintained through the medicine itself.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockTransaction {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub transaction_code: Option<String>,
    pub medicine_id: String,
    pub medicine_name: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: StockTransactionType,
    pub quantity: f64,
    #[serde(default)]
    pub unit_price: f64,
    /// Derived: `quantity * unitPrice`
    pub total_amount: Option<f64>,
    pub supplier_id: Option<String>,
    pub reference_number: Option<String>,
    pub batch_number: Option<String>,
    pub expiry_date: Option<String>,
    pub transaction_date: Option<String>,
    pub performed_by: Option<String>,
    pub notes: Option<String>,
}

impl RequestValidation for StockTransaction {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.required("medicineId", &self.medicine_id);
        errors.check(
            "quantity",
            self.quantity.is_finite() && self.quantity > 0.0,
            "quantity must be greater than zero",
        );
        errors.non_negative("unitPrice", self.unit_price);
        errors.check_optional(
            "expiryDate",
            self.expiry_date.as_deref(),
            is_valid_date,
            "expiryDate must be a date in YYYY-MM-DD format",
        );
        errors.into_result()
    }
}

pub struct StockTransactions;

#[async_trait]
impl Resource for StockTransactions {
    type Record = StockTransaction;

    const COLLECTION: &'static str = "stock-transactions";
    const LABEL: &'static str = "Stock transaction";
    const PAGES: &'static [Page] = &[Page::Pharmacy];
    const FILTERS: &'static [&'static str] = &["medicineId", "type", "supplierId"];
    const SEARCH: &'static [&'static str] = &["medicineName", "referenceNumber", "transactionCode"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("createdAt", SortOrder::Desc);
    const SORTABLE: &'static [&'static str] = &["transactionDate"];
    const CODE: Option<CodeSpec> = Some(CodeSpec {
        field: "transactionCode",
        prefix: "STK",
    });

    fn derive(transaction: &mut StockTransaction) -> ApiResult<()> {
        transaction.total_amount = Some(extended_amount(transaction.quantity, transaction.unit_price)?);
        Ok(())
    }

    async fn enrich(server: &CareDeskServer, transaction: &mut StockTransaction) -> ApiResult<()> {
        fill_display_name(
            server,
            &mut transaction.medicine_name,
            Medicines::COLLECTION,
            Some(&transaction.medicine_id),
            "name",
        )
        .await
    }
}

// ============================================================================
// STOCK ALERTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum StockAlertType {
    LowStock,
    OutOfStock,
    ExpiringSoon,
    Expired,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum StockAlertStatus {
    #[default]
    Active,
    Acknowledged,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockAlert {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub medicine_id: String,
    pub medicine_name: Option<String>,
    pub alert_type: StockAlertType,
    #[serde(default)]
    pub status: StockAlertStatus,
    pub message: String,
    pub current_stock: Option<f64>,
    pub threshold: Option<f64>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<String>,
}

impl RequestValidation for StockAlert {
    fn validate(&self) -> Result<(), ApiError> {
        validate_required!(self.medicine_id, "medicineId is required");
        validate_required!(self.message, "message is required");
        Ok(())
    }
}

pub struct StockAlerts;

#[async_trait]
impl Resource for StockAlerts {
    type Record = StockAlert;

    const COLLECTION: &'static str = "stock-alerts";
    const LABEL: &'static str = "Stock alert";
    const PAGES: &'static [Page] = &[Page::Pharmacy];
    const FILTERS: &'static [&'static str] = &["medicineId", "alertType", "status"];
    const SEARCH: &'static [&'static str] = &["medicineName", "message"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("createdAt", SortOrder::Desc);

    async fn enrich(server: &CareDeskServer, alert: &mut StockAlert) -> ApiResult<()> {
        fill_display_name(
            server,
            &mut alert.medicine_name,
            Medicines::COLLECTION,
            Some(&alert.medicine_id),
            "name",
        )
        .await
    }
}

// ============================================================================
// PRESCRIPTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum PrescriptionStatus {
    #[default]
    Pending,
    Dispensed,
    PartiallyDispensed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrescribedMedication {
    pub medicine_id: Option<String>,
    pub medicine_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: Option<String>,
    pub quantity: f64,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub prescription_code: Option<String>,
    pub patient_id: String,
    pub patient_name: Option<String>,
    pub doctor_id: Option<String>,
    pub doctor_name: Option<String>,
    pub medical_record_id: Option<String>,
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub medications: Vec<PrescribedMedication>,
    #[serde(default)]
    pub status: PrescriptionStatus,
    pub dispensed_by: Option<String>,
    pub dispensed_at: Option<String>,
    pub notes: Option<String>,
}

impl RequestValidation for Prescription {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.required("patientId", &self.patient_id);
        for (index, medication) in self.medications.iter().enumerate() {
            let field = format!("medications[{index}]");
            errors.required(&format!("{field}.medicineName"), &medication.medicine_name);
            errors.required(&format!("{field}.dosage"), &medication.dosage);
            errors.required(&format!("{field}.frequency"), &medication.frequency);
            errors.check(
                &format!("{field}.quantity"),
                medication.quantity.is_finite() && medication.quantity > 0.0,
                "quantity must be greater than zero",
            );
        }
        errors.into_result()
    }
}

pub struct Prescriptions;

#[async_trait]
impl Resource for Prescriptions {
    type Record = Prescription;

    const COLLECTION: &'static str = "prescriptions";
    const LABEL: &'static str = "Prescription";
    const PAGES: &'static [Page] = &[Page::MedicalRecords, Page::Pharmacy];
    const FILTERS: &'static [&'static str] = &["status", "patientId", "doctorId", "medicalRecordId"];
    const SEARCH: &'static [&'static str] = &["patientName", "doctorName", "prescriptionCode", "diagnosis"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("createdAt", SortOrder::Desc);
    const CODE: Option<CodeSpec> = Some(CodeSpec {
        field: "prescriptionCode",
        prefix: "RX",
    });

    async fn enrich(server: &CareDeskServer, prescription: &mut Prescription) -> ApiResult<()> {
        fill_display_name(
            server,
            &mut prescription.patient_name,
            "patients",
            Some(&prescription.patient_id),
            "fullName",
        )
        .await?;
        fill_display_name(
            server,
            &mut prescription.doctor_name,
            "users",
            prescription.doctor_id.as_deref(),
            "fullName",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_low_stock_flag() {
        let doc = |stock: f64, min: f64| {
            let mut d = Document::new();
            d.insert("stockQuantity".to_string(), json!(stock));
            d.insert("minStockLevel".to_string(), json!(min));
            d
        };
        assert!(is_low_stock(&doc(5.0, 10.0)));
        assert!(is_low_stock(&doc(10.0, 10.0)));
        assert!(!is_low_stock(&doc(11.0, 10.0)));
        assert!(!is_low_stock(&Document::new()));

        let presented = Medicines::present(doc(0.0, 5.0));
        assert_eq!(presented.get("isLowStock"), Some(&json!(true)));
    }

    #[test]
    fn test_stock_transaction_type_required() {
        let result: Result<StockTransaction, _> = serde_json::from_value(json!({
            "medicineId": "m1",
            "type": "theft",
            "quantity": 5
        }));
        assert!(result.is_err());
    }
}
