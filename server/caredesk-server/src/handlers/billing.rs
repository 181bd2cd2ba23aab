//! Invoices, invoice items, payments, service prices and insurers

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use billing_service::{
    apply_payment, line_total, settle, subtotal, Adjustment, InvoiceStatus, InvoiceTotals, PaymentMethod,
    PaymentState,
};
use database_layer::{DatabaseError, DatabaseResult, Document, UnitOfWork, UPDATED_AT_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::auth::Page;
use crate::error::{api_success, ApiError, ApiErrorResponse, ApiResponse, ApiResult};
use crate::handlers::common::crud::{load, missing_as, respond, stage_new};
use crate::handlers::common::{
    active_by_default, fill_display_name, number_field, text_field, ActiveStatus, CodeSpec, RecordMeta,
    Resource, SortOrder,
};
use crate::server::CareDeskServer;
use crate::types::ApiJson;
use crate::utils::now_rfc3339;
use crate::validation::{is_valid_date, is_valid_email, is_valid_phone, FieldErrors, RequestValidation};

// ============================================================================
// INVOICES
// ============================================================================

fn one() -> f64 {
    1.0
}

/// One billed line embedded in an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLine {
    /// Service price, medicine or lab test this line bills for
    pub item_id: Option<String>,
    pub name: String,
    #[serde(default = "one")]
    pub quantity: f64,
    pub unit_price: f64,
    /// Line discount in percent
    pub discount: Option<f64>,
    /// Derived: `quantity * unitPrice * (1 - discount/100)`
    pub total_price: Option<f64>,
}

impl InvoiceLine {
    fn check(&self, field: &str, errors: &mut FieldErrors) {
        errors.required(&format!("{field}.name"), &self.name);
        errors.check(
            &format!("{field}.quantity"),
            self.quantity.is_finite() && self.quantity > 0.0,
            &format!("{field}.quantity must be greater than zero"),
        );
        errors.non_negative(&format!("{field}.unitPrice"), self.unit_price);
        errors.percentage(&format!("{field}.discount"), self.discount);
    }
}

/// Invoice record
///
/// Money figures other than `subtotal` (when no lines are given),
/// `paidAmount` and the percent/amount inputs are derived on every write.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub invoice_number: Option<String>,
    pub patient_id: String,
    pub patient_name: Option<String>,
    pub appointment_id: Option<String>,
    pub medical_record_id: Option<String>,
    #[serde(default)]
    pub services: Vec<InvoiceLine>,
    #[serde(default)]
    pub medicines: Vec<InvoiceLine>,
    #[serde(default)]
    pub lab_tests: Vec<InvoiceLine>,
    #[serde(default)]
    pub subtotal: f64,
    pub discount_percent: Option<f64>,
    pub discount_amount: Option<f64>,
    pub tax_percent: Option<f64>,
    pub tax_amount: Option<f64>,
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub paid_amount: f64,
    pub remaining_amount: Option<f64>,
    #[serde(default)]
    pub status: InvoiceStatus,
    pub payment_method: Option<PaymentMethod>,
    pub insurance_provider_id: Option<String>,
    pub insurance_coverage: Option<f64>,
    pub due_date: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

impl RequestValidation for Invoice {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.required("patientId", &self.patient_id);
        for (field, lines) in [
            ("services", &self.services),
            ("medicines", &self.medicines),
            ("labTests", &self.lab_tests),
        ] {
            for (index, line) in lines.iter().enumerate() {
                line.check(&format!("{field}[{index}]"), &mut errors);
            }
        }
        errors.non_negative("subtotal", self.subtotal);
        errors.non_negative("paidAmount", self.paid_amount);
        errors.percentage("discountPercent", self.discount_percent);
        errors.percentage("taxPercent", self.tax_percent);
        if let Some(amount) = self.discount_amount {
            errors.non_negative("discountAmount", amount);
        }
        if let Some(amount) = self.tax_amount {
            errors.non_negative("taxAmount", amount);
        }
        if let Some(coverage) = self.insurance_coverage {
            errors.non_negative("insuranceCoverage", coverage);
        }
        errors.check_optional(
            "dueDate",
            self.due_date.as_deref(),
            is_valid_date,
            "dueDate must be a date in YYYY-MM-DD format",
        );
        errors.into_result()
    }
}

impl Invoice {
    /// Recompute line totals, invoice totals, remaining balance and status.
    pub fn recalculate(&mut self) -> ApiResult<()> {
        let mut totals = Vec::new();
        for line in self
            .services
            .iter_mut()
            .chain(self.medicines.iter_mut())
            .chain(self.lab_tests.iter_mut())
        {
            let total = line_total(line.quantity, line.unit_price, line.discount)?;
            line.total_price = Some(total);
            totals.push(total);
        }
        if !totals.is_empty() {
            self.subtotal = subtotal(totals)?;
        }

        let figures = InvoiceTotals::compute(
            self.subtotal,
            Adjustment {
                percent: self.discount_percent,
                amount: self.discount_amount,
            },
            Adjustment {
                percent: self.tax_percent,
                amount: self.tax_amount,
            },
        )?;
        let state = settle(self.status, figures.total_amount, self.paid_amount)?;

        self.subtotal = figures.subtotal;
        self.discount_amount = Some(figures.discount_amount);
        self.tax_amount = Some(figures.tax_amount);
        self.total_amount = Some(state.total_amount);
        self.paid_amount = state.paid_amount;
        self.remaining_amount = Some(state.remaining_amount);
        self.status = state.status;
        Ok(())
    }
}

pub struct Invoices;

#[async_trait]
impl Resource for Invoices {
    type Record = Invoice;

    const COLLECTION: &'static str = "invoices";
    const LABEL: &'static str = "Invoice";
    const PAGES: &'static [Page] = &[Page::Billing];
    const FILTERS: &'static [&'static str] = &["status", "patientId", "paymentMethod", "appointmentId"];
    const SEARCH: &'static [&'static str] = &["invoiceNumber", "patientName"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("createdAt", SortOrder::Desc);
    const SORTABLE: &'static [&'static str] = &["totalAmount", "dueDate"];
    const CODE: Option<CodeSpec> = Some(CodeSpec {
        field: "invoiceNumber",
        prefix: "INV",
    });

    fn derive(invoice: &mut Invoice) -> ApiResult<()> {
        invoice.recalculate()
    }

    async fn enrich(server: &CareDeskServer, invoice: &mut Invoice) -> ApiResult<()> {
        fill_display_name(
            server,
            &mut invoice.patient_name,
            "patients",
            Some(&invoice.patient_id),
            "fullName",
        )
        .await
    }
}

// ============================================================================
// INVOICE ITEMS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum InvoiceItemType {
    #[default]
    Service,
    Medicine,
    LabTest,
}

/// Stand-alone invoice line
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub invoice_id: String,
    #[serde(default)]
    pub item_type: InvoiceItemType,
    pub item_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "one")]
    pub quantity: f64,
    pub unit_price: f64,
    pub discount: Option<f64>,
    pub total_price: Option<f64>,
    pub notes: Option<String>,
}

impl RequestValidation for InvoiceItem {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.required("invoiceId", &self.invoice_id);
        errors.required("name", &self.name);
        errors.check(
            "quantity",
            self.quantity.is_finite() && self.quantity > 0.0,
            "quantity must be greater than zero",
        );
        errors.non_negative("unitPrice", self.unit_price);
        errors.percentage("discount", self.discount);
        errors.into_result()
    }
}

pub struct InvoiceItems;

#[async_trait]
impl Resource for InvoiceItems {
    type Record = InvoiceItem;

    const COLLECTION: &'static str = "invoice-items";
    const LABEL: &'static str = "Invoice item";
    const PAGES: &'static [Page] = &[Page::Billing];
    const FILTERS: &'static [&'static str] = &["invoiceId", "itemType"];
    const SEARCH: &'static [&'static str] = &["name"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("createdAt", SortOrder::Desc);

    fn derive(item: &mut InvoiceItem) -> ApiResult<()> {
        item.total_price = Some(line_total(item.quantity, item.unit_price, item.discount)?);
        Ok(())
    }
}

// ============================================================================
// PAYMENT TRANSACTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionStatus {
    Pending,
    #[default]
    Completed,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTransaction {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub transaction_code: Option<String>,
    pub invoice_id: String,
    pub invoice_number: Option<String>,
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub amount: f64,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub status: TransactionStatus,
    /// RFC 3339 instant the payment was received
    pub payment_date: Option<String>,
    pub reference_number: Option<String>,
    pub received_by: Option<String>,
    pub notes: Option<String>,
}

impl RequestValidation for PaymentTransaction {
    fn validate(&self) -> Result<(), ApiError> {
        validate_required!(self.invoice_id, "invoiceId is required");
        validate_field!(
            self.amount,
            self.amount.is_finite() && self.amount > 0.0,
            "amount must be greater than zero"
        );
        Ok(())
    }
}

pub struct PaymentTransactions;

#[async_trait]
impl Resource for PaymentTransactions {
    type Record = PaymentTransaction;

    const COLLECTION: &'static str = "payment-transactions";
    const LABEL: &'static str = "Payment transaction";
    const PAGES: &'static [Page] = &[Page::Billing];
    const FILTERS: &'static [&'static str] = &["invoiceId", "patientId", "paymentMethod", "status"];
    const SEARCH: &'static [&'static str] = &["transactionCode", "invoiceNumber", "patientName"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("createdAt", SortOrder::Desc);
    const SORTABLE: &'static [&'static str] = &["paymentDate", "amount"];
    const CODE: Option<CodeSpec> = Some(CodeSpec {
        field: "transactionCode",
        prefix: "PAY",
    });

    fn derive(transaction: &mut PaymentTransaction) -> ApiResult<()> {
        if transaction.payment_date.is_none() {
            transaction.payment_date = Some(now_rfc3339());
        }
        Ok(())
    }
}

/// Body of `POST /invoices/:id/payments`
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentRequest {
    pub amount: f64,
    pub payment_method: PaymentMethod,
    pub reference_number: Option<String>,
    pub received_by: Option<String>,
    pub notes: Option<String>,
}

impl RequestValidation for RecordPaymentRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validate_field!(
            self.amount,
            self.amount.is_finite() && self.amount > 0.0,
            "amount must be greater than zero"
        );
        Ok(())
    }
}

/// Result of applying a payment: the updated invoice and its transaction
#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentReceipt {
    #[schema(value_type = Invoice)]
    pub invoice: Document,
    #[schema(value_type = PaymentTransaction)]
    pub transaction: Document,
}

/// Apply a payment to an invoice
///
/// The invoice update and the transaction insert commit together; the
/// invoice is re-read inside the write, so concurrent payments cannot lose
/// each other's amounts.
#[utoipa::path(
    post,
    path = "/invoices/{id}/payments",
    params(("id" = String, Path, description = "Invoice id")),
    request_body = RecordPaymentRequest,
    responses(
        (status = 201, description = "Payment applied", body = PaymentReceipt),
        (status = 400, description = "Payment rejected", body = ApiErrorResponse),
        (status = 404, description = "Invoice not found", body = ApiErrorResponse)
    ),
    tag = "invoices",
    security(("bearer_auth" = []))
)]
pub async fn record_invoice_payment(
    State(server): State<CareDeskServer>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<RecordPaymentRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<PaymentReceipt>>)> {
    request.validate()?;
    let invoice = load::<Invoices>(&server, &id).await?;

    let (_, transaction) = stage_new::<PaymentTransactions>(
        &server,
        json!({
            "invoiceId": id,
            "invoiceNumber": text_field(&invoice, "invoiceNumber"),
            "patientId": text_field(&invoice, "patientId"),
            "patientName": text_field(&invoice, "patientName"),
            "amount": request.amount,
            "paymentMethod": request.payment_method,
            "status": TransactionStatus::Completed,
            "referenceNumber": request.reference_number,
            "receivedBy": request.received_by,
            "notes": request.notes,
        }),
    )
    .await?;

    let amount = request.amount;
    let method = request.payment_method;
    let work = UnitOfWork::new()
        .modify(Invoices::COLLECTION, &id, move |invoice| {
            apply_to_invoice(invoice, amount, method)
        })
        .extend(transaction);

    let mut written = server
        .store
        .commit(work)
        .await
        .map_err(missing_as::<Invoices>)?
        .into_iter();
    let (Some(invoice), Some(transaction)) = (written.next(), written.last()) else {
        return Err(ApiError::internal("Payment write returned no documents"));
    };

    tracing::info!(
        invoice_id = %id,
        amount,
        status = ?invoice.get("status"),
        "Payment applied to invoice"
    );

    let receipt = PaymentReceipt {
        invoice: respond::<Invoices>(&server, invoice).await?,
        transaction: respond::<PaymentTransactions>(&server, transaction).await?,
    };
    Ok((StatusCode::CREATED, Json(api_success(receipt))))
}

/// Read-modify-write step run by the store on the current invoice.
fn apply_to_invoice(mut invoice: Document, amount: f64, method: PaymentMethod) -> DatabaseResult<Document> {
    let status = match invoice.get("status") {
        Some(value) => serde_json::from_value::<InvoiceStatus>(value.clone())
            .map_err(|_| DatabaseError::rejected("Invoice has an unknown status"))?,
        None => InvoiceStatus::default(),
    };
    let total_amount = number_field(&invoice, "totalAmount").unwrap_or(0.0);
    let paid_amount = number_field(&invoice, "paidAmount").unwrap_or(0.0);
    let current = PaymentState {
        status,
        total_amount,
        paid_amount,
        remaining_amount: total_amount - paid_amount,
    };

    let next = apply_payment(&current, amount)
        .map_err(|e| DatabaseError::rejected(format!("Payment rejected: {e}")))?;

    invoice.insert("paidAmount".to_string(), next.paid_amount.into());
    invoice.insert("remainingAmount".to_string(), next.remaining_amount.into());
    invoice.insert("status".to_string(), next.status.as_str().into());
    invoice.insert(
        "paymentMethod".to_string(),
        serde_json::to_value(method).unwrap_or(Value::Null),
    );
    invoice.insert(UPDATED_AT_FIELD.to_string(), now_rfc3339().into());
    Ok(invoice)
}

// ============================================================================
// SERVICE PRICES
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceCategory {
    #[default]
    Consultation,
    Examination,
    Procedure,
    Imaging,
    Laboratory,
    Bed,
    Other,
}

/// Price list entry for a billable service
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrice {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub service_code: String,
    pub service_name: String,
    #[serde(default)]
    pub category: ServiceCategory,
    pub department: Option<String>,
    pub price: f64,
    /// Billing unit ("visit", "day", ...)
    pub unit: Option<String>,
    pub insurance_price: Option<f64>,
    pub description: Option<String>,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    #[serde(default)]
    pub display_order: i64,
}

impl RequestValidation for ServicePrice {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.required("serviceCode", &self.service_code);
        errors.required("serviceName", &self.service_name);
        errors.non_negative("price", self.price);
        if let Some(price) = self.insurance_price {
            errors.non_negative("insurancePrice", price);
        }
        errors.into_result()
    }
}

pub struct ServicePrices;

#[async_trait]
impl Resource for ServicePrices {
    type Record = ServicePrice;

    const COLLECTION: &'static str = "service-prices";
    const LABEL: &'static str = "Service price";
    const PAGES: &'static [Page] = &[Page::Billing];
    const FILTERS: &'static [&'static str] = &["category", "department", "isActive"];
    const SEARCH: &'static [&'static str] = &["serviceName", "serviceCode"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("displayOrder", SortOrder::Asc);
    const SORTABLE: &'static [&'static str] = &["price"];
    const UNIQUE: &'static [&'static str] = &["serviceCode"];
}

// ============================================================================
// INSURANCE PROVIDERS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InsuranceProvider {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: String,
    pub code: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    /// Share of covered charges paid by the insurer, in percent
    pub coverage_percent: Option<f64>,
    pub contract_start: Option<String>,
    pub contract_end: Option<String>,
    #[serde(default)]
    pub status: ActiveStatus,
    pub notes: Option<String>,
}

impl RequestValidation for InsuranceProvider {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.required("name", &self.name);
        errors.required("code", &self.code);
        errors.check_optional("phone", self.phone.as_deref(), is_valid_phone, "phone must contain 10-11 digits");
        errors.check_optional("email", self.email.as_deref(), is_valid_email, "email is not a valid address");
        errors.percentage("coveragePercent", self.coverage_percent);
        for (field, value) in [("contractStart", &self.contract_start), ("contractEnd", &self.contract_end)] {
            errors.check_optional(field, value.as_deref(), is_valid_date, "dates must use YYYY-MM-DD format");
        }
        errors.into_result()
    }
}

pub struct InsuranceProviders;

#[async_trait]
impl Resource for InsuranceProviders {
    type Record = InsuranceProvider;

    const COLLECTION: &'static str = "insurance-providers";
    const LABEL: &'static str = "Insurance provider";
    const PAGES: &'static [Page] = &[Page::Billing];
    const FILTERS: &'static [&'static str] = &["status"];
    const SEARCH: &'static [&'static str] = &["name", "code"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("name", SortOrder::Asc);
    const UNIQUE: &'static [&'static str] = &["code"];
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice(value: Value) -> Invoice {
        serde_json::from_value(value).expect("invoice deserializes")
    }

    #[test]
    fn test_recalculate_from_subtotal() {
        let mut inv = invoice(json!({
            "patientId": "p1",
            "subtotal": 410000,
            "discountAmount": 0,
            "taxAmount": 0
        }));
        inv.recalculate().expect("recalculates");
        assert_eq!(inv.total_amount, Some(410000.0));
        assert_eq!(inv.remaining_amount, Some(410000.0));
        assert_eq!(inv.status, InvoiceStatus::Pending);
    }

    #[test]
    fn test_recalculate_from_lines_with_percentages() {
        let mut inv = invoice(json!({
            "patientId": "p1",
            "services": [{"name": "Consultation", "unitPrice": 200000}],
            "medicines": [{"name": "Paracetamol", "quantity": 10, "unitPrice": 5000, "discount": 10}],
            "discountPercent": 10,
            "taxPercent": 8
        }));
        inv.recalculate().expect("recalculates");
        assert_eq!(inv.medicines[0].total_price, Some(45000.0));
        assert_eq!(inv.subtotal, 245000.0);
        assert_eq!(inv.discount_amount, Some(24500.0));
        assert_eq!(inv.total_amount, Some(238140.0));
    }

    #[test]
    fn test_overpaid_invoice_rejected() {
        let mut inv = invoice(json!({"patientId": "p1", "subtotal": 100, "paidAmount": 150}));
        assert!(inv.recalculate().is_err());
    }

    #[test]
    fn test_apply_to_invoice() {
        let mut doc = Document::new();
        doc.insert("status".to_string(), json!("pending"));
        doc.insert("totalAmount".to_string(), json!(410000.0));
        doc.insert("paidAmount".to_string(), json!(0.0));

        let paid = apply_to_invoice(doc.clone(), 410000.0, PaymentMethod::Cash).expect("applies");
        assert_eq!(paid.get("status"), Some(&json!("paid")));
        assert_eq!(paid.get("remainingAmount").and_then(Value::as_f64), Some(0.0));
        assert_eq!(paid.get("paymentMethod"), Some(&json!("cash")));

        let err = apply_to_invoice(doc, 500000.0, PaymentMethod::Cash).unwrap_err();
        assert!(matches!(err, DatabaseError::Rejected(_)));
    }
}
