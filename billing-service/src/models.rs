use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Invoice lifecycle status
///
/// `draft → pending → {partial → paid | overdue | cancelled}`. Paid and
/// cancelled are terminal for payment purposes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    #[default]
    Pending,
    Partial,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 6] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Pending,
        InvoiceStatus::Partial,
        InvoiceStatus::Paid,
        InvoiceStatus::Overdue,
        InvoiceStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Partial => "partial",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    /// Whether the invoice counts towards billed revenue.
    pub fn is_billable(&self) -> bool {
        !matches!(self, InvoiceStatus::Draft | InvoiceStatus::Cancelled)
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a payment was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    Insurance,
    EWallet,
}

/// Discount or tax on an invoice. A percent, when present, wins over an
/// absolute amount.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Adjustment {
    pub percent: Option<f64>,
    pub amount: Option<f64>,
}

impl Adjustment {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn percent(percent: f64) -> Self {
        Self {
            percent: Some(percent),
            amount: None,
        }
    }

    pub fn amount(amount: f64) -> Self {
        Self {
            percent: None,
            amount: Some(amount),
        }
    }
}

/// Derived invoice amounts, all rounded to two decimal places.
///
/// `total_amount == subtotal - discount_amount + tax_amount` holds exactly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceTotals {
    pub subtotal: f64,
    pub discount_amount: f64,
    pub tax_amount: f64,
    pub total_amount: f64,
}

/// Payment position of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentState {
    pub status: InvoiceStatus,
    pub total_amount: f64,
    pub paid_amount: f64,
    pub remaining_amount: f64,
}
