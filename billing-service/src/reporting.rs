use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::BillingResult;
use crate::models::InvoiceStatus;
use crate::service::{round_money, to_decimal, to_money};

/// Figures of one invoice needed for revenue reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvoiceFigures {
    pub status: InvoiceStatus,
    pub total_amount: f64,
    pub paid_amount: f64,
}

/// Revenue over a set of invoices.
///
/// Draft and cancelled invoices are counted per status but contribute nothing
/// to the money figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSummary {
    pub invoice_count: u64,
    pub billed: f64,
    pub collected: f64,
    pub outstanding: f64,
    /// Collected as a percentage of billed, 0 when nothing was billed.
    pub collection_rate: f64,
    pub by_status: BTreeMap<InvoiceStatus, u64>,
}

impl RevenueSummary {
    pub fn from_invoices<I>(invoices: I) -> BillingResult<Self>
    where
        I: IntoIterator<Item = InvoiceFigures>,
    {
        let mut by_status: BTreeMap<InvoiceStatus, u64> =
            InvoiceStatus::ALL.iter().map(|status| (*status, 0)).collect();
        let mut invoice_count = 0u64;
        let mut billed = Decimal::ZERO;
        let mut collected = Decimal::ZERO;

        for invoice in invoices {
            invoice_count += 1;
            *by_status.entry(invoice.status).or_default() += 1;
            if invoice.status.is_billable() {
                billed += to_decimal("totalAmount", invoice.total_amount)?;
                collected += to_decimal("paidAmount", invoice.paid_amount)?;
            }
        }

        let collection_rate = if billed.is_zero() {
            Decimal::ZERO
        } else {
            collected * Decimal::ONE_HUNDRED / billed
        };

        Ok(Self {
            invoice_count,
            billed: to_money(billed)?,
            collected: to_money(collected)?,
            outstanding: to_money(round_money(billed) - round_money(collected))?,
            collection_rate: to_money(collection_rate)?,
            by_status,
        })
    }
}
