use rust_decimal::Decimal;
use tracing::debug;

use crate::error::{BillingError, BillingResult};
use crate::models::{InvoiceStatus, PaymentState};
use crate::service::{round_money, to_decimal, to_money};

/// Derive the remaining balance and status of an invoice from its paid amount.
///
/// Cancelled invoices keep their status. A fully paid invoice with a positive
/// total becomes `paid`; a partly paid one becomes `partial` unless it is
/// already `overdue`. With nothing paid the current status stands, except
/// that `partial`/`paid` fall back to `pending`.
pub fn settle(current: InvoiceStatus, total_amount: f64, paid_amount: f64) -> BillingResult<PaymentState> {
    let total = round_money(to_decimal("totalAmount", total_amount)?);
    let paid = round_money(to_decimal("paidAmount", paid_amount)?);

    if paid < Decimal::ZERO {
        return Err(BillingError::Validation("paidAmount must not be negative".to_string()));
    }
    if paid > total {
        return Err(BillingError::Validation(
            "paidAmount must not exceed totalAmount".to_string(),
        ));
    }

    let status = match current {
        InvoiceStatus::Cancelled => InvoiceStatus::Cancelled,
        _ if total > Decimal::ZERO && paid >= total => InvoiceStatus::Paid,
        InvoiceStatus::Overdue if paid > Decimal::ZERO => InvoiceStatus::Overdue,
        _ if paid > Decimal::ZERO => InvoiceStatus::Partial,
        InvoiceStatus::Partial | InvoiceStatus::Paid => InvoiceStatus::Pending,
        other => other,
    };

    Ok(PaymentState {
        status,
        total_amount: to_money(total)?,
        paid_amount: to_money(paid)?,
        remaining_amount: to_money(total - paid)?,
    })
}

/// Apply one payment to an invoice.
///
/// # Errors
///
/// Rejects non-positive amounts, payments on cancelled or already settled
/// invoices, and amounts larger than the remaining balance.
pub fn apply_payment(state: &PaymentState, amount: f64) -> BillingResult<PaymentState> {
    let amount = round_money(to_decimal("amount", amount)?);
    if amount <= Decimal::ZERO {
        return Err(BillingError::Payment("amount must be greater than zero".to_string()));
    }

    match state.status {
        InvoiceStatus::Cancelled => {
            return Err(BillingError::Payment("invoice is cancelled".to_string()));
        }
        InvoiceStatus::Paid => {
            return Err(BillingError::Payment("invoice is already paid".to_string()));
        }
        _ => {}
    }

    let total = round_money(to_decimal("totalAmount", state.total_amount)?);
    let paid = round_money(to_decimal("paidAmount", state.paid_amount)?);
    let remaining = total - paid;
    if amount > remaining {
        return Err(BillingError::Payment(format!(
            "amount {amount} exceeds remaining balance {remaining}"
        )));
    }

    let current = match state.status {
        InvoiceStatus::Draft => InvoiceStatus::Pending,
        other => other,
    };
    let next = settle(current, to_money(total)?, to_money(paid + amount)?)?;
    debug!(
        from = %state.status,
        to = %next.status,
        remaining = next.remaining_amount,
        "Payment applied"
    );
    Ok(next)
}
