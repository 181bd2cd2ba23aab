use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{BillingError, BillingResult};
use crate::models::{Adjustment, InvoiceTotals};

/// Convert a boundary amount into a decimal, rejecting NaN and infinities.
pub(crate) fn to_decimal(field: &str, value: f64) -> BillingResult<Decimal> {
    if !value.is_finite() {
        return Err(BillingError::Arithmetic(format!("{field} must be a finite number")));
    }
    Decimal::from_f64(value)
        .ok_or_else(|| BillingError::Arithmetic(format!("{field} is out of range")))
}

pub(crate) fn to_money(value: Decimal) -> BillingResult<f64> {
    round_money(value)
        .to_f64()
        .ok_or_else(|| BillingError::Arithmetic(format!("{value} cannot be represented")))
}

pub(crate) fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn non_negative(field: &str, value: f64) -> BillingResult<Decimal> {
    let amount = to_decimal(field, value)?;
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(BillingError::Validation(format!("{field} must not be negative")));
    }
    Ok(amount)
}

fn percentage(field: &str, value: f64) -> BillingResult<Decimal> {
    let percent = non_negative(field, value)?;
    if percent > Decimal::ONE_HUNDRED {
        return Err(BillingError::Validation(format!("{field} must lie between 0 and 100")));
    }
    Ok(percent)
}

/// Total price of one invoice line: `quantity * unit_price * (1 - discount/100)`.
pub fn line_total(quantity: f64, unit_price: f64, discount_percent: Option<f64>) -> BillingResult<f64> {
    let quantity = non_negative("quantity", quantity)?;
    let unit_price = non_negative("unitPrice", unit_price)?;
    let discount = match discount_percent {
        Some(percent) => percentage("discount", percent)?,
        None => Decimal::ZERO,
    };
    let gross = quantity * unit_price;
    to_money(gross - gross * discount / Decimal::ONE_HUNDRED)
}

/// Sum of line totals, used as the invoice subtotal when items are present.
pub fn subtotal<I>(line_totals: I) -> BillingResult<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut sum = Decimal::ZERO;
    for value in line_totals {
        sum += non_negative("totalPrice", value)?;
    }
    to_money(sum)
}

impl InvoiceTotals {
    /// Derive discount, tax and total from a subtotal.
    ///
    /// The discount is taken from `subtotal` and the tax from what remains
    /// after the rounded discount. Each component is rounded to the cent and
    /// the total is their sum, so the figures always add up exactly.
    pub fn compute(subtotal: f64, discount: Adjustment, tax: Adjustment) -> BillingResult<Self> {
        let subtotal = round_money(non_negative("subtotal", subtotal)?);

        let discount_amount = round_money(match (discount.percent, discount.amount) {
            (Some(percent), _) => subtotal * percentage("discountPercent", percent)? / Decimal::ONE_HUNDRED,
            (None, Some(amount)) => non_negative("discountAmount", amount)?,
            (None, None) => Decimal::ZERO,
        });
        if discount_amount > subtotal {
            return Err(BillingError::Validation(
                "discountAmount must not exceed subtotal".to_string(),
            ));
        }
        let taxable = subtotal - discount_amount;

        let tax_amount = round_money(match (tax.percent, tax.amount) {
            (Some(percent), _) => taxable * percentage("taxPercent", percent)? / Decimal::ONE_HUNDRED,
            (None, Some(amount)) => non_negative("taxAmount", amount)?,
            (None, None) => Decimal::ZERO,
        });
        let total_amount = taxable + tax_amount;

        Ok(Self {
            subtotal: to_money(subtotal)?,
            discount_amount: to_money(discount_amount)?,
            tax_amount: to_money(tax_amount)?,
            total_amount: to_money(total_amount)?,
        })
    }
}

/// Total of a stock movement or similar `quantity * unit_price` figure.
pub fn extended_amount(quantity: f64, unit_price: f64) -> BillingResult<f64> {
    line_total(quantity, unit_price, None)
}
