use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BillingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payment rejected: {0}")]
    Payment(String),

    #[error("Amount is not representable: {0}")]
    Arithmetic(String),
}

pub type BillingResult<T> = Result<T, BillingError>;
