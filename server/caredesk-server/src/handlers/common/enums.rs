//! Closed value sets shared by several record types

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// On/off status used by reference data (suppliers, insurers).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ActiveStatus {
    #[default]
    Active,
    Inactive,
}

/// Serde default for `isActive` flags.
pub fn active_by_default() -> bool {
    true
}
