use crate::error::AdminError;

// ============================================================================
// Enterprise Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnterpriseError {
    #[error("Enterprise id cannot be empty")]
    EmptyId,

    #[error("Enterprise id cannot contain '#': {0}")]
    ReservedCharacterInId(String),

    #[error("Enterprise name cannot be empty")]
    EmptyName,

    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("Website must start with http:// or https://: {0}")]
    InvalidWebsite(String),

    #[error("Max licenses must be at least 1, got {0}")]
    InvalidMaxLicenses(i32),

    #[error("Used licenses cannot be negative, got {0}")]
    NegativeUsedLicenses(i32),

    #[error("Used licenses ({used}) cannot exceed max licenses ({max})")]
    LicensesExceeded { used: i32, max: i32 },

    #[error("Contract end date must be after start date")]
    ContractEndBeforeStart,

    #[error("Monthly revenue cannot be negative or NaN, got {0}")]
    InvalidRevenue(f64),

    #[error("Unknown {field} value: {value}")]
    UnknownValue { field: &'static str, value: String },
}

impl From<EnterpriseError> for AdminError {
    fn from(err: EnterpriseError) -> Self {
        AdminError::InvalidArgument(err.to_string())
    }
}
