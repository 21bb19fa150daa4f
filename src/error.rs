use crate::utils::IsTransient;

// ============================================================================
// Error Taxonomy
// ============================================================================
//
// Every repository and service operation reports failures through
// `AdminError`. Driver errors are wrapped into `StoreFailure` at the
// repository boundary; conditional-write misses are translated into
// `RecordNotFound` or `ConcurrencyConflict` before they leave the store.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Access not allowed: {0}")]
    RecordAccessNotAllowed(String),

    #[error("Concurrency conflict on {id}: expected version {expected}, found {actual:?}")]
    ConcurrencyConflict {
        id: String,
        expected: i64,
        actual: Option<i64>,
    },

    #[error("Store failure: {0}")]
    StoreFailure(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AdminError>;

impl AdminError {
    /// Wrap any driver or serialization error as a store failure.
    pub fn store<E>(error: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        AdminError::StoreFailure(error.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AdminError::RecordNotFound(what.into())
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        AdminError::InvalidArgument(reason.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AdminError::RecordNotFound(_))
    }
}

impl IsTransient for AdminError {
    fn is_transient(&self) -> bool {
        matches!(self, AdminError::StoreFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_failures_are_transient() {
        assert!(AdminError::store(anyhow::anyhow!("timeout")).is_transient());
        assert!(!AdminError::not_found("ENTERPRISE#x").is_transient());
        assert!(!AdminError::invalid("limit").is_transient());
        assert!(!AdminError::ConcurrencyConflict {
            id: "acme".into(),
            expected: 1,
            actual: Some(2),
        }
        .is_transient());
    }

    #[test]
    fn test_conflict_message_names_versions() {
        let err = AdminError::ConcurrencyConflict {
            id: "acme".into(),
            expected: 3,
            actual: Some(4),
        };
        let msg = err.to_string();
        assert!(msg.contains("acme"));
        assert!(msg.contains("expected version 3"));
    }
}
