//! Error types for the character registry

use thiserror::Error;

use crate::storage::StorageError;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that abort a registry operation.
///
/// Display surface failures are absent: once the store write has
/// happened they degrade the outcome to a partial success instead (see
/// [`crate::coordinator::MirrorStatus`]).
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Character not found: {0}")]
    NotFound(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl RegistryError {
    /// Short machine-readable kind, used by the HTTP surface
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::Unauthorized(_) => "unauthorized",
            RegistryError::Validation(_) => "validation_error",
            RegistryError::NotFound(_) => "not_found",
            RegistryError::InvalidField(_) => "invalid_field",
            RegistryError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

impl From<StorageError> for RegistryError {
    fn from(err: StorageError) -> Self {
        RegistryError::StoreUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_display_all_variants() {
        let test_cases = vec![
            (
                RegistryError::Unauthorized("42".to_string()),
                "Not authorized: 42",
            ),
            (
                RegistryError::Validation("bad rarity".to_string()),
                "Validation failed: bad rarity",
            ),
            (
                RegistryError::NotFound("07".to_string()),
                "Character not found: 07",
            ),
            (
                RegistryError::InvalidField("power".to_string()),
                "Invalid field: power",
            ),
            (
                RegistryError::StoreUnavailable("locked".to_string()),
                "Store unavailable: locked",
            ),
        ];

        for (error, expected_message) in test_cases {
            assert_eq!(
                error.to_string(),
                expected_message,
                "Display mismatch for {:?}",
                error
            );
        }
    }

    #[test]
    fn test_from_storage_error() {
        let err: RegistryError = StorageError::Database("disk I/O error".to_string()).into();
        match err {
            RegistryError::StoreUnavailable(msg) => {
                assert!(
                    msg.contains("disk I/O error"),
                    "Expected message to carry the cause, got: {}",
                    msg
                );
            }
            other => panic!("Expected StoreUnavailable variant, got: {:?}", other),
        }
    }

    #[test]
    fn test_kind_is_distinct_per_variant() {
        let kinds = [
            RegistryError::Unauthorized(String::new()).kind(),
            RegistryError::Validation(String::new()).kind(),
            RegistryError::NotFound(String::new()).kind(),
            RegistryError::InvalidField(String::new()).kind(),
            RegistryError::StoreUnavailable(String::new()).kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }
}
