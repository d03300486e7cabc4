//! Authorization of mutating commands
//!
//! Provides:
//! - Caller identity normalization
//! - The static sudo-user set checked before any write

use crate::error::{RegistryError, RegistryResult};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Normalize a caller identity as it arrives from a command surface
pub fn normalize_identity(identity: &str) -> &str {
    identity.trim()
}

// ============================================================================
// ACCESS GUARD
// ============================================================================

/// Holds the privileged identities allowed to mutate the catalog
#[derive(Debug, Clone, Default)]
pub struct AccessGuard {
    sudo_users: HashSet<String>,
}

impl AccessGuard {
    /// Create a guard that denies everyone
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a guard with an initial sudo list
    pub fn with_sudo_users<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = HashSet::new();
        for user in users {
            let user = normalize_identity(user.as_ref());
            if user.is_empty() {
                warn!("Ignoring empty identity in sudo list");
                continue;
            }
            set.insert(user.to_string());
        }
        Self { sudo_users: set }
    }

    pub fn is_privileged(&self, caller: &str) -> bool {
        self.sudo_users.contains(normalize_identity(caller))
    }

    /// Allow or deny a caller. Denial is always `Unauthorized`.
    pub fn authorize(&self, caller: &str) -> RegistryResult<()> {
        if self.is_privileged(caller) {
            Ok(())
        } else {
            debug!("Denied caller '{}'", normalize_identity(caller));
            Err(RegistryError::Unauthorized(format!(
                "'{}' is not allowed to manage characters",
                normalize_identity(caller)
            )))
        }
    }

    pub fn sudo_count(&self) -> usize {
        self.sudo_users.len()
    }
}
