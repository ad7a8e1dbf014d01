//! Newtype identifiers.
//!
//! Service names and call identities are distinct newtypes so they cannot be
//! swapped with arbitrary strings by accident.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Call identity
// ---------------------------------------------------------------------------

/// Identifies a single call descriptor.
///
/// Generated fresh for every [`crate::Request`]; recorded on tracing spans so
/// pre-call, post-call and retry events for one logical call can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(Uuid);

impl CallId {
    /// Generates a new random call identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new_random()
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Service names
// ---------------------------------------------------------------------------

/// Prefix shared by every provider service name.
pub const SERVICE_PREFIX: &str = "SoftLayer_";

/// Services that live outside the provider namespace and are never prefixed.
pub const UNPREFIXED_SERVICES: &[&str] = &["BluePages_Search", "IntegratedOfferingTeam_Region"];

/// A fully-qualified remote service name (e.g. `"SoftLayer_Account"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceName(String);

impl ServiceName {
    /// Wraps an already-qualified name as given. Returns `None` when it is
    /// blank or contains whitespace.
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            None
        } else {
            Some(Self(name))
        }
    }

    /// Qualifies a short service name with [`SERVICE_PREFIX`].
    ///
    /// `"Account"` becomes `"SoftLayer_Account"`; names that already carry the
    /// prefix, and the [`UNPREFIXED_SERVICES`], are kept as-is. Surrounding
    /// whitespace is ignored.
    pub fn qualify(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() || name.starts_with(SERVICE_PREFIX) || UNPREFIXED_SERVICES.contains(&name) {
            Self::new(name)
        } else {
            Self::new(format!("{SERVICE_PREFIX}{name}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
