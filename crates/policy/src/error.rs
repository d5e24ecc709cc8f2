//! Policy error types.

use thiserror::Error;

/// Policy errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An access check was denied.
    #[error("access denied: {0}")]
    Denied(String),

    /// A role definition references a capability the catalog does not know.
    #[error("role '{role}' references unknown capability '{token}'")]
    UnknownCapability { role: String, token: String },

    /// A role definition references a resource type the catalog does not know.
    #[error("role '{role}' references unknown resource type '{resource}'")]
    UnknownResource { role: String, resource: String },

    /// A guard requires a capability the catalog does not know.
    #[error("guard '{guard}' references unknown capability '{token}'")]
    UnknownGuardCapability { guard: String, token: String },

    /// A role referenced at runtime does not exist.
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// The bootstrap definitions are inconsistent.
    #[error("invalid bootstrap definitions: {0}")]
    Invalid(String),

    /// Failed to parse a bootstrap file.
    #[error("failed to parse bootstrap definitions: {0}")]
    Parse(String),

    /// An I/O error occurred while reading definitions.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
