//! Error types for the guard

use crate::types::Credential;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Setup-time errors (registry, configuration)
#[derive(Debug, Error)]
pub enum GuardError {
    /// A policy with the same name is already registered
    #[error("Policy already registered: {0}")]
    DuplicatePolicy(String),

    /// A path pattern could not be compiled
    #[error("Invalid path pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Configuration is structurally valid but unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for setup operations
pub type Result<T> = std::result::Result<T, GuardError>;

/// Category of a pipeline failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// No credential where one is required
    MissingCredential,
    /// Credential present but structurally wrong
    InvalidFormat,
    /// Credential does not resolve to any principal
    UnknownPrincipal,
    /// Principal resolved but disabled or locked
    PrincipalInactive,
    /// Credential could not be processed
    Malformed,
    /// Authenticated but the rule evaluated to false
    AccessDenied,
    /// Unexpected fault during any pipeline stage
    InternalFailure,
}

impl FailureKind {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            FailureKind::MissingCredential => "MISSING_CREDENTIAL",
            FailureKind::InvalidFormat => "INVALID_FORMAT",
            FailureKind::UnknownPrincipal => "UNKNOWN_PRINCIPAL",
            FailureKind::PrincipalInactive => "PRINCIPAL_INACTIVE",
            FailureKind::Malformed => "MALFORMED",
            FailureKind::AccessDenied => "ACCESS_DENIED",
            FailureKind::InternalFailure => "INTERNAL_FAILURE",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Failure raised by a pipeline stage
///
/// Validators return these to abort the chain. Every variant except
/// `MissingCredential` and `Internal` carries the offending credential.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("{message}")]
    MissingCredential { message: String },

    #[error("{message}")]
    InvalidFormat { credential: Credential, message: String },

    #[error("{message}")]
    UnknownPrincipal { credential: Credential, message: String },

    #[error("{message}")]
    PrincipalInactive { credential: Credential, message: String },

    #[error("{message}")]
    Malformed { credential: Credential, message: String },

    #[error("{message}")]
    AccessDenied {
        credential: Option<Credential>,
        message: String,
    },

    #[error("internal failure: {message}")]
    Internal { message: String },
}

impl AuthError {
    pub fn missing_credential(message: impl Into<String>) -> Self {
        AuthError::MissingCredential {
            message: message.into(),
        }
    }

    pub fn invalid_format(credential: &Credential, message: impl Into<String>) -> Self {
        AuthError::InvalidFormat {
            credential: credential.clone(),
            message: message.into(),
        }
    }

    pub fn unknown_principal(credential: &Credential, message: impl Into<String>) -> Self {
        AuthError::UnknownPrincipal {
            credential: credential.clone(),
            message: message.into(),
        }
    }

    pub fn principal_inactive(credential: &Credential, message: impl Into<String>) -> Self {
        AuthError::PrincipalInactive {
            credential: credential.clone(),
            message: message.into(),
        }
    }

    pub fn malformed(credential: &Credential, message: impl Into<String>) -> Self {
        AuthError::Malformed {
            credential: credential.clone(),
            message: message.into(),
        }
    }

    pub fn access_denied(credential: Option<&Credential>, message: impl Into<String>) -> Self {
        AuthError::AccessDenied {
            credential: credential.cloned(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AuthError::Internal {
            message: message.into(),
        }
    }

    /// Failure category
    pub fn kind(&self) -> FailureKind {
        match self {
            AuthError::MissingCredential { .. } => FailureKind::MissingCredential,
            AuthError::InvalidFormat { .. } => FailureKind::InvalidFormat,
            AuthError::UnknownPrincipal { .. } => FailureKind::UnknownPrincipal,
            AuthError::PrincipalInactive { .. } => FailureKind::PrincipalInactive,
            AuthError::Malformed { .. } => FailureKind::Malformed,
            AuthError::AccessDenied { .. } => FailureKind::AccessDenied,
            AuthError::Internal { .. } => FailureKind::InternalFailure,
        }
    }

    /// Credential that caused the failure, if any
    pub fn credential(&self) -> Option<&Credential> {
        match self {
            AuthError::InvalidFormat { credential, .. }
            | AuthError::UnknownPrincipal { credential, .. }
            | AuthError::PrincipalInactive { credential, .. }
            | AuthError::Malformed { credential, .. } => Some(credential),
            AuthError::AccessDenied { credential, .. } => credential.as_ref(),
            AuthError::MissingCredential { .. } | AuthError::Internal { .. } => None,
        }
    }

    /// Human-readable message without the category prefix
    pub fn message(&self) -> &str {
        match self {
            AuthError::MissingCredential { message }
            | AuthError::InvalidFormat { message, .. }
            | AuthError::UnknownPrincipal { message, .. }
            | AuthError::PrincipalInactive { message, .. }
            | AuthError::Malformed { message, .. }
            | AuthError::AccessDenied { message, .. }
            | AuthError::Internal { message } => message,
        }
    }
}
