//! Prefixed opaque-token validator backed by a principal directory

use super::{CredentialValidator, Next};
use crate::context::RequestContext;
use crate::error::AuthError;
use crate::types::{Credential, Principal};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Directory record for one token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub principal: Principal,

    /// Inactive (disabled, locked) principals are refused
    pub active: bool,
}

impl DirectoryEntry {
    pub fn active(principal: Principal) -> Self {
        Self {
            principal,
            active: true,
        }
    }

    pub fn inactive(principal: Principal) -> Self {
        Self {
            principal,
            active: false,
        }
    }
}

/// Resolves the token part of a credential to a principal
pub trait PrincipalDirectory: Send + Sync {
    fn lookup(&self, token: &str) -> Option<DirectoryEntry>;
}

/// Thread-safe in-memory directory
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    entries: RwLock<HashMap<String, DirectoryEntry>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: impl Into<String>, entry: DirectoryEntry) {
        self.entries.write().insert(token.into(), entry);
    }

    pub fn remove(&self, token: &str) -> Option<DirectoryEntry> {
        self.entries.write().remove(token)
    }

    /// Flip the active flag of every entry for `principal_id`; returns how many changed
    pub fn set_active(&self, principal_id: &str, active: bool) -> usize {
        let mut entries = self.entries.write();
        let mut changed = 0;
        for entry in entries.values_mut() {
            if entry.principal.id == principal_id && entry.active != active {
                entry.active = active;
                changed += 1;
            }
        }
        changed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl PrincipalDirectory for InMemoryDirectory {
    fn lookup(&self, token: &str) -> Option<DirectoryEntry> {
        self.entries.read().get(token).cloned()
    }
}

/// Default credential prefix
pub const DEFAULT_PREFIX: &str = "Bearer ";

/// Validates `<prefix><token>` credentials against a [`PrincipalDirectory`]
pub struct PrefixedTokenValidator {
    prefix: String,
    directory: Arc<dyn PrincipalDirectory>,
}

impl PrefixedTokenValidator {
    pub fn new(directory: Arc<dyn PrincipalDirectory>) -> Self {
        Self::with_prefix(DEFAULT_PREFIX, directory)
    }

    pub fn with_prefix(prefix: impl Into<String>, directory: Arc<dyn PrincipalDirectory>) -> Self {
        Self {
            prefix: prefix.into(),
            directory,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl CredentialValidator for PrefixedTokenValidator {
    fn name(&self) -> &str {
        "prefixed-token"
    }

    fn supports(&self, credential: Option<&Credential>) -> bool {
        credential.is_some_and(|c| c.value().starts_with(&self.prefix))
    }

    fn validate(&self, next: Next<'_>, ctx: &mut RequestContext) -> Result<(), AuthError> {
        let Some(credential) = ctx.credential().cloned() else {
            return Err(AuthError::missing_credential("credential is required"));
        };

        let token = credential
            .value()
            .strip_prefix(self.prefix.as_str())
            .map(str::trim)
            .unwrap_or_default();
        if token.is_empty() {
            debug!(request_id = %ctx.request_id(), "Credential has prefix but no token");
            return Err(AuthError::invalid_format(&credential, "credential format is invalid"));
        }

        let Some(entry) = self.directory.lookup(token) else {
            debug!(request_id = %ctx.request_id(), "Credential does not resolve to a principal");
            return Err(AuthError::unknown_principal(
                &credential,
                "credential does not match any principal",
            ));
        };

        if !entry.active {
            debug!(
                request_id = %ctx.request_id(),
                principal = %entry.principal.id,
                "Principal is inactive"
            );
            return Err(AuthError::principal_inactive(&credential, "principal is not active"));
        }

        debug!(
            request_id = %ctx.request_id(),
            principal = %entry.principal.id,
            "Credential validated"
        );
        ctx.authenticate(entry.principal);
        next.run(ctx)
    }
}
