//! Credential validation chain
//!
//! Validators form a chain of responsibility. A validator that supports the
//! current credential receives a [`Next`] handle and must call
//! [`Next::run`] itself to continue; not calling it short-circuits the rest of
//! the chain. Validators that do not support the credential are skipped.
//!
//! ```text
//! guard → v1 → v2 → … → vN
//!   │
//!   └─ MissingCredential when the context carries no (or a blank) credential
//! ```

pub mod bearer;

pub use bearer::{DirectoryEntry, InMemoryDirectory, PrefixedTokenValidator, PrincipalDirectory};

use crate::context::RequestContext;
use crate::error::AuthError;
use crate::types::Credential;
use std::fmt;
use std::sync::Arc;

/// One link of the validation chain
pub trait CredentialValidator: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Whether this validator applies to the credential
    fn supports(&self, _credential: Option<&Credential>) -> bool {
        true
    }

    /// Validate and, to continue, call `next.run(ctx)`
    fn validate(&self, next: Next<'_>, ctx: &mut RequestContext) -> Result<(), AuthError>;
}

/// Remaining links of the chain
#[derive(Clone, Copy)]
pub struct Next<'a> {
    rest: &'a [Arc<dyn CredentialValidator>],
}

impl<'a> Next<'a> {
    fn new(rest: &'a [Arc<dyn CredentialValidator>]) -> Self {
        Self { rest }
    }

    /// Number of links still ahead
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }

    /// Hand the context to the next supporting validator
    pub fn run(self, ctx: &mut RequestContext) -> Result<(), AuthError> {
        let mut rest = self.rest;
        while let Some((validator, tail)) = rest.split_first() {
            if validator.supports(ctx.credential()) {
                tracing::trace!(validator = validator.name(), "Running validator");
                return validator.validate(Next::new(tail), ctx);
            }
            tracing::trace!(validator = validator.name(), "Validator skipped");
            rest = tail;
        }
        Ok(())
    }
}

/// Head of every chain: rejects before any validator when nothing was presented
#[derive(Debug, Clone, Copy, Default)]
pub struct MissingCredentialGuard;

impl CredentialValidator for MissingCredentialGuard {
    fn name(&self) -> &str {
        "missing-credential-guard"
    }

    fn validate(&self, next: Next<'_>, ctx: &mut RequestContext) -> Result<(), AuthError> {
        match ctx.credential() {
            Some(credential) if !credential.is_blank() => next.run(ctx),
            _ => Err(AuthError::missing_credential("credential is required")),
        }
    }
}

/// Ordered validator list with the missing-credential guard in front
#[derive(Clone)]
pub struct ValidatorChain {
    links: Vec<Arc<dyn CredentialValidator>>,
}

impl ValidatorChain {
    pub fn new() -> Self {
        Self {
            links: vec![Arc::new(MissingCredentialGuard)],
        }
    }

    pub fn push<V: CredentialValidator + 'static>(&mut self, validator: V) {
        self.links.push(Arc::new(validator));
    }

    pub fn push_arc(&mut self, validator: Arc<dyn CredentialValidator>) {
        self.links.push(validator);
    }

    /// Number of user validators (the guard is not counted)
    pub fn len(&self) -> usize {
        self.links.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the chain from the guard
    pub fn validate(&self, ctx: &mut RequestContext) -> Result<(), AuthError> {
        Next::new(&self.links).run(ctx)
    }
}

impl Default for ValidatorChain {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ValidatorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.links.iter().map(|v| v.name()))
            .finish()
    }
}
