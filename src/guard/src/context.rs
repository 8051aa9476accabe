//! Per-request authentication context

use crate::types::{Credential, Principal};
use uuid::Uuid;

/// State of one in-flight request
///
/// Created by the pipeline before policy lookup and dropped when the request
/// completes. It is threaded through extraction, validation and evaluation by
/// reference and is never shared between requests.
#[derive(Debug)]
pub struct RequestContext {
    request_id: Uuid,
    path: String,
    credential: Option<Credential>,
    principal: Option<Principal>,
}

impl RequestContext {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            path: path.into(),
            credential: None,
            principal: None,
        }
    }

    /// Context that already carries a credential
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Credential present, validated, and principal bound
    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some() && self.credential.as_ref().is_some_and(|c| c.is_valid())
    }

    /// Mark the credential valid and bind the principal
    ///
    /// Returns `false` (and changes nothing) when there is no credential.
    pub fn authenticate(&mut self, principal: Principal) -> bool {
        match self.credential.as_mut() {
            Some(credential) => {
                credential.mark_valid();
                self.principal = Some(principal);
                true
            }
            None => false,
        }
    }

    /// Replace the credential; ignored once the current one is validated
    pub(crate) fn set_credential(&mut self, credential: Credential) -> bool {
        if self.credential.as_ref().is_some_and(|c| c.is_valid()) {
            return false;
        }
        self.credential = Some(credential);
        true
    }
}
