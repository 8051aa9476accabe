//! Core credential and principal types

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Where a credential was found in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    Header,
    Query,
    Cookie,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Header => "header",
            CredentialSource::Query => "query",
            CredentialSource::Cookie => "cookie",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw, not-yet-trusted evidence of identity extracted from a request
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    value: String,
    source: CredentialSource,
    source_key: String,
    valid: bool,
}

impl Credential {
    /// Create an unvalidated credential
    pub fn new(
        value: impl Into<String>,
        source: CredentialSource,
        source_key: impl Into<String>,
    ) -> Self {
        Self {
            value: value.into(),
            source,
            source_key: source_key.into(),
            valid: false,
        }
    }

    /// Raw credential value
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Header, parameter or cookie name the value was read from
    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// True when the value is empty or whitespace only
    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }

    pub(crate) fn mark_valid(&mut self) {
        self.valid = true;
    }
}

// The raw value never reaches logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("source_key", &self.source_key)
            .field("valid", &self.valid)
            .finish()
    }
}

/// Authenticated identity and its authorization attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable principal identifier
    pub id: String,

    /// Login or display name
    pub display_name: String,

    #[serde(default)]
    pub roles: BTreeSet<String>,

    #[serde(default)]
    pub permissions: BTreeSet<String>,

    /// Free-form attributes (email, status, department, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Principal {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}
