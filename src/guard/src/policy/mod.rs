//! Path policies and the policy registry

pub mod pattern;

pub use pattern::PathPattern;

use crate::error::{GuardError, Result};
use crate::extract::{CredentialExtractor, ExtractorChain};
use crate::validate::{CredentialValidator, ValidatorChain};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// Named binding of path patterns to an extraction and validation pipeline
#[derive(Debug, Clone)]
pub struct Policy {
    name: String,
    include: Vec<PathPattern>,
    exclude: Vec<PathPattern>,
    extractors: ExtractorChain,
    validators: ValidatorChain,
}

impl Policy {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn include_patterns(&self) -> impl Iterator<Item = &str> {
        self.include.iter().map(PathPattern::as_str)
    }

    pub fn exclude_patterns(&self) -> impl Iterator<Item = &str> {
        self.exclude.iter().map(PathPattern::as_str)
    }

    pub fn extractors(&self) -> &ExtractorChain {
        &self.extractors
    }

    pub fn validators(&self) -> &ValidatorChain {
        &self.validators
    }

    /// Whether this policy applies to `path`
    ///
    /// The include verdict is computed first; any matching exclude pattern
    /// then clears it.
    pub fn matches(&self, path: &str) -> bool {
        matches_path(&self.include, &self.exclude, path)
    }
}

/// Include/exclude evaluation shared by policies and the global gate
pub(crate) fn matches_path(include: &[PathPattern], exclude: &[PathPattern], path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    if include.is_empty() && exclude.is_empty() {
        return true;
    }

    let mut matched = include.is_empty() || include.iter().any(|p| p.matches(path));

    if exclude.iter().any(|p| p.matches(path)) {
        matched = false;
    }

    matched
}

pub(crate) fn compile_patterns<I, S>(patterns: I) -> Result<Vec<PathPattern>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .map(|p| PathPattern::new(p.as_ref()))
        .collect()
}

/// Builder returned by [`PolicyRegistry::add`]
pub struct PolicyBuilder<'r> {
    registry: &'r PolicyRegistry,
    name: String,
    include: Vec<String>,
    exclude: Vec<String>,
    extractors: ExtractorChain,
    validators: ValidatorChain,
}

impl<'r> PolicyBuilder<'r> {
    pub fn include<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn extractor<E: CredentialExtractor + 'static>(mut self, extractor: E) -> Self {
        self.extractors.push(extractor);
        self
    }

    /// Replace the extractor list wholesale
    pub fn extractors(mut self, chain: ExtractorChain) -> Self {
        self.extractors = chain;
        self
    }

    pub fn validator<V: CredentialValidator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn validator_arc(mut self, validator: Arc<dyn CredentialValidator>) -> Self {
        self.validators.push_arc(validator);
        self
    }

    /// Compile the patterns and append the policy to the registry
    ///
    /// # Errors
    /// `DuplicatePolicy` when the name is taken, `InvalidPattern` when a
    /// pattern cannot be compiled.
    pub fn register(self) -> Result<Arc<Policy>> {
        let policy = Arc::new(Policy {
            include: compile_patterns(&self.include)?,
            exclude: compile_patterns(&self.exclude)?,
            name: self.name,
            extractors: self.extractors,
            validators: self.validators,
        });

        let mut policies = self.registry.policies.write();
        if policies.iter().any(|p| p.name == policy.name) {
            return Err(GuardError::DuplicatePolicy(policy.name.clone()));
        }
        policies.push(policy.clone());

        info!(
            "Registered policy '{}' (include={:?}, exclude={:?}, extractors={:?}, validators={:?})",
            policy.name, self.include, self.exclude, policy.extractors, policy.validators
        );

        Ok(policy)
    }
}

/// Ordered set of policies; the first match wins
///
/// Reads take a short read lock and hand out `Arc` snapshots, so a policy
/// found by an in-flight request stays usable even if it is removed
/// concurrently.
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    policies: RwLock<Vec<Arc<Policy>>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building a policy named `name`
    pub fn add(&self, name: impl Into<String>) -> PolicyBuilder<'_> {
        PolicyBuilder {
            registry: self,
            name: name.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            extractors: ExtractorChain::new(),
            validators: ValidatorChain::new(),
        }
    }

    /// First policy, in registration order, whose patterns match `path`
    pub fn find(&self, path: &str) -> Option<Arc<Policy>> {
        let found = self
            .policies
            .read()
            .iter()
            .find(|p| p.matches(path))
            .cloned();

        match &found {
            Some(policy) => debug!("Path '{}' matched policy '{}'", path, policy.name),
            None => debug!("No policy matches path '{}'", path),
        }

        found
    }

    pub fn get(&self, name: &str) -> Option<Arc<Policy>> {
        self.policies.read().iter().find(|p| p.name == name).cloned()
    }

    pub fn remove(&self, name: &str) -> bool {
        let mut policies = self.policies.write();
        let before = policies.len();
        policies.retain(|p| p.name != name);
        let removed = policies.len() != before;
        if removed {
            info!("Removed policy '{}'", name);
        }
        removed
    }

    pub fn clear(&self) {
        self.policies.write().clear();
        info!("Cleared all policies");
    }

    /// Policy names in registration order
    pub fn names(&self) -> Vec<String> {
        self.policies.read().iter().map(|p| p.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.policies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.read().is_empty()
    }
}
