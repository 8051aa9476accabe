//! Variables bound for one evaluation

use super::convert::{credential_to_value, principal_to_value};
use crate::context::RequestContext;
use serde_json::Value;
use std::collections::HashMap;

/// Caller-supplied extension variables (`#alias`, ...)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    variables: HashMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Full variable set for an evaluation
    ///
    /// `token` and `user` are snapshots of the context taken now; extensions
    /// with the same name override them.
    pub(crate) fn resolve(&self, ctx: &RequestContext) -> HashMap<String, Value> {
        let mut vars = HashMap::with_capacity(self.variables.len() + 2);
        vars.insert("token".to_string(), credential_to_value(ctx.credential()));
        vars.insert("user".to_string(), principal_to_value(ctx.principal()));
        for (name, value) in &self.variables {
            vars.insert(name.clone(), value.clone());
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_includes_token_and_user() {
        let ctx = RequestContext::new("/api");
        let vars = Bindings::new().resolve(&ctx);
        assert_eq!(vars.get("token"), Some(&Value::Null));
        assert_eq!(vars.get("user"), Some(&Value::Null));
    }

    #[test]
    fn test_extensions_are_added() {
        let ctx = RequestContext::new("/api");
        let bindings = Bindings::new().with("alias", json!({"resource": "orders"}));
        let vars = bindings.resolve(&ctx);
        assert_eq!(vars["alias"]["resource"], json!("orders"));
        assert_eq!(vars.len(), 3);
    }
}
