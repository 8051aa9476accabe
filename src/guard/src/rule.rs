//! Authorization rules and their binding to operations

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Message used when a rule does not carry its own
pub const DEFAULT_FAILURE_MESSAGE: &str = "access to this resource is denied";

/// Declarative permission rule attached to an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRule {
    /// Boolean rule expression
    pub expression: String,

    /// Message reported when the expression evaluates to false
    #[serde(default = "default_failure_message")]
    pub failure_message: String,
}

fn default_failure_message() -> String {
    DEFAULT_FAILURE_MESSAGE.to_string()
}

impl AuthorizationRule {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            failure_message: default_failure_message(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = message.into();
        self
    }

    /// Rule that lets everyone through, signed in or not
    pub fn permit_all() -> Self {
        Self::new("true")
    }

    /// Rule that only asks for an authenticated principal
    pub fn require_login() -> Self {
        Self::new("#isAuthenticated()").with_message("please sign in first")
    }
}

/// Target of a request: a handler group (controller) and a method within it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operation {
    group: String,
    method: String,
}

impl Operation {
    pub fn new(group: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            method: method.into(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.group, self.method)
    }
}

/// Rule and metadata found for an operation
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRule {
    pub rule: AuthorizationRule,

    /// Value bound to `#alias` during evaluation
    pub alias: Option<Value>,
}

impl ResolvedRule {
    pub fn new(rule: AuthorizationRule) -> Self {
        Self { rule, alias: None }
    }

    pub fn with_alias(mut self, alias: Value) -> Self {
        self.alias = Some(alias);
        self
    }
}

/// Looks up the rule attached to an operation
pub trait RuleSource: Send + Sync {
    /// `None` means the operation declares no rule
    fn resolve(&self, operation: &Operation) -> Option<ResolvedRule>;
}

impl<F> RuleSource for F
where
    F: Fn(&Operation) -> Option<ResolvedRule> + Send + Sync,
{
    fn resolve(&self, operation: &Operation) -> Option<ResolvedRule> {
        self(operation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RuleKey {
    Group(String),
    Method(String, String),
}

/// Explicit operation → rule table
///
/// Method entries take precedence over group entries. The alias is resolved
/// the same way and independently of the rule, so a method can inherit the
/// group's rule while declaring its own alias.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: HashMap<RuleKey, AuthorizationRule>,
    aliases: HashMap<RuleKey, Value>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rule for every method of `group` without its own rule
    pub fn group(mut self, group: impl Into<String>, rule: AuthorizationRule) -> Self {
        self.rules.insert(RuleKey::Group(group.into()), rule);
        self
    }

    pub fn method(
        mut self,
        group: impl Into<String>,
        method: impl Into<String>,
        rule: AuthorizationRule,
    ) -> Self {
        self.rules
            .insert(RuleKey::Method(group.into(), method.into()), rule);
        self
    }

    pub fn group_alias(mut self, group: impl Into<String>, alias: Value) -> Self {
        self.aliases.insert(RuleKey::Group(group.into()), alias);
        self
    }

    pub fn method_alias(
        mut self,
        group: impl Into<String>,
        method: impl Into<String>,
        alias: Value,
    ) -> Self {
        self.aliases
            .insert(RuleKey::Method(group.into(), method.into()), alias);
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn lookup<'a, T>(map: &'a HashMap<RuleKey, T>, operation: &Operation) -> Option<&'a T> {
        map.get(&RuleKey::Method(
            operation.group.clone(),
            operation.method.clone(),
        ))
        .or_else(|| map.get(&RuleKey::Group(operation.group.clone())))
    }
}

impl RuleSource for RuleTable {
    fn resolve(&self, operation: &Operation) -> Option<ResolvedRule> {
        let rule = Self::lookup(&self.rules, operation)?.clone();
        Some(ResolvedRule {
            rule,
            alias: Self::lookup(&self.aliases, operation).cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> RuleTable {
        RuleTable::new()
            .group("AdminController", AuthorizationRule::new("#hasRole('ADMIN')"))
            .method(
                "AdminController",
                "stats",
                AuthorizationRule::new("#hasPermission('admin:read')").with_message("no stats"),
            )
            .method("UserController", "me", AuthorizationRule::require_login())
            .group_alias("AdminController", json!({"resource": "admin"}))
            .method_alias("AdminController", "audit", json!({"resource": "audit"}))
    }

    #[test]
    fn test_method_rule_wins_over_group() {
        let resolved = table().resolve(&Operation::new("AdminController", "stats")).unwrap();
        assert_eq!(resolved.rule.expression, "#hasPermission('admin:read')");
        assert_eq!(resolved.rule.failure_message, "no stats");
    }

    #[test]
    fn test_group_rule_is_fallback() {
        let resolved = table().resolve(&Operation::new("AdminController", "users")).unwrap();
        assert_eq!(resolved.rule.expression, "#hasRole('ADMIN')");
        assert_eq!(resolved.rule.failure_message, DEFAULT_FAILURE_MESSAGE);
        assert_eq!(resolved.alias, Some(json!({"resource": "admin"})));
    }

    #[test]
    fn test_alias_resolves_independently() {
        let resolved = table().resolve(&Operation::new("AdminController", "audit")).unwrap();
        assert_eq!(resolved.rule.expression, "#hasRole('ADMIN')");
        assert_eq!(resolved.alias, Some(json!({"resource": "audit"})));
    }

    #[test]
    fn test_no_rule() {
        assert!(table().resolve(&Operation::new("UserController", "list")).is_none());
        assert!(table().resolve(&Operation::new("Other", "x")).is_none());
    }

    #[test]
    fn test_stock_rules() {
        assert_eq!(AuthorizationRule::permit_all().expression, "true");
        let login = AuthorizationRule::require_login();
        assert_eq!(login.expression, "#isAuthenticated()");
        assert_eq!(login.failure_message, "please sign in first");
    }

    #[test]
    fn test_closure_rule_source() {
        let source = |op: &Operation| {
            op.method()
                .starts_with("delete")
                .then(|| ResolvedRule::new(AuthorizationRule::new("hasRole('ADMIN')")))
        };
        assert!(source.resolve(&Operation::new("Orders", "deleteOrder")).is_some());
        assert!(source.resolve(&Operation::new("Orders", "listOrders")).is_none());
    }

    #[test]
    fn test_rule_deserializes_with_default_message() {
        let rule: AuthorizationRule =
            serde_json::from_str(r#"{"expression": "hasRole('OPS')"}"#).unwrap();
        assert_eq!(rule.failure_message, DEFAULT_FAILURE_MESSAGE);
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::new("A", "b").to_string(), "A::b");
    }
}
