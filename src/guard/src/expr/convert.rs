//! Value conversion and coercion helpers

use crate::types::{Credential, Principal};
use serde_json::{json, Value};
use std::cmp::Ordering;

/// Expression view of a credential
pub fn credential_to_value(credential: Option<&Credential>) -> Value {
    match credential {
        Some(c) => json!({
            "value": c.value(),
            "source": c.source().as_str(),
            "source_key": c.source_key(),
            "valid": c.is_valid(),
        }),
        None => Value::Null,
    }
}

/// Expression view of a principal
pub fn principal_to_value(principal: Option<&Principal>) -> Value {
    match principal {
        Some(p) => json!({
            "id": p.id,
            "display_name": p.display_name,
            "roles": p.roles,
            "permissions": p.permissions,
            "attributes": p.attributes,
        }),
        None => Value::Null,
    }
}

/// Coerce an expression result to a decision
///
/// `null` is false, numbers are truncated toward zero and compared with 0,
/// strings are true only for a case-insensitive `"true"`, anything else
/// (lists, objects) is true.
pub fn to_bool(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.trunc() != 0.0),
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Equality with numeric normalisation (`1 == 1.0`)
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => left == right,
    }
}

/// Ordering for numbers and strings; `None` for anything else
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Short type label used in error messages
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CredentialSource;

    #[test]
    fn test_to_bool_coercion() {
        assert!(!to_bool(&Value::Null));
        assert!(to_bool(&json!(true)));
        assert!(!to_bool(&json!(false)));
        assert!(to_bool(&json!(2)));
        assert!(!to_bool(&json!(0)));
        assert!(!to_bool(&json!(0.5)));
        assert!(to_bool(&json!(-1.5)));
        assert!(to_bool(&json!("TRUE")));
        assert!(!to_bool(&json!("yes")));
        assert!(to_bool(&json!([])));
        assert!(to_bool(&json!({"a": 1})));
    }

    #[test]
    fn test_loose_eq_normalises_numbers() {
        assert!(loose_eq(&json!(1), &json!(1.0)));
        assert!(!loose_eq(&json!(1), &json!("1")));
        assert!(loose_eq(&json!("a"), &json!("a")));
        assert!(loose_eq(&Value::Null, &Value::Null));
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare(&json!(1), &json!(2.5)), Some(Ordering::Less));
        assert_eq!(compare(&json!("b"), &json!("a")), Some(Ordering::Greater));
        assert_eq!(compare(&json!(1), &json!("a")), None);
    }

    #[test]
    fn test_credential_view_omits_nothing_expressions_need() {
        let credential = Credential::new("abc", CredentialSource::Cookie, "token");
        let value = credential_to_value(Some(&credential));
        assert_eq!(value["source"], json!("cookie"));
        assert_eq!(value["valid"], json!(false));
        assert_eq!(credential_to_value(None), Value::Null);
    }

    #[test]
    fn test_principal_view() {
        let principal = Principal::new("7", "alice").with_role("USER");
        let value = principal_to_value(Some(&principal));
        assert_eq!(value["display_name"], json!("alice"));
        assert_eq!(value["roles"], json!(["USER"]));
    }
}
