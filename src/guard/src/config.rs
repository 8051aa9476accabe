//! Guard configuration
//!
//! Every field has a default, so a partial JSON document only needs the
//! values it changes:
//!
//! ```json
//! { "exclude_patterns": ["/health"], "token": { "cookie_name": "sid" } }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{GuardError, Result};
use crate::policy::PathPattern;

/// Top-level guard configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Master switch; when false every request is allowed untouched
    pub enabled: bool,

    /// Global gate: only these paths enter the pipeline
    pub include_patterns: Vec<String>,

    /// Paths always let through, checked after the includes
    pub exclude_patterns: Vec<String>,

    pub token: TokenConfig,

    pub expression: ExpressionConfig,

    pub rejection: RejectionConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_patterns: vec!["/**".to_string()],
            exclude_patterns: [
                "/static/**",
                "/public/**",
                "/resources/**",
                "/META-INF/resources/**",
                "/webjars/**",
                "/favicon.ico",
                "/error",
                "/actuator/**",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            token: TokenConfig::default(),
            expression: ExpressionConfig::default(),
            rejection: RejectionConfig::default(),
        }
    }
}

impl GuardConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check patterns, names and status codes
    pub fn validate(&self) -> Result<()> {
        for pattern in self.include_patterns.iter().chain(&self.exclude_patterns) {
            PathPattern::new(pattern)?;
        }
        self.token.validate()?;
        self.expression.validate()?;
        self.rejection.validate()
    }
}

/// Where credentials are looked for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Header names in priority order
    pub header_names: Vec<String>,

    /// Query parameter name
    pub parameter_name: String,

    pub cookie_name: String,

    pub enable_header_extraction: bool,
    pub enable_parameter_extraction: bool,
    pub enable_cookie_extraction: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            header_names: ["Authorization", "X-Authorization", "X-Token", "token"]
                .into_iter()
                .map(String::from)
                .collect(),
            parameter_name: "token".to_string(),
            cookie_name: "token".to_string(),
            enable_header_extraction: true,
            enable_parameter_extraction: true,
            enable_cookie_extraction: true,
        }
    }
}

impl TokenConfig {
    fn validate(&self) -> Result<()> {
        if self.enable_header_extraction
            && (self.header_names.is_empty() || self.header_names.iter().any(|h| h.trim().is_empty()))
        {
            return Err(GuardError::InvalidConfig(
                "token.header_names must be non-empty names when header extraction is enabled"
                    .to_string(),
            ));
        }
        if self.enable_parameter_extraction && self.parameter_name.trim().is_empty() {
            return Err(GuardError::InvalidConfig(
                "token.parameter_name must not be blank".to_string(),
            ));
        }
        if self.enable_cookie_extraction && self.cookie_name.trim().is_empty() {
            return Err(GuardError::InvalidConfig(
                "token.cookie_name must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

/// Expression cache settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionConfig {
    pub enable_cache: bool,

    /// Maximum number of compiled expressions kept
    pub cache_size: usize,
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self {
            enable_cache: true,
            cache_size: 256,
        }
    }
}

impl ExpressionConfig {
    fn validate(&self) -> Result<()> {
        if self.enable_cache && self.cache_size == 0 {
            return Err(GuardError::InvalidConfig(
                "expression.cache_size must be positive when caching is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// How rejections are reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RejectionConfig {
    /// Status when no credential is involved
    pub auth_failure_status: u16,

    /// Status when a credential was presented but refused
    pub access_denied_status: u16,

    /// Include failure kind and credential metadata in error bodies
    pub include_error_details: bool,

    /// Message used when a rejection carries none
    pub default_error_message: String,
}

impl Default for RejectionConfig {
    fn default() -> Self {
        Self {
            auth_failure_status: 401,
            access_denied_status: 403,
            include_error_details: false,
            default_error_message: "authentication failed".to_string(),
        }
    }
}

impl RejectionConfig {
    fn validate(&self) -> Result<()> {
        for (field, status) in [
            ("auth_failure_status", self.auth_failure_status),
            ("access_denied_status", self.access_denied_status),
        ] {
            if !(400..=599).contains(&status) {
                return Err(GuardError::InvalidConfig(format!(
                    "rejection.{} must be an error status (400-599), got {}",
                    field, status
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GuardConfig::default();
        assert!(config.enabled);
        assert_eq!(config.include_patterns, vec!["/**"]);
        assert!(config.exclude_patterns.contains(&"/actuator/**".to_string()));
        assert_eq!(config.token.header_names[0], "Authorization");
        assert_eq!(config.token.parameter_name, "token");
        assert_eq!(config.expression.cache_size, 256);
        assert_eq!(config.rejection.auth_failure_status, 401);
        assert_eq!(config.rejection.access_denied_status, 403);
        assert!(!config.rejection.include_error_details);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = GuardConfig::from_json_str(
            r#"{"exclude_patterns": ["/health"], "token": {"cookie_name": "sid"}}"#,
        )
        .unwrap();

        assert_eq!(config.exclude_patterns, vec!["/health"]);
        assert_eq!(config.token.cookie_name, "sid");
        assert_eq!(config.token.parameter_name, "token");
        assert_eq!(config.include_patterns, vec!["/**"]);
    }

    #[test]
    fn test_round_trip_through_json() {
        let config = GuardConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(GuardConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_malformed_json() {
        let result = GuardConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(GuardError::Serialization(_))));
    }

    #[test]
    fn test_blank_pattern_rejected() {
        let result = GuardConfig::from_json_str(r#"{"include_patterns": ["  "]}"#);
        assert!(matches!(result, Err(GuardError::InvalidPattern { .. })));
    }

    #[test]
    fn test_invalid_sections_rejected() {
        let result = GuardConfig::from_json_str(r#"{"expression": {"cache_size": 0}}"#);
        assert!(matches!(result, Err(GuardError::InvalidConfig(_))));

        let result = GuardConfig::from_json_str(r#"{"rejection": {"access_denied_status": 200}}"#);
        assert!(matches!(result, Err(GuardError::InvalidConfig(_))));

        let result = GuardConfig::from_json_str(r#"{"token": {"header_names": []}}"#);
        assert!(matches!(result, Err(GuardError::InvalidConfig(_))));
    }

    #[test]
    fn test_disabled_sources_skip_name_checks() {
        let config = GuardConfig::from_json_str(
            r#"{"token": {"header_names": [], "enable_header_extraction": false}}"#,
        )
        .unwrap();
        assert!(!config.token.enable_header_extraction);
    }

    #[test]
    fn test_missing_file() {
        let result = GuardConfig::from_file("/definitely/not/here.json");
        assert!(matches!(result, Err(GuardError::Io(_))));
    }
}
