//! JSON error bodies for rejected requests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RejectionConfig;
use crate::pipeline::{Rejection, Stage};
use crate::types::CredentialSource;

/// Error body returned to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,

    /// HTTP status code
    pub code: u16,

    pub message: String,

    /// Failure kind code (e.g. `ACCESS_DENIED`)
    pub error_code: String,

    pub timestamp: DateTime<Utc>,

    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_info: Option<CredentialInfo>,
}

/// Diagnostics included only when detailed errors are enabled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub stage: Stage,
    pub request_id: String,
}

/// Credential metadata; the credential value itself is never rendered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialInfo {
    pub source: CredentialSource,
    pub source_key: String,
    pub valid: bool,
}

impl ErrorBody {
    /// Build the body for a rejection using the configured status mapping
    pub fn from_rejection(rejection: &Rejection, config: &RejectionConfig) -> Self {
        let message = if rejection.message().trim().is_empty() {
            config.default_error_message.clone()
        } else {
            rejection.message().to_string()
        };

        let (details, credential_info) = if config.include_error_details {
            (
                Some(ErrorDetails {
                    stage: rejection.stage(),
                    request_id: rejection.request_id().to_string(),
                }),
                rejection.credential().map(|c| CredentialInfo {
                    source: c.source(),
                    source_key: c.source_key().to_string(),
                    valid: c.is_valid(),
                }),
            )
        } else {
            (None, None)
        };

        Self {
            success: false,
            code: rejection.status(config),
            message,
            error_code: rejection.kind().code().to_string(),
            timestamp: Utc::now(),
            path: rejection.path().to_string(),
            details,
            credential_info,
        }
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::types::Credential;
    use uuid::Uuid;

    fn denied() -> Rejection {
        let credential = Credential::new("Bearer secret", CredentialSource::Header, "Authorization");
        Rejection::from_error(
            AuthError::access_denied(Some(&credential), "admins only"),
            Stage::Evaluation,
            Uuid::new_v4(),
            "/api/admin",
        )
    }

    #[test]
    fn test_body_without_details() {
        let body = ErrorBody::from_rejection(&denied(), &RejectionConfig::default());
        assert!(!body.success);
        assert_eq!(body.code, 403);
        assert_eq!(body.message, "admins only");
        assert_eq!(body.error_code, "ACCESS_DENIED");
        assert_eq!(body.path, "/api/admin");
        assert!(body.details.is_none());
        assert!(body.credential_info.is_none());

        let json = body.to_json().unwrap();
        assert!(!json.contains("details"));
        assert!(!json.contains("credential_info"));
    }

    #[test]
    fn test_body_with_details_never_leaks_value() {
        let config = RejectionConfig {
            include_error_details: true,
            ..RejectionConfig::default()
        };
        let body = ErrorBody::from_rejection(&denied(), &config);

        assert_eq!(body.details.as_ref().unwrap().stage, Stage::Evaluation);
        let info = body.credential_info.as_ref().unwrap();
        assert_eq!(info.source, CredentialSource::Header);
        assert_eq!(info.source_key, "Authorization");

        let json = body.to_json().unwrap();
        assert!(json.contains("\"stage\":\"evaluation\""));
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_blank_message_falls_back_to_default() {
        let rejection = Rejection::from_error(
            AuthError::missing_credential(" "),
            Stage::Validation,
            Uuid::new_v4(),
            "/api",
        );
        let body = ErrorBody::from_rejection(&rejection, &RejectionConfig::default());
        assert_eq!(body.code, 401);
        assert_eq!(body.message, "authentication failed");
        assert_eq!(body.error_code, "MISSING_CREDENTIAL");
    }
}
