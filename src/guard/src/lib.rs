//! # CretoAI Guard
//!
//! Request-scoped authentication and authorization for inbound operations.
//!
//! ## Features
//!
//! - **Path policies** with Ant-style include/exclude patterns (exclude wins)
//! - **Credential extraction** from headers, query parameters and cookies
//! - **Validation chains** with explicit `next` hand-off
//! - **Rule expressions** (`#hasRole('ADMIN') and #hasPermission('user:read')`)
//!   compiled once and cached
//! - **Typed rejections** with configurable status mapping and JSON bodies
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use cretoai_guard::{
//!     AuthorizationRule, DirectoryEntry, GuardConfig, InMemoryDirectory, Operation,
//!     Pipeline, PrefixedTokenValidator, Principal, RuleTable, SimpleRequest,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let directory = Arc::new(InMemoryDirectory::new());
//!     directory.insert(
//!         "admin_token",
//!         DirectoryEntry::active(Principal::new("1", "admin").with_role("ADMIN")),
//!     );
//!
//!     let pipeline = Pipeline::new(GuardConfig::default())?.with_rules(
//!         RuleTable::new().group("Admin", AuthorizationRule::new("#hasRole('ADMIN')")),
//!     );
//!     pipeline
//!         .registry()
//!         .add("api")
//!         .include(["/api/**"])
//!         .validator(PrefixedTokenValidator::new(directory))
//!         .register()?;
//!
//!     let request = SimpleRequest::new("/api/admin/stats")
//!         .with_header("Authorization", "Bearer admin_token");
//!     let outcome = pipeline.authorize(&request, Some(&Operation::new("Admin", "stats")));
//!
//!     assert!(outcome.is_allowed());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod expr;
pub mod extract;
pub mod pipeline;
pub mod policy;
pub mod response;
pub mod rule;
pub mod types;
pub mod validate;

// Re-export commonly used types
pub use config::{ExpressionConfig, GuardConfig, RejectionConfig, TokenConfig};
pub use context::RequestContext;
pub use error::{AuthError, FailureKind, GuardError, Result};
pub use expr::{Bindings, Engine, ExprError};
pub use extract::{
    CookieExtractor, CredentialExtractor, ExtractorChain, HeaderExtractor, QueryExtractor,
    RequestParts, SimpleRequest,
};
pub use pipeline::{
    AllowReason, Grant, MetricsSnapshot, Outcome, Pipeline, PipelineMetrics, Rejection, Stage,
};
pub use policy::{PathPattern, Policy, PolicyBuilder, PolicyRegistry};
pub use response::ErrorBody;
pub use rule::{AuthorizationRule, Operation, ResolvedRule, RuleSource, RuleTable};
pub use types::{Credential, CredentialSource, Principal};
pub use validate::{
    CredentialValidator, DirectoryEntry, InMemoryDirectory, Next, PrefixedTokenValidator,
    PrincipalDirectory, ValidatorChain,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
