//! Request pipeline orchestrator
//!
//! # Flow
//!
//! ```text
//! request → gate → PolicyRegistry → ExtractorChain → ValidatorChain → RuleSource → Engine
//!             │         │                                  │              │           │
//!          [allow]   [allow]                           [reject]      [default]  [allow/deny]
//!                       └──────────────── Metrics ─────────┴──────────────┴───────────┘
//! ```
//!
//! Each request gets its own [`RequestContext`], created before policy lookup
//! and dropped on every exit path. Failures never escape as errors; they are
//! turned into a [`Rejection`] carrying the stage that produced it.

pub mod metrics;

pub use metrics::{MetricsSnapshot, PipelineMetrics};

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{GuardConfig, RejectionConfig};
use crate::context::RequestContext;
use crate::error::{AuthError, FailureKind, Result};
use crate::expr::{Bindings, Engine};
use crate::extract::{ExtractorChain, RequestParts};
use crate::policy::{compile_patterns, matches_path, PathPattern, PolicyRegistry};
use crate::response::ErrorBody;
use crate::rule::{AuthorizationRule, Operation, RuleSource, RuleTable};
use crate::types::{Credential, Principal};

/// Pipeline stage, reported with every rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PolicyLookup,
    Extraction,
    Validation,
    RuleResolution,
    Evaluation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::PolicyLookup => "policy_lookup",
            Stage::Extraction => "extraction",
            Stage::Validation => "validation",
            Stage::RuleResolution => "rule_resolution",
            Stage::Evaluation => "evaluation",
        };
        f.write_str(name)
    }
}

/// Why a request was let through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowReason {
    /// The guard is switched off
    Disabled,
    /// Path is outside the global include/exclude gate
    OutsideGate,
    /// No policy matches the path
    NoPolicy,
    /// Not an operation (static resource, fallback handler)
    NoOperation,
    /// No rule declared and the principal is authenticated
    Authenticated,
    /// The operation's rule evaluated to true
    RuleSatisfied,
}

impl AllowReason {
    /// Allowed without entering any policy
    pub fn is_pass_through(&self) -> bool {
        matches!(
            self,
            AllowReason::Disabled | AllowReason::OutsideGate | AllowReason::NoPolicy
        )
    }
}

/// Successful pipeline result
#[derive(Debug, Clone, PartialEq)]
pub struct Grant {
    pub request_id: Uuid,
    pub reason: AllowReason,

    /// Name of the policy that applied
    pub policy: Option<String>,

    /// Authenticated principal, when a credential was validated
    pub principal: Option<Principal>,
}

/// Typed failure produced by the pipeline
#[derive(Debug, Clone)]
pub struct Rejection {
    kind: FailureKind,
    message: String,
    credential: Option<Credential>,
    stage: Stage,
    request_id: Uuid,
    path: String,
}

impl Rejection {
    pub fn from_error(error: AuthError, stage: Stage, request_id: Uuid, path: impl Into<String>) -> Self {
        Self {
            kind: error.kind(),
            message: error.message().to_string(),
            credential: error.credential().cloned(),
            stage,
            request_id,
            path: path.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Credential involved in the failure, if any
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Status code: authentication failure when no credential is involved,
    /// access denied otherwise
    pub fn status(&self, config: &RejectionConfig) -> u16 {
        if self.credential.is_none() {
            config.auth_failure_status
        } else {
            config.access_denied_status
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.kind, self.stage, self.message)
    }
}

impl std::error::Error for Rejection {}

/// Result of running the pipeline
#[derive(Debug, Clone)]
pub enum Outcome {
    Allowed(Grant),
    Rejected(Rejection),
}

impl Outcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Outcome::Allowed(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Outcome::Rejected(rejection) => Some(rejection),
            Outcome::Allowed(_) => None,
        }
    }

    pub fn into_result(self) -> std::result::Result<Grant, Rejection> {
        match self {
            Outcome::Allowed(grant) => Ok(grant),
            Outcome::Rejected(rejection) => Err(rejection),
        }
    }
}

impl From<std::result::Result<Grant, Rejection>> for Outcome {
    fn from(result: std::result::Result<Grant, Rejection>) -> Self {
        match result {
            Ok(grant) => Outcome::Allowed(grant),
            Err(rejection) => Outcome::Rejected(rejection),
        }
    }
}

/// Authentication and authorization pipeline shared by all requests
pub struct Pipeline {
    config: GuardConfig,
    gate_include: Vec<PathPattern>,
    gate_exclude: Vec<PathPattern>,

    /// Used by policies that declare no extractors of their own
    default_extractors: ExtractorChain,

    registry: Arc<PolicyRegistry>,
    engine: Arc<Engine>,
    rules: Arc<dyn RuleSource>,
    metrics: Arc<PipelineMetrics>,
}

impl Pipeline {
    /// Create a pipeline with an empty registry and rule table
    ///
    /// # Errors
    /// Returns the configuration error when `config` does not validate.
    pub fn new(config: GuardConfig) -> Result<Self> {
        config.validate()?;

        let pipeline = Self {
            gate_include: compile_patterns(&config.include_patterns)?,
            gate_exclude: compile_patterns(&config.exclude_patterns)?,
            default_extractors: ExtractorChain::from_config(&config.token),
            registry: Arc::new(PolicyRegistry::new()),
            engine: Arc::new(Engine::with_config(config.expression)),
            rules: Arc::new(RuleTable::new()),
            metrics: Arc::new(PipelineMetrics::new()),
            config,
        };

        info!(
            "Pipeline initialized (enabled={}, gate include={:?}, exclude={:?})",
            pipeline.config.enabled, pipeline.config.include_patterns, pipeline.config.exclude_patterns
        );

        Ok(pipeline)
    }

    pub fn with_registry(mut self, registry: Arc<PolicyRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the expression engine (e.g. one with extra functions)
    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = Arc::new(engine);
        self
    }

    pub fn with_rules<R: RuleSource + 'static>(mut self, rules: R) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PolicyRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Extractor chain built from the token configuration
    pub fn default_extractors(&self) -> &ExtractorChain {
        &self.default_extractors
    }

    /// Decide a request; the context is dropped before returning
    pub fn authorize(&self, request: &dyn RequestParts, operation: Option<&Operation>) -> Outcome {
        let mut ctx = RequestContext::new(request.path());
        self.run(request, operation, &mut ctx).into()
    }

    /// Decide a request and, when allowed, run `handler` with the live context
    ///
    /// The context is dropped after the handler returns.
    pub fn handle<F, T>(
        &self,
        request: &dyn RequestParts,
        operation: Option<&Operation>,
        handler: F,
    ) -> std::result::Result<T, Rejection>
    where
        F: FnOnce(&RequestContext) -> T,
    {
        let mut ctx = RequestContext::new(request.path());
        self.run(request, operation, &mut ctx)?;
        Ok(handler(&ctx))
    }

    /// Error body for a rejection using this pipeline's rejection settings
    pub fn render(&self, rejection: &Rejection) -> ErrorBody {
        ErrorBody::from_rejection(rejection, &self.config.rejection)
    }

    fn run(
        &self,
        request: &dyn RequestParts,
        operation: Option<&Operation>,
        ctx: &mut RequestContext,
    ) -> std::result::Result<Grant, Rejection> {
        let start = Instant::now();
        let request_id = ctx.request_id();
        let stage = Cell::new(Stage::PolicyLookup);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.decide(request, operation, &mut *ctx, &stage)
        }))
        .unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            error!(
                request_id = %request_id,
                "Pipeline fault at {} for '{}': {}", stage.get(), request.path(), message
            );
            Err(AuthError::internal(message))
        });

        let elapsed = start.elapsed();
        match result {
            Ok((reason, policy)) => {
                if reason.is_pass_through() {
                    self.metrics.record_pass_through(elapsed);
                } else {
                    self.metrics.record_allowed(elapsed);
                }
                Ok(Grant {
                    request_id,
                    reason,
                    policy,
                    principal: ctx.principal().cloned(),
                })
            }
            Err(err) => {
                self.metrics.record_rejected(err.kind(), elapsed);
                let rejection = Rejection::from_error(err, stage.get(), request_id, request.path());
                info!(
                    request_id = %request_id,
                    "Rejected '{}': {}", rejection.path(), rejection
                );
                Err(rejection)
            }
        }
    }

    fn decide(
        &self,
        request: &dyn RequestParts,
        operation: Option<&Operation>,
        ctx: &mut RequestContext,
        stage: &Cell<Stage>,
    ) -> std::result::Result<(AllowReason, Option<String>), AuthError> {
        let request_id = ctx.request_id();
        let path = request.path();

        if !self.config.enabled {
            debug!(request_id = %request_id, "Guard disabled, allowing '{}'", path);
            return Ok((AllowReason::Disabled, None));
        }

        if !matches_path(&self.gate_include, &self.gate_exclude, path) {
            debug!(request_id = %request_id, "Path '{}' is outside the guard", path);
            return Ok((AllowReason::OutsideGate, None));
        }

        // Policy lookup
        let Some(policy) = self.registry.find(path) else {
            return Ok((AllowReason::NoPolicy, None));
        };

        let policy_name = Some(policy.name().to_string());

        // Extraction
        stage.set(Stage::Extraction);
        let extractors = if policy.extractors().is_empty() {
            &self.default_extractors
        } else {
            policy.extractors()
        };
        match extractors.extract(request) {
            Some(credential) => {
                debug!(
                    request_id = %request_id,
                    "Extracted credential from {} '{}'", credential.source(), credential.source_key()
                );
                ctx.set_credential(credential);
            }
            None => debug!(request_id = %request_id, "No credential, continuing anonymously"),
        }

        // Validation
        if ctx.credential().is_some() {
            stage.set(Stage::Validation);
            policy.validators().validate(ctx)?;

            if let Some(credential) = ctx.credential().filter(|c| !c.is_valid()) {
                warn!(
                    request_id = %request_id,
                    "Policy '{}' accepted no validator for the credential", policy.name()
                );
                return Err(AuthError::malformed(
                    credential,
                    "credential was not accepted by any validator",
                ));
            }
        }

        // Rule resolution
        stage.set(Stage::RuleResolution);
        let Some(operation) = operation else {
            debug!(request_id = %request_id, "No operation for '{}', allowing", path);
            return Ok((AllowReason::NoOperation, policy_name));
        };

        let Some(resolved) = self.rules.resolve(operation) else {
            if ctx.is_authenticated() {
                return Ok((AllowReason::Authenticated, policy_name));
            }
            return Err(AuthError::missing_credential(
                AuthorizationRule::require_login().failure_message,
            ));
        };

        // Evaluation
        stage.set(Stage::Evaluation);
        let mut bindings = Bindings::new();
        if let Some(alias) = resolved.alias {
            bindings.insert("alias", alias);
        }

        if self
            .engine
            .evaluate_with(&resolved.rule.expression, ctx, &bindings)
        {
            debug!(
                request_id = %request_id,
                "Rule '{}' satisfied for {}", resolved.rule.expression, operation
            );
            Ok((AllowReason::RuleSatisfied, policy_name))
        } else {
            debug!(
                request_id = %request_id,
                "Rule '{}' denied {}", resolved.rule.expression, operation
            );
            Err(AuthError::access_denied(
                ctx.credential(),
                resolved.rule.failure_message,
            ))
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("cache", &self.engine.cache_stats())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::SimpleRequest;
    use crate::validate::{CredentialValidator, DirectoryEntry, InMemoryDirectory, Next, PrefixedTokenValidator};

    fn directory() -> Arc<InMemoryDirectory> {
        let directory = InMemoryDirectory::new();
        directory.insert(
            "admin_token",
            DirectoryEntry::active(Principal::new("1", "admin").with_roles(["ADMIN", "USER"])),
        );
        directory.insert(
            "user_token",
            DirectoryEntry::active(Principal::new("2", "user").with_role("USER")),
        );
        Arc::new(directory)
    }

    fn pipeline() -> Pipeline {
        let pipeline = Pipeline::new(GuardConfig::default())
            .unwrap()
            .with_rules(
                RuleTable::new()
                    .group("Admin", AuthorizationRule::new("#hasRole('ADMIN')").with_message("admins only"))
                    .method("Public", "info", AuthorizationRule::permit_all()),
            );
        pipeline
            .registry()
            .add("api")
            .include(["/api/**"])
            .exclude(["/api/public/**"])
            .validator(PrefixedTokenValidator::new(directory()))
            .register()
            .unwrap();
        pipeline
    }

    fn bearer(path: &str, token: &str) -> SimpleRequest {
        SimpleRequest::new(path).with_header("Authorization", format!("Bearer {}", token))
    }

    #[test]
    fn test_disabled_guard_allows_everything() {
        let config = GuardConfig {
            enabled: false,
            ..GuardConfig::default()
        };
        let pipeline = Pipeline::new(config).unwrap();
        let outcome = pipeline.authorize(&SimpleRequest::new("/api/x"), None);
        assert!(matches!(outcome, Outcome::Allowed(Grant { reason: AllowReason::Disabled, .. })));
    }

    #[test]
    fn test_gate_excludes_static_paths() {
        let outcome = pipeline().authorize(
            &SimpleRequest::new("/static/app.js"),
            Some(&Operation::new("Admin", "x")),
        );
        assert!(matches!(outcome, Outcome::Allowed(Grant { reason: AllowReason::OutsideGate, .. })));
    }

    #[test]
    fn test_no_policy_passes_through() {
        let outcome = pipeline().authorize(&SimpleRequest::new("/other"), Some(&Operation::new("Admin", "x")));
        assert!(matches!(outcome, Outcome::Allowed(Grant { reason: AllowReason::NoPolicy, .. })));

        let outcome = pipeline().authorize(
            &SimpleRequest::new("/api/public/info"),
            Some(&Operation::new("Admin", "x")),
        );
        assert!(matches!(outcome, Outcome::Allowed(Grant { reason: AllowReason::NoPolicy, .. })));
    }

    #[test]
    fn test_rule_satisfied() {
        let outcome = pipeline().authorize(
            &bearer("/api/admin/stats", "admin_token"),
            Some(&Operation::new("Admin", "stats")),
        );
        let grant = outcome.into_result().unwrap();
        assert_eq!(grant.reason, AllowReason::RuleSatisfied);
        assert_eq!(grant.policy.as_deref(), Some("api"));
        assert_eq!(grant.principal.unwrap().id, "1");
    }

    #[test]
    fn test_rule_denied() {
        let rejection = pipeline()
            .authorize(&bearer("/api/admin/stats", "user_token"), Some(&Operation::new("Admin", "stats")))
            .into_result()
            .unwrap_err();
        assert_eq!(rejection.kind(), FailureKind::AccessDenied);
        assert_eq!(rejection.message(), "admins only");
        assert_eq!(rejection.stage(), Stage::Evaluation);
        assert_eq!(rejection.status(&RejectionConfig::default()), 403);
    }

    #[test]
    fn test_no_rule_requires_login() {
        let pipeline = pipeline();
        let operation = Operation::new("Orders", "list");

        let rejection = pipeline
            .authorize(&SimpleRequest::new("/api/orders"), Some(&operation))
            .into_result()
            .unwrap_err();
        assert_eq!(rejection.kind(), FailureKind::MissingCredential);
        assert_eq!(rejection.stage(), Stage::RuleResolution);
        assert_eq!(rejection.status(&RejectionConfig::default()), 401);

        let grant = pipeline
            .authorize(&bearer("/api/orders", "user_token"), Some(&operation))
            .into_result()
            .unwrap();
        assert_eq!(grant.reason, AllowReason::Authenticated);
    }

    #[test]
    fn test_permit_all_rule_allows_anonymous() {
        let outcome = pipeline().authorize(&SimpleRequest::new("/api/info"), Some(&Operation::new("Public", "info")));
        assert!(outcome.is_allowed());
    }

    #[test]
    fn test_no_operation_allows_after_validation() {
        let outcome = pipeline().authorize(&SimpleRequest::new("/api/favicon"), None);
        assert!(matches!(outcome, Outcome::Allowed(Grant { reason: AllowReason::NoOperation, .. })));

        // a bad credential is still rejected
        let outcome = pipeline().authorize(&bearer("/api/favicon", "nobody"), None);
        assert_eq!(outcome.rejection().unwrap().kind(), FailureKind::UnknownPrincipal);
    }

    #[test]
    fn test_unsupported_credential_is_malformed() {
        let request = SimpleRequest::new("/api/orders").with_header("X-Token", "opaque");
        let rejection = pipeline()
            .authorize(&request, Some(&Operation::new("Orders", "list")))
            .into_result()
            .unwrap_err();
        assert_eq!(rejection.kind(), FailureKind::Malformed);
        assert_eq!(rejection.stage(), Stage::Validation);
        assert_eq!(rejection.credential().unwrap().source_key(), "X-Token");
    }

    #[test]
    fn test_validator_panic_becomes_internal_failure() {
        struct Exploding;

        impl CredentialValidator for Exploding {
            fn validate(&self, _next: Next<'_>, _ctx: &mut RequestContext) -> std::result::Result<(), AuthError> {
                panic!("directory unavailable");
            }
        }

        let pipeline = Pipeline::new(GuardConfig::default()).unwrap();
        pipeline.registry().add("all").validator(Exploding).register().unwrap();

        let rejection = pipeline
            .authorize(&bearer("/x", "t"), None)
            .into_result()
            .unwrap_err();
        assert_eq!(rejection.kind(), FailureKind::InternalFailure);
        assert_eq!(rejection.stage(), Stage::Validation);
        assert!(rejection.message().contains("directory unavailable"));
    }

    #[test]
    fn test_handle_exposes_principal_to_handler() {
        let pipeline = pipeline();
        let name = pipeline
            .handle(
                &bearer("/api/admin/users", "admin_token"),
                Some(&Operation::new("Admin", "users")),
                |ctx| ctx.principal().map(|p| p.display_name.clone()),
            )
            .unwrap();
        assert_eq!(name.as_deref(), Some("admin"));
    }

    #[test]
    fn test_handle_skips_handler_on_rejection() {
        let mut called = false;
        let result = pipeline().handle(
            &SimpleRequest::new("/api/admin/users"),
            Some(&Operation::new("Admin", "users")),
            |_| called = true,
        );
        assert!(result.is_err());
        assert!(!called);
    }

    #[test]
    fn test_metrics_are_recorded() {
        let pipeline = pipeline();
        pipeline.authorize(&SimpleRequest::new("/other"), None);
        pipeline.authorize(&bearer("/api/admin/x", "admin_token"), Some(&Operation::new("Admin", "x")));
        pipeline.authorize(&bearer("/api/admin/x", "user_token"), Some(&Operation::new("Admin", "x")));

        let snapshot = pipeline.metrics().snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.passed_through, 1);
        assert_eq!(snapshot.allowed, 1);
        assert_eq!(snapshot.rejected[&FailureKind::AccessDenied], 1);
    }

    #[test]
    fn test_render_uses_configured_statuses() {
        let pipeline = pipeline();
        let rejection = pipeline
            .authorize(&SimpleRequest::new("/api/orders"), Some(&Operation::new("Orders", "list")))
            .into_result()
            .unwrap_err();
        let body = pipeline.render(&rejection);
        assert_eq!(body.code, 401);
        assert_eq!(body.path, "/api/orders");
    }
}
