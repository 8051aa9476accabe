//! Rule expression engine with compiled expression caching

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ExpressionConfig;
use crate::context::RequestContext;
use crate::expr::{
    ast::{CompareOp, Expr, Scope},
    bindings::Bindings,
    convert::{compare, credential_to_value, loose_eq, principal_to_value, to_bool, type_name},
    error::{ExprError, Result},
    functions::FunctionRegistry,
    parser,
};

/// Engine for compiling and evaluating rule expressions
pub struct Engine {
    /// Compiled expression cache (thread-safe)
    cache: Arc<DashMap<String, Arc<Expr>>>,

    /// Function table available to every expression
    functions: FunctionRegistry,

    config: ExpressionConfig,
}

impl Engine {
    /// Engine with the built-in functions and default cache settings
    pub fn new() -> Self {
        Self::with_config(ExpressionConfig::default())
    }

    pub fn with_config(config: ExpressionConfig) -> Self {
        Self::with_functions(config, FunctionRegistry::with_builtins())
    }

    pub fn with_functions(config: ExpressionConfig, functions: FunctionRegistry) -> Self {
        Self {
            cache: Arc::new(DashMap::new()),
            functions,
            config,
        }
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Add or replace a function; call during setup, before traffic
    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    /// Compile an expression, reusing the cached tree when available
    ///
    /// The cache never holds more than `cache_size` entries once a compile
    /// returns; a miss on a full cache is parsed but not retained.
    ///
    /// # Errors
    /// Returns a parse error for malformed text. Failures are not cached.
    pub fn compile(&self, source: &str) -> Result<Arc<Expr>> {
        let source = source.trim();

        if !self.config.enable_cache {
            return parser::parse(source).map(Arc::new);
        }

        if let Some(expr) = self.cache.get(source) {
            return Ok(expr.clone());
        }

        if self.cache.len() >= self.config.cache_size {
            debug!(
                "Expression cache full ({} entries), compiling without caching",
                self.cache.len()
            );
            return parser::parse(source).map(Arc::new);
        }

        // entry() holds the shard lock, so each source is parsed at most once
        let expr = match self.cache.entry(source.to_string()) {
            Entry::Occupied(entry) => return Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let expr = Arc::new(parser::parse(source)?);
                entry.insert(expr.clone());
                expr
            }
        };

        // concurrent misses can all pass the size check above
        if self.cache.len() > self.config.cache_size {
            self.cache.remove(source);
            debug!("Expression cache over capacity, dropped '{}'", source);
            return Ok(expr);
        }

        debug!("Compiled expression '{}' ({} nodes)", source, expr.node_count());
        Ok(expr)
    }

    /// Evaluate `source` against the request context
    ///
    /// Never fails: errors are logged and read as `false`.
    pub fn evaluate(&self, source: &str, ctx: &RequestContext) -> bool {
        self.evaluate_with(source, ctx, &Bindings::new())
    }

    /// Evaluate with extra variables (e.g. `#alias`)
    pub fn evaluate_with(&self, source: &str, ctx: &RequestContext, bindings: &Bindings) -> bool {
        let trimmed = source.trim();
        if trimmed.is_empty() || trimmed == "true" {
            return true;
        }
        if trimmed == "false" {
            return false;
        }

        match self.try_evaluate(trimmed, ctx, bindings) {
            Ok(value) => to_bool(&value),
            Err(e) => {
                warn!(
                    request_id = %ctx.request_id(),
                    "Expression '{}' failed, denying: {}", trimmed, e
                );
                false
            }
        }
    }

    /// Evaluate to the raw value, surfacing errors
    pub fn try_evaluate(
        &self,
        source: &str,
        ctx: &RequestContext,
        bindings: &Bindings,
    ) -> Result<Value> {
        let expr = self.compile(source)?;
        let scope = EvalScope {
            ctx,
            variables: bindings.resolve(ctx),
            functions: &self.functions,
        };
        scope.eval(&expr)
    }

    /// Drop every compiled expression
    pub fn clear_cache(&self) {
        let size = self.cache.len();
        self.cache.clear();
        debug!("Expression cache cleared ({} entries)", size);
    }

    /// Number of cached expressions
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            size: self.cache.len(),
            capacity: self.config.cache_size,
            enabled: self.config.enable_cache,
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached expressions
    pub size: usize,
    pub capacity: usize,
    pub enabled: bool,
}

/// Everything one evaluation can see
struct EvalScope<'a> {
    ctx: &'a RequestContext,
    variables: HashMap<String, Value>,
    functions: &'a FunctionRegistry,
}

impl EvalScope<'_> {
    fn eval(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ident { name, scope } => self.ident(name, scope),
            Expr::Member {
                target,
                property,
                null_safe,
            } => {
                let target = self.eval(target)?;
                member(target, property, *null_safe)
            }
            Expr::Call { name, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>>>()?;
                self.functions.call(name, self.ctx, &args)
            }
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Expr::Not(inner) => Ok(Value::Bool(!to_bool(&self.eval(inner)?))),
            Expr::And(left, right) => {
                if !to_bool(&self.eval(left)?) {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(to_bool(&self.eval(right)?)))
            }
            Expr::Or(left, right) => {
                if to_bool(&self.eval(left)?) {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(to_bool(&self.eval(right)?)))
            }
            Expr::Compare { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                compare_values(*op, &left, &right).map(Value::Bool)
            }
        }
    }

    fn ident(&self, name: &str, scope: &Scope) -> Result<Value> {
        match scope {
            // unset variables read as null
            Scope::Variable => Ok(self.variables.get(name).cloned().unwrap_or(Value::Null)),
            Scope::Root => match name {
                "token" | "credential" => Ok(credential_to_value(self.ctx.credential())),
                "principal" | "userInfo" => Ok(principal_to_value(self.ctx.principal())),
                "path" => Ok(Value::String(self.ctx.path().to_string())),
                _ => self
                    .variables
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ExprError::UnknownIdentifier(name.to_string())),
            },
        }
    }
}

fn member(target: Value, property: &str, null_safe: bool) -> Result<Value> {
    match target {
        Value::Object(mut fields) => Ok(fields.remove(property).unwrap_or(Value::Null)),
        Value::Null if null_safe => Ok(Value::Null),
        other => Err(ExprError::PropertyAccess {
            property: property.to_string(),
            target: type_name(&other).to_string(),
        }),
    }
}

fn compare_values(op: CompareOp, left: &Value, right: &Value) -> Result<bool> {
    use std::cmp::Ordering;

    match op {
        CompareOp::Eq => Ok(loose_eq(left, right)),
        CompareOp::Ne => Ok(!loose_eq(left, right)),
        _ => {
            let ordering = compare(left, right).ok_or_else(|| {
                ExprError::Type(format!(
                    "cannot order {} and {}",
                    type_name(left),
                    type_name(right)
                ))
            })?;
            Ok(match op {
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Le => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}
