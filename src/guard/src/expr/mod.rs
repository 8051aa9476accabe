//! Rule expression language
//!
//! Small boolean language for authorization rules:
//!
//! ```text
//! #hasRole('ADMIN') and #hasPermission('user:read')
//! hasAnyRole({'OPS', 'ADMIN'}) or #user.attributes.department == 'ops'
//! not isAnonymous() && #alias?.scope != null
//! ```
//!
//! Expressions are parsed once into an [`Expr`] tree and cached by source
//! text. Evaluation reads the request context for functions and bare
//! `token` / `principal`, and the variable map for `#name`.

pub mod ast;
pub mod bindings;
pub mod convert;
pub mod engine;
pub mod error;
pub mod functions;
pub mod parser;

pub use ast::{CompareOp, Expr, Scope};
pub use bindings::Bindings;
pub use engine::{CacheStats, Engine};
pub use error::{ExprError, Result};
pub use functions::{Function, FunctionRegistry};
pub use parser::parse;
