//! Error types for rule expressions

use thiserror::Error;

/// Expression parse and evaluation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("Parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),

    #[error("Cannot read property '{property}' of {target}")]
    PropertyAccess { property: String, target: String },

    #[error("Type error: {0}")]
    Type(String),

    #[error("Function '{name}' failed: {message}")]
    Function { name: String, message: String },
}

impl ExprError {
    pub(crate) fn parse(offset: usize, message: impl Into<String>) -> Self {
        ExprError::Parse {
            offset,
            message: message.into(),
        }
    }
}

/// Result type for expression operations
pub type Result<T> = std::result::Result<T, ExprError>;
