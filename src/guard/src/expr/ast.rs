//! Expression syntax tree

use serde_json::Value;

/// How an identifier is resolved
#[derive(Debug, Clone, PartialEq)]
pub enum Scope {
    /// Bare name: property of the request context, then a variable
    Root,
    /// `#name`: variable only
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Compiled rule expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident { name: String, scope: Scope },
    Member {
        target: Box<Expr>,
        property: String,
        null_safe: bool,
    },
    Call { name: String, args: Vec<Expr> },
    List(Vec<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    /// Number of nodes, used in debug logs
    pub fn node_count(&self) -> usize {
        match self {
            Expr::Literal(_) | Expr::Ident { .. } => 1,
            Expr::Member { target, .. } => 1 + target.node_count(),
            Expr::Call { args, .. } | Expr::List(args) => {
                1 + args.iter().map(Expr::node_count).sum::<usize>()
            }
            Expr::Not(inner) => 1 + inner.node_count(),
            Expr::And(l, r) | Expr::Or(l, r) => 1 + l.node_count() + r.node_count(),
            Expr::Compare { left, right, .. } => 1 + left.node_count() + right.node_count(),
        }
    }
}
