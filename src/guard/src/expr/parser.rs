//! Tokenizer and recursive-descent parser for rule expressions
//!
//! ```text
//! or      := and (("or" | "||") and)*
//! and     := unary (("and" | "&&") unary)*
//! unary   := ("not" | "!") unary | compare
//! compare := postfix (("==" | "!=" | "<" | "<=" | ">" | ">=" | eq | ne | lt | le | gt | ge) postfix)?
//! postfix := primary (("." | "?.") IDENT)*
//! primary := STRING | NUMBER | "-" NUMBER | true | false | null
//!          | "(" or ")" | "{" [or ("," or)*] "}"
//!          | ["#"] IDENT ["(" [or ("," or)*] ")"]
//! ```
//!
//! Keywords are case-insensitive. Nesting is capped at [`MAX_DEPTH`] levels so
//! that evaluation and drop stay within a bounded stack.

use super::ast::{CompareOp, Expr, Scope};
use super::error::{ExprError, Result};
use serde_json::{Number, Value};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Str(String),
    Num(Number),
    Ident(String),
    Hash,
    Dot,
    SafeDot,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Minus,
    AndOp,
    OrOp,
    Bang,
    Cmp(CompareOp),
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Str(s) => format!("string '{}'", s),
            Token::Num(n) => format!("number {}", n),
            Token::Ident(i) => format!("identifier '{}'", i),
            Token::Eof => "end of expression".to_string(),
            other => format!("{:?}", other),
        }
    }
}

struct Lexer<'a> {
    src: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<(usize, Token)>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.1 == Token::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn bump_if(&mut self, expected: char) -> bool {
        if self.chars.peek().map(|&(_, c)| c) == Some(expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn next_token(&mut self) -> Result<(usize, Token)> {
        while self.chars.peek().is_some_and(|&(_, c)| c.is_whitespace()) {
            self.chars.next();
        }

        let Some((pos, c)) = self.chars.next() else {
            return Ok((self.src.len(), Token::Eof));
        };

        let token = match c {
            '\'' | '"' => self.string(pos, c)?,
            '0'..='9' => self.number(pos)?,
            c if c.is_alphabetic() || c == '_' || c == '$' => self.ident(pos),
            '#' => Token::Hash,
            '.' => Token::Dot,
            '?' if self.bump_if('.') => Token::SafeDot,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ',' => Token::Comma,
            '-' => Token::Minus,
            '&' if self.bump_if('&') => Token::AndOp,
            '|' if self.bump_if('|') => Token::OrOp,
            '!' if self.bump_if('=') => Token::Cmp(CompareOp::Ne),
            '!' => Token::Bang,
            '=' if self.bump_if('=') => Token::Cmp(CompareOp::Eq),
            '<' if self.bump_if('=') => Token::Cmp(CompareOp::Le),
            '<' => Token::Cmp(CompareOp::Lt),
            '>' if self.bump_if('=') => Token::Cmp(CompareOp::Ge),
            '>' => Token::Cmp(CompareOp::Gt),
            other => {
                return Err(ExprError::parse(pos, format!("unexpected character '{}'", other)));
            }
        };

        Ok((pos, token))
    }

    fn string(&mut self, start: usize, quote: char) -> Result<Token> {
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some((_, c)) if c == quote => {
                    // doubled quote is an escaped quote
                    if self.bump_if(quote) {
                        out.push(quote);
                    } else {
                        return Ok(Token::Str(out));
                    }
                }
                Some((_, c)) => out.push(c),
                None => return Err(ExprError::parse(start, "unterminated string literal")),
            }
        }
    }

    fn number(&mut self, start: usize) -> Result<Token> {
        let mut end = start + 1;
        let mut seen_dot = false;
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                end = i + 1;
                self.chars.next();
            } else if c == '.' && !seen_dot {
                // only a fraction if a digit follows
                let rest = &self.src[i + 1..];
                if !rest.starts_with(|d: char| d.is_ascii_digit()) {
                    break;
                }
                seen_dot = true;
                end = i + 1;
                self.chars.next();
            } else {
                break;
            }
        }

        let text = &self.src[start..end];
        let number = if seen_dot {
            text.parse::<f64>().ok().and_then(Number::from_f64)
        } else {
            text.parse::<i64>().ok().map(Number::from)
        };

        number
            .map(Token::Num)
            .ok_or_else(|| ExprError::parse(start, format!("invalid number '{}'", text)))
    }

    fn ident(&mut self, start: usize) -> Token {
        let mut end = start + self.src[start..].chars().next().map_or(1, char::len_utf8);
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                end = i + c.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        let word = &self.src[start..end];

        match word.to_ascii_lowercase().as_str() {
            "and" => Token::AndOp,
            "or" => Token::OrOp,
            "not" => Token::Bang,
            "eq" => Token::Cmp(CompareOp::Eq),
            "ne" => Token::Cmp(CompareOp::Ne),
            "lt" => Token::Cmp(CompareOp::Lt),
            "le" => Token::Cmp(CompareOp::Le),
            "gt" => Token::Cmp(CompareOp::Gt),
            "ge" => Token::Cmp(CompareOp::Ge),
            _ => Token::Ident(word.to_string()),
        }
    }
}

/// Deepest syntax tree the parser will build
pub const MAX_DEPTH: usize = 128;

/// Parse an expression into its syntax tree
pub fn parse(src: &str) -> Result<Expr> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.or()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(ExprError::parse(
            parser.offset(),
            format!("unexpected {}", other.describe()),
        )),
    }
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,

    /// Tree levels opened on the current path
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)].1
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].0
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<()> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(ExprError::parse(
                self.offset(),
                format!("expected {}, found {}", what, self.peek().describe()),
            ))
        }
    }

    /// Open one tree level; callers restore `depth` once their subtree is built
    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::parse(
                self.offset(),
                format!("expression nested deeper than {} levels", MAX_DEPTH),
            ));
        }
        Ok(())
    }

    fn or(&mut self) -> Result<Expr> {
        let base = self.depth;
        let mut left = self.and()?;
        while *self.peek() == Token::OrOp {
            self.advance();
            // left-nested chains grow the tree one level per operand
            self.descend()?;
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr> {
        let base = self.depth;
        let mut left = self.unary()?;
        while *self.peek() == Token::AndOp {
            self.advance();
            self.descend()?;
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        if *self.peek() == Token::Bang {
            self.advance();
            let base = self.depth;
            self.descend()?;
            let inner = self.unary()?;
            self.depth = base;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.compare()
    }

    fn compare(&mut self) -> Result<Expr> {
        let left = self.postfix()?;
        if let Token::Cmp(op) = *self.peek() {
            self.advance();
            let right = self.postfix()?;
            return Ok(Expr::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn postfix(&mut self) -> Result<Expr> {
        let base = self.depth;
        let mut expr = self.primary()?;
        loop {
            let null_safe = match self.peek() {
                Token::Dot => false,
                Token::SafeDot => true,
                _ => {
                    self.depth = base;
                    return Ok(expr);
                }
            };
            self.advance();
            self.descend()?;
            let property = match self.advance() {
                Token::Ident(name) => name,
                other => {
                    return Err(ExprError::parse(
                        self.offset(),
                        format!("expected property name, found {}", other.describe()),
                    ));
                }
            };
            expr = Expr::Member {
                target: Box::new(expr),
                property,
                null_safe,
            };
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        let offset = self.offset();
        match self.advance() {
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Num(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Minus => match self.advance() {
                Token::Num(n) => negate(&n)
                    .map(|n| Expr::Literal(Value::Number(n)))
                    .ok_or_else(|| ExprError::parse(offset, "number out of range")),
                other => Err(ExprError::parse(
                    offset,
                    format!("expected number after '-', found {}", other.describe()),
                )),
            },
            Token::LParen => {
                let base = self.depth;
                self.descend()?;
                let inner = self.or()?;
                self.expect(Token::RParen, "')'")?;
                self.depth = base;
                Ok(inner)
            }
            Token::LBrace => {
                let items = self.list(Token::RBrace, "'}'")?;
                Ok(Expr::List(items))
            }
            Token::Hash => match self.advance() {
                Token::Ident(name) => self.ident_or_call(name, Scope::Variable),
                other => Err(ExprError::parse(
                    offset,
                    format!("expected name after '#', found {}", other.describe()),
                )),
            },
            Token::Ident(name) => match name.to_ascii_lowercase().as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ => self.ident_or_call(name, Scope::Root),
            },
            other => Err(ExprError::parse(
                offset,
                format!("unexpected {}", other.describe()),
            )),
        }
    }

    fn ident_or_call(&mut self, name: String, scope: Scope) -> Result<Expr> {
        if *self.peek() == Token::LParen {
            self.advance();
            let args = self.list(Token::RParen, "')'")?;
            return Ok(Expr::Call { name, args });
        }
        Ok(Expr::Ident { name, scope })
    }

    /// Comma-separated expressions up to `close`; the opener is already consumed
    fn list(&mut self, close: Token, what: &str) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        if *self.peek() == close {
            self.advance();
            return Ok(items);
        }
        let base = self.depth;
        self.descend()?;
        loop {
            items.push(self.or()?);
            if *self.peek() == Token::Comma {
                self.advance();
                continue;
            }
            self.expect(close, what)?;
            self.depth = base;
            return Ok(items);
        }
    }
}

fn negate(n: &Number) -> Option<Number> {
    if let Some(i) = n.as_i64() {
        return i.checked_neg().map(Number::from);
    }
    n.as_f64().and_then(|f| Number::from_f64(-f))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Expr>) -> Expr {
        Expr::Call {
            name: name.to_string(),
            args,
        }
    }

    fn string(s: &str) -> Expr {
        Expr::Literal(Value::String(s.to_string()))
    }

    #[test]
    fn test_function_call_with_string() {
        assert_eq!(
            parse("hasRole('ADMIN')").unwrap(),
            call("hasRole", vec![string("ADMIN")])
        );
    }

    #[test]
    fn test_hash_prefixed_call() {
        assert_eq!(parse("#hasRole('ADMIN')").unwrap(), parse("hasRole('ADMIN')").unwrap());
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse("a or b and c").unwrap();
        let Expr::Or(_, right) = expr else {
            panic!("expected or at the root");
        };
        assert!(matches!(*right, Expr::And(_, _)));
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(parse("a AND b").unwrap(), parse("a && b").unwrap());
        assert_eq!(parse("NOT a").unwrap(), parse("!a").unwrap());
        assert_eq!(parse("TRUE").unwrap(), Expr::Literal(Value::Bool(true)));
    }

    #[test]
    fn test_member_access_chain() {
        let expr = parse("#user?.attributes.email").unwrap();
        let Expr::Member { target, property, null_safe } = expr else {
            panic!("expected member access");
        };
        assert_eq!(property, "email");
        assert!(!null_safe);
        assert!(matches!(*target, Expr::Member { null_safe: true, .. }));
    }

    #[test]
    fn test_comparison_forms() {
        assert_eq!(parse("#a == 1").unwrap(), parse("#a eq 1").unwrap());
        assert_eq!(parse("#a != 'x'").unwrap(), parse("#a ne 'x'").unwrap());
        assert!(matches!(
            parse("#a >= -2.5").unwrap(),
            Expr::Compare { op: CompareOp::Ge, .. }
        ));
    }

    #[test]
    fn test_list_literal_and_varargs() {
        let expr = parse("hasAnyRole('A', \"B\", {'C'})").unwrap();
        let Expr::Call { args, .. } = expr else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 3);
        assert_eq!(args[2], Expr::List(vec![string("C")]));
    }

    #[test]
    fn test_escaped_quotes() {
        assert_eq!(parse("'it''s'").unwrap(), string("it's"));
    }

    #[test]
    fn test_malformed_inputs() {
        for src in [
            "hasRole('ADMIN'",
            "hasRole('ADMIN) and",
            "and",
            "a b",
            "#",
            "a ==",
            "@foo",
            "",
            "x.",
        ] {
            assert!(
                matches!(parse(src), Err(ExprError::Parse { .. })),
                "expected parse error for {:?}",
                src
            );
        }
    }

    #[test]
    fn test_nesting_depth_is_capped() {
        let deep = |n: usize| format!("{}true{}", "(".repeat(n), ")".repeat(n));
        assert!(parse(&deep(MAX_DEPTH - 1)).is_ok());

        for src in [
            deep(3_000),
            format!("{}true", "not ".repeat(3_000)),
            format!("a{}", " and a".repeat(3_000)),
            format!("a{}", ".b".repeat(3_000)),
            format!("f({})", "{".repeat(3_000)),
        ] {
            assert!(
                matches!(parse(&src), Err(ExprError::Parse { .. })),
                "expected depth error for {}...",
                &src[..20]
            );
        }
    }

    #[test]
    fn test_sibling_groups_do_not_accumulate_depth() {
        let args = vec!["(('A'))"; 500].join(", ");
        assert!(parse(&format!("hasAnyRole({})", args)).is_ok());

        let clauses = vec!["(#a.b and not #c)"; 40].join(" or ");
        assert!(parse(&clauses).is_ok());
    }
}
