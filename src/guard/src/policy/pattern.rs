//! Ant-style path patterns
//!
//! `**` matches zero or more whole path segments, `*` matches any run of
//! characters inside one segment and `?` matches a single non-separator
//! character. Patterns are translated to anchored regular expressions once,
//! at registration time.
//!
//! URI-template segments such as `/users/{id}` are not variables here: the
//! braces are escaped and must appear literally in the path. Use `*` for a
//! single variable segment.

use crate::error::{GuardError, Result};
use regex::Regex;

/// Compiled path pattern
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
}

impl PathPattern {
    /// Compile a pattern
    ///
    /// # Errors
    /// Returns `InvalidPattern` for blank patterns.
    pub fn new(pattern: &str) -> Result<Self> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(GuardError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "pattern is empty".to_string(),
            });
        }

        let regex = Regex::new(&to_regex(trimmed)).map_err(|e| GuardError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: trimmed.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

fn to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let segments: Vec<&str> = pattern.split('/').collect();
    let last = segments.len() - 1;

    for (i, segment) in segments.iter().enumerate() {
        if *segment == "**" {
            if i == last {
                // "/a/**" also matches "/a"; a lone "**" matches everything
                if i == 0 {
                    out.push_str(".*");
                } else {
                    // the separator before "**" was already written
                    out.pop();
                    out.push_str("(?:/.*)?");
                }
            } else {
                out.push_str("(?:[^/]*/)*");
            }
            continue;
        }

        for ch in segment.chars() {
            match ch {
                '*' => out.push_str("[^/]*"),
                '?' => out.push_str("[^/]"),
                c => out.push_str(&regex::escape(&c.to_string())),
            }
        }

        if i != last {
            out.push('/');
        }
    }

    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, path: &str) -> bool {
        PathPattern::new(pattern).unwrap().matches(path)
    }

    #[test]
    fn test_literal_pattern() {
        assert!(matches("/favicon.ico", "/favicon.ico"));
        assert!(!matches("/favicon.ico", "/faviconXico"));
        assert!(!matches("/error", "/error/page"));
    }

    #[test]
    fn test_double_star_suffix() {
        assert!(matches("/api/**", "/api"));
        assert!(matches("/api/**", "/api/"));
        assert!(matches("/api/**", "/api/users"));
        assert!(matches("/api/**", "/api/users/1/roles"));
        assert!(!matches("/api/**", "/apiv2/users"));
        assert!(!matches("/api/**", "/other"));
    }

    #[test]
    fn test_root_double_star() {
        assert!(matches("/**", "/"));
        assert!(matches("/**", "/anything/at/all"));
        assert!(matches("**", "relative/path"));
    }

    #[test]
    fn test_double_star_in_middle() {
        assert!(matches("/api/**/edit", "/api/edit"));
        assert!(matches("/api/**/edit", "/api/users/1/edit"));
        assert!(!matches("/api/**/edit", "/api/users/1/view"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        assert!(matches("/api/*", "/api/users"));
        assert!(!matches("/api/*", "/api/users/1"));
        assert!(matches("/api/*.json", "/api/data.json"));
        assert!(matches("/api/user*", "/api/users"));
    }

    #[test]
    fn test_question_mark() {
        assert!(matches("/v?/items", "/v1/items"));
        assert!(!matches("/v?/items", "/v10/items"));
        assert!(!matches("/a?b", "/a/b"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(matches("/files/(draft)+.txt", "/files/(draft)+.txt"));
        assert!(!matches("/files/a.txt", "/files/abtxt"));
    }

    #[test]
    fn test_template_braces_are_literal() {
        assert!(matches("/users/{id}", "/users/{id}"));
        assert!(!matches("/users/{id}", "/users/42"));
        assert!(matches("/users/*", "/users/42"));
    }

    #[test]
    fn test_blank_pattern_rejected() {
        assert!(matches!(
            PathPattern::new("   "),
            Err(GuardError::InvalidPattern { .. })
        ));
    }
}
