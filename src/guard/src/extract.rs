//! Credential extraction from request headers, query parameters and cookies

use crate::config::TokenConfig;
use crate::types::{Credential, CredentialSource};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Read-only view of the inbound request supplied by the host
pub trait RequestParts {
    /// Request path, without query string
    fn path(&self) -> &str;

    /// Header value by name (lookup should be case-insensitive)
    fn header(&self, name: &str) -> Option<&str>;

    /// Single query parameter value by name
    fn query(&self, name: &str) -> Option<&str>;

    /// Cookie value by name
    fn cookie(&self, name: &str) -> Option<&str>;
}

/// In-memory request used by hosts without their own request type, and by tests
#[derive(Debug, Clone, Default)]
pub struct SimpleRequest {
    path: String,
    headers: HashMap<String, String>,
    query: HashMap<String, String>,
    cookies: HashMap<String, String>,
}

impl SimpleRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }
}

impl RequestParts for SimpleRequest {
    fn path(&self) -> &str {
        &self.path
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

/// Produces a credential from one source category
pub trait CredentialExtractor: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// First non-blank credential this extractor can see, if any
    fn extract(&self, request: &dyn RequestParts) -> Option<Credential>;
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Checks a list of header names in order
#[derive(Debug, Clone)]
pub struct HeaderExtractor {
    names: Vec<String>,
}

impl HeaderExtractor {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for HeaderExtractor {
    fn default() -> Self {
        Self::new(TokenConfig::default().header_names)
    }
}

impl CredentialExtractor for HeaderExtractor {
    fn name(&self) -> &str {
        "header"
    }

    fn extract(&self, request: &dyn RequestParts) -> Option<Credential> {
        self.names.iter().find_map(|name| {
            non_blank(request.header(name))
                .map(|value| Credential::new(value, CredentialSource::Header, name.as_str()))
        })
    }
}

/// Reads one named query parameter
#[derive(Debug, Clone)]
pub struct QueryExtractor {
    name: String,
}

impl QueryExtractor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl CredentialExtractor for QueryExtractor {
    fn name(&self) -> &str {
        "query"
    }

    fn extract(&self, request: &dyn RequestParts) -> Option<Credential> {
        non_blank(request.query(&self.name))
            .map(|value| Credential::new(value, CredentialSource::Query, self.name.as_str()))
    }
}

/// Reads one named cookie
#[derive(Debug, Clone)]
pub struct CookieExtractor {
    name: String,
}

impl CookieExtractor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl CredentialExtractor for CookieExtractor {
    fn name(&self) -> &str {
        "cookie"
    }

    fn extract(&self, request: &dyn RequestParts) -> Option<Credential> {
        non_blank(request.cookie(&self.name))
            .map(|value| Credential::new(value, CredentialSource::Cookie, self.name.as_str()))
    }
}

/// Ordered extractors; the first hit wins
#[derive(Clone, Default)]
pub struct ExtractorChain {
    extractors: Vec<Arc<dyn CredentialExtractor>>,
}

impl ExtractorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header, then query parameter, then cookie, honouring the enable switches
    pub fn from_config(config: &TokenConfig) -> Self {
        let mut chain = Self::new();
        if config.enable_header_extraction {
            chain.push(HeaderExtractor::new(config.header_names.iter().cloned()));
        }
        if config.enable_parameter_extraction {
            chain.push(QueryExtractor::new(config.parameter_name.clone()));
        }
        if config.enable_cookie_extraction {
            chain.push(CookieExtractor::new(config.cookie_name.clone()));
        }
        chain
    }

    pub fn push<E: CredentialExtractor + 'static>(&mut self, extractor: E) {
        self.extractors.push(Arc::new(extractor));
    }

    pub fn push_arc(&mut self, extractor: Arc<dyn CredentialExtractor>) {
        self.extractors.push(extractor);
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    /// Run extractors in order, short-circuiting on the first credential
    pub fn extract(&self, request: &dyn RequestParts) -> Option<Credential> {
        self.extractors.iter().find_map(|extractor| {
            let credential = extractor.extract(request);
            if let Some(credential) = &credential {
                tracing::trace!(
                    extractor = extractor.name(),
                    source = %credential.source(),
                    key = credential.source_key(),
                    "Credential extracted"
                );
            }
            credential
        })
    }
}

impl fmt::Debug for ExtractorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.extractors.iter().map(|e| e.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_chain() -> ExtractorChain {
        ExtractorChain::from_config(&TokenConfig::default())
    }

    #[test]
    fn test_header_takes_priority() {
        let request = SimpleRequest::new("/api")
            .with_header("X-Token", "from-header")
            .with_query("token", "from-query")
            .with_cookie("token", "from-cookie");

        let credential = default_chain().extract(&request).unwrap();
        assert_eq!(credential.value(), "from-header");
        assert_eq!(credential.source(), CredentialSource::Header);
        assert_eq!(credential.source_key(), "X-Token");
        assert!(!credential.is_valid());
    }

    #[test]
    fn test_header_alias_order() {
        let request = SimpleRequest::new("/api")
            .with_header("token", "fourth")
            .with_header("X-Authorization", "second");

        let credential = default_chain().extract(&request).unwrap();
        assert_eq!(credential.value(), "second");
        assert_eq!(credential.source_key(), "X-Authorization");
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = SimpleRequest::new("/api").with_header("authorization", "abc");
        let credential = default_chain().extract(&request).unwrap();
        assert_eq!(credential.source_key(), "Authorization");
    }

    #[test]
    fn test_query_before_cookie() {
        let request = SimpleRequest::new("/api")
            .with_query("token", "from-query")
            .with_cookie("token", "from-cookie");

        let credential = default_chain().extract(&request).unwrap();
        assert_eq!(credential.source(), CredentialSource::Query);
    }

    #[test]
    fn test_cookie_fallback() {
        let request = SimpleRequest::new("/api").with_cookie("token", "from-cookie");
        let credential = default_chain().extract(&request).unwrap();
        assert_eq!(credential.source(), CredentialSource::Cookie);
        assert_eq!(credential.value(), "from-cookie");
    }

    #[test]
    fn test_blank_values_are_skipped() {
        let request = SimpleRequest::new("/api")
            .with_header("Authorization", "   ")
            .with_query("token", "")
            .with_cookie("token", "c");

        let credential = default_chain().extract(&request).unwrap();
        assert_eq!(credential.source(), CredentialSource::Cookie);
    }

    #[test]
    fn test_nothing_found_is_anonymous() {
        let request = SimpleRequest::new("/api").with_header("Accept", "text/html");
        assert!(default_chain().extract(&request).is_none());
    }

    #[test]
    fn test_disabled_sources_are_not_consulted() {
        let config = TokenConfig {
            enable_header_extraction: false,
            enable_parameter_extraction: false,
            ..TokenConfig::default()
        };
        let chain = ExtractorChain::from_config(&config);
        assert_eq!(chain.len(), 1);

        let request = SimpleRequest::new("/api")
            .with_header("Authorization", "h")
            .with_query("token", "q");
        assert!(chain.extract(&request).is_none());
    }
}
