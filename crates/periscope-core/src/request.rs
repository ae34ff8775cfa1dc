//! HTTP Request types

use crate::parser::{decode_or_keep, Method, RawRequest};
use smallvec::SmallVec;

/// HTTP Request
///
/// Lives for one connection. The path is already stripped of its query
/// string and percent-decoded.
#[derive(Debug, Clone)]
pub struct Request {
    /// Verb exactly as sent
    pub method: String,
    /// Decoded request path (without query string)
    pub path: String,
    /// Raw query string (without leading ?)
    pub query: Option<String>,
    /// Request headers, lowercase names
    pub headers: SmallVec<[(String, String); 16]>,
}

impl Request {
    /// Create a new request
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            query: None,
            headers: SmallVec::new(),
        }
    }

    /// Normalize a parsed head: split off the query, then decode the path
    pub fn from_raw(raw: RawRequest) -> Self {
        let (path, query) = match raw.target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (raw.target.as_str(), None),
        };

        Self {
            path: decode_or_keep(path),
            method: raw.method,
            query,
            headers: raw.headers,
        }
    }

    /// Parsed method, if it is a standard verb
    pub fn method(&self) -> Option<Method> {
        Method::parse(self.method.as_bytes())
    }

    /// Get a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True if the path tries to climb out of the asset namespace
    pub fn is_traversal(&self) -> bool {
        self.path.contains("..")
    }
}

/// Builder for constructing requests
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Create a new builder
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            request: Request::new(method, path),
        }
    }

    /// Set query string
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.request.query = Some(query.into());
        self
    }

    /// Add a header (name is lowercased)
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request
            .headers
            .push((name.into().to_ascii_lowercase(), value.into()));
        self
    }

    /// Build the request
    pub fn build(self) -> Request {
        self.request
    }
}
