//! CORS (Cross-Origin Resource Sharing) headers
//!
//! Every response allows any origin. `OPTIONS` requests are answered with a
//! fixed preflight before routing.

use crate::{Method, Response, ResponseBuilder, StatusCode};
use smallvec::SmallVec;

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed methods
    pub methods: SmallVec<[Method; 4]>,
    /// Allowed request headers
    pub headers: SmallVec<[String; 4]>,
    /// Preflight max age (seconds)
    pub max_age: u32,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            methods: smallvec::smallvec![Method::Get, Method::Post, Method::Options],
            headers: smallvec::smallvec!["Content-Type".to_string()],
            max_age: 86400, // 24 hours
        }
    }
}

impl CorsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_method(mut self, method: Method) -> Self {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        self
    }

    pub fn allow_header(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into());
        self
    }

    pub fn max_age(mut self, seconds: u32) -> Self {
        self.max_age = seconds;
        self
    }
}

/// Permissive CORS policy
#[derive(Debug, Clone)]
pub struct Cors {
    config: CorsConfig,
    methods: String,
    headers: String,
}

impl Cors {
    pub fn new(config: CorsConfig) -> Self {
        let methods = config
            .methods
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let headers = config.headers.join(", ");
        Self {
            config,
            methods,
            headers,
        }
    }

    /// Any origin, GET/POST/OPTIONS, `Content-Type`
    pub fn permissive() -> Self {
        Self::new(CorsConfig::default())
    }

    /// Add CORS headers to an outgoing response
    pub fn apply(&self, res: &mut Response) {
        res.headers
            .push(("Access-Control-Allow-Origin".to_string(), "*".to_string()));
        res.headers
            .push(("Access-Control-Allow-Methods".to_string(), self.methods.clone()));
        if !self.headers.is_empty() {
            res.headers
                .push(("Access-Control-Allow-Headers".to_string(), self.headers.clone()));
        }
    }

    /// Fixed answer to any `OPTIONS` request
    pub fn preflight(&self) -> Response {
        let mut res = ResponseBuilder::new(StatusCode::NO_CONTENT).build();
        self.apply(&mut res);
        res.headers.push((
            "Access-Control-Max-Age".to_string(),
            self.config.max_age.to_string(),
        ));
        res
    }
}

impl Default for Cors {
    fn default() -> Self {
        Self::permissive()
    }
}
