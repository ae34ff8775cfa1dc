//! API handler registry
//!
//! Maps path prefixes to handlers. Lookups run on every worker thread;
//! registration is rare (startup, extension load) and may happen while the
//! server is running.

use crate::error::HandlerError;
use crate::Request;
use parking_lot::RwLock;
use periscope_router::PrefixRouter;
use std::sync::Arc;

/// What a handler produces
///
/// - `Ok(Some(json))` - 200 with the given JSON body
/// - `Ok(None)` - no data for this path (404)
/// - `Err(_)` - handler fault (500)
pub type HandlerResult = std::result::Result<Option<String>, HandlerError>;

/// Structured API endpoint
///
/// Handlers must not touch server state. Their only sanctioned side
/// effects are reading a snapshot or submitting a command.
pub trait ApiHandler: Send + Sync {
    fn handle(&self, req: &Request) -> HandlerResult;
}

impl<F> ApiHandler for F
where
    F: Fn(&Request) -> HandlerResult + Send + Sync,
{
    fn handle(&self, req: &Request) -> HandlerResult {
        self(req)
    }
}

/// Handler resolved for a path
#[derive(Clone)]
pub struct Resolved {
    pub handler: Arc<dyn ApiHandler>,
    /// Byte length of the matched prefix
    pub prefix_len: usize,
}

#[derive(Default)]
struct Inner {
    router: PrefixRouter,
    handlers: Vec<Arc<dyn ApiHandler>>,
}

/// Prefix → handler map with longest-prefix lookup
#[derive(Default)]
pub struct HandlerRegistry {
    inner: RwLock<Inner>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; an existing handler at the same prefix is replaced
    pub fn register<H: ApiHandler + 'static>(&self, prefix: &str, handler: H) {
        self.register_arc(prefix, Arc::new(handler));
    }

    pub fn register_arc(&self, prefix: &str, handler: Arc<dyn ApiHandler>) {
        let mut inner = self.inner.write();
        match inner.router.get(prefix) {
            Some(id) => inner.handlers[id as usize] = handler,
            None => {
                let id = inner.handlers.len() as u32;
                inner.handlers.push(handler);
                inner.router.insert(prefix, id);
            }
        }
    }

    /// Longest registered prefix of `path`
    ///
    /// The handler is cloned out so the lock is released before it runs.
    pub fn resolve(&self, path: &str) -> Option<Resolved> {
        let inner = self.inner.read();
        let matched = inner.router.find(path)?;
        Some(Resolved {
            handler: Arc::clone(&inner.handlers[matched.handler_id as usize]),
            prefix_len: matched.prefix_len,
        })
    }

    pub fn len(&self) -> usize {
        self.inner.read().router.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(body: &'static str) -> impl ApiHandler {
        move |_: &Request| -> HandlerResult { Ok(Some(body.to_string())) }
    }

    fn call(registry: &HandlerRegistry, path: &str) -> Option<String> {
        let resolved = registry.resolve(path)?;
        resolved.handler.handle(&Request::new("GET", path)).unwrap()
    }

    #[test]
    fn test_longest_prefix() {
        let registry = HandlerRegistry::new();
        registry.register("/api/", fixed("root"));
        registry.register("/api/v1/game", fixed("game"));

        assert_eq!(call(&registry, "/api/v1/game/x").as_deref(), Some("game"));
        assert_eq!(call(&registry, "/api/v1/fleet").as_deref(), Some("root"));
        assert!(registry.resolve("/other").is_none());
    }

    #[test]
    fn test_reregister_replaces() {
        let registry = HandlerRegistry::new();
        registry.register("/api/v1/cargo", fixed("old"));
        registry.register("/api/v1/cargo", fixed("new"));

        assert_eq!(registry.len(), 1);
        assert_eq!(call(&registry, "/api/v1/cargo").as_deref(), Some("new"));
    }

    #[test]
    fn test_prefix_len_reported() {
        let registry = HandlerRegistry::new();
        registry.register("/api/v1/custom/", fixed("x"));

        let resolved = registry.resolve("/api/v1/custom/mymod").unwrap();
        assert_eq!(&"/api/v1/custom/mymod"[resolved.prefix_len..], "mymod");
    }

    #[test]
    fn test_concurrent_reads_during_registration() {
        let registry = Arc::new(HandlerRegistry::new());
        registry.register("/api/", fixed("root"));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        assert!(call(&registry, "/api/v1/x/y").is_some());
                    }
                })
            })
            .collect();

        for i in 0..100 {
            registry.register(&format!("/api/v1/x{i}"), fixed("x"));
        }
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(registry.len(), 101);
    }
}
