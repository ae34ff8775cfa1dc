//! In-memory static asset store
//!
//! Assets are registered by the host at startup and served by exact path.
//! There is no filesystem access; the store is a flat map.

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Document served for `/`
pub const DEFAULT_DOCUMENT: &str = "/index.html";

/// Asset found by [`AssetStore::get`]
#[derive(Debug, Clone)]
pub struct Asset {
    pub body: Bytes,
    pub content_type: &'static str,
}

/// Path → payload map, safe for concurrent reads
#[derive(Debug, Default)]
pub struct AssetStore {
    files: RwLock<HashMap<String, Bytes>>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one asset. A missing leading `/` is added.
    pub fn insert(&self, path: &str, body: impl Into<Bytes>) {
        self.files.write().insert(normalize(path), body.into());
    }

    /// Add or replace several assets under one write lock
    pub fn extend<I, P, B>(&self, files: I)
    where
        I: IntoIterator<Item = (P, B)>,
        P: AsRef<str>,
        B: Into<Bytes>,
    {
        let mut map = self.files.write();
        for (path, body) in files {
            map.insert(normalize(path.as_ref()), body.into());
        }
    }

    /// Exact lookup; `/` resolves to [`DEFAULT_DOCUMENT`]
    pub fn get(&self, path: &str) -> Option<Asset> {
        let path = if path == "/" { DEFAULT_DOCUMENT } else { path };
        let body = self.files.read().get(path).cloned()?;
        Some(Asset {
            body,
            content_type: content_type(path),
        })
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

fn normalize(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Content type from the file suffix
pub fn content_type(path: &str) -> &'static str {
    let ext = match path.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && !ext.contains('/') => ext,
        _ => "",
    };

    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "application/javascript; charset=utf-8",
        "json" => "application/json; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        // Default
        _ => "text/plain; charset=utf-8",
    }
}
