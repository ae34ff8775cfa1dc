//! periscope-router: Zero-dependency longest-prefix trie
//!
//! Maps raw path prefixes to handler IDs and resolves a request path to
//! the most specific registered prefix.
//!
//! ## Features
//! - O(k) lookup where k = path length
//! - Plain string prefixes: `/api/v1/game` also covers `/api/v1/game/x`
//!   and `/api/v1/gameplay`. Add a trailing `/` to restrict to a sub-tree.
//! - Last write wins when a prefix is inserted twice
//! - Zero external dependencies
//!
//! ## Example
//! ```
//! use periscope_router::PrefixRouter;
//!
//! let mut router = PrefixRouter::new();
//! router.insert("/api/", 0);
//! router.insert("/api/v1/game", 1);
//!
//! let m = router.find("/api/v1/game/x").unwrap();
//! assert_eq!(m.handler_id, 1);
//! assert_eq!(m.prefix_len, "/api/v1/game".len());
//! assert_eq!(router.find("/api/other").unwrap().handler_id, 0);
//! assert!(router.find("/index.html").is_none());
//! ```

use std::collections::HashMap;

/// Prefix match result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    /// The matched handler ID
    pub handler_id: u32,
    /// Byte length of the matched prefix
    pub prefix_len: usize,
}

impl Match {
    /// Remainder of `path` after the matched prefix
    pub fn rest<'a>(&self, path: &'a str) -> &'a str {
        path.get(self.prefix_len..).unwrap_or("")
    }
}

/// Trie node, one per byte of a registered prefix
#[derive(Debug, Default)]
struct Node {
    children: HashMap<u8, Node>,
    /// Handler ID if a prefix ends at this node
    handler_id: Option<u32>,
}

/// Longest-prefix router
#[derive(Debug, Default)]
pub struct PrefixRouter {
    root: Node,
    len: usize,
}

impl PrefixRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a prefix
    ///
    /// Returns the handler ID previously bound to exactly this prefix, if any.
    ///
    /// # Example
    /// ```
    /// use periscope_router::PrefixRouter;
    ///
    /// let mut router = PrefixRouter::new();
    /// assert_eq!(router.insert("/api/v1/fleet", 0), None);
    /// assert_eq!(router.insert("/api/v1/fleet", 3), Some(0));
    /// assert_eq!(router.find("/api/v1/fleet").unwrap().handler_id, 3);
    /// ```
    pub fn insert(&mut self, prefix: &str, handler_id: u32) -> Option<u32> {
        let mut node = &mut self.root;
        for byte in prefix.bytes() {
            node = node.children.entry(byte).or_default();
        }
        let previous = node.handler_id.replace(handler_id);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Find the longest registered prefix of `path`
    pub fn find(&self, path: &str) -> Option<Match> {
        let mut node = &self.root;
        let mut best = node.handler_id.map(|handler_id| Match {
            handler_id,
            prefix_len: 0,
        });

        for (depth, byte) in path.bytes().enumerate() {
            match node.children.get(&byte) {
                Some(child) => node = child,
                None => break,
            }
            if let Some(handler_id) = node.handler_id {
                best = Some(Match {
                    handler_id,
                    prefix_len: depth + 1,
                });
            }
        }

        best
    }

    /// Exact lookup of a registered prefix
    pub fn get(&self, prefix: &str) -> Option<u32> {
        let mut node = &self.root;
        for byte in prefix.bytes() {
            node = node.children.get(&byte)?;
        }
        node.handler_id
    }

    /// Number of registered prefixes
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if no prefix is registered
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
