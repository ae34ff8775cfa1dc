//! Snapshot slots
//!
//! The writer rebuilds each slot from simulation state and swaps the new
//! value in whole. Readers on any thread load the current `Arc` without
//! locking and never observe a partially built value.

use crate::error::{panic_message, HandlerError};
use arc_swap::ArcSwap;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Fixed snapshot categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Game,
    Fleet,
    Colonies,
    Cargo,
    Factions,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Game,
        Category::Fleet,
        Category::Colonies,
        Category::Cargo,
        Category::Factions,
    ];

    /// Name used in the endpoint path
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Game => "game",
            Category::Fleet => "fleet",
            Category::Colonies => "colonies",
            Category::Cargo => "cargo",
            Category::Factions => "factions",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produces a fresh snapshot value; runs on the writer thread only
pub type Builder = Box<dyn FnMut() -> Result<Value, HandlerError> + Send>;

type Slot = Arc<ArcSwap<Value>>;

fn empty_slot() -> Slot {
    Arc::new(ArcSwap::from_pointee(Value::Object(Default::default())))
}

/// Published snapshots, shared by the writer and every reader
pub struct SnapshotStore {
    fixed: [Slot; 5],
    custom: RwLock<HashMap<String, Slot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            fixed: std::array::from_fn(|_| empty_slot()),
            custom: RwLock::new(HashMap::new()),
        }
    }

    /// Current value of a category (`{}` until first published)
    #[inline]
    pub fn get(&self, category: Category) -> Arc<Value> {
        self.fixed[category.index()].load_full()
    }

    /// Current value of a custom provider, `None` if the key is unknown
    pub fn custom(&self, key: &str) -> Option<Arc<Value>> {
        self.custom.read().get(key).map(|slot| slot.load_full())
    }

    /// Registered custom keys, sorted
    pub fn custom_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.custom.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Replace a category's value
    pub fn store(&self, category: Category, value: Value) {
        self.fixed[category.index()].store(Arc::new(value));
    }

    fn slot(&self, category: Category) -> Slot {
        Arc::clone(&self.fixed[category.index()])
    }

    fn custom_slot(&self, key: &str) -> Slot {
        if let Some(slot) = self.custom.read().get(key) {
            return Arc::clone(slot);
        }
        Arc::clone(
            self.custom
                .write()
                .entry(key.to_string())
                .or_insert_with(empty_slot),
        )
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

struct Source {
    name: String,
    slot: Slot,
    builder: Builder,
}

/// Writer-side owner of every snapshot builder
pub struct Publisher {
    store: Arc<SnapshotStore>,
    sources: Vec<Source>,
}

impl Publisher {
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        Self {
            store,
            sources: Vec::new(),
        }
    }

    /// Set the builder for a fixed category (replaces any existing one)
    pub fn set_builder(&mut self, category: Category, builder: Builder) {
        let slot = self.store.slot(category);
        self.add_source(category.as_str().to_string(), slot, builder);
    }

    /// Register a custom provider served under its key
    ///
    /// The key becomes visible to readers immediately with an empty object;
    /// it is filled on the next publish.
    pub fn register_provider(&mut self, key: &str, builder: Builder) {
        let slot = self.store.custom_slot(key);
        self.add_source(format!("custom/{key}"), slot, builder);
    }

    fn add_source(&mut self, name: String, slot: Slot, builder: Builder) {
        match self.sources.iter_mut().find(|s| Arc::ptr_eq(&s.slot, &slot)) {
            Some(existing) => existing.builder = builder,
            None => self.sources.push(Source { name, slot, builder }),
        }
    }

    /// Rebuild every slot that has a builder
    ///
    /// A builder that fails or panics leaves its slot at the previous value.
    /// Returns the number of slots updated.
    pub fn publish(&mut self) -> usize {
        let mut updated = 0;
        for source in &mut self.sources {
            match catch_unwind(AssertUnwindSafe(|| (source.builder)())) {
                Ok(Ok(value)) => {
                    source.slot.store(Arc::new(value));
                    updated += 1;
                }
                Ok(Err(e)) => {
                    tracing::warn!(snapshot = %source.name, error = %e, "snapshot build failed");
                }
                Err(payload) => {
                    tracing::warn!(
                        snapshot = %source.name,
                        error = %panic_message(payload.as_ref()),
                        "snapshot builder panicked"
                    );
                }
            }
        }
        tracing::trace!(updated, total = self.sources.len(), "snapshots published");
        updated
    }

    /// Number of registered builders
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn builder(f: impl FnMut() -> Result<Value, HandlerError> + Send + 'static) -> Builder {
        Box::new(f)
    }

    #[test]
    fn test_category_names() {
        let names: Vec<_> = Category::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(names, ["game", "fleet", "colonies", "cargo", "factions"]);
        assert_eq!(Category::from_name("cargo"), Some(Category::Cargo));
        assert_eq!(Category::from_name("Cargo"), None);
    }

    #[test]
    fn test_slots_start_empty() {
        let store = SnapshotStore::new();
        for category in Category::ALL {
            assert_eq!(*store.get(category), json!({}));
        }
        assert!(store.custom("missing").is_none());
    }

    #[test]
    fn test_publish_replaces_value() {
        let store = Arc::new(SnapshotStore::new());
        let mut publisher = Publisher::new(Arc::clone(&store));
        let mut credits = 0;
        publisher.set_builder(
            Category::Cargo,
            builder(move || {
                credits += 100;
                Ok(json!({ "credits": credits }))
            }),
        );

        let before = store.get(Category::Cargo);
        assert_eq!(publisher.publish(), 1);
        assert_eq!(store.get(Category::Cargo)["credits"], 100);
        publisher.publish();
        assert_eq!(store.get(Category::Cargo)["credits"], 200);

        // Readers holding an old Arc keep seeing the old value
        assert_eq!(*before, json!({}));
    }

    #[test]
    fn test_failed_builder_keeps_previous_value() {
        let store = Arc::new(SnapshotStore::new());
        let mut publisher = Publisher::new(Arc::clone(&store));
        let mut calls = 0;
        publisher.set_builder(
            Category::Fleet,
            builder(move || {
                calls += 1;
                match calls {
                    1 => Ok(json!({ "totalShips": 3 })),
                    2 => Err("fleet unavailable".into()),
                    _ => panic!("fleet exploded"),
                }
            }),
        );
        publisher.set_builder(Category::Game, builder(|| Ok(json!({ "day": 1 }))));

        assert_eq!(publisher.publish(), 2);
        assert_eq!(publisher.publish(), 1);
        assert_eq!(store.get(Category::Fleet)["totalShips"], 3);
        assert_eq!(publisher.publish(), 1);
        assert_eq!(store.get(Category::Fleet)["totalShips"], 3);
        assert_eq!(store.get(Category::Game)["day"], 1);
    }

    #[test]
    fn test_replacing_builder_keeps_one_source() {
        let store = Arc::new(SnapshotStore::new());
        let mut publisher = Publisher::new(Arc::clone(&store));
        publisher.set_builder(Category::Game, builder(|| Ok(json!(1))));
        publisher.set_builder(Category::Game, builder(|| Ok(json!(2))));
        publisher.register_provider("mymod", builder(|| Ok(json!("a"))));
        publisher.register_provider("mymod", builder(|| Ok(json!("b"))));

        assert_eq!(publisher.len(), 2);
        publisher.publish();
        assert_eq!(*store.get(Category::Game), json!(2));
        assert_eq!(*store.custom("mymod").unwrap(), json!("b"));
    }

    #[test]
    fn test_provider_visible_before_publish() {
        let store = Arc::new(SnapshotStore::new());
        let mut publisher = Publisher::new(Arc::clone(&store));
        publisher.register_provider("trade", builder(|| Ok(json!({ "routes": [] }))));
        publisher.register_provider("alerts", builder(|| Ok(json!([]))));

        assert_eq!(store.custom_keys(), ["alerts", "trade"]);
        assert_eq!(*store.custom("trade").unwrap(), json!({}));
        publisher.publish();
        assert_eq!(*store.custom("trade").unwrap(), json!({ "routes": [] }));
    }

    #[test]
    fn test_concurrent_readers_see_whole_values() {
        let store = Arc::new(SnapshotStore::new());
        let mut publisher = Publisher::new(Arc::clone(&store));
        let mut n = 0u64;
        publisher.set_builder(
            Category::Colonies,
            builder(move || {
                n += 1;
                Ok(json!({ "a": n, "b": n }))
            }),
        );

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let value = store.get(Category::Colonies);
                        assert_eq!(value.get("a"), value.get("b"));
                    }
                })
            })
            .collect();

        for _ in 0..200 {
            publisher.publish();
        }
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.get(Category::Colonies)["a"], 200);
    }
}
