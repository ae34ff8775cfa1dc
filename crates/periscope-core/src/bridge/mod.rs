//! Command and snapshot bridge between HTTP workers and the simulation
//!
//! [`Bridge::new`] returns two halves:
//! - [`Bridge`]: a cloneable handle for any thread. Submits commands, polls
//!   results, reads snapshots.
//! - [`BridgeWriter`]: owned by the simulation thread. Its `tick` runs the
//!   queued commands and republishes snapshots. Taking `&mut self` keeps
//!   ticks from ever overlapping.

pub mod commands;
pub mod snapshot;

pub use commands::{CommandId, CommandQueue, Poll, DEFAULT_SUCCESS};
pub use snapshot::{Category, Publisher, SnapshotStore};

use crate::config::BridgeConfig;
use crate::error::HandlerError;
use crate::registry::HandlerResult;
use crate::{Request, Server};
use serde::Serialize;
use serde_json::value::RawValue;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Path prefix of the built-in snapshot endpoints
pub const SNAPSHOT_PREFIX: &str = "/api/v1/";
/// Keyed custom provider endpoint
pub const CUSTOM_PREFIX: &str = "/api/v1/custom/";
/// Command result polling endpoint
pub const COMMANDS_PREFIX: &str = "/api/v1/commands/";

/// Thread-safe handle to the bridge
#[derive(Clone)]
pub struct Bridge {
    commands: Arc<CommandQueue>,
    snapshots: Arc<SnapshotStore>,
}

impl Bridge {
    /// Create a bridge and its single writer
    pub fn new(config: BridgeConfig) -> (Bridge, BridgeWriter) {
        let bridge = Bridge {
            commands: Arc::new(CommandQueue::new(config.max_pending_results)),
            snapshots: Arc::new(SnapshotStore::new()),
        };
        let writer = BridgeWriter {
            bridge: bridge.clone(),
            publisher: Publisher::new(Arc::clone(&bridge.snapshots)),
            interval: config.interval(),
            since_publish: Duration::ZERO,
        };
        (bridge, writer)
    }

    /// Queue a command for the next writer tick
    ///
    /// # Example
    /// ```
    /// use periscope_core::{Bridge, BridgeConfig};
    ///
    /// let (bridge, mut writer) = Bridge::new(BridgeConfig::default());
    /// let id = bridge.submit(|| Ok::<_, String>(Some(r#"{"success":true,"message":"Added 1000 credits"}"#)));
    /// assert_eq!(id.to_string(), "cmd_1");
    ///
    /// writer.tick(std::time::Duration::from_millis(16), false);
    /// assert!(bridge.poll(id).is_ready());
    /// ```
    pub fn submit<F, T, E>(&self, command: F) -> CommandId
    where
        F: FnOnce() -> Result<Option<T>, E> + Send + 'static,
        T: Into<String>,
        E: fmt::Display,
    {
        self.commands.submit(command)
    }

    /// Collect a command result (destructive)
    pub fn poll(&self, id: CommandId) -> Poll {
        self.commands.poll(id)
    }

    /// Poll by the `cmd_<n>` string form; malformed IDs are `Unknown`
    pub fn poll_str(&self, id: &str) -> Poll {
        match id.parse() {
            Ok(id) => self.poll(id),
            Err(_) => Poll::Unknown,
        }
    }

    /// Latest published value of a category
    pub fn snapshot(&self, category: Category) -> Arc<Value> {
        self.snapshots.get(category)
    }

    /// Latest published value of a category, serialized
    pub fn snapshot_json(&self, category: Category) -> String {
        self.snapshots.get(category).to_string()
    }

    /// Latest value of a custom provider
    pub fn custom(&self, key: &str) -> Option<Arc<Value>> {
        self.snapshots.custom(key)
    }

    pub fn custom_keys(&self) -> Vec<String> {
        self.snapshots.custom_keys()
    }

    /// Uncollected command results
    pub fn pending_results(&self) -> usize {
        self.commands.pending_results()
    }

    /// Commands waiting for the next tick
    pub fn queued(&self) -> usize {
        self.commands.queued()
    }

    /// Install the snapshot, custom and command-polling endpoints
    pub fn register_api_handlers(&self, server: &Server) {
        for category in Category::ALL {
            let snapshots = Arc::clone(&self.snapshots);
            server.register_handler(
                &format!("{SNAPSHOT_PREFIX}{category}"),
                move |_: &Request| -> HandlerResult { Ok(Some(snapshots.get(category).to_string())) },
            );
        }

        let snapshots = Arc::clone(&self.snapshots);
        server.register_handler(CUSTOM_PREFIX, move |req: &Request| -> HandlerResult {
            let key = req.path.strip_prefix(CUSTOM_PREFIX).unwrap_or_default();
            Ok(snapshots.custom(key).map(|value| value.to_string()))
        });

        let commands = Arc::clone(&self.commands);
        server.register_handler(COMMANDS_PREFIX, move |req: &Request| -> HandlerResult {
            let raw = req.path.strip_prefix(COMMANDS_PREFIX).unwrap_or_default();
            let Ok(id) = raw.parse::<CommandId>() else {
                return Ok(None);
            };
            command_status(id, commands.poll(id))
        });
    }
}

#[derive(Serialize)]
struct CommandStatus<'a> {
    id: String,
    status: &'static str,
    result: Option<&'a RawValue>,
}

/// Body returned by the polling endpoint; `None` for unknown IDs
///
/// A ready result is embedded as the exact text the command recorded. Text
/// that is not JSON is sent as a JSON string.
fn command_status(id: CommandId, poll: Poll) -> HandlerResult {
    let quoted;
    let result = match &poll {
        Poll::Ready(text) => match serde_json::from_str::<&RawValue>(text) {
            Ok(raw) => Some(raw),
            Err(_) => {
                quoted = serde_json::value::to_raw_value(text)?;
                Some(&*quoted)
            }
        },
        Poll::Pending => None,
        Poll::Unknown => return Ok(None),
    };

    let body = CommandStatus {
        id: id.to_string(),
        status: poll.status(),
        result,
    };
    Ok(Some(serde_json::to_string(&body)?))
}

/// What one writer tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Commands executed
    pub executed: usize,
    /// Uncollected results dropped by leak protection
    pub evicted: usize,
    /// Snapshot slots rebuilt (0 when no publish happened)
    pub published: usize,
}

/// The simulation-side half of the bridge
///
/// Owns every snapshot builder. Must be ticked from the thread that owns
/// simulation state.
pub struct BridgeWriter {
    bridge: Bridge,
    publisher: Publisher,
    interval: Duration,
    since_publish: Duration,
}

impl BridgeWriter {
    /// A reader handle sharing this writer's queue and snapshots
    pub fn bridge(&self) -> Bridge {
        self.bridge.clone()
    }

    /// Set the builder for a fixed category
    pub fn set_builder<F>(&mut self, category: Category, builder: F)
    where
        F: FnMut() -> Result<Value, HandlerError> + Send + 'static,
    {
        self.publisher.set_builder(category, Box::new(builder));
    }

    /// Register a custom provider served at `/api/v1/custom/<key>`
    pub fn register_provider<F>(&mut self, key: &str, builder: F)
    where
        F: FnMut() -> Result<Value, HandlerError> + Send + 'static,
    {
        self.publisher.register_provider(key, Box::new(builder));
    }

    /// Run one bridge cycle
    ///
    /// Executes every queued command, bounds the result store, then
    /// republishes snapshots if `interested` and at least the publish
    /// interval has accumulated since the last publish. Time accumulates
    /// while nobody is interested, so the first interested tick after a
    /// long pause publishes immediately.
    pub fn tick(&mut self, elapsed: Duration, interested: bool) -> TickReport {
        let commands = &self.bridge.commands;

        let mut evicted = commands.evict_if_over();
        let executed = commands.drain();
        evicted += commands.evict_if_over();

        self.since_publish = self.since_publish.saturating_add(elapsed);
        let published = if interested && self.since_publish >= self.interval {
            self.since_publish = Duration::ZERO;
            self.publisher.publish()
        } else {
            0
        };

        TickReport {
            executed,
            evicted,
            published,
        }
    }

    /// Rebuild every snapshot now, ignoring the interval and interest gate
    pub fn publish_now(&mut self) -> usize {
        self.since_publish = Duration::ZERO;
        self.publisher.publish()
    }
}
