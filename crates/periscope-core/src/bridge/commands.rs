//! Command queue and result store
//!
//! Producers (HTTP workers) submit closures that must run on the
//! simulation's writer thread. The writer drains the queue once per tick.
//! Results are parked under the command's correlation ID until polled.

use crate::error::panic_message;
use crate::Error;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;

/// Body recorded when a command completes without a value
pub const DEFAULT_SUCCESS: &str = r#"{"success":true}"#;

const ID_PREFIX: &str = "cmd_";

/// Correlation ID for a submitted command
///
/// Displayed and parsed as `cmd_<n>`. IDs start at 1 and strictly increase
/// for the life of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandId(pub u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ID_PREFIX}{}", self.0)
    }
}

impl FromStr for CommandId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(ID_PREFIX)
            .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|n| n.parse().ok())
            .map(CommandId)
            .ok_or_else(|| Error::InvalidCommandId(s.to_string()))
    }
}

/// Outcome of polling a correlation ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll {
    /// The command ran; this is its result. Removed from the store.
    Ready(String),
    /// Submitted but not yet executed by the writer
    Pending,
    /// Never issued, already collected, or evicted
    Unknown,
}

impl Poll {
    /// Found/not-found view: only `Ready` carries a value
    pub fn into_option(self) -> Option<String> {
        match self {
            Poll::Ready(result) => Some(result),
            Poll::Pending | Poll::Unknown => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Poll::Ready(_))
    }

    /// Wire name used by the polling endpoint
    pub fn status(&self) -> &'static str {
        match self {
            Poll::Ready(_) => "ready",
            Poll::Pending => "pending",
            Poll::Unknown => "unknown",
        }
    }
}

/// Unit of work executed on the writer thread
///
/// `Ok(Some(json))` is recorded verbatim, `Ok(None)` as
/// [`DEFAULT_SUCCESS`], and `Err(e)` as `{"success":false,"error":"<e>"}`.
pub type Command = Box<dyn FnOnce() -> Result<Option<String>, String> + Send>;

#[derive(Default)]
struct Queue {
    last_id: u64,
    pending: VecDeque<(CommandId, Command)>,
}

/// Multi-producer, single-consumer command queue with a result store
pub struct CommandQueue {
    queue: Mutex<Queue>,
    results: DashMap<CommandId, String>,
    /// Highest ID whose result has been recorded
    ///
    /// Written together with the result insert; pollers hold the read side
    /// across their remove so "collected" and "pending" never overlap.
    completed: RwLock<u64>,
    max_pending_results: usize,
}

impl CommandQueue {
    pub fn new(max_pending_results: usize) -> Self {
        Self {
            queue: Mutex::new(Queue::default()),
            results: DashMap::new(),
            completed: RwLock::new(0),
            max_pending_results,
        }
    }

    /// Enqueue a command for the writer
    ///
    /// Never blocks on the writer and never fails. The error type only needs
    /// `Display`; its text becomes the failure message.
    pub fn submit<F, T, E>(&self, command: F) -> CommandId
    where
        F: FnOnce() -> Result<Option<T>, E> + Send + 'static,
        T: Into<String>,
        E: fmt::Display,
    {
        let boxed: Command = Box::new(move || {
            command()
                .map(|value| value.map(Into::into))
                .map_err(|e| e.to_string())
        });

        let mut queue = self.queue.lock();
        queue.last_id += 1;
        let id = CommandId(queue.last_id);
        queue.pending.push_back((id, boxed));
        id
    }

    /// Execute every queued command in submission order
    ///
    /// Must only be called from the writer thread. Returns the number of
    /// commands executed.
    pub fn drain(&self) -> usize {
        let mut executed = 0;
        while let Some((id, command)) = self.pop() {
            let result = run_command(id, command);
            let mut completed = self.completed.write();
            self.results.insert(id, result);
            *completed = id.0;
            executed += 1;
        }
        executed
    }

    fn pop(&self) -> Option<(CommandId, Command)> {
        self.queue.lock().pending.pop_front()
    }

    /// Collect a result (destructive)
    pub fn poll(&self, id: CommandId) -> Poll {
        let completed = self.completed.read();
        if let Some((_, result)) = self.results.remove(&id) {
            return Poll::Ready(result);
        }
        if id.0 > *completed && id.0 <= self.last_issued() {
            Poll::Pending
        } else {
            Poll::Unknown
        }
    }

    /// Clear the result store if it holds more than the configured maximum
    ///
    /// Returns the number of results dropped.
    pub fn evict_if_over(&self) -> usize {
        let count = self.results.len();
        if count <= self.max_pending_results {
            return 0;
        }
        tracing::warn!(
            count,
            max = self.max_pending_results,
            "too many uncollected command results, clearing"
        );
        self.results.clear();
        count
    }

    /// Uncollected results currently stored
    pub fn pending_results(&self) -> usize {
        self.results.len()
    }

    /// Commands waiting for the writer
    pub fn queued(&self) -> usize {
        self.queue.lock().pending.len()
    }

    fn last_issued(&self) -> u64 {
        self.queue.lock().last_id
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(crate::config::BridgeConfig::default().max_pending_results)
    }
}

fn run_command(id: CommandId, command: Command) -> String {
    match catch_unwind(AssertUnwindSafe(command)) {
        Ok(Ok(Some(result))) => result,
        Ok(Ok(None)) => DEFAULT_SUCCESS.to_string(),
        Ok(Err(message)) => {
            tracing::warn!(%id, error = %message, "command failed");
            failure(&message)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(%id, error = %message, "command panicked");
            failure(&message)
        }
    }
}

fn failure(message: &str) -> String {
    serde_json::json!({ "success": false, "error": message }).to_string()
}
