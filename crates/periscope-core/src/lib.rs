//! periscope-core: Embedded loopback HTTP server and simulation bridge
//!
//! Serves a browser overlay from inside a host simulation:
//! - A small blocking HTTP/1.1 server bound to `127.0.0.1`
//! - Prefix-routed JSON API handlers plus in-memory static assets
//! - A command queue that runs mutations on the simulation thread
//! - Lock-free snapshots of simulation state for any number of readers
//!
//! ## Example
//! ```no_run
//! use periscope_core::{Bridge, BridgeConfig, Server, ServerConfig};
//! use std::time::Duration;
//!
//! let (bridge, mut writer) = Bridge::new(BridgeConfig::default());
//! let mut server = Server::new(ServerConfig::default());
//! bridge.register_api_handlers(&server);
//! server.add_asset("/index.html", "<h1>overlay</h1>");
//! server.start()?;
//!
//! loop {
//!     writer.tick(Duration::from_millis(16), true);
//!     # break;
//! }
//! # Ok::<(), periscope_core::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod assets;
pub mod bridge;
pub mod config;
pub mod cors;
pub mod error;
pub mod parser;
pub mod registry;
pub mod request;
pub mod response;
pub mod router;
pub mod server;

// Re-exports
pub use error::{Error, HandlerError, Result};
pub use parser::Method;
pub use request::{Request, RequestBuilder};
pub use response::{Response, ResponseBuilder, StatusCode};

pub use assets::{Asset, AssetStore};
pub use config::{BridgeConfig, PeriscopeConfig, ServerConfig};
pub use cors::{Cors, CorsConfig};
pub use registry::{ApiHandler, HandlerRegistry, HandlerResult};
pub use server::{ConnectionTracker, Server, ServerState};

pub use bridge::{Bridge, BridgeWriter, Category, CommandId, Poll, TickReport};
