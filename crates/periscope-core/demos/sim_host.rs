//! Toy simulation exposing its state through the overlay server
//!
//! ```sh
//! RUST_LOG=periscope_core=debug cargo run --example sim_host -- periscope.toml
//! curl http://127.0.0.1:5959/api/v1/cargo
//! curl http://127.0.0.1:5959/api/v1/actions/credits
//! curl http://127.0.0.1:5959/api/v1/commands/cmd_1
//! ```

use parking_lot::Mutex;
use periscope_core::{
    Bridge, Category, HandlerResult, PeriscopeConfig, Request, Server,
};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const FRAME: Duration = Duration::from_millis(16);

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head><title>periscope</title><link rel="stylesheet" href="/style.css"></head>
<body>
<pre id="cargo">loading...</pre>
<button id="credits">+1000 credits</button>
<script src="/app.js"></script>
</body>
</html>
"#;

const APP_JS: &str = r#"async function refresh() {
  const res = await fetch('/api/v1/cargo');
  document.getElementById('cargo').textContent = JSON.stringify(await res.json(), null, 2);
}
document.getElementById('credits').onclick = () => fetch('/api/v1/actions/credits');
setInterval(refresh, 1000);
refresh();
"#;

/// Simulation state, touched only on the main thread and by commands
#[derive(Debug)]
struct World {
    day: u32,
    credits: i64,
    ships: Vec<&'static str>,
}

fn load_config() -> Result<PeriscopeConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => Ok(PeriscopeConfig::from_toml_str(&std::fs::read_to_string(path)?)?),
        None => Ok(PeriscopeConfig::default()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    let world = Arc::new(Mutex::new(World {
        day: 1,
        credits: 25_000,
        ships: vec!["Onslaught", "Hammerhead", "Wolf"],
    }));

    let (bridge, mut writer) = Bridge::new(config.bridge.clone());

    let w = Arc::clone(&world);
    writer.set_builder(Category::Game, move || {
        let world = w.lock();
        Ok(json!({ "day": world.day, "credits": world.credits }))
    });
    let w = Arc::clone(&world);
    writer.set_builder(Category::Fleet, move || {
        let world = w.lock();
        Ok(json!({ "totalShips": world.ships.len(), "members": world.ships }))
    });
    let w = Arc::clone(&world);
    writer.set_builder(Category::Cargo, move || {
        Ok(json!({ "credits": w.lock().credits }))
    });
    writer.register_provider("uptime", {
        let started = Instant::now();
        move || Ok(json!({ "seconds": started.elapsed().as_secs() }))
    });

    let mut server = Server::new(config.server.clone());
    bridge.register_api_handlers(&server);
    server.add_assets([
        ("/index.html", INDEX_HTML),
        ("/app.js", APP_JS),
        ("/style.css", "body { font-family: monospace; }"),
    ]);

    let handle = bridge.clone();
    let w = Arc::clone(&world);
    server.register_handler("/api/v1/actions/credits", move |_: &Request| -> HandlerResult {
        let w = Arc::clone(&w);
        let id = handle.submit(move || -> Result<Option<String>, String> {
            w.lock().credits += 1000;
            Ok(Some(json!({ "success": true, "message": "Added 1000 credits" }).to_string()))
        });
        Ok(Some(json!({ "id": id.to_string() }).to_string()))
    });

    server.start()?;
    writer.publish_now();

    let mut last = Instant::now();
    loop {
        std::thread::sleep(FRAME);
        let now = Instant::now();
        let elapsed = now - last;
        last = now;

        world.lock().day += 1;
        let report = writer.tick(elapsed, true);
        if report.executed > 0 {
            tracing::debug!(executed = report.executed, "commands applied");
        }
    }
}
