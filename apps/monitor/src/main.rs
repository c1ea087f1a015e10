mod config;
mod connectivity;
mod feed;
mod main_lib;

use std::collections::HashMap;

use config::Config;
use feed::ScoreFeed;
use main_lib::{build_orchestrator, handle_event, init_tracing, render_status, tracked_keys};

fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing();

    let feed = ScoreFeed::new(config.feed_url.clone(), config.request_timeout)?;
    let mut orchestrator = build_orchestrator(&config);
    let keys = tracked_keys(&config.teams);
    tracing::info!(
        "Following {} teams, tick every {}ms",
        keys.len(),
        config.tick.as_millis()
    );

    // Only log a key when what the display shows changes.
    let mut shown: HashMap<String, String> = HashMap::new();
    let mut ticks: u64 = 0;
    loop {
        for (key, selection) in &keys {
            let status = orchestrator.attempt_fetch(key, || feed.fetch(selection), handle_event);
            let line = render_status(&status);
            if shown.get(key.as_str()) != Some(&line) {
                tracing::info!(key = %key, status = status.tag(), "{}", line);
                shown.insert(key.to_string(), line);
            }
        }

        ticks += 1;
        if config.max_ticks.is_some_and(|max| ticks >= max) {
            break;
        }
        std::thread::sleep(config.tick);
    }

    tracing::info!(
        "Recovery stats: {}",
        serde_json::to_string(orchestrator.stats())?
    );
    for metrics in orchestrator.circuit_breaker().metrics() {
        tracing::info!("Circuit: {}", serde_json::to_string(&metrics)?);
    }
    tracing::info!(
        "Fallback cache: {}",
        serde_json::to_string(&orchestrator.cache().stats())?
    );
    Ok(())
}
