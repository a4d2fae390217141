mod actions;
mod core;
mod dom;
mod engine;
mod overlay;
mod sites;

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::broadcast;

use crate::core::{JsonFileStore, KeyValueStore, MemoryStore, Settings};
use crate::dom::{Document, Scenario, ScenarioContext};
use crate::engine::{PageSession, SessionEvent};
use crate::overlay::DomRenderer;
use crate::sites::NoSegments;

/// Replays a scripted page session against the media controller engine
/// and reports the controllers left standing.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Scenario JSON; the built-in demo runs when omitted
    #[arg(value_name = "SCENARIO")]
    scenario: Option<PathBuf>,

    /// Persist settings and speeds in this JSON file instead of memory
    #[arg(long, value_name = "PATH")]
    store: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut store: Box<dyn KeyValueStore> = match cli.store {
        Some(path) => {
            log::info!("Using store file {}", path.display());
            Box::new(JsonFileStore::at(path))
        }
        None => Box::new(MemoryStore::new()),
    };
    let settings = Settings::load(store.as_mut());

    let scenario = match cli.scenario {
        Some(path) => Scenario::from_file(&path)?,
        None => {
            log::info!("No scenario given, replaying the built-in demo");
            Scenario::demo()
        }
    };

    let mut doc = Document::new(&scenario.url);
    let (mut session, mut events) = PageSession::new(
        &mut doc,
        settings,
        store,
        Box::new(DomRenderer::new()),
        Box::new(NoSegments),
    );

    let mut labels = ScenarioContext::new();
    let mut received = Vec::new();
    drain_events(&mut events, &mut received);
    for (index, step) in scenario.steps.iter().enumerate() {
        session
            .replay_step(&mut doc, &mut labels, step)
            .map_err(|e| anyhow::anyhow!("Step {} failed: {}", index, e))?;
        drain_events(&mut events, &mut received);
    }

    println!("Replayed {} steps on {}", scenario.steps.len(), scenario.url);
    println!(
        "Strategy {} | {} | {} controller(s)",
        session.strategy_name(),
        if session.is_active() { "active" } else { "dormant" },
        session.registry().len()
    );
    for controller in session.registry().iter() {
        let media = doc.media(controller.media)?;
        println!(
            "  {} on {} | rate {:.2} | {}{}",
            controller.id,
            controller.media,
            media.playback_rate,
            if controller.hidden { "hidden" } else { "shown" },
            if controller.suspended { " | suspended" } else { "" },
        );
    }
    println!("{} event(s):", received.len());
    for event in &received {
        println!("  {:?}", event);
    }

    Ok(())
}

/// Non-blocking receiver drain. A lagged receiver loses the oldest
/// entries; the report notes how many.
fn drain_events(
    receiver: &mut broadcast::Receiver<SessionEvent>,
    into: &mut Vec<SessionEvent>,
) {
    loop {
        match receiver.try_recv() {
            Ok(event) => into.push(event),
            Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                log::warn!("Event report lost {} event(s) to channel lag", missed);
            }
            Err(_) => break,
        }
    }
}
