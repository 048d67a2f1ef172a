// Rust guideline compliant 2026-10-09

//! Guardian entry point.
//!
//! Wires every component to the demo adapters with an in-memory session
//! store, then runs the live pipeline next to a scripted payment
//! walkthrough until the script ends or CTRL+C is pressed.
//!
//! # Usage
//!
//! ```text
//! RUST_LOG=info cargo run --bin guardian
//!
//! # Reproducible run, with per-component debug output
//! GUARDIAN_SEED=42 RUST_LOG=debug cargo run --bin guardian
//! ```

mod adapters;
mod app;

use adapters::memory_session_store::MemorySessionStore;
use anyhow::Context as _;
use app::{Guardian, Settings};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize the tracing subscriber before any async work.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = Settings::from_env().context("failed to read settings")?;
    let guardian = Guardian::new(MemorySessionStore::new(), &settings).context("failed to wire components")?;

    // CTRL+C: stop the loops; the walkthrough is dropped mid-flight.
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("main.shutdown: ctrl_c received");
            guardian.shutdown().await;
        }
        result = guardian.run() => {
            result?;
        }
    }

    Ok(())
}
