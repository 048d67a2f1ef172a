// Rust guideline compliant 2026-10-09

//! Guardian entry point -- `SQLite` session store.
//!
//! Identical to the `guardian` binary except that the session store is a
//! `SQLite` file, so a staged payment and the theme survive a restart. Only
//! this entry point and the adapter change; no library crate is touched.
//!
//! # Usage
//!
//! ```text
//! RUST_LOG=info cargo run --bin guardian_sqlite
//!
//! # Custom database location
//! GUARDIAN_DB_URL=sqlite:/tmp/guardian.db RUST_LOG=info cargo run --bin guardian_sqlite
//! ```

mod adapters;
mod app;

// Load the SQLite adapter here only, so the `guardian` binary never
// compiles it.
#[path = "adapters/sqlite_session_store.rs"]
mod sqlite_session_store;

use anyhow::Context as _;
use app::{Guardian, Settings};
use sqlite_session_store::SqliteSessionStore;

/// Database used when `GUARDIAN_DB_URL` is not set; created in the working
/// directory on first run.
const DEFAULT_DB_URL: &str = "sqlite:guardian.db";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = Settings::from_env().context("failed to read settings")?;
    let db_url = std::env::var("GUARDIAN_DB_URL").unwrap_or_else(|_| DEFAULT_DB_URL.to_owned());
    let store = SqliteSessionStore::new(&db_url)
        .await
        .with_context(|| format!("failed to open SQLite session store at {db_url}"))?;
    tracing::info!(%db_url, "main.session_store.opened");
    let guardian = Guardian::new(store, &settings).context("failed to wire components")?;

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
