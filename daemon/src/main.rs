//! voice-nav-daemon: background coordinator for voice-driven browsing
//!
//! Runs the session coordinator and the IPC server until SIGTERM or SIGINT.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use voice_nav::bridge::Bridge;
use voice_nav::config::Config;
use voice_nav::coordinator::{Coordinator, CoordinatorParts};
use voice_nav::credential::{CredentialStore, FileCredentialStore};
use voice_nav::events::Broadcaster;
use voice_nav::interpreter::GeminiInterpreter;
use voice_nav::ipc::{Server, ServerContext};
use voice_nav::lifecycle::ShutdownSignal;

/// Broadcasts a slow subscriber may fall behind by before skipping
const EVENT_CAPACITY: usize = 64;

/// Control requests and capture events queued for the coordinator
const INPUT_QUEUE_DEPTH: usize = 32;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "voice-nav-daemon starting");

    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        socket_path = ?config.socket_path,
        model = %config.interpreter.model,
        "configuration loaded"
    );

    let mut shutdown = ShutdownSignal::new()?;

    let store = Arc::new(FileCredentialStore::new(config.credential_path()));
    let credential = match store.load().await {
        Ok(credential) => credential,
        Err(e) => {
            warn!(error = %e, "could not read stored credential, starting without one");
            None
        }
    };

    let events = Broadcaster::new(EVENT_CAPACITY, config.status_clear_delay);
    let bridge = Arc::new(Bridge::new());
    let interpreter = Arc::new(GeminiInterpreter::new(&config.interpreter)?);

    let coordinator = Coordinator::new(CoordinatorParts {
        store,
        credential,
        capture: bridge.clone(),
        browser: bridge.clone(),
        interpreter,
        events: events.clone(),
    });
    let snapshot = coordinator.subscribe_state();
    let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE_DEPTH);

    let server = Server::new(
        &config.socket_path,
        ServerContext {
            coordinator: input_tx,
            snapshot,
            events,
            bridge,
        },
    )?;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        _ = coordinator.run(input_rx) => {
            info!("coordinator exited");
        }

        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        signal = shutdown.wait() => {
            info!(signal, "shutdown signal received");
        }
    }

    info!("shutting down...");
    server.shutdown().await;
    info!("voice-nav-daemon stopped");

    Ok(())
}
