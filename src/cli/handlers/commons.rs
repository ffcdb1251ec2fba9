// src/cli/handlers/commons.rs

// Shared setup used by several handlers.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::thread;

use crate::{
    CancellationToken,
    core::{config, session::ExecutionSession},
    models::KernelConfig,
};

/// What every handler gets: the `--config` override and the interrupt flag.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config_path: Option<PathBuf>,
    pub cancellation_token: CancellationToken,
}

impl AppContext {
    pub fn new(config_path: Option<PathBuf>, cancellation_token: CancellationToken) -> Self {
        Self {
            config_path,
            cancellation_token,
        }
    }

    pub fn load_config(&self) -> Result<(KernelConfig, PathBuf)> {
        let loaded = config::load_config(self.config_path.as_deref())?;
        log::debug!("Using configuration '{}'.", loaded.1.display());
        Ok(loaded)
    }

    /// Loads the configuration and starts the interpreter.
    pub fn start_session(&self) -> Result<ExecutionSession> {
        let (config, path) = self.load_config()?;
        ExecutionSession::start(config)
            .with_context(|| format!("Interpreter configured in '{}'", display(&path)))
    }
}

fn display(path: &Path) -> String {
    dunce::simplified(path).display().to_string()
}

/// Sets `token` whenever Ctrl+C is pressed, for as long as the process lives.
///
/// The interpreter runs in its own process group, so the terminal's SIGINT only reaches us; the
/// session forwards it when the flag is seen.
pub fn spawn_interrupt_listener(token: CancellationToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .context("Failed to start the signal listener")?;

    thread::Builder::new()
        .name("irepl-ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    log::debug!("Ctrl+C received.");
                    token.store(true, Ordering::SeqCst);
                }
            });
        })
        .context("Failed to start the signal listener thread")?;
    Ok(())
}
