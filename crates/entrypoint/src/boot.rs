//! Top-level entrypoint flow: environment, logging, sequence, exit code.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use alibi_core::readiness::DEFAULT_CONNECT_TIMEOUT;
use alibi_supervisor::foreground::exec_replace;
use alibi_supervisor::signal::{shutdown_signal, Signal};
use alibi_supervisor::{Sequencer, SupervisorError};

use crate::config::BootConfig;
use crate::logging;
use crate::state::StatusState;
use crate::status_server;

/// Exit code for configuration that cannot be loaded.
pub const CONFIG_ERROR_EXIT_CODE: i32 = 2;

const STATUS_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Load the dotenv file named by `ENV_FILE` (default `.env`).
///
/// A missing file is not an error; variables already set in the process
/// environment take precedence.
pub fn load_env_file() -> Option<PathBuf> {
    let name = std::env::var("ENV_FILE").unwrap_or_else(|_| ".env".into());
    dotenvy::from_filename(&name).ok()
}

/// Run the entrypoint and return the process exit code.
pub async fn run() -> i32 {
    let env_file = load_env_file();
    let config = BootConfig::from_env();

    logging::init(
        config
            .as_ref()
            .map(|c| c.log_format)
            .unwrap_or_default(),
    );
    if let Some(path) = env_file {
        tracing::info!(path = %path.display(), "Loaded environment file");
    }

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return CONFIG_ERROR_EXIT_CODE;
        }
    };

    match execute(config, shutdown_signal()).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "Entrypoint failed");
            exit_code_for(&e)
        }
    }
}

/// Execute the startup sequence described by `config`.
///
/// `shutdown` resolves when the entrypoint is asked to stop.
pub async fn execute<F>(config: BootConfig, shutdown: F) -> anyhow::Result<i32>
where
    F: Future<Output = Signal>,
{
    tracing::info!(
        env = config.app_env.as_str(),
        role = config.role.as_str(),
        dependencies = config.dependencies.len(),
        bounded_wait = config.wait.is_bounded(),
        exec_server = config.exec_server,
        "Loaded boot configuration",
    );

    let sequencer = Sequencer::new(config.plan(), config.sequencer_options())
        .context("invalid startup plan")?;
    let cancel = CancellationToken::new();

    let status_cancel = CancellationToken::new();
    let status_task = config.status_addr.map(|addr| {
        let state = StatusState {
            role: config.role,
            progress: sequencer.subscribe(),
            supervisor: sequencer.supervisor(),
            dependencies: Arc::new(config.dependencies.clone()),
            probe_timeout: DEFAULT_CONNECT_TIMEOUT,
        };
        let token = status_cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = status_server::serve(addr, state, token).await {
                tracing::error!(%addr, error = %e, "Status endpoint failed");
            }
        })
    });

    let result = if config.exec_server {
        prepare_then_exec(&sequencer, &cancel, shutdown).await
    } else {
        sequencer
            .run(&cancel, shutdown)
            .await
            .map(|result| {
                let warnings = result.reports.iter().filter(|r| r.is_warning()).count();
                tracing::info!(
                    exit_code = result.exit_code,
                    warnings,
                    "Container sequence finished",
                );
                result.exit_code
            })
            .map_err(anyhow::Error::from)
    };

    status_cancel.cancel();
    if let Some(task) = status_task {
        let _ = tokio::time::timeout(STATUS_SHUTDOWN_TIMEOUT, task).await;
    }

    result
}

/// Run everything before the foreground step, then replace this process
/// with the foreground command. Background services keep running without
/// supervision.
async fn prepare_then_exec<F>(
    sequencer: &Sequencer,
    cancel: &CancellationToken,
    shutdown: F,
) -> anyhow::Result<i32>
where
    F: Future<Output = Signal>,
{
    let prepared = tokio::select! {
        prepared = sequencer.prepare(cancel) => prepared,
        signal = shutdown => {
            tracing::warn!(signal = signal.name(), "Shutdown requested during startup");
            cancel.cancel();
            Err(SupervisorError::Cancelled)
        }
    };

    let prepared = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            sequencer.supervisor().shutdown_all().await;
            return Err(e.into());
        }
    };

    let err = exec_replace(&prepared.foreground);
    sequencer.supervisor().shutdown_all().await;
    Err(anyhow::Error::new(err).context(format!("failed to exec '{}'", prepared.foreground)))
}

/// Map a top-level error to the process exit code.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<SupervisorError>()
        .map_or(1, SupervisorError::exit_code)
}
