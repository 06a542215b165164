//! Wait for TCP endpoints, then replace this process with a command.
//!
//! ```text
//! alibi-wait-for db:5432 redis --default-port 6379 -- python manage.py migrate
//! ```

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use alibi_core::command::CommandSpec;
use alibi_entrypoint::config::{AppEnv, LogFormat};
use alibi_entrypoint::logging;
use alibi_entrypoint::wait_for::WaitForArgs;
use alibi_supervisor::foreground::exec_replace;
use alibi_supervisor::probe;
use alibi_supervisor::signal::shutdown_signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = WaitForArgs::parse();
    logging::init(if args.json {
        LogFormat::Json
    } else {
        LogFormat::default_for(AppEnv::Local)
    });

    let endpoints = args.endpoints().context("invalid target")?;
    let policy = args.policy().context("invalid wait settings")?;

    let cancel = CancellationToken::new();
    tokio::select! {
        result = probe::wait_for_all(&endpoints, &policy, &cancel) => {
            result.context("dependencies not ready")?;
        }
        signal = shutdown_signal() => {
            cancel.cancel();
            anyhow::bail!("interrupted by {}", signal.name());
        }
    }

    if args.command.is_empty() {
        return Ok(());
    }

    let command = CommandSpec::from_argv(args.command).context("invalid command")?;
    let err = exec_replace(&command);
    Err(anyhow::Error::new(err).context(format!("failed to exec '{command}'")))
}
