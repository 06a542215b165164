//! Signal delivery to children and shutdown-signal handling for the
//! entrypoint itself.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Terminate,
    Kill,
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Kill => "SIGKILL",
        }
    }

    #[cfg(unix)]
    fn as_raw(&self) -> libc::c_int {
        match self {
            Self::Interrupt => libc::SIGINT,
            Self::Terminate => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
        }
    }
}

/// Send `signal` to the process `pid`.
///
/// A process that already exited (`ESRCH`) is not an error.
#[cfg(unix)]
pub fn send_signal(pid: u32, signal: Signal) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // Safety: kill(2) takes plain integers and has no memory-safety
    // preconditions.
    let ret = unsafe { libc::kill(pid, signal.as_raw()) };
    if ret == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(err)
}

#[cfg(not(unix))]
pub fn send_signal(_pid: u32, signal: Signal) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{} delivery is only supported on unix", signal.name()),
    ))
}

/// Stop `child`: SIGTERM first, SIGKILL if it is still alive after `grace`.
pub async fn terminate(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    if let Some(pid) = child.id() {
        if let Err(e) = send_signal(pid, Signal::Terminate) {
            tracing::warn!(pid, error = %e, "Failed to send SIGTERM, killing instead");
        }
    }

    let waited = tokio::time::timeout(grace, child.wait()).await;
    match waited {
        Ok(status) => status,
        Err(_elapsed) => {
            tracing::warn!(
                pid = child.id(),
                grace_ms = grace.as_millis() as u64,
                "Process ignored SIGTERM, sending SIGKILL",
            );
            child.kill().await?;
            child.wait().await
        }
    }
}

/// Wait for SIGINT or SIGTERM delivered to the entrypoint.
///
/// If a handler cannot be installed the corresponding branch never
/// completes; the other one still works.
pub async fn shutdown_signal() -> Signal {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT");
            Signal::Interrupt
        }
        () = terminate => {
            tracing::info!("Received SIGTERM");
            Signal::Terminate
        }
    }
}
