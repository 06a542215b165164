//! Readiness gate: block until TCP dependencies accept connections.
//!
//! [`wait_for`] polls an [`Endpoint`] following a [`WaitPolicy`]. The first
//! attempt happens immediately; later attempts back off exponentially.
//! A bounded policy ends in [`SupervisorError::DependencyTimeout`]; an
//! unbounded one keeps polling until the dependency answers or the
//! [`CancellationToken`] fires.

use std::io;
use std::time::{Duration, Instant};

use alibi_core::readiness::{Endpoint, WaitPolicy};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::error::SupervisorError;

/// How often a still-waiting gate logs a reminder at `info` level.
const REMINDER_INTERVAL: Duration = Duration::from_secs(30);

/// Outcome of a successful wait.
#[derive(Debug, Clone)]
pub struct WaitReport {
    pub endpoint: Endpoint,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Attempt a single TCP connection.
pub async fn probe(endpoint: &Endpoint, connect_timeout: Duration) -> io::Result<()> {
    let connect = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
    match tokio::time::timeout(connect_timeout, connect).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connect timed out after {}ms", connect_timeout.as_millis()),
        )),
    }
}

/// Poll `endpoint` until it accepts a connection.
pub async fn wait_for(
    endpoint: &Endpoint,
    policy: &WaitPolicy,
    cancel: &CancellationToken,
) -> Result<WaitReport, SupervisorError> {
    let start = Instant::now();
    let mut delay = policy.initial_interval;
    let mut attempt = 0u32;
    let mut last_reminder = start;

    loop {
        attempt += 1;

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(SupervisorError::Cancelled),
            result = probe(endpoint, policy.connect_timeout) => result,
        };

        match result {
            Ok(()) => {
                let elapsed = start.elapsed();
                tracing::info!(
                    endpoint = %endpoint,
                    attempts = attempt,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Dependency is ready",
                );
                return Ok(WaitReport {
                    endpoint: endpoint.clone(),
                    attempts: attempt,
                    elapsed,
                });
            }
            Err(e) => {
                if attempt == 1 {
                    tracing::info!(
                        endpoint = %endpoint,
                        max_wait_secs = policy.max_wait.map(|d| d.as_secs()),
                        "Waiting for dependency",
                    );
                } else if last_reminder.elapsed() >= REMINDER_INTERVAL {
                    last_reminder = Instant::now();
                    tracing::info!(
                        endpoint = %endpoint,
                        attempts = attempt,
                        elapsed_secs = start.elapsed().as_secs(),
                        "Still waiting for dependency",
                    );
                }
                tracing::debug!(endpoint = %endpoint, attempt, error = %e, "Dependency not ready");
            }
        }

        let elapsed = start.elapsed();
        if policy.deadline_exceeded(elapsed) {
            tracing::error!(
                endpoint = %endpoint,
                attempts = attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                "Gave up waiting for dependency",
            );
            return Err(SupervisorError::DependencyTimeout {
                endpoint: endpoint.clone(),
                elapsed_ms: elapsed.as_millis() as u64,
                attempts: attempt,
            });
        }

        // Never sleep past the deadline; the last attempt lands on it.
        let sleep_for = match policy.max_wait {
            Some(max) => delay.min(max.saturating_sub(elapsed)),
            None => delay,
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(SupervisorError::Cancelled),
            _ = tokio::time::sleep(sleep_for) => {}
        }

        delay = policy.next_delay(delay);
    }
}

/// Wait for each endpoint in turn.
pub async fn wait_for_all(
    endpoints: &[Endpoint],
    policy: &WaitPolicy,
    cancel: &CancellationToken,
) -> Result<Vec<WaitReport>, SupervisorError> {
    let mut reports = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        reports.push(wait_for(endpoint, policy, cancel).await?);
    }
    Ok(reports)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tokio::net::TcpListener;

    use super::*;

    fn fast_policy(max_wait: Option<Duration>) -> WaitPolicy {
        WaitPolicy {
            initial_interval: Duration::from_millis(50),
            max_interval: Duration::from_millis(100),
            multiplier: 2.0,
            max_wait,
            connect_timeout: Duration::from_millis(200),
        }
    }

    /// A local port with nothing listening on it.
    async fn closed_endpoint() -> Endpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);
        Endpoint::new("127.0.0.1", port)
    }

    #[tokio::test]
    async fn open_port_is_ready_on_first_attempt() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let endpoint = Endpoint::new("127.0.0.1", port);

        let report = wait_for(&endpoint, &fast_policy(None), &CancellationToken::new())
            .await
            .expect("ready");
        assert_eq!(report.attempts, 1);
    }

    #[tokio::test]
    async fn closed_port_times_out_under_bounded_policy() {
        let endpoint = closed_endpoint().await;
        let policy = fast_policy(Some(Duration::from_millis(300)));

        let start = Instant::now();
        let result = wait_for(&endpoint, &policy, &CancellationToken::new()).await;

        assert_matches!(
            result,
            Err(SupervisorError::DependencyTimeout { attempts, .. }) if attempts >= 2
        );
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn proceeds_only_once_the_dependency_opens() {
        let endpoint = closed_endpoint().await;
        let port = endpoint.port;
        let opens_after = Duration::from_millis(400);

        let opener = tokio::spawn(async move {
            tokio::time::sleep(opens_after).await;
            TcpListener::bind(("127.0.0.1", port)).await.expect("rebind")
        });

        let interval = Duration::from_millis(50);
        let start = Instant::now();
        let report = wait_for(&endpoint, &WaitPolicy::fixed(interval), &CancellationToken::new())
            .await
            .expect("ready");

        // Passes at the first poll after the port opens, not a later one.
        let elapsed = start.elapsed();
        assert!(elapsed >= opens_after);
        assert!(
            elapsed < opens_after + interval + Duration::from_millis(300),
            "gate passed late: {elapsed:?}"
        );
        assert!(report.attempts > 1);
        drop(opener.await.expect("opener task"));
    }

    #[tokio::test]
    async fn cancellation_stops_an_unbounded_wait() {
        let endpoint = closed_endpoint().await;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            trigger.cancel();
        });

        let result = wait_for(&endpoint, &fast_policy(None), &cancel).await;
        assert_matches!(result, Err(SupervisorError::Cancelled));
    }

    #[tokio::test]
    async fn wait_for_all_stops_at_first_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let open = Endpoint::new("127.0.0.1", listener.local_addr().expect("addr").port());
        let closed = closed_endpoint().await;
        let policy = fast_policy(Some(Duration::from_millis(150)));

        let result = wait_for_all(&[open, closed.clone()], &policy, &CancellationToken::new()).await;
        assert_matches!(
            result,
            Err(SupervisorError::DependencyTimeout { endpoint, .. }) if endpoint == closed
        );
    }
}
