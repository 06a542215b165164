//! Dependency endpoints and the polling policy used by the readiness gate.
//!
//! An [`Endpoint`] names a TCP service the container must be able to reach
//! before it runs migrations or starts serving. A [`WaitPolicy`] describes
//! how often to poll it and for how long.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Delay before the second connection attempt.
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on the delay between attempts.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(10);

/// Factor by which the delay grows after each failed attempt.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Total time the gate waits before giving up.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);

/// Timeout applied to each individual connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// A network-addressable dependency (`host:port`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port`, `[v6addr]:port` or a bare host.
    ///
    /// A bare host takes `default_port`. When no default is supplied the
    /// input is rejected rather than guessing a port.
    pub fn parse(input: &str, default_port: Option<u16>) -> Result<Self, CoreError> {
        let trimmed = input.trim();
        let invalid = |reason: &str| CoreError::InvalidEndpoint {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid("host is empty"));
        }

        let (host, port_part) = if let Some(rest) = trimmed.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| invalid("missing closing ']'"))?;
            match after {
                "" => (host, None),
                _ => match after.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => return Err(invalid("unexpected characters after ']'")),
                },
            }
        } else if trimmed.matches(':').count() == 1 {
            let (host, port) = trimmed.split_once(':').unwrap_or((trimmed, ""));
            (host, Some(port))
        } else {
            // Zero colons, or an unbracketed IPv6 literal.
            (trimmed, None)
        };

        if host.is_empty() {
            return Err(invalid("host is empty"));
        }

        let port = match port_part {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| invalid("port must be an integer between 1 and 65535"))?,
            None => default_port.ok_or_else(|| invalid("no port given and no default port"))?,
        };

        if port == 0 {
            return Err(invalid("port must be an integer between 1 and 65535"));
        }

        Ok(Self::new(host, port))
    }

    /// Parse a comma-separated list of endpoints. Blank entries are skipped.
    pub fn parse_list(input: &str, default_port: Option<u16>) -> Result<Vec<Self>, CoreError> {
        input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Self::parse(s, default_port))
            .collect()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

// ---------------------------------------------------------------------------
// WaitPolicy
// ---------------------------------------------------------------------------

/// Tunable parameters for polling a dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitPolicy {
    /// Delay after the first failed attempt.
    pub initial_interval: Duration,
    /// Upper bound on the delay between attempts.
    pub max_interval: Duration,
    /// Growth factor applied after each failure. `1.0` keeps the interval fixed.
    pub multiplier: f64,
    /// Give up after this much total time. `None` waits forever.
    pub max_wait: Option<Duration>,
    /// Timeout for a single connect attempt.
    pub connect_timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
            multiplier: DEFAULT_MULTIPLIER,
            max_wait: Some(DEFAULT_MAX_WAIT),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl WaitPolicy {
    /// Constant interval, no deadline: poll until the dependency answers.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial_interval: interval,
            max_interval: interval,
            multiplier: 1.0,
            max_wait: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn is_bounded(&self) -> bool {
        self.max_wait.is_some()
    }

    /// Next delay after `current`, clamped to [`WaitPolicy::max_interval`].
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier) as u64;
        Duration::from_millis(next_ms).min(self.max_interval)
    }

    pub fn deadline_exceeded(&self, elapsed: Duration) -> bool {
        self.max_wait.is_some_and(|max| elapsed >= max)
    }

    /// Check that the policy can make progress.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.initial_interval.is_zero() {
            return Err(CoreError::Validation(
                "wait interval must be greater than zero".into(),
            ));
        }
        if self.max_interval < self.initial_interval {
            return Err(CoreError::Validation(
                "maximum wait interval must not be below the initial interval".into(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(CoreError::Validation(
                "wait backoff multiplier must be at least 1.0".into(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(CoreError::Validation(
                "connect timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_host_and_port() {
        let ep = Endpoint::parse("db:5432", None).expect("parse");
        assert_eq!(ep, Endpoint::new("db", 5432));
    }

    #[test]
    fn parse_bare_host_uses_default_port() {
        let ep = Endpoint::parse("alibi_redis", Some(6379)).expect("parse");
        assert_eq!(ep, Endpoint::new("alibi_redis", 6379));
    }

    #[test]
    fn parse_bare_host_without_default_is_rejected() {
        let err = Endpoint::parse("db", None).unwrap_err();
        assert!(err.to_string().contains("no port given"));
    }

    #[test]
    fn parse_bracketed_ipv6() {
        let ep = Endpoint::parse("[::1]:8000", None).expect("parse");
        assert_eq!(ep.host, "::1");
        assert_eq!(ep.port, 8000);
        assert_eq!(ep.to_string(), "[::1]:8000");
    }

    #[test]
    fn parse_unbracketed_ipv6_takes_default_port() {
        let ep = Endpoint::parse("fe80::1", Some(5432)).expect("parse");
        assert_eq!(ep.host, "fe80::1");
        assert_eq!(ep.port, 5432);
    }

    #[test]
    fn parse_rejects_bad_ports() {
        assert!(Endpoint::parse("db:0", None).is_err());
        assert!(Endpoint::parse("db:70000", None).is_err());
        assert!(Endpoint::parse("db:abc", None).is_err());
        assert!(Endpoint::parse("db:", None).is_err());
    }

    #[test]
    fn parse_rejects_empty_host() {
        assert!(Endpoint::parse("", Some(1)).is_err());
        assert!(Endpoint::parse(":5432", None).is_err());
        assert!(Endpoint::parse("[]:5432", None).is_err());
    }

    #[test]
    fn parse_list_skips_blanks() {
        let eps = Endpoint::parse_list("db:5432, ,redis:6379,", None).expect("parse");
        assert_eq!(
            eps,
            vec![Endpoint::new("db", 5432), Endpoint::new("redis", 6379)]
        );
    }

    #[test]
    fn parse_list_fails_on_any_bad_entry() {
        assert!(Endpoint::parse_list("db:5432,redis", None).is_err());
    }

    #[test]
    fn next_delay_doubles_then_clamps() {
        let policy = WaitPolicy::default();
        let mut delay = policy.initial_interval;
        let expected = [1, 2, 4, 8, 10, 10];
        for &secs in &expected {
            assert_eq!(delay.as_secs(), secs);
            delay = policy.next_delay(delay);
        }
    }

    #[test]
    fn fixed_policy_never_grows_and_is_unbounded() {
        let policy = WaitPolicy::fixed(Duration::from_secs(1));
        assert_eq!(
            policy.next_delay(Duration::from_secs(1)),
            Duration::from_secs(1)
        );
        assert!(!policy.is_bounded());
        assert!(!policy.deadline_exceeded(Duration::from_secs(86_400)));
    }

    #[test]
    fn deadline_is_inclusive() {
        let policy = WaitPolicy::default().with_max_wait(Some(Duration::from_secs(5)));
        assert!(!policy.deadline_exceeded(Duration::from_millis(4_999)));
        assert!(policy.deadline_exceeded(Duration::from_secs(5)));
    }

    #[test]
    fn validate_rejects_shrinking_backoff() {
        let policy = WaitPolicy {
            multiplier: 0.5,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
        assert!(WaitPolicy::default().validate().is_ok());
    }
}
