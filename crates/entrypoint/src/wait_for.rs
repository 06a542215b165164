//! Command-line surface of `alibi-wait-for`.
//!
//! The binary only wires these arguments to the readiness gate and
//! `exec`; everything that decides *what* to wait for lives here.

use std::time::Duration;

use clap::Parser;

use alibi_core::error::CoreError;
use alibi_core::readiness::{Endpoint, WaitPolicy};

#[derive(Parser, Debug)]
#[command(name = "alibi-wait-for", author, version, about)]
pub struct WaitForArgs {
    /// Endpoints as `host:port`, `[v6addr]:port` or a bare host.
    #[arg(required = true)]
    pub targets: Vec<String>,

    /// Port for targets given without one. Without it a bare host is rejected.
    #[arg(long)]
    pub default_port: Option<u16>,

    /// Give up after this many seconds. `0` waits forever.
    #[arg(long, default_value_t = 0)]
    pub timeout: u64,

    /// Delay between attempts, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub interval: u64,

    /// Backoff multiplier applied to the interval after each failed attempt.
    #[arg(long, default_value_t = 1.0)]
    pub backoff: f64,

    /// Upper bound for the interval, in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    pub max_interval: u64,

    /// Emit JSON log lines.
    #[arg(long)]
    pub json: bool,

    /// Command to run once every endpoint answers.
    #[arg(last = true)]
    pub command: Vec<String>,
}

impl WaitForArgs {
    pub fn endpoints(&self) -> Result<Vec<Endpoint>, CoreError> {
        self.targets
            .iter()
            .map(|target| Endpoint::parse(target, self.default_port))
            .collect()
    }

    /// The polling policy. The interval never exceeds `--max-interval`
    /// unless the initial interval is already larger.
    pub fn policy(&self) -> Result<WaitPolicy, CoreError> {
        let interval = Duration::from_millis(self.interval);
        let policy = WaitPolicy {
            initial_interval: interval,
            max_interval: Duration::from_millis(self.max_interval).max(interval),
            multiplier: self.backoff,
            ..WaitPolicy::fixed(interval)
        }
        .with_max_wait((self.timeout > 0).then(|| Duration::from_secs(self.timeout)));
        policy.validate()?;
        Ok(policy)
    }
}
