use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use alibi_core::command::CommandSpec;
use alibi_core::error::CoreError;
use alibi_core::readiness::{Endpoint, WaitPolicy, DEFAULT_CONNECT_TIMEOUT};
use alibi_core::restart::{RestartMode, RestartPolicy};
use alibi_core::role::Role;
use alibi_core::startup::StartupPlan;
use alibi_supervisor::SequencerOptions;

pub const DEFAULT_MIGRATE_CMD: &str = "python manage.py migrate --noinput";
pub const DEFAULT_COLLECTSTATIC_CMD: &str = "python manage.py collectstatic --noinput";
pub const DEFAULT_WORKER_CMD: &str = "celery -A project worker -l info";
pub const DEFAULT_SCHEDULER_CMD: &str =
    "celery -A project beat -l info --scheduler django_celery_beat.schedulers:DatabaseScheduler";
pub const DEFAULT_SERVER_CMD: &str = "gunicorn project.wsgi:application --bind 0.0.0.0:8000";

/// Port assumed for `DB_HOST` when `DB_PORT` is unset.
pub const DEFAULT_DB_PORT: u16 = 5432;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

fn invalid(var: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Environment and log format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppEnv {
    #[default]
    Local,
    Development,
    Production,
}

impl AppEnv {
    pub fn from_str_value(s: &str) -> Result<Self, String> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "unknown environment '{other}'. Must be one of: local, development, production"
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    pub fn from_str_value(s: &str) -> Result<Self, String> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'. Must be pretty or json")),
        }
    }

    /// JSON in production, human-readable elsewhere.
    pub fn default_for(env: AppEnv) -> Self {
        match env {
            AppEnv::Production => Self::Json,
            AppEnv::Local | AppEnv::Development => Self::Pretty,
        }
    }
}

// ---------------------------------------------------------------------------
// Boot configuration
// ---------------------------------------------------------------------------

/// Entrypoint configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct BootConfig {
    pub app_env: AppEnv,
    pub role: Role,
    pub dependencies: Vec<Endpoint>,
    pub wait: WaitPolicy,
    pub migrate: Option<CommandSpec>,
    pub collect_static: Option<CommandSpec>,
    pub worker: Option<CommandSpec>,
    pub scheduler: Option<CommandSpec>,
    pub server: Option<CommandSpec>,
    /// Limit for each one-shot step. `None` means no limit.
    pub step_timeout: Option<Duration>,
    pub restart: RestartPolicy,
    pub stop_grace: Duration,
    /// Replace the entrypoint with the foreground command instead of
    /// supervising it.
    pub exec_server: bool,
    /// Bind address of the status endpoint. `None` disables it.
    pub status_addr: Option<SocketAddr>,
    pub log_format: LogFormat,
}

impl BootConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                | Default                                       |
    /// |------------------------|-----------------------------------------------|
    /// | `APP_ENV`              | `DJANGO_ENV`, else `local`                    |
    /// | `BOOT_ROLE`            | `all`                                         |
    /// | `WAIT_FOR`             | `DB_HOST:DB_PORT` when `DB_HOST` is set       |
    /// | `DB_PORT`              | `5432`                                        |
    /// | `WAIT_INTERVAL_MS`     | `1000`                                        |
    /// | `WAIT_MAX_INTERVAL_MS` | `10000`                                       |
    /// | `WAIT_BACKOFF`         | `2.0`                                         |
    /// | `WAIT_TIMEOUT_SECS`    | `300` (`0` waits forever)                     |
    /// | `MIGRATE_CMD`          | `python manage.py migrate --noinput`          |
    /// | `COLLECTSTATIC_CMD`    | `python manage.py collectstatic --noinput`    |
    /// | `WORKER_CMD`           | `celery -A project worker -l info`            |
    /// | `SCHEDULER_CMD`        | `celery -A project beat ...`                  |
    /// | `SERVER_CMD`           | `gunicorn project.wsgi:application ...`       |
    /// | `STEP_TIMEOUT_SECS`    | `0` (no limit)                                |
    /// | `RESTART_POLICY`       | `on-failure`                                  |
    /// | `RESTART_MAX`          | `5` (`0` is unlimited)                        |
    /// | `STOP_GRACE_SECS`      | `10`                                          |
    /// | `EXEC_SERVER`          | `false`                                       |
    /// | `STATUS_ADDR`          | unset (status endpoint disabled)              |
    /// | `LOG_FORMAT`           | `json` in production, otherwise `pretty`      |
    ///
    /// Setting a command variable to an empty string disables that step.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_env = match lookup("APP_ENV").or_else(|| lookup("DJANGO_ENV")) {
            Some(value) => {
                AppEnv::from_str_value(&value).map_err(|e| invalid("APP_ENV", &value, e))?
            }
            None => AppEnv::default(),
        };

        let role = match lookup("BOOT_ROLE") {
            Some(value) => Role::from_str_value(&value)?,
            None => Role::default(),
        };

        let dependencies = match lookup("WAIT_FOR").filter(|v| !v.trim().is_empty()) {
            Some(list) => Endpoint::parse_list(&list, None)?,
            None => match lookup("DB_HOST").filter(|v| !v.trim().is_empty()) {
                Some(host) => {
                    let port = parse_or(&lookup, "DB_PORT", DEFAULT_DB_PORT)?;
                    vec![Endpoint::parse(&host, Some(port))?]
                }
                None => Vec::new(),
            },
        };

        let defaults = WaitPolicy::default();
        let wait_timeout_secs: u64 = parse_or(
            &lookup,
            "WAIT_TIMEOUT_SECS",
            defaults.max_wait.map_or(0, |d| d.as_secs()),
        )?;
        let wait = WaitPolicy {
            initial_interval: Duration::from_millis(parse_or(
                &lookup,
                "WAIT_INTERVAL_MS",
                defaults.initial_interval.as_millis() as u64,
            )?),
            max_interval: Duration::from_millis(parse_or(
                &lookup,
                "WAIT_MAX_INTERVAL_MS",
                defaults.max_interval.as_millis() as u64,
            )?),
            multiplier: parse_or(&lookup, "WAIT_BACKOFF", defaults.multiplier)?,
            max_wait: (wait_timeout_secs > 0).then(|| Duration::from_secs(wait_timeout_secs)),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        };
        wait.validate()?;

        let step_timeout_secs: u64 = parse_or(&lookup, "STEP_TIMEOUT_SECS", 0)?;

        let restart_mode = match lookup("RESTART_POLICY") {
            Some(value) => RestartMode::from_str_value(&value)?,
            None => RestartMode::default(),
        };
        let restart_defaults = RestartPolicy::default();
        let restart_max: u32 = parse_or(
            &lookup,
            "RESTART_MAX",
            restart_defaults.max_restarts.unwrap_or(0),
        )?;
        let restart = RestartPolicy {
            mode: restart_mode,
            max_restarts: (restart_max > 0).then_some(restart_max),
            ..restart_defaults
        };

        let status_addr = match lookup("STATUS_ADDR").filter(|v| !v.trim().is_empty()) {
            Some(value) => Some(
                value
                    .trim()
                    .parse::<SocketAddr>()
                    .map_err(|e| invalid("STATUS_ADDR", &value, e))?,
            ),
            None => None,
        };

        let log_format = match lookup("LOG_FORMAT") {
            Some(value) => {
                LogFormat::from_str_value(&value).map_err(|e| invalid("LOG_FORMAT", &value, e))?
            }
            None => LogFormat::default_for(app_env),
        };

        let config = Self {
            app_env,
            role,
            dependencies,
            wait,
            migrate: command(&lookup, "MIGRATE_CMD", DEFAULT_MIGRATE_CMD)?,
            collect_static: command(&lookup, "COLLECTSTATIC_CMD", DEFAULT_COLLECTSTATIC_CMD)?,
            worker: command(&lookup, "WORKER_CMD", DEFAULT_WORKER_CMD)?,
            scheduler: command(&lookup, "SCHEDULER_CMD", DEFAULT_SCHEDULER_CMD)?,
            server: command(&lookup, "SERVER_CMD", DEFAULT_SERVER_CMD)?,
            step_timeout: (step_timeout_secs > 0).then(|| Duration::from_secs(step_timeout_secs)),
            restart,
            stop_grace: Duration::from_secs(parse_or(&lookup, "STOP_GRACE_SECS", 10)?),
            exec_server: parse_bool(&lookup, "EXEC_SERVER", false)?,
            status_addr,
            log_format,
        };
        config.plan().validate()?;
        Ok(config)
    }

    pub fn plan(&self) -> StartupPlan {
        StartupPlan {
            role: self.role,
            dependencies: self.dependencies.clone(),
            migrate: self.migrate.clone(),
            collect_static: self.collect_static.clone(),
            worker: self.worker.clone(),
            scheduler: self.scheduler.clone(),
            server: self.server.clone(),
        }
    }

    pub fn sequencer_options(&self) -> SequencerOptions {
        SequencerOptions {
            wait: self.wait.clone(),
            step_timeout: self.step_timeout,
            restart: self.restart.clone(),
            stop_grace: self.stop_grace,
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(value) if !value.trim().is_empty() => {
            value.trim().parse().map_err(|e| invalid(var, &value, e))
        }
        _ => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, var: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(var) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" => Ok(default),
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, &value, "expected true or false")),
    }
}

/// A command variable: unset uses `default`, empty disables the step.
fn command<F>(
    lookup: &F,
    var: &'static str,
    default: &str,
) -> Result<Option<CommandSpec>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => CommandSpec::parse(&value)
            .map(Some)
            .map_err(|e| invalid(var, &value, e)),
        None => Ok(Some(CommandSpec::parse(default)?)),
    }
}
