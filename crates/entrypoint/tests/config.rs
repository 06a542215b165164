//! Tests for loading `BootConfig` from environment-style lookups.

use std::collections::HashMap;
use std::time::Duration;

use alibi_core::error::CoreError;
use alibi_core::readiness::Endpoint;
use alibi_core::restart::RestartMode;
use alibi_core::role::Role;
use alibi_core::startup::StepKind;
use alibi_entrypoint::config::{AppEnv, BootConfig, ConfigError, LogFormat};
use assert_matches::assert_matches;

fn load(vars: &[(&str, &str)]) -> Result<BootConfig, ConfigError> {
    let env: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    BootConfig::from_lookup(|key| env.get(key).cloned())
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

#[test]
fn empty_environment_uses_defaults() {
    let config = load(&[]).expect("config");

    assert_eq!(config.app_env, AppEnv::Local);
    assert_eq!(config.role, Role::All);
    assert!(config.dependencies.is_empty());
    assert_eq!(config.wait.max_wait, Some(Duration::from_secs(300)));
    assert_eq!(config.step_timeout, None);
    assert_eq!(config.restart.mode, RestartMode::OnFailure);
    assert_eq!(config.restart.max_restarts, Some(5));
    assert_eq!(config.stop_grace, Duration::from_secs(10));
    assert!(!config.exec_server);
    assert!(config.status_addr.is_none());
    assert_eq!(config.log_format, LogFormat::Pretty);

    let server = config.server.as_ref().expect("server");
    assert_eq!(server.program, "gunicorn");
    assert_eq!(server.args[0], "project.wsgi:application");
    let migrate = config.migrate.as_ref().expect("migrate");
    assert_eq!(migrate.args, vec!["manage.py", "migrate", "--noinput"]);
    assert!(config.scheduler.as_ref().expect("scheduler").args.contains(
        &"django_celery_beat.schedulers:DatabaseScheduler".to_string()
    ));
}

#[test]
fn default_plan_runs_the_full_sequence() {
    let plan = load(&[]).expect("config").plan();
    let kinds: Vec<_> = plan.steps().iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![
            StepKind::WaitForDependencies,
            StepKind::Migrate,
            StepKind::CollectStatic,
            StepKind::LaunchWorker,
            StepKind::LaunchScheduler,
            StepKind::LaunchServer,
        ]
    );
}

// ---------------------------------------------------------------------------
// Dependencies and waiting
// ---------------------------------------------------------------------------

#[test]
fn wait_for_list_is_parsed() {
    let config = load(&[("WAIT_FOR", "db:5432, alibi_redis:6379")]).expect("config");
    assert_eq!(
        config.dependencies,
        vec![Endpoint::new("db", 5432), Endpoint::new("alibi_redis", 6379)]
    );
}

#[test]
fn db_host_falls_back_to_default_port() {
    let config = load(&[("DB_HOST", "postgres")]).expect("config");
    assert_eq!(config.dependencies, vec![Endpoint::new("postgres", 5432)]);

    let config = load(&[("DB_HOST", "postgres"), ("DB_PORT", "6543")]).expect("config");
    assert_eq!(config.dependencies, vec![Endpoint::new("postgres", 6543)]);
}

#[test]
fn wait_for_takes_precedence_over_db_host() {
    let config = load(&[("WAIT_FOR", "db:1"), ("DB_HOST", "other")]).expect("config");
    assert_eq!(config.dependencies, vec![Endpoint::new("db", 1)]);
}

#[test]
fn wait_for_without_port_is_rejected() {
    assert_matches!(load(&[("WAIT_FOR", "db")]), Err(ConfigError::Core(_)));
}

#[test]
fn zero_wait_timeout_waits_forever() {
    let config = load(&[("WAIT_TIMEOUT_SECS", "0")]).expect("config");
    assert!(!config.wait.is_bounded());
}

#[test]
fn wait_tuning_is_applied() {
    let config = load(&[
        ("WAIT_INTERVAL_MS", "250"),
        ("WAIT_MAX_INTERVAL_MS", "2000"),
        ("WAIT_BACKOFF", "1.5"),
        ("WAIT_TIMEOUT_SECS", "60"),
    ])
    .expect("config");
    assert_eq!(config.wait.initial_interval, Duration::from_millis(250));
    assert_eq!(config.wait.max_interval, Duration::from_secs(2));
    assert_eq!(config.wait.multiplier, 1.5);
    assert_eq!(config.wait.max_wait, Some(Duration::from_secs(60)));
}

#[test]
fn invalid_wait_interval_is_rejected() {
    assert_matches!(
        load(&[("WAIT_INTERVAL_MS", "soon")]),
        Err(ConfigError::Invalid { var: "WAIT_INTERVAL_MS", .. })
    );
    assert_matches!(load(&[("WAIT_INTERVAL_MS", "0")]), Err(ConfigError::Core(_)));
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[test]
fn empty_command_disables_the_step() {
    let config = load(&[("COLLECTSTATIC_CMD", ""), ("WORKER_CMD", "  ")]).expect("config");
    assert!(config.collect_static.is_none());
    assert!(config.worker.is_none());
    assert!(!config
        .plan()
        .steps()
        .iter()
        .any(|s| s.kind == StepKind::LaunchWorker));
}

#[test]
fn disabling_the_foreground_command_is_rejected() {
    assert_matches!(
        load(&[("SERVER_CMD", "")]),
        Err(ConfigError::Core(CoreError::Validation(_)))
    );
    assert_matches!(
        load(&[("BOOT_ROLE", "worker"), ("WORKER_CMD", "")]),
        Err(ConfigError::Core(CoreError::Validation(_)))
    );
    // The server command only matters for roles that run it.
    let config = load(&[("BOOT_ROLE", "scheduler"), ("SERVER_CMD", "")]).expect("config");
    assert!(config.server.is_none());
}

#[test]
fn quoted_command_is_split() {
    let config = load(&[("SERVER_CMD", "gunicorn 'project.wsgi:application' --bind \"0.0.0.0:9000\"")])
        .expect("config");
    let server = config.server.expect("server");
    assert_eq!(server.args, vec!["project.wsgi:application", "--bind", "0.0.0.0:9000"]);
}

#[test]
fn unterminated_quote_names_the_variable() {
    assert_matches!(
        load(&[("MIGRATE_CMD", "python 'manage.py")]),
        Err(ConfigError::Invalid { var: "MIGRATE_CMD", .. })
    );
}

// ---------------------------------------------------------------------------
// Environment, role and misc
// ---------------------------------------------------------------------------

#[test]
fn app_env_accepts_known_values_and_falls_back_to_django_env() {
    assert_eq!(load(&[("APP_ENV", "Production")]).expect("config").app_env, AppEnv::Production);
    assert_eq!(
        load(&[("DJANGO_ENV", "development")]).expect("config").app_env,
        AppEnv::Development
    );
    assert_matches!(
        load(&[("APP_ENV", "staging")]),
        Err(ConfigError::Invalid { var: "APP_ENV", .. })
    );
}

#[test]
fn production_defaults_to_json_logs() {
    let config = load(&[("APP_ENV", "production")]).expect("config");
    assert_eq!(config.log_format, LogFormat::Json);

    let config = load(&[("APP_ENV", "production"), ("LOG_FORMAT", "pretty")]).expect("config");
    assert_eq!(config.log_format, LogFormat::Pretty);
}

#[test]
fn role_is_parsed() {
    assert_eq!(load(&[("BOOT_ROLE", "worker")]).expect("config").role, Role::Worker);
    assert_matches!(load(&[("BOOT_ROLE", "cron")]), Err(ConfigError::Core(_)));
}

#[test]
fn restart_settings_are_parsed() {
    let config = load(&[("RESTART_POLICY", "always"), ("RESTART_MAX", "0")]).expect("config");
    assert_eq!(config.restart.mode, RestartMode::Always);
    assert_eq!(config.restart.max_restarts, None);
}

#[test]
fn exec_server_and_status_addr() {
    let config = load(&[("EXEC_SERVER", "yes"), ("STATUS_ADDR", "127.0.0.1:8081")])
        .expect("config");
    assert!(config.exec_server);
    assert_eq!(
        config.status_addr.map(|a| a.port()),
        Some(8081)
    );

    assert_matches!(
        load(&[("EXEC_SERVER", "maybe")]),
        Err(ConfigError::Invalid { var: "EXEC_SERVER", .. })
    );
    assert_matches!(
        load(&[("STATUS_ADDR", "not-an-addr")]),
        Err(ConfigError::Invalid { var: "STATUS_ADDR", .. })
    );
}

#[test]
fn sequencer_options_mirror_config() {
    let config = load(&[("STEP_TIMEOUT_SECS", "120"), ("STOP_GRACE_SECS", "3")]).expect("config");
    let options = config.sequencer_options();
    assert_eq!(options.step_timeout, Some(Duration::from_secs(120)));
    assert_eq!(options.stop_grace, Duration::from_secs(3));
    assert_eq!(options.wait, config.wait);
}
