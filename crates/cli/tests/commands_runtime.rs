use std::env;
use std::sync::{Mutex, OnceLock};

use connecthub_cli::commands::{config, doctor, migrate, seed, smoke};
use serde_json::Value;

const IN_MEMORY: (&str, &str) = ("CONNECTHUB_DATABASE_URL", "sqlite::memory:");
const WEAK_SECRET: (&str, &str) = ("CONNECTHUB_AUTH_GATEWAY_SECRET", "short");

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[IN_MEMORY], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_weak_gateway_secret() {
    with_env(&[IN_MEMORY, WEAK_SECRET], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_reports_every_demo_table() {
    with_env(&[IN_MEMORY], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected deterministic seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("owner `owner-demo-001`"));
        assert!(message.contains("  - businesses: 4"));
        assert!(message.contains("  - quote_requests: 2"));
        assert!(message.contains("  - messages: 3"));
    });
}

#[test]
fn seed_is_idempotent_against_a_file_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("connecthub.db").display());

    with_env(&[("CONNECTHUB_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");

        assert_eq!(parse_payload(&first.output)["message"], parse_payload(&second.output)["message"]);
    });
}

#[test]
fn doctor_passes_once_the_schema_is_migrated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("connecthub.db").display());

    with_env(&[("CONNECTHUB_DATABASE_URL", url.as_str())], || {
        let before = parse_payload(&doctor::run(true).output);
        assert_eq!(before["overall_status"], "fail");
        assert_eq!(check_status(&before, "schema_migrations"), "fail");

        assert_eq!(migrate::run().exit_code, 0);

        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0);
        let after = parse_payload(&result.output);
        assert_eq!(after["overall_status"], "warn");
        assert_eq!(check_status(&after, "database_connectivity"), "pass");
        assert_eq!(check_status(&after, "schema_migrations"), "pass");
        assert_eq!(check_status(&after, "gateway_secret"), "warn");
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[WEAK_SECRET], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(check_status(&payload, "config_validation"), "fail");
        assert_eq!(check_status(&payload, "database_connectivity"), "skipped");
    });
}

#[test]
fn config_attributes_sources_and_redacts_the_gateway_secret() {
    with_env(
        &[
            ("CONNECTHUB_AUTH_GATEWAY_SECRET", "gateway-secret-that-is-long-enough"),
            ("CONNECTHUB_LOG_LEVEL", "debug"),
        ],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);

            let output = result.output;
            assert!(!output.contains("gateway-secret-that-is-long-enough"));
            assert!(output.contains(
                "- auth.gateway_secret = <redacted> (source: env (CONNECTHUB_AUTH_GATEWAY_SECRET))"
            ));
            assert!(output.contains("- logging.level = debug (source: env (CONNECTHUB_LOG_LEVEL))"));
            assert!(output.contains("- server.port = 3000 (source: default)"));
        },
    );
}

#[test]
fn smoke_returns_success_report_with_valid_env() {
    with_env(&[], || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 0, "expected successful smoke report: {}", result.output);

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "pass");

        let checks = payload["checks"].as_array().expect("checks");
        assert_eq!(checks.len(), 6);
        assert_eq!(check_status(&payload, "quote_to_order"), "pass");
        assert_eq!(check_status(&payload, "marketplace_search"), "pass");
    });
}

#[test]
fn smoke_returns_failure_when_config_invalid() {
    with_env(&[WEAK_SECRET], || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 6, "expected smoke failure code");

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "fail");
        assert_eq!(check_status(&payload, "quote_to_order"), "skipped");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn check_status(payload: &Value, name: &str) -> String {
    payload["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .and_then(|check| check["status"].as_str())
        .unwrap_or("missing")
        .to_string()
}

fn last_line(output: &str) -> &str {
    output.lines().last().unwrap_or_default()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CONNECTHUB_DATABASE_URL",
        "CONNECTHUB_DATABASE_MAX_CONNECTIONS",
        "CONNECTHUB_DATABASE_TIMEOUT_SECS",
        "CONNECTHUB_SERVER_BIND_ADDRESS",
        "CONNECTHUB_SERVER_PORT",
        "CONNECTHUB_SERVER_HEALTH_CHECK_PORT",
        "CONNECTHUB_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "CONNECTHUB_AUTH_GATEWAY_SECRET",
        "CONNECTHUB_NOTIFICATIONS_ENABLED",
        "CONNECTHUB_NOTIFICATIONS_SENDER_NAME",
        "CONNECTHUB_LOGGING_LEVEL",
        "CONNECTHUB_LOGGING_FORMAT",
        "CONNECTHUB_LOG_LEVEL",
        "CONNECTHUB_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
