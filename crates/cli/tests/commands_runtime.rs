use std::env;
use std::sync::{Mutex, OnceLock};

use intake_cli::commands::{config, doctor, migrate, start};
use serde_json::Value;

const MEMORY_DB: (&str, &str) = ("INTAKE_DATABASE_URL", "sqlite::memory:");

#[test]
fn start_returns_success_with_valid_env() {
    with_env(&[MEMORY_DB], || {
        let result = start::run();
        assert_eq!(result.exit_code, 0, "expected successful start preflight");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "start");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("notifications disabled"), "unexpected message: {message}");
    });
}

#[test]
fn start_returns_config_failure_when_identity_lacks_credentials() {
    with_env(&[MEMORY_DB, ("INTAKE_IDENTITY_ENABLED", "true")], || {
        let result = start::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "start");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[MEMORY_DB], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_applies_schema_to_a_file_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("intake.db").display());

    with_env(&[("INTAKE_DATABASE_URL", url.as_str())], || {
        let first = migrate::run();
        assert_eq!(first.exit_code, 0, "expected first migrate run to succeed");
        let second = migrate::run();
        assert_eq!(second.exit_code, 0, "expected repeat migrate run to be a no-op");

        let report = doctor::run(true);
        let payload = parse_payload(&report.output);
        let database = find_check(&payload, "database_connectivity");
        assert_eq!(database["status"], "pass");
        assert!(database["details"].as_str().unwrap_or_default().contains("schema present"));
    });
}

#[test]
fn migrate_reports_unreachable_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("missing").join("intake.db").display());

    with_env(&[("INTAKE_DATABASE_URL", url.as_str())], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 4, "expected db connectivity failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "db_connectivity");
    });
}

#[test]
fn doctor_skips_disabled_integrations() {
    with_env(&[MEMORY_DB], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "expected doctor to pass");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        assert_eq!(find_check(&payload, "config_validation")["status"], "pass");
        assert_eq!(find_check(&payload, "sms_gateway_readiness")["status"], "skipped");
        assert_eq!(find_check(&payload, "identity_readiness")["status"], "skipped");
        assert_eq!(find_check(&payload, "database_connectivity")["status"], "pass");
    });
}

#[test]
fn doctor_fails_on_invalid_config() {
    with_env(&[MEMORY_DB, ("INTAKE_SMS_ENABLED", "true")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 1, "expected doctor failure code");
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] config_validation"));
        assert!(result.output.contains("- [skip] database_connectivity"));
    });
}

#[test]
fn config_reports_sources_and_redacts_secrets() {
    with_env(
        &[
            MEMORY_DB,
            ("INTAKE_SMS_ENABLED", "true"),
            ("INTAKE_SMS_USERNAME", "sandbox"),
            ("INTAKE_SMS_API_KEY", "atsk-live-secret"),
        ],
        || {
            let output = config::run();

            assert!(output.contains(
                "- database.url = sqlite::memory: (source: env (INTAKE_DATABASE_URL))"
            ));
            assert!(output.contains("- sms.api_key = <redacted> (source: env (INTAKE_SMS_API_KEY))"));
            assert!(output.contains("- intake.code_prefix = CUST (source: default)"));
            assert!(!output.contains("atsk-live-secret"));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn find_check<'a>(payload: &'a Value, name: &str) -> &'a Value {
    payload["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .unwrap_or_else(|| panic!("doctor report should include `{name}`"))
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "INTAKE_DATABASE_URL",
        "INTAKE_DATABASE_MAX_CONNECTIONS",
        "INTAKE_DATABASE_TIMEOUT_SECS",
        "INTAKE_SERVER_BIND_ADDRESS",
        "INTAKE_SERVER_PORT",
        "INTAKE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "INTAKE_CODE_PREFIX",
        "INTAKE_MAX_CODE_ATTEMPTS",
        "INTAKE_NOTIFICATION_TIMEOUT_SECS",
        "INTAKE_SMS_ENABLED",
        "INTAKE_SMS_USERNAME",
        "INTAKE_SMS_API_KEY",
        "INTAKE_SMS_SENDER_ID",
        "INTAKE_SMS_BASE_URL",
        "INTAKE_SMS_TIMEOUT_SECS",
        "INTAKE_IDENTITY_ENABLED",
        "INTAKE_IDENTITY_ISSUER_URL",
        "INTAKE_IDENTITY_CLIENT_ID",
        "INTAKE_IDENTITY_CLIENT_SECRET",
        "INTAKE_IDENTITY_PUBLIC_BASE_URL",
        "INTAKE_IDENTITY_SCOPE",
        "INTAKE_IDENTITY_SESSION_SECRET",
        "INTAKE_IDENTITY_SESSION_TTL_SECS",
        "INTAKE_SECRET_KEY",
        "INTAKE_LOGGING_LEVEL",
        "INTAKE_LOGGING_FORMAT",
        "INTAKE_LOG_LEVEL",
        "INTAKE_LOG_FORMAT",
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
