use intake_core::config::{AppConfig, LoadOptions};
use intake_db::{connect_with_settings, migrations};
use intake_sms::SmsGateway;
use serde::Serialize;
use url::Url;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// Exit code 0 when no check failed, 1 otherwise. Disabled integrations are
/// reported as skipped and do not fail the run.
pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_sms_gateway(&config));
            checks.push(check_identity(&config));
            checks.push(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()));
            for name in ["sms_gateway_readiness", "identity_readiness", "database_connectivity"] {
                checks.push(DoctorCheck::new(
                    name,
                    CheckStatus::Skipped,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let (overall_status, summary) = if any_failed {
        (CheckStatus::Fail, "doctor: one or more readiness checks failed")
    } else {
        (CheckStatus::Pass, "doctor: all readiness checks passed")
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_sms_gateway(config: &AppConfig) -> DoctorCheck {
    const NAME: &str = "sms_gateway_readiness";
    if !config.sms.enabled {
        return DoctorCheck::new(NAME, CheckStatus::Skipped, "sms disabled; notifications are skipped");
    }

    match SmsGateway::from_config(&config.sms) {
        Ok(_) => DoctorCheck::new(
            NAME,
            CheckStatus::Pass,
            format!("gateway client ready for `{}`", config.sms.base_url),
        ),
        Err(error) => DoctorCheck::new(NAME, CheckStatus::Fail, error.to_string()),
    }
}

fn check_identity(config: &AppConfig) -> DoctorCheck {
    const NAME: &str = "identity_readiness";
    if !config.identity.enabled {
        return DoctorCheck::new(NAME, CheckStatus::Skipped, "identity gate disabled; API is open");
    }

    let issuer = config.identity.issuer_url.as_deref().unwrap_or_default();
    match Url::parse(&format!("{}/authorize", issuer.trim_end_matches('/'))) {
        Ok(authorize) => DoctorCheck::new(
            NAME,
            CheckStatus::Pass,
            format!("logins redirect to `{authorize}`"),
        ),
        Err(error) => {
            DoctorCheck::new(NAME, CheckStatus::Fail, format!("issuer url `{issuer}` is invalid: {error}"))
        }
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    const NAME: &str = "database_connectivity";
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::new(
                NAME,
                CheckStatus::Fail,
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        let schema_tables = migrations::managed_table_count(&pool)
            .await
            .map_err(|error| format!("failed to inspect schema: {error}"))?;
        pool.close().await;
        Ok::<i64, String>(schema_tables)
    });

    match result {
        Ok(count) if count == migrations::MANAGED_TABLES.len() as i64 => DoctorCheck::new(
            NAME,
            CheckStatus::Pass,
            format!("connected using `{}`; schema present", config.database.url),
        ),
        Ok(_) => DoctorCheck::new(
            NAME,
            CheckStatus::Pass,
            format!("connected using `{}`; run `intake migrate` to create the schema", config.database.url),
        ),
        Err(error) => DoctorCheck::new(NAME, CheckStatus::Fail, error),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
