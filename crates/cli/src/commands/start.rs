use crate::commands::{block_on, CommandResult};
use intake_core::config::{AppConfig, LoadOptions};
use intake_db::{connect_with_settings, migrations};
use intake_sms::notifier_from_config;

/// Startup preflight: everything `intake-server` needs before it binds, without
/// binding. Exit codes: 2 config, 3 runtime, 4 database, 5 migration, 6 notifier.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "start",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let notifier = match notifier_from_config(&config.sms) {
        Ok(notifier) => notifier,
        Err(error) => {
            return CommandResult::failure("start", "notifier", error.to_string(), 6);
        }
    };

    let outcome = block_on("start", async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<(), (&'static str, String, u8)>(())
    });

    match outcome {
        Err(runtime_failure) => runtime_failure,
        Ok(Err((error_class, message, exit_code))) => {
            CommandResult::failure("start", error_class, message, exit_code)
        }
        Ok(Ok(())) => CommandResult::success(
            "start",
            format!(
                "preflight passed: listen {}:{}, notifications {}, identity gate {}",
                config.server.bind_address,
                config.server.port,
                if notifier.is_noop() { "disabled" } else { "sms" },
                if config.identity.enabled { "enabled" } else { "disabled" },
            ),
        ),
    }
}
