use crate::commands::{block_on, CommandResult};
use intake_core::config::{AppConfig, LoadOptions};
use intake_db::{connect_with_settings, migrations};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let outcome = block_on("migrate", async {
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
        Ok(Ok(())) => CommandResult::success(
            "migrate",
            format!(
                "applied pending migrations ({} known) to `{}`",
                migrations::MIGRATOR.iter().count(),
                config.database.url
            ),
        ),
        Ok(Err((error_class, message, exit_code))) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
