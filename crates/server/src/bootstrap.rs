use std::sync::Arc;

use axum::{middleware, Router};
use intake_core::code::RandomCodeAllocator;
use intake_core::config::{AppConfig, ConfigError};
use intake_db::repositories::{SqlCustomerRepository, SqlOrderRepository};
use intake_db::{connect_with_settings, migrations, DbPool};
use intake_sms::{notifier_from_config, GatewayBuildError};
use thiserror::Error;
use tracing::info;

use crate::api;
use crate::health;
use crate::identity::{self, IdentityError, IdentityState};
use crate::intake::{IntakeService, IntakeSettings};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: Arc<IntakeService>,
    pub identity: Option<IdentityState>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("sms gateway setup failed: {0}")]
    Notifier(#[from] GatewayBuildError),
    #[error("identity gate setup failed: {0}")]
    Identity(#[from] IdentityError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let notifier = notifier_from_config(&config.sms)?;
    info!(
        event_name = "system.bootstrap.notifier_ready",
        correlation_id = "bootstrap",
        transport_mode = if notifier.is_noop() { "noop" } else { "sms" },
        "order notifier initialized"
    );

    let identity = if config.identity.enabled {
        Some(IdentityState::from_config(&config.identity, db_pool.clone())?)
    } else {
        None
    };
    info!(
        event_name = "system.bootstrap.identity_ready",
        correlation_id = "bootstrap",
        identity_enabled = identity.is_some(),
        "identity gate initialized"
    );

    let service = Arc::new(IntakeService::new(
        Arc::new(SqlCustomerRepository::new(db_pool.clone())),
        Arc::new(SqlOrderRepository::new(db_pool.clone())),
        Arc::new(RandomCodeAllocator::new(config.intake.code_prefix.clone())),
        notifier,
        IntakeSettings::from(&config.intake),
    ));

    Ok(Application { config, db_pool, service, identity })
}

impl Application {
    /// Full HTTP surface. With the identity gate enabled the customer and order
    /// routes sit behind `require_session`; `/health` and the login routes never do.
    pub fn router(&self) -> Router {
        let mut intake = api::router(self.service.clone());
        let mut app = health::router(self.db_pool.clone(), self.config.sms.enabled);

        if let Some(identity) = &self.identity {
            intake = intake.route_layer(middleware::from_fn_with_state(
                identity.clone(),
                identity::require_session,
            ));
            app = app.merge(identity::router(identity.clone()));
        }

        api::with_error_fallbacks(app.merge(intake))
            .layer(middleware::from_fn(api::correlation))
    }
}
