//! SMS delivery for order notifications.
//!
//! - **Gateway** (`gateway`) - HTTP client for an Africa's Talking style
//!   messaging endpoint (form POST, `apiKey` header, JSON recipient report)
//!
//! `notifier_from_config` picks the gateway when `sms.enabled` is set and
//! falls back to `NoopNotifier` otherwise.

use std::sync::Arc;

use intake_core::config::SmsConfig;
use intake_core::notify::{NoopNotifier, Notifier};

pub mod gateway;

pub use gateway::{GatewayBuildError, SmsGateway};

pub fn notifier_from_config(config: &SmsConfig) -> Result<Arc<dyn Notifier>, GatewayBuildError> {
    if !config.enabled {
        return Ok(Arc::new(NoopNotifier));
    }
    Ok(Arc::new(SmsGateway::from_config(config)?))
}
