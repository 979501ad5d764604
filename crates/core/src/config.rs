use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::code::DEFAULT_CODE_PREFIX;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub intake: IntakeConfig,
    pub sms: SmsConfig,
    pub identity: IdentityConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct IntakeConfig {
    pub code_prefix: String,
    pub max_code_attempts: u32,
    pub notification_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SmsConfig {
    pub enabled: bool,
    pub username: Option<String>,
    pub api_key: Option<SecretString>,
    pub sender_id: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct IdentityConfig {
    pub enabled: bool,
    pub issuer_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    pub public_base_url: String,
    pub scope: String,
    pub session_secret: SecretString,
    pub session_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub sms_enabled: Option<bool>,
    pub identity_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://intake.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            intake: IntakeConfig {
                code_prefix: DEFAULT_CODE_PREFIX.to_string(),
                max_code_attempts: 5,
                notification_timeout_secs: 5,
            },
            sms: SmsConfig {
                enabled: false,
                username: None,
                api_key: None,
                sender_id: None,
                base_url: "https://api.africastalking.com/version1/messaging".to_string(),
                timeout_secs: 10,
            },
            identity: IdentityConfig {
                enabled: false,
                issuer_url: None,
                client_id: None,
                client_secret: None,
                public_base_url: "http://127.0.0.1:8080".to_string(),
                scope: "openid profile email".to_string(),
                session_secret: String::new().into(),
                session_ttl_secs: 86_400,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("intake.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.intake.code_prefix = config.intake.code_prefix.trim().to_string();
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(intake) = patch.intake {
            if let Some(code_prefix) = intake.code_prefix {
                self.intake.code_prefix = code_prefix;
            }
            if let Some(max_code_attempts) = intake.max_code_attempts {
                self.intake.max_code_attempts = max_code_attempts;
            }
            if let Some(notification_timeout_secs) = intake.notification_timeout_secs {
                self.intake.notification_timeout_secs = notification_timeout_secs;
            }
        }

        if let Some(sms) = patch.sms {
            if let Some(enabled) = sms.enabled {
                self.sms.enabled = enabled;
            }
            if let Some(username) = sms.username {
                self.sms.username = Some(username);
            }
            if let Some(sms_api_key_value) = sms.api_key {
                self.sms.api_key = Some(secret_value(sms_api_key_value));
            }
            if let Some(sender_id) = sms.sender_id {
                self.sms.sender_id = Some(sender_id);
            }
            if let Some(base_url) = sms.base_url {
                self.sms.base_url = base_url;
            }
            if let Some(timeout_secs) = sms.timeout_secs {
                self.sms.timeout_secs = timeout_secs;
            }
        }

        if let Some(identity) = patch.identity {
            if let Some(enabled) = identity.enabled {
                self.identity.enabled = enabled;
            }
            if let Some(issuer_url) = identity.issuer_url {
                self.identity.issuer_url = Some(issuer_url);
            }
            if let Some(client_id) = identity.client_id {
                self.identity.client_id = Some(client_id);
            }
            if let Some(client_secret_value) = identity.client_secret {
                self.identity.client_secret = Some(secret_value(client_secret_value));
            }
            if let Some(public_base_url) = identity.public_base_url {
                self.identity.public_base_url = public_base_url;
            }
            if let Some(scope) = identity.scope {
                self.identity.scope = scope;
            }
            if let Some(session_secret_value) = identity.session_secret {
                self.identity.session_secret = secret_value(session_secret_value);
            }
            if let Some(session_ttl_secs) = identity.session_ttl_secs {
                self.identity.session_ttl_secs = session_ttl_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("INTAKE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("INTAKE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("INTAKE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("INTAKE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("INTAKE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("INTAKE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("INTAKE_SERVER_PORT") {
            self.server.port = parse_u16("INTAKE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("INTAKE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("INTAKE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("INTAKE_CODE_PREFIX") {
            self.intake.code_prefix = value;
        }
        if let Some(value) = read_env("INTAKE_MAX_CODE_ATTEMPTS") {
            self.intake.max_code_attempts = parse_u32("INTAKE_MAX_CODE_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("INTAKE_NOTIFICATION_TIMEOUT_SECS") {
            self.intake.notification_timeout_secs =
                parse_u64("INTAKE_NOTIFICATION_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("INTAKE_SMS_ENABLED") {
            self.sms.enabled = parse_bool("INTAKE_SMS_ENABLED", &value)?;
        }
        if let Some(value) = read_env("INTAKE_SMS_USERNAME") {
            self.sms.username = Some(value);
        }
        if let Some(value) = read_env("INTAKE_SMS_API_KEY") {
            self.sms.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("INTAKE_SMS_SENDER_ID") {
            self.sms.sender_id = Some(value);
        }
        if let Some(value) = read_env("INTAKE_SMS_BASE_URL") {
            self.sms.base_url = value;
        }
        if let Some(value) = read_env("INTAKE_SMS_TIMEOUT_SECS") {
            self.sms.timeout_secs = parse_u64("INTAKE_SMS_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("INTAKE_IDENTITY_ENABLED") {
            self.identity.enabled = parse_bool("INTAKE_IDENTITY_ENABLED", &value)?;
        }
        if let Some(value) = read_env("INTAKE_IDENTITY_ISSUER_URL") {
            self.identity.issuer_url = Some(value);
        }
        if let Some(value) = read_env("INTAKE_IDENTITY_CLIENT_ID") {
            self.identity.client_id = Some(value);
        }
        if let Some(value) = read_env("INTAKE_IDENTITY_CLIENT_SECRET") {
            self.identity.client_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("INTAKE_IDENTITY_PUBLIC_BASE_URL") {
            self.identity.public_base_url = value;
        }
        if let Some(value) = read_env("INTAKE_IDENTITY_SCOPE") {
            self.identity.scope = value;
        }
        let session_secret =
            read_env("INTAKE_IDENTITY_SESSION_SECRET").or_else(|| read_env("INTAKE_SECRET_KEY"));
        if let Some(value) = session_secret {
            self.identity.session_secret = secret_value(value);
        }
        if let Some(value) = read_env("INTAKE_IDENTITY_SESSION_TTL_SECS") {
            self.identity.session_ttl_secs =
                parse_u64("INTAKE_IDENTITY_SESSION_TTL_SECS", &value)?;
        }

        let log_level = read_env("INTAKE_LOGGING_LEVEL").or_else(|| read_env("INTAKE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("INTAKE_LOGGING_FORMAT").or_else(|| read_env("INTAKE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(enabled) = overrides.sms_enabled {
            self.sms.enabled = enabled;
        }
        if let Some(enabled) = overrides.identity_enabled {
            self.identity.enabled = enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_intake(&self.intake)?;
        validate_sms(&self.sms)?;
        validate_identity(&self.identity)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("intake.toml"), PathBuf::from("config/intake.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|value| value.trim().is_empty()).unwrap_or(true)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_intake(intake: &IntakeConfig) -> Result<(), ConfigError> {
    let prefix = intake.code_prefix.as_str();
    if prefix.is_empty() || !prefix.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Err(ConfigError::Validation(
            "intake.code_prefix must be a non-empty alphabetic string".to_string(),
        ));
    }

    if intake.max_code_attempts == 0 || intake.max_code_attempts > 100 {
        return Err(ConfigError::Validation(
            "intake.max_code_attempts must be in range 1..=100".to_string(),
        ));
    }

    if intake.notification_timeout_secs == 0 || intake.notification_timeout_secs > 60 {
        return Err(ConfigError::Validation(
            "intake.notification_timeout_secs must be in range 1..=60".to_string(),
        ));
    }

    Ok(())
}

fn validate_sms(sms: &SmsConfig) -> Result<(), ConfigError> {
    if !sms.enabled {
        return Ok(());
    }

    if is_blank(sms.username.as_deref()) {
        return Err(ConfigError::Validation(
            "sms.username is required when sms.enabled is true (use `sandbox` for the sandbox environment)"
                .to_string(),
        ));
    }

    let missing_key = sms.api_key.as_ref().map(|key| key.expose_secret().trim().is_empty());
    if missing_key.unwrap_or(true) {
        return Err(ConfigError::Validation(
            "sms.api_key is required when sms.enabled is true".to_string(),
        ));
    }

    if !is_http_url(&sms.base_url) {
        return Err(ConfigError::Validation(
            "sms.base_url must start with http:// or https://".to_string(),
        ));
    }

    if sms.timeout_secs == 0 || sms.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "sms.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_identity(identity: &IdentityConfig) -> Result<(), ConfigError> {
    if !identity.enabled {
        return Ok(());
    }

    match identity.issuer_url.as_deref() {
        Some(url) if is_http_url(url) => {}
        Some(_) => {
            return Err(ConfigError::Validation(
                "identity.issuer_url must start with http:// or https://".to_string(),
            ))
        }
        None => {
            return Err(ConfigError::Validation(
                "identity.issuer_url is required when identity.enabled is true".to_string(),
            ))
        }
    }

    if is_blank(identity.client_id.as_deref()) {
        return Err(ConfigError::Validation(
            "identity.client_id is required when identity.enabled is true".to_string(),
        ));
    }

    let missing_secret =
        identity.client_secret.as_ref().map(|secret| secret.expose_secret().trim().is_empty());
    if missing_secret.unwrap_or(true) {
        return Err(ConfigError::Validation(
            "identity.client_secret is required when identity.enabled is true".to_string(),
        ));
    }

    if !is_http_url(&identity.public_base_url) {
        return Err(ConfigError::Validation(
            "identity.public_base_url must start with http:// or https://".to_string(),
        ));
    }

    if identity.session_secret.expose_secret().len() < 32 {
        return Err(ConfigError::Validation(
            "identity.session_secret must be at least 32 characters when identity.enabled is true"
                .to_string(),
        ));
    }

    if identity.session_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "identity.session_ttl_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    intake: Option<IntakePatch>,
    sms: Option<SmsPatch>,
    identity: Option<IdentityPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct IntakePatch {
    code_prefix: Option<String>,
    max_code_attempts: Option<u32>,
    notification_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SmsPatch {
    enabled: Option<bool>,
    username: Option<String>,
    api_key: Option<String>,
    sender_id: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct IdentityPatch {
    enabled: Option<bool>,
    issuer_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    public_base_url: Option<String>,
    scope: Option<String>,
    session_secret: Option<String>,
    session_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const SESSION_SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_without_any_input() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(!config.sms.enabled, "sms should be disabled by default")?;
        ensure(!config.identity.enabled, "identity gate should be disabled by default")?;
        ensure(config.intake.code_prefix == "CUST", "default code prefix should be CUST")?;
        ensure(config.intake.max_code_attempts == 5, "default code attempts should be 5")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SMS_API_KEY", "atsk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("intake.toml");
            fs::write(
                &path,
                r#"
[sms]
enabled = true
username = "sandbox"
api_key = "${TEST_SMS_API_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let api_key = config.sms.api_key.as_ref().map(|key| key.expose_secret().to_string());
            ensure(
                api_key.as_deref() == Some("atsk-from-env"),
                "sms api key should be loaded from environment",
            )?;
            ensure(config.sms.username.as_deref() == Some("sandbox"), "username from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_SMS_API_KEY"]);
        result
    }

    #[test]
    fn code_prefix_is_trimmed_before_use() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("INTAKE_CODE_PREFIX", " KE ");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.intake.code_prefix == "KE", "code prefix should be stored trimmed")
        })();

        clear_vars(&["INTAKE_CODE_PREFIX"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("INTAKE_LOG_LEVEL", "warn");
        env::set_var("INTAKE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["INTAKE_LOG_LEVEL", "INTAKE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("INTAKE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("INTAKE_SERVER_PORT", "9090");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("intake.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[server]
port = 7070
bind_address = "0.0.0.0"

[intake]
code_prefix = "KE"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.server.port == 9090, "env port should win over file")?;
            ensure(config.server.bind_address == "0.0.0.0", "file bind address should apply")?;
            ensure(config.intake.code_prefix == "KE", "file code prefix should apply")?;
            Ok(())
        })();

        clear_vars(&["INTAKE_DATABASE_URL", "INTAKE_SERVER_PORT"]);
        result
    }

    #[test]
    fn identity_validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("INTAKE_IDENTITY_ENABLED", "true");
        env::set_var("INTAKE_IDENTITY_ISSUER_URL", "https://tenant.example.auth0.com");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("identity.client_id")
            );
            ensure(has_message, "validation failure should mention identity.client_id")
        })();

        clear_vars(&["INTAKE_IDENTITY_ENABLED", "INTAKE_IDENTITY_ISSUER_URL"]);
        result
    }

    #[test]
    fn sms_requires_credentials_when_enabled() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("INTAKE_SMS_ENABLED", "true");
        env::set_var("INTAKE_SMS_USERNAME", "sandbox");

        let result = (|| -> Result<(), String> {
            let has_message = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::Validation(ref message)) if message.contains("sms.api_key")
            );
            ensure(has_message, "validation failure should mention sms.api_key")
        })();

        clear_vars(&["INTAKE_SMS_ENABLED", "INTAKE_SMS_USERNAME"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("INTAKE_MAX_CODE_ATTEMPTS", "many");

        let result = (|| -> Result<(), String> {
            let has_error = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::InvalidEnvOverride { ref key, .. }) if key == "INTAKE_MAX_CODE_ATTEMPTS"
            );
            ensure(has_error, "non-numeric attempts should be rejected")
        })();

        clear_vars(&["INTAKE_MAX_CODE_ATTEMPTS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("INTAKE_IDENTITY_ENABLED", "true");
        env::set_var("INTAKE_IDENTITY_ISSUER_URL", "https://tenant.example.auth0.com");
        env::set_var("INTAKE_IDENTITY_CLIENT_ID", "client-123");
        env::set_var("INTAKE_IDENTITY_CLIENT_SECRET", "client-secret-value");
        env::set_var("INTAKE_SECRET_KEY", SESSION_SECRET);

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("client-secret-value"),
                "debug output should not contain client secret",
            )?;
            ensure(!debug.contains(SESSION_SECRET), "debug output should not contain session key")?;
            ensure(
                config.identity.session_secret.expose_secret() == SESSION_SECRET,
                "legacy secret key alias should populate the session secret",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "INTAKE_IDENTITY_ENABLED",
            "INTAKE_IDENTITY_ISSUER_URL",
            "INTAKE_IDENTITY_CLIENT_ID",
            "INTAKE_IDENTITY_CLIENT_SECRET",
            "INTAKE_SECRET_KEY",
        ]);
        result
    }
}
