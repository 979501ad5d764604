use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use intake_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

/// One reported setting: dotted key, rendered value, and the env variables
/// that can set it (first match wins).
struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn field(key: &'static str, value: impl ToString, env_keys: &'static [&'static str]) -> Field {
    Field { key, value: value.to_string(), env_keys }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in fields(&config) {
        let source = field_source(
            entry.key,
            entry.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(entry.key, &entry.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        field("database.url", &config.database.url, &["INTAKE_DATABASE_URL"]),
        field(
            "database.max_connections",
            config.database.max_connections,
            &["INTAKE_DATABASE_MAX_CONNECTIONS"],
        ),
        field("database.timeout_secs", config.database.timeout_secs, &["INTAKE_DATABASE_TIMEOUT_SECS"]),
        field("server.bind_address", &config.server.bind_address, &["INTAKE_SERVER_BIND_ADDRESS"]),
        field("server.port", config.server.port, &["INTAKE_SERVER_PORT"]),
        field(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs,
            &["INTAKE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        field("intake.code_prefix", &config.intake.code_prefix, &["INTAKE_CODE_PREFIX"]),
        field("intake.max_code_attempts", config.intake.max_code_attempts, &["INTAKE_MAX_CODE_ATTEMPTS"]),
        field(
            "intake.notification_timeout_secs",
            config.intake.notification_timeout_secs,
            &["INTAKE_NOTIFICATION_TIMEOUT_SECS"],
        ),
        field("sms.enabled", config.sms.enabled, &["INTAKE_SMS_ENABLED"]),
        field("sms.username", unset_or(config.sms.username.as_deref()), &["INTAKE_SMS_USERNAME"]),
        field("sms.api_key", redact_optional(config.sms.api_key.as_ref()), &["INTAKE_SMS_API_KEY"]),
        field("sms.sender_id", unset_or(config.sms.sender_id.as_deref()), &["INTAKE_SMS_SENDER_ID"]),
        field("sms.base_url", &config.sms.base_url, &["INTAKE_SMS_BASE_URL"]),
        field("sms.timeout_secs", config.sms.timeout_secs, &["INTAKE_SMS_TIMEOUT_SECS"]),
        field("identity.enabled", config.identity.enabled, &["INTAKE_IDENTITY_ENABLED"]),
        field(
            "identity.issuer_url",
            unset_or(config.identity.issuer_url.as_deref()),
            &["INTAKE_IDENTITY_ISSUER_URL"],
        ),
        field(
            "identity.client_id",
            unset_or(config.identity.client_id.as_deref()),
            &["INTAKE_IDENTITY_CLIENT_ID"],
        ),
        field(
            "identity.client_secret",
            redact_optional(config.identity.client_secret.as_ref()),
            &["INTAKE_IDENTITY_CLIENT_SECRET"],
        ),
        field(
            "identity.public_base_url",
            &config.identity.public_base_url,
            &["INTAKE_IDENTITY_PUBLIC_BASE_URL"],
        ),
        field("identity.scope", &config.identity.scope, &["INTAKE_IDENTITY_SCOPE"]),
        field(
            "identity.session_secret",
            redact_optional(Some(&config.identity.session_secret)),
            &["INTAKE_IDENTITY_SESSION_SECRET", "INTAKE_SECRET_KEY"],
        ),
        field(
            "identity.session_ttl_secs",
            config.identity.session_ttl_secs,
            &["INTAKE_IDENTITY_SESSION_TTL_SECS"],
        ),
        field("logging.level", &config.logging.level, &["INTAKE_LOGGING_LEVEL", "INTAKE_LOG_LEVEL"]),
        field(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["INTAKE_LOGGING_FORMAT", "INTAKE_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["intake.toml", "config/intake.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn unset_or(value: Option<&str>) -> &str {
    value.filter(|value| !value.trim().is_empty()).unwrap_or("<unset>")
}

fn redact_optional(secret: Option<&SecretString>) -> &'static str {
    match secret {
        Some(secret) if !secret.expose_secret().trim().is_empty() => "<redacted>",
        _ => "<unset>",
    }
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_optional, unset_or};

    #[test]
    fn nested_keys_are_found_in_config_documents() {
        let doc: Value = "[sms]\nenabled = true\n".parse().expect("toml parses");

        assert!(contains_path(&doc, "sms.enabled"));
        assert!(!contains_path(&doc, "sms.username"));
        assert!(!contains_path(&doc, "identity.enabled"));
    }

    #[test]
    fn secrets_never_render_their_value() {
        let secret = "atsk-live-123".to_string().into();

        assert_eq!(redact_optional(Some(&secret)), "<redacted>");
        assert_eq!(redact_optional(None), "<unset>");
        assert_eq!(unset_or(Some("  ")), "<unset>");
        assert_eq!(unset_or(Some("sandbox")), "sandbox");
    }
}
