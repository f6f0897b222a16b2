use std::env;
use std::fs;
use std::path::Path;

use connecthub_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::CommandResult;

const UNSET: &str = "<unset>";
const REDACTED: &str = "<redacted>";

#[derive(Debug)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

/// One config key with its environment override and printable value.
struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let entries = fields(&config)
        .into_iter()
        .map(|field| ConfigEntry {
            key: field.key,
            source: field_source(
                field.key,
                field.env_keys,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
            value: field.value,
        })
        .collect::<Vec<_>>();

    CommandResult { exit_code: 0, output: render(&entries) }
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let gateway_secret = config
        .auth
        .gateway_secret
        .as_ref()
        .map(|secret| redact_secret(secret.expose_secret()))
        .unwrap_or_else(|| UNSET.to_string());

    vec![
        Field {
            key: "database.url",
            env_keys: &["CONNECTHUB_DATABASE_URL"],
            value: config.database.url.clone(),
        },
        Field {
            key: "database.max_connections",
            env_keys: &["CONNECTHUB_DATABASE_MAX_CONNECTIONS"],
            value: config.database.max_connections.to_string(),
        },
        Field {
            key: "database.timeout_secs",
            env_keys: &["CONNECTHUB_DATABASE_TIMEOUT_SECS"],
            value: config.database.timeout_secs.to_string(),
        },
        Field {
            key: "server.bind_address",
            env_keys: &["CONNECTHUB_SERVER_BIND_ADDRESS"],
            value: config.server.bind_address.clone(),
        },
        Field {
            key: "server.port",
            env_keys: &["CONNECTHUB_SERVER_PORT"],
            value: config.server.port.to_string(),
        },
        Field {
            key: "server.health_check_port",
            env_keys: &["CONNECTHUB_SERVER_HEALTH_CHECK_PORT"],
            value: config.server.health_check_port.to_string(),
        },
        Field {
            key: "server.graceful_shutdown_secs",
            env_keys: &["CONNECTHUB_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            value: config.server.graceful_shutdown_secs.to_string(),
        },
        Field {
            key: "auth.gateway_secret",
            env_keys: &["CONNECTHUB_AUTH_GATEWAY_SECRET"],
            value: gateway_secret,
        },
        Field {
            key: "notifications.enabled",
            env_keys: &["CONNECTHUB_NOTIFICATIONS_ENABLED"],
            value: config.notifications.enabled.to_string(),
        },
        Field {
            key: "notifications.sender_name",
            env_keys: &["CONNECTHUB_NOTIFICATIONS_SENDER_NAME"],
            value: config.notifications.sender_name.clone(),
        },
        Field {
            key: "logging.level",
            env_keys: &["CONNECTHUB_LOGGING_LEVEL", "CONNECTHUB_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Field {
            key: "logging.format",
            env_keys: &["CONNECTHUB_LOGGING_FORMAT", "CONNECTHUB_LOG_FORMAT"],
            value: format!("{:?}", config.logging.format).to_lowercase(),
        },
    ]
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
    if let Some(env_key) = env_keys.iter().copied().find(|key| env::var_os(key).is_some()) {
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

fn render(entries: &[ConfigEntry]) -> String {
    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(entries.iter().map(|entry| {
        format!("- {} = {} (source: {})", entry.key, entry.value, entry.source)
    }));
    lines.join("\n")
}

fn redact_secret(secret: &str) -> String {
    if secret.trim().is_empty() {
        "<empty>".to_string()
    } else {
        REDACTED.to_string()
    }
}
