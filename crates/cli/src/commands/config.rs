use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use stockplan_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// `(key path, environment variable)` for every reported setting, in display order.
const REPORTED_KEYS: &[(&str, &str)] = &[
    ("database.url", "STOCKPLAN_DATABASE_URL"),
    ("database.max_connections", "STOCKPLAN_DATABASE_MAX_CONNECTIONS"),
    ("database.timeout_secs", "STOCKPLAN_DATABASE_TIMEOUT_SECS"),
    ("server.bind_address", "STOCKPLAN_SERVER_BIND_ADDRESS"),
    ("server.port", "STOCKPLAN_SERVER_PORT"),
    ("server.graceful_shutdown_secs", "STOCKPLAN_SERVER_GRACEFUL_SHUTDOWN_SECS"),
    ("engine.upsert_max_attempts", "STOCKPLAN_ENGINE_UPSERT_MAX_ATTEMPTS"),
    ("engine.plan_lock_shards", "STOCKPLAN_ENGINE_PLAN_LOCK_SHARDS"),
    ("logging.level", "STOCKPLAN_LOGGING_LEVEL"),
    ("logging.format", "STOCKPLAN_LOGGING_FORMAT"),
];

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, env_key) in REPORTED_KEYS {
        let source =
            field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key_path, &effective_value(&config, key_path), source));
    }

    lines.join("\n")
}

fn effective_value(config: &AppConfig, key_path: &str) -> String {
    match key_path {
        "database.url" => config.database.url.clone(),
        "database.max_connections" => config.database.max_connections.to_string(),
        "database.timeout_secs" => config.database.timeout_secs.to_string(),
        "server.bind_address" => config.server.bind_address.clone(),
        "server.port" => config.server.port.to_string(),
        "server.graceful_shutdown_secs" => config.server.graceful_shutdown_secs.to_string(),
        "engine.upsert_max_attempts" => config.engine.upsert_max_attempts.to_string(),
        "engine.plan_lock_shards" => config.engine.plan_lock_shards.to_string(),
        "logging.level" => config.logging.level.clone(),
        "logging.format" => format!("{:?}", config.logging.format).to_ascii_lowercase(),
        _ => "<unknown>".to_string(),
    }
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("stockplan.toml"), PathBuf::from("config/stockplan.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
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
