use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

const APP_JSON: &str = "app.json";
const BACKEND_JSON: &str = "backend.json";
const SESSION_JSON: &str = "session.json";
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/";
const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_LOG_LEVEL: &str = "info";

pub const BASE_URL_KEYS: &[&str] = &["STUDYAID_API_BASE_URL"];
pub const USER_ID_KEYS: &[&str] = &["STUDYAID_USER_ID"];
pub const TIMEZONE_KEYS: &[&str] = &["STUDYAID_TIMEZONE"];

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub app: serde_json::Value,
    pub backend: serde_json::Value,
    pub session: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub base_url: Url,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "StudyAid",
                "timezone": null,
                "logLevel": DEFAULT_LOG_LEVEL
            }),
        ),
        (
            BACKEND_JSON,
            serde_json::json!({
                "schema": 1,
                "baseUrl": DEFAULT_BASE_URL,
                "connectTimeoutSeconds": DEFAULT_TIMEOUT_SECONDS,
                "requestTimeoutSeconds": DEFAULT_TIMEOUT_SECONDS
            }),
        ),
        (
            SESSION_JSON,
            serde_json::json!({
                "schema": 1,
                "userId": null
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            write_config(&path, &value)?;
        }
    }
    Ok(())
}

fn write_config(path: &Path, value: &serde_json::Value) -> Result<(), InfraError> {
    let formatted = serde_json::to_string_pretty(value)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    Ok(ConfigBundle {
        app: read_config(&config_dir.join(APP_JSON))?,
        backend: read_config(&config_dir.join(BACKEND_JSON))?,
        session: read_config(&config_dir.join(SESSION_JSON))?,
    })
}

fn string_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

pub fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    None
}

pub fn read_timezone<F>(config_dir: &Path, lookup: &F) -> Result<Option<String>, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(zone) = optional_lookup_value(lookup, TIMEZONE_KEYS) {
        return Ok(Some(zone));
    }
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(string_field(&app, "timezone"))
}

pub fn read_log_level(config_dir: &Path) -> Result<String, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(string_field(&app, "logLevel").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()))
}

pub fn read_backend_config<F>(config_dir: &Path, lookup: &F) -> Result<BackendConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let backend = read_config(&config_dir.join(BACKEND_JSON))?;
    let raw_url = optional_lookup_value(lookup, BASE_URL_KEYS)
        .or_else(|| string_field(&backend, "baseUrl"))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let base_url = parse_base_url(&raw_url)?;

    let seconds = |key: &str| {
        backend
            .get(key)
            .and_then(serde_json::Value::as_u64)
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS)
    };

    Ok(BackendConfig {
        base_url,
        connect_timeout: Duration::from_secs(seconds("connectTimeoutSeconds")),
        request_timeout: Duration::from_secs(seconds("requestTimeoutSeconds")),
    })
}

fn parse_base_url(raw: &str) -> Result<Url, InfraError> {
    // Url::join drops the last path segment unless the base ends with '/'.
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    let url = Url::parse(&normalized)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid baseUrl '{raw}': {error}")))?;
    if url.cannot_be_a_base() {
        return Err(InfraError::InvalidConfig(format!(
            "baseUrl '{raw}' cannot be a base"
        )));
    }
    Ok(url)
}

pub fn read_user_id<F>(config_dir: &Path, lookup: &F) -> Result<Option<String>, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(user_id) = optional_lookup_value(lookup, USER_ID_KEYS) {
        return Ok(Some(user_id));
    }
    let session = read_config(&config_dir.join(SESSION_JSON))?;
    Ok(string_field(&session, "userId"))
}

pub fn save_user_id(config_dir: &Path, user_id: Option<&str>) -> Result<(), InfraError> {
    let path = config_dir.join(SESSION_JSON);
    let mut session = read_config(&path)?;
    let object = session.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig(format!("invalid object structure in {}", path.display()))
    })?;

    let value = match user_id.map(str::trim) {
        Some("") => {
            return Err(InfraError::InvalidConfig(
                "userId must not be empty".to_string(),
            ));
        }
        Some(user_id) => serde_json::Value::String(user_id.to_string()),
        None => serde_json::Value::Null,
    };
    object.insert("userId".to_string(), value);
    write_config(&path, &session)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_key: &str) -> Option<String> {
        None
    }

    #[test]
    fn ensure_default_configs_writes_loadable_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        ensure_default_configs(dir.path()).expect("write defaults");

        let bundle = load_configs(dir.path()).expect("load configs");
        assert_eq!(bundle.app["appName"], "StudyAid");
        assert!(bundle.session["userId"].is_null());
        assert_eq!(read_log_level(dir.path()).expect("log level"), "info");
        assert_eq!(read_timezone(dir.path(), &no_env).expect("timezone"), None);
    }

    #[test]
    fn read_config_rejects_unknown_schema() {
        let dir = tempfile::tempdir().expect("temp dir");
        ensure_default_configs(dir.path()).expect("write defaults");
        fs::write(dir.path().join(APP_JSON), r#"{"schema": 2}"#).expect("overwrite app.json");

        match load_configs(dir.path()) {
            Err(InfraError::InvalidConfig(message)) => assert!(message.contains("unsupported schema 2")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn backend_config_prefers_environment_override() {
        let dir = tempfile::tempdir().expect("temp dir");
        ensure_default_configs(dir.path()).expect("write defaults");

        let config = read_backend_config(dir.path(), &|key: &str| match key {
            "STUDYAID_API_BASE_URL" => Some("https://api.example.test/v1".to_string()),
            _ => None,
        })
        .expect("backend config");

        assert_eq!(config.base_url.as_str(), "https://api.example.test/v1/");
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(
            config.base_url.join("chat").expect("join").as_str(),
            "https://api.example.test/v1/chat"
        );
    }

    #[test]
    fn save_user_id_roundtrip_and_clear() {
        let dir = tempfile::tempdir().expect("temp dir");
        ensure_default_configs(dir.path()).expect("write defaults");

        save_user_id(dir.path(), Some(" student-1 ")).expect("save user");
        assert_eq!(
            read_user_id(dir.path(), &no_env).expect("read user"),
            Some("student-1".to_string())
        );

        save_user_id(dir.path(), None).expect("clear user");
        assert_eq!(read_user_id(dir.path(), &no_env).expect("read user"), None);
        assert!(save_user_id(dir.path(), Some("  ")).is_err());
    }
}
