use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const REMOTE_JSON: &str = "remote.json";

pub const REMOTE_URL_KEYS: &[&str] = &["TIMECALC_SUPABASE_URL", "SUPABASE_URL"];
pub const REMOTE_ANON_KEY_KEYS: &[&str] = &["TIMECALC_SUPABASE_ANON_KEY", "SUPABASE_ANON_KEY"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClearMode {
    Deferred,
    Immediate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub app_name: String,
    pub storage: StorageBackend,
    pub clear_mode: ClearMode,
    pub status_message_seconds: u64,
    pub save_concurrency: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "Time Calculator".to_string(),
            storage: StorageBackend::Local,
            clear_mode: ClearMode::Deferred,
            status_message_seconds: 3,
            save_concurrency: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub url: String,
    pub anon_key: String,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    let app = AppConfig::default();
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": app.app_name,
                "storage": app.storage,
                "clearMode": app.clear_mode,
                "statusMessageSeconds": app.status_message_seconds,
                "saveConcurrency": app.save_concurrency
            }),
        ),
        (
            REMOTE_JSON,
            serde_json::json!({
                "schema": 1,
                "url": null,
                "anonKey": null
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
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

/// Reads `app.json`. Keys that are absent keep their defaults.
pub fn load_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    let path = config_dir.join(APP_JSON);
    let parsed = read_config(&path)?;
    let mut config = AppConfig::default();

    if let Some(name) = read_trimmed(&parsed, "appName") {
        config.app_name = name;
    }
    if let Some(storage) = parsed.get("storage") {
        config.storage = serde_json::from_value(storage.clone()).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid storage in {}: {error}", path.display()))
        })?;
    }
    if let Some(mode) = parsed.get("clearMode") {
        config.clear_mode = serde_json::from_value(mode.clone()).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid clearMode in {}: {error}", path.display()))
        })?;
    }
    if let Some(seconds) = read_count(&parsed, "statusMessageSeconds", &path)? {
        config.status_message_seconds = seconds;
    }
    if let Some(concurrency) = read_count(&parsed, "saveConcurrency", &path)? {
        if concurrency == 0 {
            return Err(InfraError::InvalidConfig(
                "saveConcurrency must be >= 1".to_string(),
            ));
        }
        config.save_concurrency = concurrency as usize;
    }

    Ok(config)
}

pub fn load_remote_config(config_dir: &Path) -> Result<Option<RemoteConfig>, InfraError> {
    load_remote_config_with_lookup(config_dir, |key| std::env::var(key).ok())
}

/// Environment values win over `remote.json`. A half-configured remote
/// (only url or only key) is rejected.
pub fn load_remote_config_with_lookup<F>(
    config_dir: &Path,
    lookup: F,
) -> Result<Option<RemoteConfig>, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let remote = read_config(&config_dir.join(REMOTE_JSON))?;
    let url = optional_lookup_value(&lookup, REMOTE_URL_KEYS).or_else(|| read_trimmed(&remote, "url"));
    let anon_key = optional_lookup_value(&lookup, REMOTE_ANON_KEY_KEYS)
        .or_else(|| read_trimmed(&remote, "anonKey"));

    match (url, anon_key) {
        (Some(url), Some(anon_key)) => Ok(Some(RemoteConfig { url, anon_key })),
        (None, None) => Ok(None),
        (Some(_), None) => Err(InfraError::InvalidConfig(format!(
            "missing remote anon key (set anonKey or one of: {})",
            REMOTE_ANON_KEY_KEYS.join(", ")
        ))),
        (None, Some(_)) => Err(InfraError::InvalidConfig(format!(
            "missing remote url (set url or one of: {})",
            REMOTE_URL_KEYS.join(", ")
        ))),
    }
}

/// A missing or `null` key is unset; anything else must be a whole,
/// non-negative number.
fn read_count(value: &serde_json::Value, key: &str, path: &Path) -> Result<Option<u64>, InfraError> {
    match value.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(raw) => raw.as_u64().map(Some).ok_or_else(|| {
            InfraError::InvalidConfig(format!(
                "{key} must be a non-negative integer in {}, got {raw}",
                path.display()
            ))
        }),
    }
}

fn read_trimmed(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_CONFIG: AtomicUsize = AtomicUsize::new(0);

    struct TempConfigDir {
        path: PathBuf,
    }

    impl TempConfigDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_CONFIG.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "timecalc-config-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp config dir");
            ensure_default_configs(&path).expect("write defaults");
            Self { path }
        }

        fn write(&self, name: &str, value: serde_json::Value) {
            fs::write(self.path.join(name), value.to_string()).expect("write config");
        }
    }

    impl Drop for TempConfigDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn default_app_config_round_trips_through_disk() {
        let dir = TempConfigDir::new();
        let config = load_app_config(&dir.path).expect("load app config");
        assert_eq!(config, AppConfig::default());
        assert_eq!(
            load_remote_config_with_lookup(&dir.path, |_| None).expect("remote config"),
            None
        );
    }

    #[test]
    fn app_config_reads_storage_and_clear_mode() {
        let dir = TempConfigDir::new();
        dir.write(
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "storage": "remote",
                "clearMode": "immediate",
                "statusMessageSeconds": 10
            }),
        );

        let config = load_app_config(&dir.path).expect("load app config");
        assert_eq!(config.storage, StorageBackend::Remote);
        assert_eq!(config.clear_mode, ClearMode::Immediate);
        assert_eq!(config.status_message_seconds, 10);
        assert_eq!(config.save_concurrency, 5);
    }

    #[test]
    fn unsupported_schema_and_bad_values_are_rejected() {
        let dir = TempConfigDir::new();
        dir.write(APP_JSON, serde_json::json!({ "schema": 2 }));
        assert!(matches!(
            load_app_config(&dir.path),
            Err(InfraError::InvalidConfig(_))
        ));

        dir.write(APP_JSON, serde_json::json!({ "schema": 1, "storage": "cloud" }));
        assert!(matches!(
            load_app_config(&dir.path),
            Err(InfraError::InvalidConfig(_))
        ));

        dir.write(APP_JSON, serde_json::json!({ "schema": 1, "saveConcurrency": 0 }));
        assert!(matches!(
            load_app_config(&dir.path),
            Err(InfraError::InvalidConfig(_))
        ));
    }

    #[test]
    fn numeric_keys_that_do_not_parse_are_rejected() {
        let dir = TempConfigDir::new();
        for key in ["saveConcurrency", "statusMessageSeconds"] {
            for bad in [serde_json::json!(-1), serde_json::json!("abc"), serde_json::json!(2.5)] {
                let mut config = serde_json::json!({ "schema": 1 });
                config[key] = bad.clone();
                dir.write(APP_JSON, config);
                assert!(
                    matches!(load_app_config(&dir.path), Err(InfraError::InvalidConfig(_))),
                    "{key} = {bad} should be rejected"
                );
            }
        }

        dir.write(
            APP_JSON,
            serde_json::json!({ "schema": 1, "saveConcurrency": null, "statusMessageSeconds": 7 }),
        );
        let config = load_app_config(&dir.path).expect("load app config");
        assert_eq!(config.save_concurrency, AppConfig::default().save_concurrency);
        assert_eq!(config.status_message_seconds, 7);
    }

    #[test]
    fn environment_overrides_remote_file() {
        let dir = TempConfigDir::new();
        dir.write(
            REMOTE_JSON,
            serde_json::json!({
                "schema": 1,
                "url": "https://file.supabase.co",
                "anonKey": "file-key"
            }),
        );

        let remote = load_remote_config_with_lookup(&dir.path, |key| match key {
            "TIMECALC_SUPABASE_URL" => Some(" https://env.supabase.co ".to_string()),
            _ => None,
        })
        .expect("remote config")
        .expect("remote configured");

        assert_eq!(remote.url, "https://env.supabase.co");
        assert_eq!(remote.anon_key, "file-key");
    }

    #[test]
    fn half_configured_remote_reports_missing_key() {
        let dir = TempConfigDir::new();
        let result = load_remote_config_with_lookup(&dir.path, |key| match key {
            "SUPABASE_URL" => Some("https://env.supabase.co".to_string()),
            _ => None,
        });
        match result {
            Err(InfraError::InvalidConfig(message)) => {
                assert!(message.contains("anon key"));
            }
            _ => panic!("expected invalid config error"),
        }
    }
}
