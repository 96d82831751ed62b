use crate::domain::models::{Category, IntervalSettings, PomodoroSettings};
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const POMODORO_JSON: &str = "pomodoro.json";
const DEFAULT_ACCESS_TOKEN_TTL_MINUTES: i64 = 12 * 60;

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub app: serde_json::Value,
    pub pomodoro: serde_json::Value,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    let defaults = PomodoroSettings::default();
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "Pomoboard",
                "accessTokenTtlMinutes": DEFAULT_ACCESS_TOKEN_TTL_MINUTES
            }),
        ),
        (
            POMODORO_JSON,
            serde_json::json!({
                "schema": 1,
                "intervals": defaults.intervals,
                "categories": defaults.categories
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

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    Ok(ConfigBundle {
        app: read_config(&config_dir.join(APP_JSON))?,
        pomodoro: read_config(&config_dir.join(POMODORO_JSON))?,
    })
}

pub fn read_access_token_ttl_minutes(config_dir: &Path) -> Result<i64, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    match app.get("accessTokenTtlMinutes") {
        None => Ok(DEFAULT_ACCESS_TOKEN_TTL_MINUTES),
        Some(value) => value
            .as_i64()
            .filter(|minutes| *minutes > 0)
            .ok_or_else(|| {
                InfraError::InvalidConfig(format!(
                    "accessTokenTtlMinutes must be a positive integer in {APP_JSON}"
                ))
            }),
    }
}

/// Settings handed to users who have not saved anything yet.
pub fn read_default_settings(config_dir: &Path) -> Result<PomodoroSettings, InfraError> {
    let pomodoro = read_config(&config_dir.join(POMODORO_JSON))?;
    let fallback = PomodoroSettings::default();

    let intervals = match pomodoro.get("intervals") {
        Some(value) => serde_json::from_value::<IntervalSettings>(value.clone()).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid intervals in {POMODORO_JSON}: {error}"))
        })?,
        None => fallback.intervals,
    };
    intervals
        .validate()
        .map_err(|message| InfraError::InvalidConfig(format!("{message} in {POMODORO_JSON}")))?;

    let categories = match pomodoro.get("categories") {
        Some(value) => serde_json::from_value::<Vec<Category>>(value.clone()).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid categories in {POMODORO_JSON}: {error}"))
        })?,
        None => fallback.categories,
    };
    for category in &categories {
        category
            .validate()
            .map_err(|message| InfraError::InvalidConfig(format!("{message} in {POMODORO_JSON}")))?;
    }

    Ok(PomodoroSettings {
        categories,
        intervals,
    })
}
