use std::{fs, time::Duration};

use tracing::warn;

pub const CONFIG_FILE: &str = "console.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    pub resource: String,
    pub page_size: u32,
    pub search_debounce_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080/api".into(),
            resource: "bookings".into(),
            page_size: 10,
            search_debounce_ms: 300,
        }
    }
}

impl Settings {
    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(CONFIG_FILE) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings.api_base_url = normalize_base_url(&settings.api_base_url);
    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<toml::Table>(raw) {
        Ok(table) => table,
        Err(error) => {
            warn!(%error, file = CONFIG_FILE, "ignoring unreadable config file");
            return;
        }
    };

    if let Some(v) = file_cfg.get("api_base_url").and_then(toml::Value::as_str) {
        settings.api_base_url = v.to_string();
    }
    if let Some(v) = file_cfg.get("resource").and_then(toml::Value::as_str) {
        settings.resource = v.to_string();
    }
    if let Some(v) = file_cfg.get("page_size").and_then(toml::Value::as_integer) {
        match u32::try_from(v) {
            Ok(parsed) if parsed > 0 => settings.page_size = parsed,
            _ => warn!(value = v, "ignoring page_size from config file"),
        }
    }
    if let Some(v) = file_cfg
        .get("search_debounce_ms")
        .and_then(toml::Value::as_integer)
    {
        match u64::try_from(v) {
            Ok(parsed) => settings.search_debounce_ms = parsed,
            Err(_) => warn!(value = v, "ignoring search_debounce_ms from config file"),
        }
    }
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("CONSOLE_API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = lookup("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = lookup("APP__RESOURCE") {
        settings.resource = v;
    }

    if let Some(v) = lookup("APP__PAGE_SIZE") {
        match v.parse::<u32>() {
            Ok(parsed) if parsed > 0 => settings.page_size = parsed,
            _ => warn!(value = %v, "ignoring APP__PAGE_SIZE"),
        }
    }

    if let Some(v) = lookup("APP__SEARCH_DEBOUNCE_MS") {
        match v.parse::<u64>() {
            Ok(parsed) => settings.search_debounce_ms = parsed,
            Err(_) => warn!(value = %v, "ignoring APP__SEARCH_DEBOUNCE_MS"),
        }
    }
}

/// Trims whitespace and trailing slashes and assumes `http://` when no scheme
/// is given.
pub fn normalize_base_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return Settings::default().api_base_url;
    }

    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    with_scheme.trim_end_matches('/').to_string()
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
