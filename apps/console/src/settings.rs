use std::collections::HashMap;
use std::fs;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_url: String,
    pub log_filter: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".into(),
            log_filter: None,
        }
    }
}

/// Defaults, overlaid by `console.toml`, overlaid by environment variables.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("console.toml") {
        apply_file_config(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("OPSDECK_SERVER_URL") {
        settings.server_url = v;
    }
    if let Ok(v) = std::env::var("OPSDECK_LOG") {
        settings.log_filter = Some(v);
    }

    settings
}

fn apply_file_config(settings: &mut Settings, raw: &str) {
    if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) {
        if let Some(v) = file_cfg.get("server_url") {
            settings.server_url = v.clone();
        }
        if let Some(v) = file_cfg.get("log_filter") {
            settings.log_filter = Some(v.clone());
        }
    }
}
