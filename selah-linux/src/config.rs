//! Load config from file and environment.

use serde::Deserialize;
use std::path::PathBuf;

/// Host configuration. File: ~/.config/selah/config.toml or /etc/selah/config.toml.
/// Env overrides: SELAH_RELAY_HOST, SELAH_RELAY_PORT, SELAH_CONTENT_URL, SELAH_TRANSLATION,
/// SELAH_ASSISTANT_URL, SELAH_ASSISTANT_MODEL, SELAH_ASSISTANT_KEY.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Relay service host (default 127.0.0.1).
    #[serde(default = "default_relay_host")]
    pub relay_host: String,
    /// Relay service TCP port (default 45680).
    #[serde(default = "default_relay_port")]
    pub relay_port: u16,
    /// Chapter content API base URL.
    #[serde(default = "default_content_url")]
    pub content_url: String,
    /// Translation code passed to the content API.
    #[serde(default = "default_translation")]
    pub translation: String,
    /// Behave like a mobile form factor (recordings use the camera).
    #[serde(default)]
    pub mobile: bool,
    /// Study assistant API base URL.
    #[serde(default = "default_assistant_url")]
    pub assistant_url: String,
    #[serde(default = "default_assistant_model")]
    pub assistant_model: String,
    /// Without a key every assistant request answers with its apology.
    #[serde(default)]
    pub assistant_key: Option<String>,
}

fn default_relay_host() -> String {
    "127.0.0.1".to_string()
}
fn default_relay_port() -> u16 {
    45680
}
fn default_content_url() -> String {
    "https://bible-api.com".to_string()
}
fn default_translation() -> String {
    "web".to_string()
}
fn default_assistant_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_assistant_model() -> String {
    "gemini-2.5-flash".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay_host: default_relay_host(),
            relay_port: default_relay_port(),
            content_url: default_content_url(),
            translation: default_translation(),
            mobile: false,
            assistant_url: default_assistant_url(),
            assistant_model: default_assistant_model(),
            assistant_key: None,
        }
    }
}

impl Config {
    pub fn relay_addr(&self) -> String {
        format!("{}:{}", self.relay_host, self.relay_port)
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    apply_env(&mut c, |k| std::env::var(k).ok());
    c
}

fn apply_env<F: Fn(&str) -> Option<String>>(c: &mut Config, var: F) {
    if let Some(s) = var("SELAH_RELAY_HOST") {
        if !s.trim().is_empty() {
            c.relay_host = s.trim().to_string();
        }
    }
    if let Some(s) = var("SELAH_RELAY_PORT") {
        if let Ok(p) = s.parse::<u16>() {
            c.relay_port = p;
        }
    }
    if let Some(s) = var("SELAH_CONTENT_URL") {
        if !s.trim().is_empty() {
            c.content_url = s.trim().trim_end_matches('/').to_string();
        }
    }
    if let Some(s) = var("SELAH_TRANSLATION") {
        if !s.trim().is_empty() {
            c.translation = s.trim().to_string();
        }
    }
    if let Some(s) = var("SELAH_ASSISTANT_URL") {
        if !s.trim().is_empty() {
            c.assistant_url = s.trim().trim_end_matches('/').to_string();
        }
    }
    if let Some(s) = var("SELAH_ASSISTANT_MODEL") {
        if !s.trim().is_empty() {
            c.assistant_model = s.trim().to_string();
        }
    }
    if let Some(s) = var("SELAH_ASSISTANT_KEY") {
        if !s.trim().is_empty() {
            c.assistant_key = Some(s.trim().to_string());
        }
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/selah/config.toml"));
    }
    out.push(PathBuf::from("/etc/selah/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            match std::fs::read_to_string(&p) {
                Ok(s) => match toml::from_str::<Config>(&s) {
                    Ok(c) => return Some(c),
                    Err(e) => log::warn!("config: ignoring {}: {e}", p.display()),
                },
                Err(e) => log::warn!("config: cannot read {}: {e}", p.display()),
            }
            break;
        }
    }
    None
}
