use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "POSTMEDIA";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub redgifs: RedgifsConfig,
    #[serde(default)]
    pub reddit: RedditConfig,
}

/// Paddings and sizes in points; `display_scale` converts to pixels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutConfig {
    #[serde(default = "default_padding")]
    pub inner_padding: f64,
    #[serde(default = "default_padding")]
    pub outer_padding: f64,
    #[serde(default = "default_padding")]
    pub gallery_spacing: f64,
    #[serde(default = "default_compact_thumbnail")]
    pub compact_thumbnail: f64,
    #[serde(default = "default_display_scale")]
    pub display_scale: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            inner_padding: default_padding(),
            outer_padding: default_padding(),
            gallery_spacing: default_padding(),
            compact_thumbnail: default_compact_thumbnail(),
            display_scale: default_display_scale(),
        }
    }
}

fn default_padding() -> f64 {
    8.0
}

fn default_compact_thumbnail() -> f64 {
    72.0
}

fn default_display_scale() -> f64 {
    2.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedgifsConfig {
    #[serde(default = "default_redgifs_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_redgifs_api_url")]
    pub api_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RedgifsConfig {
    fn default() -> Self {
        Self {
            auth_url: default_redgifs_auth_url(),
            api_url: default_redgifs_api_url(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            timeout: default_timeout(),
        }
    }
}

fn default_redgifs_auth_url() -> String {
    "https://api.redgifs.com/v2/auth/temporary".into()
}

fn default_redgifs_api_url() -> String {
    "https://api.redgifs.com/v2/".into()
}

fn default_accept_language() -> String {
    "en-US,en;q=0.9".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedditConfig {
    #[serde(default = "default_reddit_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            base_url: default_reddit_base_url(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
        }
    }
}

fn default_reddit_base_url() -> String {
    crate::reddit::DEFAULT_BASE_URL.into()
}

fn default_user_agent() -> String {
    format!("postmedia/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    base.layout = other.layout;

    if !other.redgifs.auth_url.is_empty() {
        base.redgifs.auth_url = other.redgifs.auth_url;
    }
    if !other.redgifs.api_url.is_empty() {
        base.redgifs.api_url = other.redgifs.api_url;
    }
    if !other.redgifs.user_agent.is_empty() {
        base.redgifs.user_agent = other.redgifs.user_agent;
    }
    if !other.redgifs.accept_language.is_empty() {
        base.redgifs.accept_language = other.redgifs.accept_language;
    }
    if !other.redgifs.timeout.is_zero() {
        base.redgifs.timeout = other.redgifs.timeout;
    }

    if !other.reddit.base_url.is_empty() {
        base.reddit.base_url = other.reddit.base_url;
    }
    if !other.reddit.user_agent.is_empty() {
        base.reddit.user_agent = other.reddit.user_agent;
    }
    if !other.reddit.timeout.is_zero() {
        base.reddit.timeout = other.reddit.timeout;
    }

    base
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "layout.inner_padding" => set_points(&mut cfg.layout.inner_padding, &value),
        "layout.outer_padding" => set_points(&mut cfg.layout.outer_padding, &value),
        "layout.gallery_spacing" => set_points(&mut cfg.layout.gallery_spacing, &value),
        "layout.compact_thumbnail" => set_points(&mut cfg.layout.compact_thumbnail, &value),
        "layout.display_scale" => set_points(&mut cfg.layout.display_scale, &value),
        "redgifs.auth_url" => cfg.redgifs.auth_url = value,
        "redgifs.api_url" => cfg.redgifs.api_url = value,
        "redgifs.user_agent" => cfg.redgifs.user_agent = value,
        "redgifs.accept_language" => cfg.redgifs.accept_language = value,
        "redgifs.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.redgifs.timeout = duration;
            }
        }
        "reddit.base_url" => cfg.reddit.base_url = value,
        "reddit.user_agent" => cfg.reddit.user_agent = value,
        "reddit.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.reddit.timeout = duration;
            }
        }
        _ => {}
    }
}

fn set_points(field: &mut f64, value: &str) {
    if let Ok(parsed) = value.trim().parse::<f64>() {
        if parsed.is_finite() && parsed >= 0.0 {
            *field = parsed;
        }
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("postmedia").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            env_prefix: Some("POSTMEDIA_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.layout.gallery_spacing, 8.0);
        assert_eq!(
            cfg.redgifs.auth_url,
            "https://api.redgifs.com/v2/auth/temporary"
        );
        assert_eq!(cfg.reddit.timeout, Duration::from_secs(20));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "layout:\n  compact_thumbnail: 48\nredgifs:\n  auth_url: http://127.0.0.1:9/auth\n  timeout: 5s\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("POSTMEDIA_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.layout.compact_thumbnail, 48.0);
        assert_eq!(cfg.layout.inner_padding, 8.0);
        assert_eq!(cfg.redgifs.auth_url, "http://127.0.0.1:9/auth");
        assert_eq!(cfg.redgifs.timeout, Duration::from_secs(5));
        assert_eq!(cfg.redgifs.api_url, "https://api.redgifs.com/v2/");
    }

    #[test]
    fn env_overrides() {
        env::set_var("POSTMEDIA_TEST_ENV_LAYOUT__DISPLAY_SCALE", "3");
        env::set_var("POSTMEDIA_TEST_ENV_REDDIT__TIMEOUT", "2s");
        env::set_var("POSTMEDIA_TEST_ENV_LAYOUT__OUTER_PADDING", "not-a-number");
        let dir = tempdir().unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            env_prefix: Some("POSTMEDIA_TEST_ENV".into()),
        })
        .unwrap();
        assert_eq!(cfg.layout.display_scale, 3.0);
        assert_eq!(cfg.layout.outer_padding, 8.0);
        assert_eq!(cfg.reddit.timeout, Duration::from_secs(2));
        env::remove_var("POSTMEDIA_TEST_ENV_LAYOUT__DISPLAY_SCALE");
        env::remove_var("POSTMEDIA_TEST_ENV_REDDIT__TIMEOUT");
        env::remove_var("POSTMEDIA_TEST_ENV_LAYOUT__OUTER_PADDING");
    }
}
