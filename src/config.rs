use crate::client::{ClientTimeouts, DEFAULT_CONTROL_PORT};
use crate::decoder;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "roku-remote";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub control_port: u16,
    pub request_timeout_ms: u64,
    pub reachability_timeout_ms: u64,
    pub device_info_timeout_ms: u64,
    pub apps_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub probe_concurrency: usize,
    pub max_hosts: usize,
    pub escape_timeout_ms: u64,
    pub presets: BTreeMap<String, String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            control_port: DEFAULT_CONTROL_PORT,
            request_timeout_ms: 1500,
            reachability_timeout_ms: 2000,
            device_info_timeout_ms: 2000,
            apps_timeout_ms: 3000,
            probe_timeout_ms: 400,
            probe_concurrency: 256,
            max_hosts: 65534,
            escape_timeout_ms: 100,
            presets: default_presets(),
        }
    }
}

impl RemoteConfig {
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("request_timeout_ms", self.request_timeout_ms),
            ("reachability_timeout_ms", self.reachability_timeout_ms),
            ("device_info_timeout_ms", self.device_info_timeout_ms),
            ("apps_timeout_ms", self.apps_timeout_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("escape_timeout_ms", self.escape_timeout_ms),
        ];
        for (key, value) in timeouts {
            if value == 0 {
                return Err(anyhow!("config field '{key}' must be greater than zero"));
            }
        }
        if self.probe_concurrency == 0 {
            return Err(anyhow!("config field 'probe_concurrency' must be greater than zero"));
        }
        if self.max_hosts == 0 {
            return Err(anyhow!("config field 'max_hosts' must be greater than zero"));
        }
        if self.control_port == 0 {
            return Err(anyhow!("config field 'control_port' must be a valid port"));
        }

        for (key, app_id) in &self.presets {
            parse_preset_key(key)?;
            if app_id.is_empty() || !app_id.chars().all(|c| c.is_ascii_digit()) {
                return Err(anyhow!(
                    "preset '{key}' must map to a numeric app id, got '{app_id}'"
                ));
            }
        }
        Ok(())
    }

    pub fn preset_map(&self) -> BTreeMap<char, String> {
        self.presets
            .iter()
            .filter_map(|(key, app_id)| Some((parse_preset_key(key).ok()?, app_id.clone())))
            .collect()
    }

    pub const fn client_timeouts(&self) -> ClientTimeouts {
        ClientTimeouts {
            request: Duration::from_millis(self.request_timeout_ms),
            reachability: Duration::from_millis(self.reachability_timeout_ms),
            device_info: Duration::from_millis(self.device_info_timeout_ms),
            apps: Duration::from_millis(self.apps_timeout_ms),
        }
    }

    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub const fn escape_timeout(&self) -> Duration {
        Duration::from_millis(self.escape_timeout_ms)
    }
}

pub fn config_path() -> Result<PathBuf> {
    scoped_path(CONFIG_FILE)
}

pub fn load_or_create_config() -> Result<RemoteConfig> {
    load_or_create_at(&config_path()?)
}

fn load_or_create_at(path: &Path) -> Result<RemoteConfig> {
    if !path.exists() {
        let defaults = RemoteConfig::default();
        write_config_file(path, &defaults)?;
        return Ok(defaults);
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading config at {}", path.display()))?;
    let parsed = serde_json::from_str::<RemoteConfig>(&raw)
        .with_context(|| format!("failed parsing config at {}", path.display()))?;
    parsed
        .validate()
        .with_context(|| format!("invalid config at {}", path.display()))?;
    Ok(parsed)
}

fn write_config_file(path: &Path, config: &RemoteConfig) -> Result<()> {
    ensure_parent_dir(path)?;
    let payload = serde_json::to_string_pretty(config).context("failed serializing config")?;
    fs::write(path, payload)
        .with_context(|| format!("failed writing config at {}", path.display()))?;
    Ok(())
}

fn parse_preset_key(key: &str) -> Result<char> {
    let mut chars = key.chars();
    let (Some(ch), None) = (chars.next(), chars.next()) else {
        return Err(anyhow!("preset key '{key}' must be a single character"));
    };
    if !ch.is_ascii_alphanumeric() {
        return Err(anyhow!("preset key '{key}' must be a letter or digit"));
    }
    if decoder::is_builtin_binding(ch) {
        return Err(anyhow!(
            "preset key '{key}' collides with a built-in key binding"
        ));
    }
    Ok(ch)
}

fn default_presets() -> BTreeMap<String, String> {
    [
        ("1", "12"),
        ("2", "837"),
        ("3", "13"),
        ("4", "2285"),
        ("5", "291097"),
    ]
    .into_iter()
    .map(|(key, app_id)| (key.to_owned(), app_id.to_owned()))
    .collect()
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating data directory {}", parent.display()))?;
    }
    Ok(())
}

fn data_root() -> Result<PathBuf> {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .context("unable to determine user data directory")
}

pub(crate) fn scoped_path(file: &str) -> Result<PathBuf> {
    Ok(data_root()?.join(APP_DIR).join(file))
}
