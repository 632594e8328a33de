use std::{
    collections::HashMap,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::{idle::IdleThresholdSpec, listeners::hyprland::DEFAULT_SOCKET_PATH, types::SwayEventType};

pub const CONFIG_FILE: &str = r#"{
    "listeners": {
        "systemd_logind": {}
    },
    "idle_config": [],
    "handlers": {
        "init": "logger -t easyland started",
        "on_PrepareForSleep": "logger -t easyland \"PrepareForSleep $1\""
    }
}
"#;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub listeners: Option<ListenerConfig>,
    #[serde(default)]
    pub idle_config: Option<Vec<IdleThresholdSpec>>,
    /// Handler name to shell command.
    #[serde(default)]
    pub handlers: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListenerConfig {
    pub hyprland: Option<HyprlandOptions>,
    pub sway: Option<SwayOptions>,
    pub systemd_logind: Option<LogindOptions>,
    pub idle: Option<IdleOptions>,
    #[serde(flatten)]
    pub unknown: HashMap<String, Value>,
}

impl ListenerConfig {
    fn is_empty(&self) -> bool {
        self.hyprland.is_none()
            && self.sway.is_none()
            && self.systemd_logind.is_none()
            && self.idle.is_none()
            && self.unknown.is_empty()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HyprlandOptions {
    pub socket_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SwayOptions {
    pub event_types: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogindOptions {}

#[derive(Debug, Default, Deserialize)]
pub struct IdleOptions {}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No listeners defined in the config file")]
    MissingListeners,
    #[error("No usable listeners in the config file")]
    NoSources,
    #[error("No sway event types defined for Sway listeners in the config file")]
    MissingSwayEventTypes,
    #[error("Sway - Invalid event type: {0}")]
    InvalidSwayEventType(String),
    #[error("Hyprland - cannot expand socket path '{path}': {reason}")]
    SocketPath { path: String, reason: String },
    #[error("Idle - timeout of {0} seconds is too large")]
    IdleTimeout(u32),
}

/// One worker to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Hyprland { socket_path: PathBuf },
    Sway(SwayEventType),
    Logind,
    Idle(Vec<IdleThresholdSpec>),
}

/// Validated listener set, in start order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenerPlan {
    pub sources: Vec<Source>,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON config {}", path.display()))?;
        Ok(config)
    }

    /// Validates the listener section. Nothing is started here, so an error
    /// means no worker runs at all.
    pub fn plan(&self) -> Result<ListenerPlan, ConfigError> {
        let listeners = match &self.listeners {
            Some(listeners) if !listeners.is_empty() => listeners,
            _ => return Err(ConfigError::MissingListeners),
        };

        for kind in listeners.unknown.keys() {
            warn!("Ignoring unknown listener '{}'", kind);
        }

        let mut sources = Vec::new();

        if let Some(hyprland) = &listeners.hyprland {
            let raw = hyprland.socket_path.as_deref().unwrap_or(DEFAULT_SOCKET_PATH);
            let expanded = shellexpand::full(raw).map_err(|e| ConfigError::SocketPath {
                path: raw.to_string(),
                reason: e.to_string(),
            })?;
            sources.push(Source::Hyprland {
                socket_path: PathBuf::from(expanded.as_ref()),
            });
        }

        if let Some(sway) = &listeners.sway {
            let event_types = sway
                .event_types
                .as_ref()
                .ok_or(ConfigError::MissingSwayEventTypes)?;
            for name in event_types {
                let event_type = name
                    .parse::<SwayEventType>()
                    .map_err(ConfigError::InvalidSwayEventType)?;
                sources.push(Source::Sway(event_type));
            }
        }

        if listeners.systemd_logind.is_some() {
            sources.push(Source::Logind);
        }

        if listeners.idle.is_some() {
            match &self.idle_config {
                Some(specs) => {
                    if let Some(spec) = specs.iter().find(|spec| spec.timeout_millis().is_none()) {
                        return Err(ConfigError::IdleTimeout(spec.timeout));
                    }
                    sources.push(Source::Idle(specs.clone()));
                }
                None => warn!("Idle listener configured without idle_config, skipping"),
            }
        }

        if sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        debug!("Listener plan: {:?}", sources);
        Ok(ListenerPlan { sources })
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    xdg::BaseDirectories::with_prefix("easyland")
        .place_config_file("config.json")
        .context("Failed to resolve config directory")
}

pub fn ensure_config_file_exists(config_path: &Path) -> std::io::Result<()> {
    if !config_path.exists() {
        let mut file = File::create(config_path)?;
        file.write_all(CONFIG_FILE.as_bytes())?;
    }
    Ok(())
}

/// Resolves the config location: an explicit path with `~`/`$VAR` expanded, or
/// the XDG default, seeded with a starter config when missing.
pub fn resolve_config_path(explicit: Option<&str>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) => {
            let expanded = shellexpand::full(path)
                .with_context(|| format!("Failed to expand config path {path}"))?;
            Ok(PathBuf::from(expanded.as_ref()))
        }
        None => {
            let path = default_config_path()?;
            ensure_config_file_exists(&path)
                .with_context(|| format!("Failed to write default config {}", path.display()))?;
            Ok(path)
        }
    }
}
