//! Persistent settings, stored as TOML in the platform config directory.
//!
//! ```toml
//! script = "/Users/me/bin/route-url"
//! timeout = "30s"
//! launch_command = ["open", "-b", "{app}", "{url}"]
//!
//! [apps]
//! frontmost = "com.example.Mail"
//! running = ["com.google.Chrome"]
//!
//! [apps.schemes]
//! http = ["com.google.Chrome", "org.mozilla.firefox"]
//! https = ["com.google.Chrome", "org.mozilla.firefox"]
//! ```

use crate::handler::{HandlerId, StaticCatalog};
use crate::session::{DEFAULT_HELPER_LIB_VAR, SessionSettings};
use anyhow::{Context as _, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_SELF_ID: &str = "urlscript";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// The routing script.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<PathBuf>,

    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    /// Our own handler id, hidden from `AVAILABLE_APPS`.
    pub self_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub helper_lib: Option<PathBuf>,

    pub helper_lib_var: String,

    /// argv template for opening a URL with an app. `{app}` and `{url}` are
    /// replaced in every element.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub launch_command: Vec<String>,

    pub apps: AppsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frontmost: Option<String>,
    pub running: Vec<String>,
    pub schemes: BTreeMap<String, Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            script: None,
            timeout: None,
            self_id: DEFAULT_SELF_ID.to_string(),
            helper_lib: None,
            helper_lib_var: DEFAULT_HELPER_LIB_VAR.to_string(),
            launch_command: Vec::new(),
            apps: AppsConfig::default(),
        }
    }
}

impl Config {
    /// `<config dir>/urlscript/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "urlscript").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load from `path`. A missing file gives the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Write to `path`, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, self.to_toml()?)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    pub fn catalog(&self) -> StaticCatalog {
        let ids = |list: &[String]| -> Vec<HandlerId> {
            list.iter().filter_map(|s| HandlerId::new(s.as_str())).collect()
        };
        StaticCatalog {
            current: HandlerId::new(self.self_id.as_str()),
            frontmost: self.apps.frontmost.as_deref().and_then(HandlerId::new),
            schemes: self
                .apps
                .schemes
                .iter()
                .map(|(scheme, list)| (scheme.clone(), ids(list)))
                .collect(),
            running: ids(&self.apps.running),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            script: self.script.clone(),
            timeout: self.timeout,
            helper_lib: self.helper_lib.clone(),
            helper_lib_var: self.helper_lib_var.clone(),
            catalog: Arc::new(self.catalog()),
            ..SessionSettings::default()
        }
    }
}
