// DBGp Client - Remote Script Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Configuration for the DBGp client
//!
//! Holds the listening address, attach behavior, engine feature negotiation
//! and remote/local path mappings. Stored as TOML at `~/.dbgp.toml` unless
//! [`DBGP_CONFIG`](crate::env::DBGP_CONFIG) points elsewhere.

use std::{
    fs,
    path::{Path, PathBuf},
};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::env::DBGP_CONFIG;

/// Default port engines connect to.
pub const DEFAULT_PORT: u16 = 9000;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerConfig {
    /// Address to listen on
    pub bind_address: String,
    /// Port to listen on
    pub port: u16,
    /// Keep listening and accept the next engine after a disconnect
    pub auto_attach: bool,
    /// Stop on the first line after attaching instead of running to a breakpoint
    pub break_on_first_line: bool,
    /// How outbound commands are framed
    pub command_framing: FramingMode,
    /// Engine features negotiated after the handshake
    pub features: FeatureConfig,
    /// Remote/local path prefix replacements
    pub path_mappings: Vec<PathMapping>,
    /// Breakpoints registered at start-up (`file:line` or `function()`)
    pub breakpoints: Vec<String>,
}

/// Framing used for client to engine commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingMode {
    /// `<command>\0`, what DBGp engines parse
    #[default]
    NulTerminated,
    /// `<len>\0<command>\0`, the same framing engines use for responses
    LengthPrefixed,
}

/// Engine features set with `feature_set` after the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Children returned per page
    pub max_children: u32,
    /// Nesting depth returned inline
    pub max_depth: u32,
    /// Maximum bytes of a value (0 leaves the engine default)
    pub max_data: u32,
}

/// A remote path prefix and the local directory it corresponds to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapping {
    /// Path prefix as the engine sees it
    pub remote: PathBuf,
    /// Path prefix on this machine
    pub local: PathBuf,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            auto_attach: true,
            break_on_first_line: true,
            command_framing: FramingMode::default(),
            features: FeatureConfig::default(),
            path_mappings: Vec::new(),
            breakpoints: Vec::new(),
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self { max_children: 32, max_depth: 1, max_data: 0 }
    }
}

impl PathMapping {
    fn rewrite(path: &Path, from: &Path, to: &Path) -> Option<PathBuf> {
        path.strip_prefix(from).ok().map(|rest| to.join(rest))
    }
}

impl DebuggerConfig {
    /// Get the config file path (`$DBGP_CONFIG` or `~/.dbgp.toml`)
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(DBGP_CONFIG) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }

        let home =
            dirs::home_dir().ok_or_else(|| eyre::eyre!("Unable to determine home directory"))?;
        Ok(home.join(".dbgp.toml"))
    }

    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, creating a default file if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Config file not found, creating default at {:?}", path);
            let default_config = Self::default();
            default_config.save_to(path)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path:?}"))?;

        let config: Self =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {path:?}"))?;

        debug!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Translate an engine path to a local one using the first matching mapping
    pub fn to_local(&self, remote: &Path) -> PathBuf {
        self.path_mappings
            .iter()
            .find_map(|m| PathMapping::rewrite(remote, &m.remote, &m.local))
            .unwrap_or_else(|| remote.to_path_buf())
    }

    /// Translate a local path to the engine's view using the first matching mapping
    pub fn to_remote(&self, local: &Path) -> PathBuf {
        self.path_mappings
            .iter()
            .find_map(|m| PathMapping::rewrite(local, &m.local, &m.remote))
            .unwrap_or_else(|| local.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = DebuggerConfig::default();
        assert_eq!(config.port, 9000);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert!(config.auto_attach);
        assert!(config.break_on_first_line);
        assert_eq!(config.command_framing, FramingMode::NulTerminated);
        assert_eq!(config.features.max_children, 32);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dbgp.toml");

        let config = DebuggerConfig::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, DebuggerConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dbgp.toml");

        let mut config = DebuggerConfig::default();
        config.port = 9003;
        config.command_framing = FramingMode::LengthPrefixed;
        config.path_mappings.push(PathMapping {
            remote: PathBuf::from("/var/www"),
            local: PathBuf::from("/home/me/site"),
        });
        config.breakpoints.push("/home/me/site/index.php:3".to_string());
        config.save_to(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("length_prefixed"));

        assert_eq!(DebuggerConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dbgp.toml");
        fs::write(&path, "port = 9100\n[features]\nmax_depth = 3\n").unwrap();

        let config = DebuggerConfig::load_from(&path).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.features.max_depth, 3);
        assert_eq!(config.features.max_children, 32);
        assert!(config.auto_attach);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dbgp.toml");
        fs::write(&path, "port = \"not a number\"").unwrap();
        assert!(DebuggerConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_path_mapping() {
        let mut config = DebuggerConfig::default();
        config.path_mappings.push(PathMapping {
            remote: PathBuf::from("/var/www"),
            local: PathBuf::from("/home/me/site"),
        });

        assert_eq!(
            config.to_local(Path::new("/var/www/lib/a.php")),
            PathBuf::from("/home/me/site/lib/a.php")
        );
        assert_eq!(
            config.to_remote(Path::new("/home/me/site/index.php")),
            PathBuf::from("/var/www/index.php")
        );
        assert_eq!(config.to_local(Path::new("/opt/other.php")), PathBuf::from("/opt/other.php"));
        // Prefixes match whole components only.
        assert_eq!(config.to_local(Path::new("/var/wwwx/a.php")), PathBuf::from("/var/wwwx/a.php"));
    }

    #[test]
    #[serial]
    fn test_config_path_env_override() {
        std::env::set_var(DBGP_CONFIG, "/tmp/custom-dbgp.toml");
        assert_eq!(DebuggerConfig::config_path().unwrap(), PathBuf::from("/tmp/custom-dbgp.toml"));
        std::env::remove_var(DBGP_CONFIG);
        assert!(DebuggerConfig::config_path().unwrap().ends_with(".dbgp.toml"));
    }
}
