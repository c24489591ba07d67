//! Configuration management (config.toml)
//!
//! Handles loading, saving, and providing defaults for replay and plugin
//! settings. Settings are stored in TOML format in the platform-specific
//! config directory.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::plugin::{
    ModuleProvider, PluginLoader, PluginSetting, ReplayOptions, SettingValue, SurfaceTarget,
    TracerModules, settings_from_table,
};
use crate::trace::{LogLevel, TracerId};

const CONFIG_FILE: &str = "config.toml";

/// Configuration file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Replay behavior
    #[serde(default)]
    pub replay: ReplayConfig,
    /// Plugin discovery
    #[serde(default)]
    pub plugins: PluginsConfig,
    /// Per-module settings handed to replayers, keyed by module name
    #[serde(default)]
    pub plugin_settings: HashMap<String, HashMap<String, SettingValue>>,
}

/// Replay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Most verbose level replayers log at (default: warning)
    #[serde(default)]
    pub log_level: LogLevel,
    /// Enable API validation layers (default: false)
    #[serde(default)]
    pub validation: bool,
    /// Offscreen surface width; 0 uses a window supplied by the embedder
    #[serde(default)]
    pub offscreen_width: u32,
    #[serde(default)]
    pub offscreen_height: u32,
}

/// Plugin discovery configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Directories searched for plugin modules, in order
    #[serde(default)]
    pub search_dirs: Vec<PathBuf>,
    /// Tracer ID (as a string key) to module name
    #[serde(default = "default_tracer_modules")]
    pub tracer_modules: HashMap<String, String>,
}

fn default_tracer_modules() -> HashMap<String, String> {
    TracerModules::default()
        .entries()
        .into_iter()
        .map(|(id, name)| (id.0.to_string(), name.to_string()))
        .collect()
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            validation: false,
            offscreen_width: 0,
            offscreen_height: 0,
        }
    }
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            search_dirs: Vec::new(),
            tracer_modules: default_tracer_modules(),
        }
    }
}

impl Config {
    /// Tracer → module mapping; keys that are not tracer IDs are ignored
    pub fn tracer_modules(&self) -> TracerModules {
        let mut modules = TracerModules::empty();
        for (key, name) in &self.plugins.tracer_modules {
            match key.parse::<u8>() {
                Ok(id) => modules.insert(TracerId(id), name.clone()),
                Err(_) => warn!("Ignoring tracer_modules entry '{}': not a tracer ID", key),
            }
        }
        modules
    }

    /// Configured settings for a plugin module, sorted by key
    pub fn settings_for(&self, module: &str) -> Vec<PluginSetting> {
        self.plugin_settings
            .get(module)
            .map(settings_from_table)
            .unwrap_or_default()
    }

    pub fn replay_options(&self) -> ReplayOptions {
        ReplayOptions {
            validation: self.replay.validation,
            log_level: self.replay.log_level,
        }
    }

    /// Surface to replay into
    ///
    /// A configured offscreen size wins; otherwise the embedder's window is
    /// used. `None` when neither is available.
    pub fn surface_target(&self, window: Option<u64>) -> Option<SurfaceTarget> {
        let (width, height) = (self.replay.offscreen_width, self.replay.offscreen_height);
        if width > 0 && height > 0 {
            return Some(SurfaceTarget::Offscreen { width, height });
        }
        window.map(|handle| SurfaceTarget::Window { handle })
    }

    /// Plugin loader wired with this configuration
    pub fn plugin_loader(&self, provider: Arc<dyn ModuleProvider>) -> PluginLoader {
        let mut loader = PluginLoader::new(provider)
            .with_tracer_modules(self.tracer_modules())
            .with_search_dirs(self.plugins.search_dirs.clone());
        for module in self.plugin_settings.keys() {
            loader = loader.with_settings(module.clone(), self.settings_for(module));
        }
        loader
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Windows: `%APPDATA%\gfxreplay\config`
/// On macOS: `~/Library/Application Support/io.gfxreplay.gfxreplay`
/// On Linux: `~/.config/gfxreplay`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.gfxreplay", "", "gfxreplay")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Path of `config.toml`, if the config directory is known
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE))
}

/// Loads the configuration from disk.
///
/// Returns default values if the file doesn't exist or cannot be parsed.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        return Config::default();
    };
    if !path.exists() {
        return Config::default();
    }
    load_from(&path).unwrap_or_else(|e| {
        warn!("{}; using defaults", e);
        Config::default()
    })
}

/// Loads the configuration from a specific file.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Saves the configuration to the platform's configuration directory.
///
/// Creates the directory if it doesn't exist. Does nothing if the directory
/// cannot be determined.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    match config_path() {
        Some(path) => save_to(&path, config),
        None => Ok(()),
    }
}

/// Saves the configuration to a specific file.
pub fn save_to(path: &Path, config: &Config) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    let write_err = |source: std::io::Error| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(write_err)?;
    }
    std::fs::write(path, content).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    // =============================================================
    // Default value tests
    // =============================================================

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.replay.log_level, LogLevel::Warning);
        assert!(!config.replay.validation);
        assert_eq!(config.surface_target(None), None);
        assert_eq!(
            config.tracer_modules().module_for(TracerId::VULKAN),
            Some("vulkan_replay")
        );
    }

    #[test]
    fn test_config_deserialize_empty() {
        // Empty TOML should produce defaults
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    // =============================================================
    // TOML parsing tests
    // =============================================================

    #[test]
    fn test_config_full_document() {
        let toml_str = r#"
[replay]
log_level = "verbose"
validation = true
offscreen_width = 1920
offscreen_height = 1080

[plugins]
search_dirs = ["/usr/lib/gfxreplay"]

[plugins.tracer_modules]
"2" = "vk_replay"
"1" = "gl_fps"

[plugin_settings.vk_replay]
skip_fence_waits = true
"#;
        let config: Config = toml::from_str(toml_str).unwrap();

        assert_eq!(
            config.replay_options(),
            ReplayOptions {
                validation: true,
                log_level: LogLevel::Verbose,
            }
        );
        assert_eq!(
            config.surface_target(Some(7)),
            Some(SurfaceTarget::Offscreen {
                width: 1920,
                height: 1080
            })
        );
        let modules = config.tracer_modules();
        assert_eq!(modules.module_for(TracerId::VULKAN), Some("vk_replay"));
        assert_eq!(modules.module_for(TracerId::GL_FPS), Some("gl_fps"));

        let settings = config.settings_for("vk_replay");
        assert_eq!(settings.len(), 1);
        assert_eq!(settings[0].key, "skip_fence_waits");
        assert_eq!(settings[0].value, SettingValue::Bool(true));
        assert!(config.settings_for("other").is_empty());
    }

    #[test]
    fn test_window_surface_when_no_offscreen_size() {
        let toml_str = r#"
[replay]
offscreen_width = 640
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.surface_target(Some(42)),
            Some(SurfaceTarget::Window { handle: 42 })
        );
    }

    #[test]
    fn test_non_numeric_tracer_key_ignored() {
        let toml_str = r#"
[plugins.tracer_modules]
"vulkan" = "vk_replay"
"3" = "vk_fps"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let modules = config.tracer_modules();
        assert_eq!(modules.entries(), vec![(TracerId::VULKAN_FPS, "vk_fps")]);
    }

    #[test]
    fn test_invalid_log_level_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[replay]\nlog_level = \"loud\"\n").unwrap();

        let err = load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    // =============================================================
    // Persistence tests
    // =============================================================

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = Config::default();
        config.replay.log_level = LogLevel::Debug;
        config.plugins.search_dirs.push(PathBuf::from("/opt/gfxreplay/plugins"));
        config
            .plugin_settings
            .entry("vulkan_replay".to_string())
            .or_default()
            .insert("max_frames".to_string(), SettingValue::Int(300));

        save_to(&path, &config).unwrap();
        assert_eq!(load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_from(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
