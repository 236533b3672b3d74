/// Configuration module for blocksaver.
///
/// Handles loading, validating, and providing default configuration values
/// for context collection, command execution, the injected surface and the
/// file watcher.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ── Default value functions ──────────────────────────────────────────

fn default_preceding_siblings() -> usize {
    5
}

fn default_parent_siblings() -> usize {
    3
}

fn default_grandparent_siblings() -> usize {
    2
}

fn default_max_chars() -> usize {
    3000
}

fn default_label_siblings() -> usize {
    3
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_timeout_secs() -> u64 {
    300
}

fn default_shell() -> String {
    "/bin/sh".to_string()
}

fn default_overlay_class() -> String {
    "aic-modal-overlay".to_string()
}

fn default_preview_class() -> String {
    "aic-exec-preview".to_string()
}

fn default_wrapper_class() -> String {
    "aic-block-wrapper".to_string()
}

fn default_button_class() -> String {
    "aic-action".to_string()
}

fn default_debounce_ms() -> u64 {
    250
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub execute: ExecuteConfig,

    #[serde(default)]
    pub surface: SurfaceConfig,

    #[serde(default)]
    pub watch: WatchConfig,
}

/// How much of the document around a block is read when guessing its name.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    #[serde(default = "default_preceding_siblings")]
    pub preceding_siblings: usize,

    #[serde(default = "default_parent_siblings")]
    pub parent_siblings: usize,

    #[serde(default = "default_grandparent_siblings")]
    pub grandparent_siblings: usize,

    /// Cap on the joined context text, in characters.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Preceding siblings (per nesting level) checked for heading/bold labels.
    #[serde(default = "default_label_siblings")]
    pub label_siblings: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ExecuteConfig {
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    #[serde(default = "default_max_timeout_secs")]
    pub max_timeout_secs: u64,

    #[serde(default = "default_shell")]
    pub shell: String,
}

/// Class names of the elements the action surface injects into a document.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct SurfaceConfig {
    #[serde(default = "default_overlay_class")]
    pub overlay_class: String,

    #[serde(default = "default_preview_class")]
    pub preview_class: String,

    #[serde(default = "default_wrapper_class")]
    pub wrapper_class: String,

    #[serde(default = "default_button_class")]
    pub button_class: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            preceding_siblings: default_preceding_siblings(),
            parent_siblings: default_parent_siblings(),
            grandparent_siblings: default_grandparent_siblings(),
            max_chars: default_max_chars(),
            label_siblings: default_label_siblings(),
        }
    }
}

impl Default for ExecuteConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            max_timeout_secs: default_max_timeout_secs(),
            shell: default_shell(),
        }
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            overlay_class: default_overlay_class(),
            preview_class: default_preview_class(),
            wrapper_class: default_wrapper_class(),
            button_class: default_button_class(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl ExecuteConfig {
    /// Clamp a requested timeout into `1..=max_timeout_secs`.
    #[must_use]
    pub fn clamp_timeout(&self, secs: u64) -> u64 {
        secs.clamp(1, self.max_timeout_secs.max(1))
    }
}

impl Config {
    /// `<config dir>/blocksaver/config.json`, when the platform has a config dir.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("blocksaver").join("config.json"))
    }

    /// Load configuration from a JSON file.
    ///
    /// A missing file yields the defaults. A file that is not valid JSON is
    /// reported and also yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("{} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {}: {e}", path.display());
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {}", path.display());
        Ok(cfg)
    }

    /// Save configuration to a JSON file, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data)
            .with_context(|| format!("failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.context.max_chars > 0,
            "context.max_chars must be positive"
        );
        anyhow::ensure!(
            self.execute.default_timeout_secs > 0,
            "execute.default_timeout_secs must be positive"
        );
        anyhow::ensure!(
            self.execute.default_timeout_secs <= self.execute.max_timeout_secs,
            "execute.default_timeout_secs must not exceed execute.max_timeout_secs"
        );
        anyhow::ensure!(
            !self.execute.shell.is_empty(),
            "execute.shell must be specified"
        );
        anyhow::ensure!(
            !self.surface.overlay_class.is_empty() && !self.surface.preview_class.is_empty(),
            "surface class names must not be empty"
        );
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.context.preceding_siblings, 5);
        assert_eq!(config.context.parent_siblings, 3);
        assert_eq!(config.context.grandparent_siblings, 2);
        assert_eq!(config.context.max_chars, 3000);
        assert_eq!(config.execute.default_timeout_secs, 30);
        assert_eq!(config.execute.shell, "/bin/sh");
        assert_eq!(config.surface.overlay_class, "aic-modal-overlay");
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"context": {"max_chars": 1000}, "execute": {"shell": "/bin/bash"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.context.max_chars, 1000);
        assert_eq!(config.execute.shell, "/bin/bash");
        // Other fields should have defaults
        assert_eq!(config.context.preceding_siblings, 5);
        assert_eq!(config.execute.default_timeout_secs, 30);
        assert_eq!(config.watch.debounce_ms, 250);
    }

    #[test]
    fn test_validate_ok() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_timeout() {
        let mut config = Config::default();
        config.execute.default_timeout_secs = 600;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_clamp_timeout() {
        let execute = ExecuteConfig::default();
        assert_eq!(execute.clamp_timeout(0), 1);
        assert_eq!(execute.clamp_timeout(45), 45);
        assert_eq!(execute.clamp_timeout(9000), 300);
    }

    #[test]
    fn test_load_missing_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        let config = Config::load(&missing).unwrap();
        assert_eq!(config.context.max_chars, 3000);

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        let config = Config::load(&broken).unwrap();
        assert_eq!(config.execute.default_timeout_secs, 30);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::default();
        config.watch.debounce_ms = 900;
        config.save(&path).unwrap();

        let parsed = Config::load(&path).unwrap();
        assert_eq!(parsed.watch.debounce_ms, 900);
        assert_eq!(parsed.surface, config.surface);
    }
}
