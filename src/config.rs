// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section and key is optional; anything missing takes its default.
// A missing file is not an error, a malformed one is.

use crate::assets::Identifier;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
    pub assets: AssetsConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Game".to_string(),
            width: 800,
            height: 600,
            resizable: true,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Preferred present mode; FIFO is used when the surface lacks it.
    pub present_mode: String,
    pub clear_color: [f32; 4],
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "info".to_string(),
        }
    }
}

/// Asset locations
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub root: String,
    pub vertex_shader: Identifier,
    pub fragment_shader: Identifier,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            root: "mods".to_string(),
            vertex_shader: Identifier::new("core", "mesh.vert"),
            fragment_shader: Identifier::new("core", "mesh.frag"),
        }
    }
}

/// Where a loaded configuration came from. Loading runs before the logger
/// exists, so the caller reports this once logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No file at the given path
    Defaults(PathBuf),
}

impl Config {
    /// Load configuration from a specific path; a missing file yields defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<(Self, ConfigSource)> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok((Config::default(), ConfigSource::Defaults(path.to_path_buf())));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok((config, ConfigSource::File(path.to_path_buf())))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Preferred present mode as Vulkan enum
    pub fn preferred_present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to MAILBOX",
                    self.graphics.present_mode
                );
                ash::vk::PresentModeKHR::MAILBOX
            }
        }
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.debug.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.preferred_present_mode(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.assets.root, "mods");
        assert_eq!(config.assets.vertex_shader, Identifier::new("core", "mesh.vert"));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::parse(
            r#"
            [window]
            title = "Quad"

            [graphics]
            present_mode = "FIFO"
            clear_color = [0.1, 0.2, 0.3, 1.0]

            [assets]
            fragment_shader = "demo:flat"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "Quad");
        assert_eq!(config.window.width, 800);
        assert_eq!(config.preferred_present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(config.graphics.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(config.assets.fragment_shader, Identifier::new("demo", "flat"));
        assert_eq!(config.assets.vertex_shader, Identifier::new("core", "mesh.vert"));
    }

    #[test]
    fn malformed_identifier_is_rejected() {
        let result = Config::parse(
            r#"
            [assets]
            vertex_shader = "no-namespace"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn unknown_values_fall_back() {
        let config = Config::parse(
            r#"
            [graphics]
            present_mode = "warp"

            [debug]
            log_level = "chatty"
            "#,
        )
        .unwrap();
        assert_eq!(config.preferred_present_mode(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let (config, source) = Config::load_from_path("definitely/not/here/config.toml").unwrap();
        assert!(config.debug.validation_layers);
        assert_eq!(
            source,
            ConfigSource::Defaults(PathBuf::from("definitely/not/here/config.toml"))
        );
    }

    #[test]
    fn existing_file_reports_its_path() {
        let dir = std::env::temp_dir().join(format!("quad-renderer-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[window]\nwidth = 1024\n").unwrap();

        let (config, source) = Config::load_from_path(&path).unwrap();

        assert_eq!(config.window.width, 1024);
        assert_eq!(source, ConfigSource::File(path.clone()));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = std::env::temp_dir().join(format!("quad-renderer-bad-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[window\n").unwrap();

        assert!(Config::load_from_path(&path).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
