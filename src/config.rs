// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
    pub controls: ControlsConfig,
    pub scene: SceneConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "vkforge".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            clear_color: [0.01, 0.01, 0.03, 1.0],
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
            show_fps: false,
        }
    }
}

/// Camera control tuning
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub move_speed: f32,
    pub turn_speed: f32,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            move_speed: 3.0,
            turn_speed: 6.0,
        }
    }
}

/// Content loaded at startup
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SceneConfig {
    pub models: Vec<ModelConfig>,
}

/// One model instance placed in the scene
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub obj: String,
    pub diffuse_texture: Option<String>,
    pub normal_texture: Option<String>,
    pub translation: [f32; 3],
    pub rotation_deg: [f32; 3],
    pub scale: [f32; 3],
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            obj: String::new(),
            diffuse_texture: None,
            normal_texture: None,
            translation: [0.0; 3],
            rotation_deg: [0.0; 3],
            scale: [1.0; 3],
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get present mode as Vulkan enum
    pub fn get_present_mode(&self) -> ash::vk::PresentModeKHR {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert!(config.scene.models.is_empty());
        assert_eq!(config.controls.move_speed, 3.0);
    }

    #[test]
    fn partial_toml_keeps_defaults_for_the_rest() {
        let config: Config = toml::from_str(
            r#"
            [window]
            title = "test"
            width = 640
            "#,
        )
        .unwrap();
        assert_eq!(config.window.title, "test");
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.graphics.present_mode, "mailbox");
    }

    #[test]
    fn scene_models_parse_with_optional_textures() {
        let config: Config = toml::from_str(
            r#"
            [[scene.models]]
            obj = "models/crate.obj"
            diffuse_texture = "textures/crate.png"
            translation = [0.0, 1.0, 2.5]
            rotation_deg = [0.0, 90.0, 0.0]
            scale = [0.5, 0.5, 0.5]

            [[scene.models]]
            obj = "models/floor.obj"
            "#,
        )
        .unwrap();
        assert_eq!(config.scene.models.len(), 2);
        let first = &config.scene.models[0];
        assert_eq!(first.obj, "models/crate.obj");
        assert_eq!(first.diffuse_texture.as_deref(), Some("textures/crate.png"));
        assert!(first.normal_texture.is_none());
        assert_eq!(first.translation, [0.0, 1.0, 2.5]);
        let second = &config.scene.models[1];
        assert!(second.diffuse_texture.is_none());
        assert_eq!(second.scale, [1.0; 3]);
    }

    #[test]
    fn present_mode_parses_known_names() {
        let mut config = Config::default();
        for (name, expected) in [
            ("immediate", ash::vk::PresentModeKHR::IMMEDIATE),
            ("Mailbox", ash::vk::PresentModeKHR::MAILBOX),
            ("FIFO", ash::vk::PresentModeKHR::FIFO),
            ("fifo_relaxed", ash::vk::PresentModeKHR::FIFO_RELAXED),
            ("bogus", ash::vk::PresentModeKHR::MAILBOX),
        ] {
            config.graphics.present_mode = name.to_string();
            assert_eq!(config.get_present_mode(), expected);
        }
    }
}
