// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Replaces compile-time switches: the loaded value is passed explicitly into
// renderer initialization. Missing file => defaults, malformed file => error.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub scene: SceneConfig,
    pub camera: CameraConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Notes".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// How the swapchain image count is derived from `minImageCount + 1`
/// when the surface reports a maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImageCountPolicy {
    /// `min(min + 1, max)`
    #[default]
    Clamp,
    /// `(min + 1) % max`, rejected when the result falls below `min`
    Modulo,
}

/// Graphics settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub validation: bool,
    pub present_mode: String,
    pub image_count_policy: ImageCountPolicy,
    pub min_device_memory_mb: u64,
    pub require_geometry_shader: bool,
    pub clear_color: [f32; 4],
    pub target_fps: u32,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            validation: true,
            present_mode: "mailbox".to_string(),
            image_count_policy: ImageCountPolicy::Clamp,
            min_device_memory_mb: 1024,
            require_geometry_shader: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            target_fps: 60,
        }
    }
}

/// Which demo the frame loop drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DemoKind {
    Triangle,
    #[default]
    Grid,
    Model,
}

impl std::str::FromStr for DemoKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "triangle" => Ok(DemoKind::Triangle),
            "grid" => Ok(DemoKind::Grid),
            "model" => Ok(DemoKind::Model),
            other => anyhow::bail!("Unknown demo '{}' (expected triangle, grid or model)", other),
        }
    }
}

/// Scene settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub demo: DemoKind,
    pub grid_size: u32,
    pub model_path: PathBuf,
    /// PNG for the model demo; a 1x1 white texture when unset
    pub texture_path: Option<PathBuf>,
    pub vertex_shader: String,
    pub fragment_shader: String,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            demo: DemoKind::Grid,
            grid_size: 64,
            model_path: PathBuf::from("assets/model.obj"),
            texture_path: None,
            vertex_shader: String::new(),
            fragment_shader: String::new(),
        }
    }
}

/// Free-fly camera settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: [f32; 3],
    pub speed: f32,
    /// Degrees per second
    pub turn_speed: f32,
    /// Vertical field of view in degrees
    pub fov_y: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 3.0],
            speed: 2.5,
            turn_speed: 90.0,
            fov_y: 45.0,
        }
    }
}

/// Debug settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
            log_file: "vulkan_notes.log".to_string(),
            show_fps: true,
        }
    }
}

/// Where a loaded `Config` came from. Loading runs before the logger exists,
/// so the caller reports this once logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults { missing: PathBuf },
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => log::info!("Loaded configuration from {:?}", path),
            ConfigSource::Defaults { missing } => {
                log::info!("Config file not found at {:?}, using defaults", missing)
            }
        }
    }
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// A missing file yields the defaults; a file that exists but does not
    /// parse is an error.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<(Self, ConfigSource)> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok((
                Config::default(),
                ConfigSource::Defaults {
                    missing: path.to_path_buf(),
                },
            ));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok((config, ConfigSource::File(path.to_path_buf())))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Preferred present mode as Vulkan enum. FIFO is always the fallback
    /// when the surface does not offer the preferred one.
    pub fn preferred_present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to MAILBOX",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::MAILBOX
            }
        }
    }

    /// Heap 0 threshold used during adapter selection
    pub fn min_device_memory_bytes(&self) -> vk::DeviceSize {
        self.graphics.min_device_memory_mb * 1024 * 1024
    }
}
