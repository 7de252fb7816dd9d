use crate::error::Result;
use glam::UVec2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Window size presets, plus a free-form size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowFormat {
    Size640x480,
    Size1280x720,
    Size1366x768,
    Size1600x900,
    Size1920x1080,
    Custom { width: u32, height: u32 },
}

impl WindowFormat {
    pub fn size(&self) -> UVec2 {
        match *self {
            Self::Size640x480 => UVec2::new(640, 480),
            Self::Size1280x720 => UVec2::new(1280, 720),
            Self::Size1366x768 => UVec2::new(1366, 768),
            Self::Size1600x900 => UVec2::new(1600, 900),
            Self::Size1920x1080 => UVec2::new(1920, 1080),
            Self::Custom { width, height } => UVec2::new(width, height),
        }
    }

    pub fn from_size(width: u32, height: u32) -> Self {
        match (width, height) {
            (640, 480) => Self::Size640x480,
            (1280, 720) => Self::Size1280x720,
            (1366, 768) => Self::Size1366x768,
            (1600, 900) => Self::Size1600x900,
            (1920, 1080) => Self::Size1920x1080,
            _ => Self::Custom { width, height },
        }
    }

    pub fn is_valid(&self) -> bool {
        let size = self.size();
        size.x > 0 && size.y > 0
    }
}

impl Default for WindowFormat {
    fn default() -> Self {
        Self::Size1280x720
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub format: WindowFormat,
    pub vsync: bool,
    pub fullscreen: bool,
    /// MSAA sample count handed to the backend before the window exists.
    pub samples: u32,
    pub gui_enabled: bool,
    pub grid_enabled: bool,
    pub clear_color: [f32; 4],
    pub init_timeout_ms: u64,
    pub default_hdr_buffers: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "engine-graphics".to_string(),
            format: WindowFormat::default(),
            vsync: true,
            fullscreen: false,
            samples: 4,
            gui_enabled: true,
            grid_enabled: false,
            clear_color: [0.1, 0.1, 0.12, 1.0],
            init_timeout_ms: 10_000,
            default_hdr_buffers: 3,
        }
    }
}

impl WindowConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn swap_interval(&self) -> u32 {
        u32::from(self.vsync)
    }
}

#[cfg(test)]
mod tests {
    use super::{WindowConfig, WindowFormat};
    use pretty_assertions::assert_eq;

    #[test]
    fn config_survives_a_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("window.json");
        let config = WindowConfig {
            title: "Editor".to_string(),
            format: WindowFormat::Custom {
                width: 1024,
                height: 600,
            },
            vsync: false,
            ..WindowConfig::default()
        };
        config.save(&path).unwrap();
        let loaded = WindowConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: WindowConfig = serde_json::from_str(r#"{ "title": "Game" }"#).unwrap();
        assert_eq!(config.title, "Game");
        assert_eq!(config.format, WindowFormat::Size1280x720);
        assert_eq!(config.default_hdr_buffers, 3);
    }

    #[test]
    fn format_presets_map_back_from_size() {
        assert_eq!(WindowFormat::from_size(1920, 1080), WindowFormat::Size1920x1080);
        assert_eq!(
            WindowFormat::from_size(10, 20),
            WindowFormat::Custom {
                width: 10,
                height: 20
            }
        );
        assert!(!WindowFormat::Custom { width: 0, height: 5 }.is_valid());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = WindowConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, crate::error::GraphicsError::Io(_)));
    }
}
