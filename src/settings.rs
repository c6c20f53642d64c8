//! Persistent settings
//!
//! Stored as XML at `<config dir>/Domecast/settings.xml`:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <DomecastSettings pitch="0" yaw="0" roll="0" fov="210" resolution="1024" ...>
//!   <output name="Dome" kind="Ndi" view="Fisheye" enabled="true" pixelFormat="Bgra8"/>
//! </DomecastSettings>
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::de::from_str;
use quick_xml::se::to_string;
use serde::{Deserialize, Serialize};

use crate::network::{NdiSink, PngSequenceSink};
use crate::projection::controls::{ControlSnapshot, DEFAULT_FOV_DEGREES, DEFAULT_SIZE_PERCENTAGE};
use crate::projection::mapping::{clamp_fov_degrees, clamp_size_percentage};
use crate::projection::pipeline::DEFAULT_RESOLUTION;
use crate::projection::standard::DEFAULT_STANDARD_SIZE;
use crate::projection::target::normalize_resolution;
use crate::projection::{PipelineConfig, ViewSelection};
use crate::transfer::{FrameSink, PixelFormat, TransportError};

pub const DEFAULT_TARGET_FPS: u32 = 70;
pub const MIN_TARGET_FPS: u32 = 1;
pub const MAX_TARGET_FPS: u32 = 240;

/// Transport used by a configured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputType {
    #[default]
    Ndi,
    PngSequence,
}

/// One configured output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@kind", default)]
    pub kind: OutputType,
    #[serde(rename = "@view", default)]
    pub view: ViewSelection,
    #[serde(rename = "@enabled", default = "default_enabled")]
    pub enabled: bool,
    /// Pixel order sent to the receiver (NDI only; PNG is always RGBA)
    #[serde(rename = "@pixelFormat", default = "default_pixel_format")]
    pub pixel_format: PixelFormat,
    /// Output directory for PNG sequences
    #[serde(rename = "@path", default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_pixel_format() -> PixelFormat {
    PixelFormat::Bgra8
}

impl OutputConfig {
    pub fn ndi(name: &str, view: ViewSelection) -> Self {
        Self {
            name: name.to_string(),
            kind: OutputType::Ndi,
            view,
            enabled: true,
            pixel_format: default_pixel_format(),
            path: None,
        }
    }

    pub fn png_sequence(name: &str, view: ViewSelection, directory: impl AsRef<Path>) -> Self {
        Self {
            name: name.to_string(),
            kind: OutputType::PngSequence,
            view,
            enabled: true,
            pixel_format: PixelFormat::Rgba8,
            path: Some(directory.as_ref().to_string_lossy().to_string()),
        }
    }

    /// Directory a PNG sequence writes to when no path is configured.
    fn default_directory(&self) -> PathBuf {
        dirs::video_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Domecast")
            .join(&self.name)
    }

    /// Build the sink for this output.
    pub fn create_sink(&self, frame_rate: u32) -> Result<Box<dyn FrameSink>, TransportError> {
        match self.kind {
            OutputType::Ndi => Ok(Box::new(NdiSink::new(&self.name, frame_rate).with_pixel_format(self.pixel_format))),
            OutputType::PngSequence => {
                let directory = self
                    .path
                    .as_ref()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| self.default_directory());
                Ok(Box::new(PngSequenceSink::new(&self.name, directory)?))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "DomecastSettings", default)]
pub struct DomeSettings {
    /// Radians
    #[serde(rename = "@pitch")]
    pub pitch: f32,
    #[serde(rename = "@yaw")]
    pub yaw: f32,
    #[serde(rename = "@roll")]
    pub roll: f32,
    /// Fisheye field of view in degrees
    #[serde(rename = "@fov")]
    pub fov: f32,
    #[serde(rename = "@sizePercentage")]
    pub size_percentage: f32,
    /// Cube face resolution
    #[serde(rename = "@resolution")]
    pub resolution: u32,
    #[serde(rename = "@view")]
    pub view: ViewSelection,
    #[serde(rename = "@standardWidth")]
    pub standard_width: u32,
    #[serde(rename = "@standardHeight")]
    pub standard_height: u32,
    /// Orientation SLERP factor per frame
    #[serde(rename = "@damping")]
    pub damping: f32,
    #[serde(rename = "@targetFps")]
    pub target_fps: u32,
    #[serde(rename = "output")]
    pub outputs: Vec<OutputConfig>,
}

impl Default for DomeSettings {
    fn default() -> Self {
        Self {
            pitch: 0.0,
            yaw: 0.0,
            roll: 0.0,
            fov: DEFAULT_FOV_DEGREES,
            size_percentage: DEFAULT_SIZE_PERCENTAGE,
            resolution: DEFAULT_RESOLUTION,
            view: ViewSelection::default(),
            standard_width: DEFAULT_STANDARD_SIZE.0,
            standard_height: DEFAULT_STANDARD_SIZE.1,
            damping: 1.0,
            target_fps: DEFAULT_TARGET_FPS,
            outputs: Vec::new(),
        }
    }
}

impl DomeSettings {
    /// Bring every field into its valid range.
    pub fn sanitize(&mut self) {
        for angle in [&mut self.pitch, &mut self.yaw, &mut self.roll] {
            if !angle.is_finite() {
                *angle = 0.0;
            }
        }
        self.fov = if self.fov.is_nan() {
            DEFAULT_FOV_DEGREES
        } else {
            clamp_fov_degrees(self.fov)
        };
        self.size_percentage = if self.size_percentage.is_nan() {
            DEFAULT_SIZE_PERCENTAGE
        } else {
            clamp_size_percentage(self.size_percentage)
        };
        self.resolution = normalize_resolution(self.resolution);
        self.standard_width = self.standard_width.max(1);
        self.standard_height = self.standard_height.max(1);
        self.damping = if self.damping.is_finite() {
            self.damping.clamp(0.01, 1.0)
        } else {
            1.0
        };
        self.target_fps = self.target_fps.clamp(MIN_TARGET_FPS, MAX_TARGET_FPS);

        for output in &mut self.outputs {
            if !output.view.is_transferable() {
                tracing::warn!(
                    output = %output.name,
                    "{} view is preview only; output switched to Fisheye",
                    output.view.display_name()
                );
                output.view = ViewSelection::Fisheye;
            }
        }
    }

    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("Domecast");
            p.push("settings.xml");
            p
        })
    }

    /// Load from the config directory, falling back to defaults.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Failed to load settings from {}: {}; using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        Self::from_xml(&contents)
    }

    pub fn from_xml(xml: &str) -> Result<Self, SettingsError> {
        let mut settings: Self = from_str(xml)?;
        settings.sanitize();
        Ok(settings)
    }

    pub fn to_xml(&self) -> Result<String, SettingsError> {
        let xml = to_string(self)?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml))
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::settings_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_xml()?)?;
        tracing::debug!("Settings saved to {}", path.display());
        Ok(())
    }

    pub fn control_snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            pitch: self.pitch,
            yaw: self.yaw,
            roll: self.roll,
            fov_degrees: self.fov,
            size_percentage: self.size_percentage,
            view: self.view,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            resolution: self.resolution,
            standard_size: (self.standard_width, self.standard_height),
            damping: self.damping,
        }
    }

    /// Copy the live control values back for saving.
    pub fn update_from(&mut self, controls: &ControlSnapshot, resolution: u32) {
        self.pitch = controls.pitch;
        self.yaw = controls.yaw;
        self.roll = controls.roll;
        self.fov = controls.fov_degrees;
        self.size_percentage = controls.size_percentage;
        self.view = controls.view;
        self.resolution = resolution;
    }

    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.target_fps.clamp(MIN_TARGET_FPS, MAX_TARGET_FPS) as f64)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::DeError),
    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::SeError),
    #[error("Could not find config directory")]
    NoConfigDir,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = DomeSettings::default();
        assert_eq!(settings.fov, 210.0);
        assert_eq!(settings.size_percentage, 100.0);
        assert_eq!(settings.resolution, 1024);
        assert_eq!(settings.target_fps, 70);
        assert_eq!(settings.view, ViewSelection::Fisheye);
        assert!(settings.outputs.is_empty());
    }

    #[test]
    fn test_sanitize_clamps() {
        let mut settings = DomeSettings {
            fov: 500.0,
            size_percentage: -3.0,
            resolution: 1001,
            target_fps: 1000,
            damping: f32::NAN,
            yaw: f32::INFINITY,
            ..Default::default()
        };
        settings.sanitize();
        assert_eq!(settings.fov, 360.0);
        assert_eq!(settings.size_percentage, 0.0);
        assert_eq!(settings.resolution, 1000);
        assert_eq!(settings.target_fps, 240);
        assert_eq!(settings.damping, 1.0);
        assert_eq!(settings.yaw, 0.0);

        settings.target_fps = 0;
        settings.resolution = 2;
        settings.sanitize();
        assert_eq!(settings.target_fps, 1);
        assert_eq!(settings.resolution, 64);
    }

    #[test]
    fn test_xml_keeps_outputs() {
        let mut settings = DomeSettings {
            pitch: 0.5,
            fov: 180.0,
            view: ViewSelection::Equirectangular,
            ..Default::default()
        };
        settings.outputs.push(OutputConfig::ndi("Dome", ViewSelection::Fisheye));
        settings
            .outputs
            .push(OutputConfig::png_sequence("Frames", ViewSelection::Equirectangular, "/tmp/frames"));

        let xml = settings.to_xml().unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<DomecastSettings"));

        let loaded = DomeSettings::from_xml(&xml).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.outputs[1].kind, OutputType::PngSequence);
        assert_eq!(loaded.outputs[1].path.as_deref(), Some("/tmp/frames"));
    }

    #[test]
    fn test_skybox_output_falls_back_to_fisheye() {
        let xml = r#"<DomecastSettings><output name="Preview" kind="Ndi" view="Cubemap"/><output name="Pano" kind="Ndi" view="Equirectangular"/></DomecastSettings>"#;
        let loaded = DomeSettings::from_xml(xml).unwrap();
        assert_eq!(loaded.outputs[0].view, ViewSelection::Fisheye);
        assert_eq!(loaded.outputs[1].view, ViewSelection::Equirectangular);
    }

    #[test]
    fn test_missing_attributes_use_defaults() {
        let loaded = DomeSettings::from_xml(r#"<DomecastSettings fov="190"/>"#).unwrap();
        assert_eq!(loaded.fov, 190.0);
        assert_eq!(loaded.resolution, DEFAULT_RESOLUTION);
        assert_eq!(loaded.target_fps, DEFAULT_TARGET_FPS);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        assert!(DomeSettings::from_xml("<DomecastSettings fov=").is_err());
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir()
            .join(format!("domecast-settings-{}", std::process::id()))
            .join("settings.xml");
        let settings = DomeSettings {
            target_fps: 30,
            ..Default::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(DomeSettings::load_from(&path).unwrap(), settings);
        if let Some(dir) = path.parent() {
            fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_png_output_creates_sink() {
        let dir = std::env::temp_dir().join(format!("domecast-settings-png-{}", std::process::id()));
        let config = OutputConfig::png_sequence("Offline", ViewSelection::Fisheye, &dir);
        let sink = config.create_sink(30).unwrap();
        assert_eq!(sink.name(), "Offline");
        assert_eq!(sink.preferred_format(), PixelFormat::Rgba8);
        fs::remove_dir_all(&dir).ok();
    }
}
