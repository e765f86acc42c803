use serde::{Deserialize, Serialize};
use std::fmt;

/// Current settings schema version.
pub const SETTINGS_VERSION: u32 = 1;

/// Output image formats a profile can convert to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageType {
    #[serde(alias = "JPEG")]
    Jpeg,
    #[serde(alias = "PNG")]
    Png,
    #[serde(alias = "WEBP")]
    Webp,
    #[serde(alias = "GIF")]
    Gif,
    #[serde(alias = "TIFF")]
    Tiff,
}

impl ImageType {
    /// Canonical file extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            ImageType::Jpeg => "jpg",
            ImageType::Png => "png",
            ImageType::Webp => "webp",
            ImageType::Gif => "gif",
            ImageType::Tiff => "tiff",
        }
    }

    /// Guess the format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageType::Jpeg),
            "png" => Some(ImageType::Png),
            "webp" => Some(ImageType::Webp),
            "gif" => Some(ImageType::Gif),
            "tif" | "tiff" => Some(ImageType::Tiff),
            _ => None,
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A named compression configuration handed to the compressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: String,
    pub id: u32,
    pub active: bool,
    pub should_resize: bool,
    pub should_convert: bool,
    pub should_overwrite: bool,
    pub enable_lossy: bool,
    pub keep_metadata: bool,
    #[serde(alias = "add_posfix")]
    pub add_postfix: bool,
    pub convert_extension: ImageType,
    pub postfix: String,
    pub resize_width: u32,
    pub resize_height: u32,
    pub jpeg_quality: u32,
    pub png_quality: u32,
    pub webp_quality: u32,
    pub gif_quality: u32,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            id: 0,
            active: true,
            should_resize: false,
            should_convert: false,
            should_overwrite: false,
            enable_lossy: true,
            keep_metadata: true,
            add_postfix: true,
            convert_extension: ImageType::Webp,
            postfix: ".min".to_string(),
            resize_width: 1000,
            resize_height: 1000,
            jpeg_quality: 80,
            png_quality: 80,
            webp_quality: 80,
            gif_quality: 80,
        }
    }
}

impl Profile {
    /// A fresh, inactive profile with default parameters.
    pub fn with_name(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            active: false,
            ..Self::default()
        }
    }

    /// Quality setting for the given target format.
    ///
    /// TIFF has no quality knob; it reuses the JPEG value.
    pub fn quality_for(&self, image_type: ImageType) -> u32 {
        match image_type {
            ImageType::Jpeg | ImageType::Tiff => self.jpeg_quality,
            ImageType::Png => self.png_quality,
            ImageType::Webp => self.webp_quality,
            ImageType::Gif => self.gif_quality,
        }
    }
}

/// External encoder invocation used by [`crate::services::CommandCompressor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorConfig {
    /// Encoder executable
    pub program: String,
    /// Argument template; see `CommandCompressor` for the placeholders
    pub args: Vec<String>,
    /// Per-image timeout in seconds
    pub timeout_secs: u64,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            program: "vips".to_string(),
            args: vec![
                "copy".to_string(),
                "{input}".to_string(),
                "{output}[Q={quality},strip={strip}]".to_string(),
            ],
            timeout_secs: 120,
        }
    }
}

/// Application settings.
///
/// `threads == 0` means "one compression per available CPU".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub version: u32,
    pub threads: u32,
    pub profiles: Vec<Profile>,
    pub compressor: CompressorConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            threads: 0,
            profiles: vec![Profile::default()],
            compressor: CompressorConfig::default(),
        }
    }
}

impl Settings {
    /// The active profile, or the first one when none is flagged active.
    pub fn active_profile(&self) -> Profile {
        self.profiles
            .iter()
            .find(|p| p.active)
            .or_else(|| self.profiles.first())
            .cloned()
            .unwrap_or_default()
    }

    pub fn profile(&self, id: u32) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    /// Resolve the configured thread count against the CPU count.
    pub fn effective_threads(&self, cpu_count: usize) -> usize {
        if self.threads == 0 {
            cpu_count.max(1)
        } else {
            self.threads as usize
        }
    }
}
