//! Media export preferences.

use serde::{Deserialize, Serialize};

use crate::types::media::ExportPreferences;

/// User-facing media conversion settings.
///
/// These settings are translated into [`ExportPreferences`] handed to the
/// exporter; the actual format conversion is entirely delegated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Convert HEIC photos to JPEG before uploading.
    #[serde(default = "default_true")]
    pub convert_heic: bool,
    /// Convert QuickTime videos to MP4 before uploading.
    #[serde(default = "default_true")]
    pub convert_videos_to_mp4: bool,
    /// Keep the asset's original file name instead of a generated one.
    #[serde(default)]
    pub preserve_original_names: bool,
}

impl MediaConfig {
    /// Derive the exporter preferences from the conversion flags.
    pub fn export_preferences(&self) -> ExportPreferences {
        let mut preferred_formats = Vec::new();
        if self.convert_heic {
            preferred_formats.push("jpeg".to_string());
        }
        if self.convert_videos_to_mp4 {
            preferred_formats.push("mp4".to_string());
        }
        ExportPreferences {
            preferred_formats,
            preserve_original_name: self.preserve_original_names,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            convert_heic: true,
            convert_videos_to_mp4: true,
            preserve_original_names: false,
        }
    }
}

fn default_true() -> bool {
    true
}
