//! Instant upload configuration.

use serde::{Deserialize, Serialize};

/// Settings for enqueueing newly captured assets automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstantUploadConfig {
    /// Enqueue new photos.
    #[serde(default)]
    pub photos: bool,
    /// Enqueue new videos.
    #[serde(default)]
    pub videos: bool,
    /// Remote folder that receives instant uploads.
    #[serde(default = "default_target_path")]
    pub target_path: String,
}

impl InstantUploadConfig {
    /// Whether any media kind is enabled for instant upload.
    pub fn enabled(&self) -> bool {
        self.photos || self.videos
    }
}

impl Default for InstantUploadConfig {
    fn default() -> Self {
        Self {
            photos: false,
            videos: false,
            target_path: default_target_path(),
        }
    }
}

fn default_target_path() -> String {
    "/Camera Uploads".to_string()
}
