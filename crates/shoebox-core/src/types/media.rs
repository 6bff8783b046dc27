//! Local media asset types and export preferences.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::AssetId;

/// Kind of a media asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// A still photo.
    Photo,
    /// A video clip.
    Video,
}

impl MediaKind {
    /// Return the kind as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
        }
    }
}

/// A locally-available media item resolved from the platform's library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    /// Stable asset identifier.
    pub id: AssetId,
    /// Original file name of the asset.
    pub name: String,
    /// Photo or video.
    pub kind: MediaKind,
    /// When the asset was captured.
    pub created_at: DateTime<Utc>,
}

/// Preferences handed to the exporter when producing a transferable file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportPreferences {
    /// Formats the export should convert into when the source format is not
    /// directly uploadable (e.g. `"jpeg"`, `"mp4"`). Empty means "keep the
    /// original representation".
    pub preferred_formats: Vec<String>,
    /// Keep the asset's original file name.
    pub preserve_original_name: bool,
}

/// The exporter's product: a local file ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedMedia {
    /// File name to use for the uploaded item.
    pub name: String,
    /// Location of the exported file on local disk.
    pub source: PathBuf,
}
