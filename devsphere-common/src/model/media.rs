use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use thiserror::Error;

const VIDEO_EXTENSIONS: [&str; 7] = ["mp4", "avi", "mov", "mkv", "webm", "flv", "wmv"];
const GIF_EXTENSIONS: [&str; 1] = ["gif"];
const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "bmp", "svg"];

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    None,
    Image,
    Video,
    Gif,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Unknown media type: {0:?}")]
pub struct InvalidMediaKindError(String);

impl MediaKind {
    /// Classifies an uploaded file by its extension, case-insensitively.
    ///
    /// Files with an unrecognized extension are still accepted as [`MediaKind::None`].
    #[must_use]
    pub fn classify(file_name: &str) -> Self {
        let Some(extension) = file_extension(file_name) else {
            return MediaKind::None;
        };
        let extension = extension.as_str();

        if VIDEO_EXTENSIONS.contains(&extension) {
            MediaKind::Video
        } else if GIF_EXTENSIONS.contains(&extension) {
            MediaKind::Gif
        } else if IMAGE_EXTENSIONS.contains(&extension) {
            MediaKind::Image
        } else {
            MediaKind::None
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::None => "none",
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Gif => "gif",
        }
    }
}

/// Lowercase extension of `file_name`, if it has one.
#[must_use]
pub fn file_extension(file_name: &str) -> Option<String> {
    let (_, extension) = file_name.rsplit_once('.')?;
    (!extension.is_empty()).then(|| extension.to_lowercase())
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = InvalidMediaKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(MediaKind::None),
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            "gif" => Ok(MediaKind::Gif),
            other => Err(InvalidMediaKindError(other.to_owned())),
        }
    }
}
