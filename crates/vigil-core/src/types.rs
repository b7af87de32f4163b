use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Numeric identity assigned at enrollment time.
///
/// The recognizer reports matches by this number; the watchlist directory
/// maps it back to a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub u32);

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for IdentityId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(IdentityId)
    }
}

/// Convert the recognizer's raw distance into a similarity percentage.
///
/// Lower distance means a closer match, so the scale is inverted:
/// distance 0 reads as 100%, distance 100 as 0%.
pub fn similarity_percent(raw_distance: f32) -> i32 {
    (100.0 - raw_distance).round() as i32
}

/// Face bounding box reported by the detector, in pixel coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One identified face within a frame event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceObservation {
    pub id: IdentityId,
    /// Raw recognizer distance (0 = identical).
    pub distance: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

impl FaceObservation {
    /// Similarity percentage for this observation.
    pub fn similarity(&self) -> i32 {
        similarity_percent(self.distance)
    }
}

/// Event emitted by the observation source, one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceEvent {
    /// One processed video frame with zero or more identified faces.
    Frame {
        #[serde(default)]
        faces: Vec<FaceObservation>,
        /// Base64-encoded JPEG of the annotated frame, when available.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jpeg: Option<String>,
    },
    /// The operator requested a manual capture of the current frame.
    Manual,
}
