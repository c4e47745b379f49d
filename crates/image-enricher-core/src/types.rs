use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Supported image formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Tiff,
    Heic,
    Webp,
}

impl ImageFormat {
    /// Determine format from file extension, `None` for anything unsupported
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "bmp" => Some(Self::Bmp),
            "tif" | "tiff" => Some(Self::Tiff),
            "heic" | "heif" => Some(Self::Heic),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }
}

/// One tracked image file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAsset {
    /// ID in the database
    pub id: i64,

    /// Absolute path to the image file, unique across the collection
    pub path: PathBuf,

    /// File name shown to users
    pub file_name: String,

    /// File size in bytes
    pub size: u64,

    /// When the scanner first saw the file
    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// A scanned file that has not been stored yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewAsset {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
}

/// Camera metadata decoded from the embedded EXIF block.
///
/// Every field is optional: `None` means the tag was missing or unusable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExifRecord {
    pub date_taken: Option<NaiveDateTime>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub lens_model: Option<String>,
    pub iso: Option<u32>,
    pub aperture: Option<f64>,
    pub shutter_speed: Option<String>,
    pub focal_length: Option<f64>,
    pub orientation: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
    pub gps_altitude: Option<f64>,
}

impl ExifRecord {
    pub fn has_gps(&self) -> bool {
        self.gps_latitude.is_some() && self.gps_longitude.is_some()
    }
}

/// Structured content recovered from a vision model response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub description: String,
    pub objects: Vec<String>,
    pub people: Vec<String>,
    pub scene_type: String,
    pub activities: Vec<String>,
    pub confidence: f64,
}

/// Stored analysis for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub analyzed_at: DateTime<Utc>,
    pub result: AnalysisResult,

    /// Model output exactly as received
    pub raw_response: String,
}

/// Tag categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagCategory {
    Object,
    Person,
    Scene,
    Activity,
}

impl TagCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagCategory::Object => "object",
            TagCategory::Person => "person",
            TagCategory::Scene => "scene",
            TagCategory::Activity => "activity",
        }
    }
}

impl fmt::Display for TagCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "object" => Ok(TagCategory::Object),
            "person" => Ok(TagCategory::Person),
            "scene" => Ok(TagCategory::Scene),
            "activity" => Ok(TagCategory::Activity),
            other => Err(format!("unknown tag category: {}", other)),
        }
    }
}

/// A searchable label attached to an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub image_id: i64,
    pub name: String,
    pub category: TagCategory,
    pub confidence: f64,
}

/// Which derived record an asset is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingKind {
    Exif,
    Analysis,
}
