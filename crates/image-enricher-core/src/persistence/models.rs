use rusqlite::types::Type;
use rusqlite::Row;
use serde::Serialize;
use std::path::PathBuf;

use crate::types::{AnalysisRecord, AnalysisResult, ExifRecord, ImageAsset, Tag, TagCategory};

/// Selection criteria for browsing stored assets. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetFilter {
    pub has_exif: Option<bool>,
    pub has_analysis: Option<bool>,
    /// Exact tag label, matched case-insensitively
    pub tag: Option<String>,
    pub tag_category: Option<TagCategory>,
    pub within: Option<GpsBounds>,
    /// Substring of the file name
    pub name_contains: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Inclusive latitude/longitude rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsBounds {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

/// Collection-wide counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub total_images: usize,
    pub with_exif: usize,
    pub with_analysis: usize,
    pub with_gps: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagCount {
    pub name: String,
    pub category: TagCategory,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationCount {
    pub latitude: f64,
    pub longitude: f64,
    pub count: usize,
}

pub(crate) const ASSET_COLUMNS: &str =
    "images.id, images.file_path, images.file_name, images.file_size, images.created_at, images.updated_at";

pub(crate) fn asset_from_row(row: &Row<'_>) -> rusqlite::Result<ImageAsset> {
    let path: String = row.get(1)?;
    let size: i64 = row.get(3)?;
    Ok(ImageAsset {
        id: row.get(0)?,
        path: PathBuf::from(path),
        file_name: row.get(2)?,
        size: size.max(0) as u64,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub(crate) const EXIF_COLUMNS: &str = "date_taken, camera_make, camera_model, lens_model, iso, \
     aperture, shutter_speed, focal_length, orientation, width, height, \
     gps_latitude, gps_longitude, gps_altitude";

pub(crate) fn exif_from_row(row: &Row<'_>) -> rusqlite::Result<ExifRecord> {
    Ok(ExifRecord {
        date_taken: row.get(0)?,
        camera_make: row.get(1)?,
        camera_model: row.get(2)?,
        lens_model: row.get(3)?,
        iso: row.get(4)?,
        aperture: row.get(5)?,
        shutter_speed: row.get(6)?,
        focal_length: row.get(7)?,
        orientation: row.get(8)?,
        width: row.get(9)?,
        height: row.get(10)?,
        gps_latitude: row.get(11)?,
        gps_longitude: row.get(12)?,
        gps_altitude: row.get(13)?,
    })
}

pub(crate) const ANALYSIS_COLUMNS: &str = "analyzed_at, description, detected_objects, \
     detected_people, detected_activities, scene_type, confidence_score, raw_response";

pub(crate) fn analysis_from_row(row: &Row<'_>) -> rusqlite::Result<AnalysisRecord> {
    Ok(AnalysisRecord {
        analyzed_at: row.get(0)?,
        result: AnalysisResult {
            description: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            objects: json_list(row, 2)?,
            people: json_list(row, 3)?,
            activities: json_list(row, 4)?,
            scene_type: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            confidence: row.get::<_, Option<f64>>(6)?.unwrap_or_default(),
        },
        raw_response: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
    })
}

pub(crate) fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        image_id: row.get(0)?,
        name: row.get(1)?,
        category: category_at(row, 2)?,
        confidence: row.get::<_, Option<f64>>(3)?.unwrap_or_default(),
    })
}

pub(crate) fn category_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<TagCategory> {
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

// Lists are stored as JSON arrays in TEXT columns
fn json_list(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(text) => serde_json::from_str(&text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(Vec::new()),
    }
}
