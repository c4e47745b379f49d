//! EXIF decoding.
//!
//! Files without an EXIF block, and files that cannot be read at all, decode
//! to `None`. Individual fields that are absent or malformed are left unknown
//! without affecting the rest of the record.

mod fields;

pub use fields::{
    dms_to_decimal, parse_exif_datetime, rational_to_f64, Absent, FieldResult, TagSource,
};

use exif::Tag;
use log::{debug, trace};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::types::ExifRecord;

/// Decode the EXIF block of an image file.
pub fn decode_file(path: &Path) -> Option<ExifRecord> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            debug!("Cannot open {} for EXIF decoding: {}", path.display(), e);
            return None;
        }
    };

    let mut reader = BufReader::new(file);
    match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => Some(build_record(&exif)),
        Err(e) => {
            debug!("No EXIF data in {}: {}", path.display(), e);
            None
        }
    }
}

/// Assemble a record from any tag source, field by field.
pub fn build_record<S: TagSource + ?Sized>(src: &S) -> ExifRecord {
    ExifRecord {
        date_taken: keep("date_taken", fields::date_taken(src)),
        camera_make: keep("camera_make", fields::text(src, Tag::Make)),
        camera_model: keep("camera_model", fields::text(src, Tag::Model)),
        lens_model: keep("lens_model", fields::text(src, Tag::LensModel)),
        iso: keep("iso", fields::uint(src, Tag::PhotographicSensitivity)),
        aperture: keep("aperture", fields::number(src, Tag::FNumber)),
        shutter_speed: keep("shutter_speed", fields::shutter_speed(src)),
        focal_length: keep("focal_length", fields::number(src, Tag::FocalLength)),
        orientation: keep("orientation", fields::uint(src, Tag::Orientation)),
        width: keep("width", fields::uint(src, Tag::PixelXDimension)),
        height: keep("height", fields::uint(src, Tag::PixelYDimension)),
        gps_latitude: keep("gps_latitude", fields::latitude(src)),
        gps_longitude: keep("gps_longitude", fields::longitude(src)),
        gps_altitude: keep("gps_altitude", fields::altitude(src)),
    }
}

fn keep<T>(field: &str, result: FieldResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(Absent::Missing) => None,
        Err(Absent::Malformed(reason)) => {
            trace!("Ignoring malformed {}: {}", field, reason);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fields::test_support::{ascii, Tags};
    use super::*;
    use exif::{Rational, Value};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_build_record_keeps_good_fields_when_others_are_corrupt() {
        let tags = Tags(vec![
            (Tag::Make, ascii("Canon")),
            (Tag::Model, ascii("EOS R5")),
            (Tag::FNumber, Value::Rational(vec![Rational { num: 28, denom: 10 }])),
            (Tag::FocalLength, Value::Rational(vec![Rational { num: 35, denom: 0 }])),
            (Tag::ExposureTime, Value::Rational(vec![Rational { num: 1, denom: 500 }])),
            (Tag::PhotographicSensitivity, Value::Short(vec![400])),
            (Tag::PixelXDimension, Value::Long(vec![6000])),
            (Tag::PixelYDimension, Value::Long(vec![4000])),
            (
                Tag::GPSLatitude,
                Value::Rational(vec![
                    Rational { num: 48, denom: 1 },
                    Rational { num: 51, denom: 1 },
                    Rational { num: 296, denom: 10 },
                ]),
            ),
        ]);

        let record = build_record(&tags);

        assert_eq!(record.camera_make.as_deref(), Some("Canon"));
        assert_eq!(record.camera_model.as_deref(), Some("EOS R5"));
        assert_eq!(record.shutter_speed.as_deref(), Some("1/500"));
        assert_eq!(record.iso, Some(400));
        assert_eq!(record.width, Some(6000));
        assert_eq!(record.height, Some(4000));
        assert!((record.aperture.unwrap() - 2.8).abs() < 1e-9);
        assert_eq!(record.focal_length, None);
        // no hemisphere reference
        assert_eq!(record.gps_latitude, None);
        assert!(!record.has_gps());
        assert_eq!(record.date_taken, None);
    }

    #[test]
    fn test_build_record_from_empty_source() {
        let record = build_record(&Tags(vec![]));
        assert_eq!(record, ExifRecord::default());
    }

    #[test]
    fn test_decode_non_image_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("notes.jpg");
        fs::write(&path, b"definitely not a jpeg").unwrap();

        assert!(decode_file(&path).is_none());
    }

    #[test]
    fn test_decode_missing_file() {
        let temp_dir = tempdir().unwrap();
        assert!(decode_file(&temp_dir.path().join("gone.jpg")).is_none());
    }
}
