//! Independent per-field extractors.
//!
//! Each extractor looks at one tag (or one tag pair) and returns either a value
//! or the reason it has none. They never depend on each other, so a corrupt
//! tag only costs its own field.

use chrono::NaiveDateTime;
use exif::{Tag, Value};

/// Why a field has no value
#[derive(Debug, Clone, PartialEq)]
pub enum Absent {
    /// Tag not present
    Missing,
    /// Tag present but unusable
    Malformed(String),
}

pub type FieldResult<T> = Result<T, Absent>;

/// Read access to decoded tags
pub trait TagSource {
    fn value(&self, tag: Tag) -> Option<&Value>;
}

impl TagSource for exif::Exif {
    fn value(&self, tag: Tag) -> Option<&Value> {
        self.get_field(tag, exif::In::PRIMARY).map(|field| &field.value)
    }
}

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Parse the fixed `YYYY:MM:DD HH:MM:SS` EXIF timestamp layout
pub fn parse_exif_datetime(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), EXIF_DATETIME_FORMAT).ok()
}

/// Divide a rational, `None` when the denominator is zero
pub fn rational_to_f64(num: f64, denom: f64) -> Option<f64> {
    if denom == 0.0 {
        None
    } else {
        Some(num / denom)
    }
}

/// Degrees, minutes and seconds to decimal degrees
pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}

fn require<'a, S: TagSource + ?Sized>(src: &'a S, tag: Tag) -> FieldResult<&'a Value> {
    src.value(tag).ok_or(Absent::Missing)
}

fn malformed<T>(tag: Tag, what: &str) -> FieldResult<T> {
    Err(Absent::Malformed(format!("{}: {}", tag, what)))
}

/// ASCII tag as trimmed text. Empty strings count as missing.
pub fn text<S: TagSource + ?Sized>(src: &S, tag: Tag) -> FieldResult<String> {
    match require(src, tag)? {
        Value::Ascii(parts) => {
            let joined = parts
                .iter()
                .map(|p| String::from_utf8_lossy(p).into_owned())
                .collect::<Vec<_>>()
                .join(" ");
            let trimmed = joined.trim_matches(|c: char| c == '\0' || c.is_whitespace());
            if trimmed.is_empty() {
                Err(Absent::Missing)
            } else {
                Ok(trimmed.to_string())
            }
        }
        _ => malformed(tag, "expected ASCII"),
    }
}

/// First unsigned integer of a BYTE/SHORT/LONG tag
pub fn uint<S: TagSource + ?Sized>(src: &S, tag: Tag) -> FieldResult<u32> {
    match require(src, tag)?.get_uint(0) {
        Some(v) => Ok(v),
        None => malformed(tag, "expected an unsigned integer"),
    }
}

/// First component of a numeric tag as a float. Rationals are divided out.
pub fn number<S: TagSource + ?Sized>(src: &S, tag: Tag) -> FieldResult<f64> {
    let value = require(src, tag)?;
    let result = match value {
        Value::Rational(v) => v
            .first()
            .and_then(|r| rational_to_f64(r.num as f64, r.denom as f64)),
        Value::SRational(v) => v
            .first()
            .and_then(|r| rational_to_f64(r.num as f64, r.denom as f64)),
        Value::Float(v) => v.first().map(|f| *f as f64),
        Value::Double(v) => v.first().copied(),
        other => other.get_uint(0).map(|u| u as f64),
    };
    match result {
        Some(v) if v.is_finite() => Ok(v),
        _ => malformed(tag, "not a usable number"),
    }
}

/// Exposure time. Rationals keep their `num/denom` form; plain numbers are
/// rendered as-is.
pub fn shutter_speed<S: TagSource + ?Sized>(src: &S) -> FieldResult<String> {
    let tag = Tag::ExposureTime;
    match require(src, tag)? {
        Value::Rational(v) => match v.first() {
            Some(r) if r.denom != 0 => Ok(format!("{}/{}", r.num, r.denom)),
            Some(_) => malformed(tag, "zero denominator"),
            None => malformed(tag, "empty"),
        },
        Value::SRational(v) => match v.first() {
            Some(r) if r.denom != 0 => Ok(format!("{}/{}", r.num, r.denom)),
            Some(_) => malformed(tag, "zero denominator"),
            None => malformed(tag, "empty"),
        },
        Value::Float(v) if !v.is_empty() => Ok(v[0].to_string()),
        Value::Double(v) if !v.is_empty() => Ok(v[0].to_string()),
        other => match other.get_uint(0) {
            Some(u) => Ok(u.to_string()),
            None => malformed(tag, "not a usable number"),
        },
    }
}

/// Capture time: `DateTimeOriginal`, falling back to `DateTime`
pub fn date_taken<S: TagSource + ?Sized>(src: &S) -> FieldResult<NaiveDateTime> {
    datetime(src, Tag::DateTimeOriginal).or_else(|_| datetime(src, Tag::DateTime))
}

fn datetime<S: TagSource + ?Sized>(src: &S, tag: Tag) -> FieldResult<NaiveDateTime> {
    let raw = text(src, tag)?;
    match parse_exif_datetime(&raw) {
        Some(dt) => Ok(dt),
        None => malformed(tag, &format!("unparsable timestamp {:?}", raw)),
    }
}

/// Signed decimal coordinate from a DMS triple and its hemisphere reference.
///
/// Both tags must be present and the reference must be one of `positive` or
/// `negative`; otherwise the coordinate is absent rather than guessed.
pub fn coordinate<S: TagSource + ?Sized>(
    src: &S,
    coord_tag: Tag,
    ref_tag: Tag,
    positive: char,
    negative: char,
) -> FieldResult<f64> {
    let coord = require(src, coord_tag)?;
    let reference = text(src, ref_tag)?;

    let sign = match reference.chars().next().map(|c| c.to_ascii_uppercase()) {
        Some(c) if c == positive => 1.0,
        Some(c) if c == negative => -1.0,
        _ => return malformed(ref_tag, &format!("unexpected reference {:?}", reference)),
    };

    let parts = match coord {
        Value::Rational(v) if v.len() >= 3 => v
            .iter()
            .take(3)
            .map(|r| rational_to_f64(r.num as f64, r.denom as f64))
            .collect::<Option<Vec<f64>>>(),
        _ => return malformed(coord_tag, "expected three rationals"),
    };

    match parts {
        Some(dms) => Ok(sign * dms_to_decimal(dms[0], dms[1], dms[2])),
        None => malformed(coord_tag, "zero denominator"),
    }
}

pub fn latitude<S: TagSource + ?Sized>(src: &S) -> FieldResult<f64> {
    coordinate(src, Tag::GPSLatitude, Tag::GPSLatitudeRef, 'N', 'S')
}

pub fn longitude<S: TagSource + ?Sized>(src: &S) -> FieldResult<f64> {
    coordinate(src, Tag::GPSLongitude, Tag::GPSLongitudeRef, 'E', 'W')
}

/// Altitude in meters, negative when `GPSAltitudeRef` marks below sea level
pub fn altitude<S: TagSource + ?Sized>(src: &S) -> FieldResult<f64> {
    let meters = number(src, Tag::GPSAltitude)?;
    let below_sea_level = matches!(uint(src, Tag::GPSAltitudeRef), Ok(1));
    Ok(if below_sea_level { -meters } else { meters })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::TagSource;
    use exif::{Tag, Value};

    /// Tags held in memory
    pub(crate) struct Tags(pub Vec<(Tag, Value)>);

    impl TagSource for Tags {
        fn value(&self, tag: Tag) -> Option<&Value> {
            self.0.iter().find(|(t, _)| *t == tag).map(|(_, v)| v)
        }
    }

    pub(crate) fn ascii(s: &str) -> Value {
        Value::Ascii(vec![s.as_bytes().to_vec()])
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{ascii, Tags};
    use super::*;
    use exif::Rational;

    fn r(num: u32, denom: u32) -> Rational {
        Rational { num, denom }
    }

    fn eiffel_dms() -> Value {
        Value::Rational(vec![r(48, 1), r(51, 1), r(296, 10)])
    }

    #[test]
    fn test_aperture_rational() {
        let tags = Tags(vec![(Tag::FNumber, Value::Rational(vec![r(28, 10)]))]);
        let aperture = number(&tags, Tag::FNumber).unwrap();
        assert!((aperture - 2.8).abs() < 1e-9);
    }

    #[test]
    fn test_zero_denominator_is_malformed() {
        let tags = Tags(vec![(Tag::FocalLength, Value::Rational(vec![r(50, 0)]))]);
        assert!(matches!(
            number(&tags, Tag::FocalLength),
            Err(Absent::Malformed(_))
        ));
    }

    #[test]
    fn test_shutter_speed_keeps_fraction() {
        let tags = Tags(vec![(Tag::ExposureTime, Value::Rational(vec![r(1, 500)]))]);
        assert_eq!(shutter_speed(&tags).unwrap(), "1/500");
    }

    #[test]
    fn test_shutter_speed_zero_denominator() {
        let tags = Tags(vec![(Tag::ExposureTime, Value::Rational(vec![r(1, 0)]))]);
        assert!(matches!(shutter_speed(&tags), Err(Absent::Malformed(_))));
    }

    #[test]
    fn test_shutter_speed_missing() {
        let tags = Tags(vec![]);
        assert_eq!(shutter_speed(&tags), Err(Absent::Missing));
    }

    #[test]
    fn test_latitude_north_and_south() {
        let north = Tags(vec![
            (Tag::GPSLatitude, eiffel_dms()),
            (Tag::GPSLatitudeRef, ascii("N")),
        ]);
        let south = Tags(vec![
            (Tag::GPSLatitude, eiffel_dms()),
            (Tag::GPSLatitudeRef, ascii("S")),
        ]);

        assert!((latitude(&north).unwrap() - 48.858222).abs() < 1e-6);
        assert!((latitude(&south).unwrap() + 48.858222).abs() < 1e-6);
    }

    #[test]
    fn test_longitude_west_is_negative() {
        let tags = Tags(vec![
            (Tag::GPSLongitude, Value::Rational(vec![r(73, 1), r(59, 1), r(0, 1)])),
            (Tag::GPSLongitudeRef, ascii("W")),
        ]);
        let lon = longitude(&tags).unwrap();
        assert!(lon < 0.0);
        assert!((lon + 73.983333).abs() < 1e-6);
    }

    #[test]
    fn test_coordinate_without_reference_is_unknown() {
        let tags = Tags(vec![
            (Tag::GPSLatitude, eiffel_dms()),
            (Tag::GPSLongitude, eiffel_dms()),
        ]);
        assert_eq!(latitude(&tags), Err(Absent::Missing));
        assert_eq!(longitude(&tags), Err(Absent::Missing));
    }

    #[test]
    fn test_coordinate_with_wrong_hemisphere_letter() {
        let tags = Tags(vec![
            (Tag::GPSLatitude, eiffel_dms()),
            (Tag::GPSLatitudeRef, ascii("E")),
        ]);
        assert!(matches!(latitude(&tags), Err(Absent::Malformed(_))));
    }

    #[test]
    fn test_coordinate_with_short_triple() {
        let tags = Tags(vec![
            (Tag::GPSLatitude, Value::Rational(vec![r(48, 1), r(51, 1)])),
            (Tag::GPSLatitudeRef, ascii("N")),
        ]);
        assert!(matches!(latitude(&tags), Err(Absent::Malformed(_))));
    }

    #[test]
    fn test_altitude_below_sea_level() {
        let tags = Tags(vec![
            (Tag::GPSAltitude, Value::Rational(vec![r(4305, 100)])),
            (Tag::GPSAltitudeRef, Value::Byte(vec![1])),
        ]);
        assert!((altitude(&tags).unwrap() + 43.05).abs() < 1e-9);
    }

    #[test]
    fn test_date_prefers_original() {
        let tags = Tags(vec![
            (Tag::DateTime, ascii("2024:01:02 03:04:05")),
            (Tag::DateTimeOriginal, ascii("2023:06:14 10:30:00")),
        ]);
        let dt = date_taken(&tags).unwrap();
        assert_eq!(dt.to_string(), "2023-06-14 10:30:00");
    }

    #[test]
    fn test_date_falls_back_to_datetime() {
        let tags = Tags(vec![(Tag::DateTime, ascii("2024:01:02 03:04:05"))]);
        assert_eq!(date_taken(&tags).unwrap().to_string(), "2024-01-02 03:04:05");
    }

    #[test]
    fn test_unparsable_date_is_unknown() {
        let tags = Tags(vec![(Tag::DateTimeOriginal, ascii("0000:00:00 00:00:00"))]);
        assert!(date_taken(&tags).is_err());
    }

    #[test]
    fn test_text_trims_padding() {
        let tags = Tags(vec![(
            Tag::Make,
            Value::Ascii(vec![b"NIKON CORPORATION  \0".to_vec()]),
        )]);
        assert_eq!(text(&tags, Tag::Make).unwrap(), "NIKON CORPORATION");
    }

    #[test]
    fn test_text_of_wrong_type() {
        let tags = Tags(vec![(Tag::Model, Value::Short(vec![7]))]);
        assert!(matches!(text(&tags, Tag::Model), Err(Absent::Malformed(_))));
    }

    #[test]
    fn test_dms_conversion() {
        assert!((dms_to_decimal(48.0, 51.0, 29.6) - 48.858222).abs() < 1e-6);
        assert_eq!(dms_to_decimal(10.0, 30.0, 0.0), 10.5);
    }
}
