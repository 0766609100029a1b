use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use exif::{In, Tag, Value};
use serde::{Deserialize, Serialize};

/// EXIF fields surfaced on an asset node.
///
/// All fields are optional — cameras and post-processing tools are
/// inconsistent about which tags they write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExifData {
    /// ISO-8601 date derived from `DateTimeOriginal`.
    pub date_created_iso: Option<String>,
    /// `DateTimeOriginal` as a Unix timestamp.
    pub date_time_original: Option<i64>,
    pub exposure_time: Option<f64>,
    pub f_number: Option<f64>,
    pub focal_length: Option<f64>,
    pub iso: Option<u32>,
    pub lens_model: Option<String>,
    pub model: Option<String>,
    pub shutter_speed_value: Option<f64>,
}

/// Read EXIF metadata from an image file.
///
/// Returns `Ok(None)` when the file carries no parseable EXIF container,
/// and `Err` only on I/O failure opening the file.
pub fn read_image_exif(path: &Path) -> Result<Option<ExifData>> {
    let file =
        std::fs::File::open(path).with_context(|| format!("Opening {}", path.display()))?;
    let mut bufreader = std::io::BufReader::new(&file);

    match exif::Reader::new().read_from_container(&mut bufreader) {
        Ok(parsed) => Ok(Some(extract(&parsed))),
        Err(e) => {
            tracing::debug!("No EXIF data in {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

fn extract(parsed: &exif::Exif) -> ExifData {
    let datetime = ascii_field(parsed, Tag::DateTimeOriginal);
    let (date_created_iso, date_time_original) = datetime
        .as_deref()
        .map(parse_exif_datetime)
        .unwrap_or((None, None));

    ExifData {
        date_created_iso,
        date_time_original,
        exposure_time: rational_field(parsed, Tag::ExposureTime),
        f_number: rational_field(parsed, Tag::FNumber),
        focal_length: rational_field(parsed, Tag::FocalLength),
        iso: uint_field(parsed, Tag::PhotographicSensitivity),
        lens_model: ascii_field(parsed, Tag::LensModel),
        model: ascii_field(parsed, Tag::Model),
        shutter_speed_value: srational_field(parsed, Tag::ShutterSpeedValue),
    }
}

/// Parse the EXIF `"YYYY:MM:DD HH:MM:SS"` format into an ISO date and a
/// Unix timestamp (the tag carries no zone; treated as UTC).
fn parse_exif_datetime(s: &str) -> (Option<String>, Option<i64>) {
    match NaiveDateTime::parse_from_str(s.trim(), "%Y:%m:%d %H:%M:%S") {
        Ok(dt) => (
            Some(dt.date().format("%Y-%m-%d").to_string()),
            Some(dt.and_utc().timestamp()),
        ),
        Err(_) => (None, None),
    }
}

fn ascii_field(parsed: &exif::Exif, tag: Tag) -> Option<String> {
    match &parsed.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(segments) => segments.first().map(|bytes| {
            String::from_utf8_lossy(bytes)
                .trim_end_matches('\0')
                .trim()
                .to_string()
        }),
        _ => None,
    }
}

fn rational_field(parsed: &exif::Exif, tag: Tag) -> Option<f64> {
    match &parsed.get_field(tag, In::PRIMARY)?.value {
        Value::Rational(values) => values.first().map(|r| r.to_f64()),
        _ => None,
    }
}

fn srational_field(parsed: &exif::Exif, tag: Tag) -> Option<f64> {
    match &parsed.get_field(tag, In::PRIMARY)?.value {
        Value::SRational(values) => values.first().map(|r| r.to_f64()),
        _ => None,
    }
}

fn uint_field(parsed: &exif::Exif, tag: Tag) -> Option<u32> {
    parsed.get_field(tag, In::PRIMARY)?.value.get_uint(0)
}
