#![allow(dead_code)]

use image_enricher_core::vision::VisionService;
use image_enricher_core::{Config, Error, ImageEnricher, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const DOG_REPLY: &str = "Sure! {\"description\":\"A dog on grass\",\"objects\":[\"Dog\",\" Ball \"],\"people\":[],\"scene_type\":\"Outdoor\",\"activities\":[\"playing\"],\"confidence\":0.9} Hope that helps!";

/// Vision service that answers from a script instead of a model
pub struct ScriptedVision {
    reply: String,
    failing: HashSet<String>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedVision {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            failing: HashSet::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Calls for these file names fail as if the service timed out
    pub fn failing_on(mut self, names: &[&str]) -> Self {
        self.failing = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl VisionService for ScriptedVision {
    fn describe(&self, image: &Path, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.failing.contains(&name) {
            Err(Error::Service("request timed out".to_string()))
        } else {
            Ok(self.reply.clone())
        }
    }
}

pub fn test_config(dir: &Path) -> Config {
    Config {
        database_path: dir.join("db").join("images.db"),
        max_workers: 4,
        ..Default::default()
    }
}

pub fn enricher(dir: &Path, service: ScriptedVision) -> ImageEnricher {
    ImageEnricher::with_service(test_config(dir), Box::new(service)).unwrap()
}

/// Write `count` placeholder images named `img_000.jpg`, `img_001.jpg`, ...
pub fn create_fake_images(dir: &Path, count: usize) -> Vec<PathBuf> {
    fs::create_dir_all(dir).unwrap();
    (0..count)
        .map(|i| {
            let path = dir.join(format!("img_{:03}.jpg", i));
            fs::write(&path, b"not really a jpeg").unwrap();
            path
        })
        .collect()
}

type Dms = [(u32, u32); 3];

/// Minimal JPEG carrying an EXIF block with a camera make and GPS position
pub fn jpeg_with_exif(make: &str, lat_ref: char, lat: Dms, lon_ref: char, lon: Dms) -> Vec<u8> {
    let tiff = tiff_with_gps(make, lat_ref, lat, lon_ref, lon);

    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
    let segment_len = (2 + 6 + tiff.len()) as u16;
    jpeg.extend_from_slice(&segment_len.to_be_bytes());
    jpeg.extend_from_slice(b"Exif\0\0");
    jpeg.extend_from_slice(&tiff);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}

const ASCII: u16 = 2;
const LONG: u16 = 4;
const RATIONAL: u16 = 5;

fn tiff_with_gps(make: &str, lat_ref: char, lat: Dms, lon_ref: char, lon: Dms) -> Vec<u8> {
    let mut make_bytes = make.as_bytes().to_vec();
    make_bytes.push(0);

    let ifd0_offset = 8u32;
    let ifd0_len = 2 + 2 * 12 + 4;
    let make_offset = ifd0_offset + ifd0_len;
    let mut gps_offset = make_offset + make_bytes.len() as u32;
    gps_offset += gps_offset % 2;
    let gps_len = 2 + 4 * 12 + 4;
    let lat_offset = gps_offset + gps_len;
    let lon_offset = lat_offset + 24;

    let mut out = Vec::new();
    out.extend_from_slice(b"II");
    push_u16(&mut out, 42);
    push_u32(&mut out, ifd0_offset);

    // IFD0: Make, GPS IFD pointer
    push_u16(&mut out, 2);
    push_entry(&mut out, 0x010F, ASCII, make_bytes.len() as u32, make_offset.to_le_bytes());
    push_entry(&mut out, 0x8825, LONG, 1, gps_offset.to_le_bytes());
    push_u32(&mut out, 0);

    out.extend_from_slice(&make_bytes);
    while (out.len() as u32) < gps_offset {
        out.push(0);
    }

    // GPS IFD
    push_u16(&mut out, 4);
    push_entry(&mut out, 0x0001, ASCII, 2, [lat_ref as u8, 0, 0, 0]);
    push_entry(&mut out, 0x0002, RATIONAL, 3, lat_offset.to_le_bytes());
    push_entry(&mut out, 0x0003, ASCII, 2, [lon_ref as u8, 0, 0, 0]);
    push_entry(&mut out, 0x0004, RATIONAL, 3, lon_offset.to_le_bytes());
    push_u32(&mut out, 0);

    for (num, denom) in lat.iter().chain(lon.iter()) {
        push_u32(&mut out, *num);
        push_u32(&mut out, *denom);
    }
    out
}

fn push_entry(out: &mut Vec<u8>, tag: u16, kind: u16, count: u32, value: [u8; 4]) {
    push_u16(out, tag);
    push_u16(out, kind);
    push_u32(out, count);
    out.extend_from_slice(&value);
}

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}
