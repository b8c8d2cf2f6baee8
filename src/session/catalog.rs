//! Image directory listing.
//!
//! Files are named `<timestamp>_<region>_<variant>.png`. A `cropped` variant is
//! a raw region crop that still needs variant generation; any other variant
//! name marks an image that was already processed and is OCR'd as-is.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Variant token of an unprocessed crop.
pub const RAW_CROP: &str = "cropped";

/// One image found in a session directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogEntry {
    pub path: PathBuf,
    pub filename: String,
    pub timestamp: String,
    pub region: String,
    pub variant: String,
}

impl CatalogEntry {
    pub fn is_raw_crop(&self) -> bool {
        self.variant == RAW_CROP
    }
}

/// File name for the raw crop of `region` taken from the screenshot `stem`.
pub fn crop_file_name(stem: &str, region: &str) -> String {
    format!("{}_{}_{}.png", stem, region, RAW_CROP)
}

/// Splits a file name into (timestamp, region, variant).
///
/// Returns `None` for non-PNG files and names that mention no known region.
pub fn parse_file_name(name: &str, regions: &[&str]) -> Option<(String, String, String)> {
    let path = Path::new(name);
    let is_png = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("png"));
    if !is_png {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;

    // Rightmost region token wins, so timestamps may contain anything
    let mut best: Option<(usize, usize, &str)> = None;
    for &region in regions {
        let marker = format!("_{}_", region);
        let found = if let Some(pos) = stem.rfind(&marker) {
            Some((pos, pos + marker.len()))
        } else if stem.starts_with(&marker[1..]) {
            Some((0, marker.len() - 1))
        } else {
            None
        };
        if let Some((start, end)) = found {
            if best.is_none_or(|(s, _, _)| start > s) {
                best = Some((start, end, region));
            }
        }
    }

    let (start, end, region) = best?;
    let variant = &stem[end..];
    if variant.is_empty() {
        return None;
    }
    Some((stem[..start].to_string(), region.to_string(), variant.to_string()))
}

/// Lists catalog images in `dir`, sorted by file name.
pub fn scan_directory(dir: &Path, regions: &[&str]) -> io::Result<Vec<CatalogEntry>> {
    let mut entries = Vec::new();

    for dir_entry in fs::read_dir(dir)? {
        let dir_entry = dir_entry?;
        if !dir_entry.file_type()?.is_file() {
            continue;
        }
        let filename = dir_entry.file_name().to_string_lossy().to_string();
        match parse_file_name(&filename, regions) {
            Some((timestamp, region, variant)) => entries.push(CatalogEntry {
                path: dir_entry.path(),
                filename,
                timestamp,
                region,
                variant,
            }),
            None => log::debug!("Ignoring {}", filename),
        }
    }

    entries.sort_by(|a, b| a.filename.cmp(&b.filename));
    log::info!("Found {} images in {}", entries.len(), dir.display());
    Ok(entries)
}

/// Entries belonging to `region`, in catalog order.
pub fn entries_for_region<'a>(entries: &'a [CatalogEntry], region: &str) -> Vec<&'a CatalogEntry> {
    entries.iter().filter(|e| e.region == region).collect()
}
