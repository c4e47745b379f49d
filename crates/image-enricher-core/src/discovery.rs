use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::batch::{BatchExecutor, ErrorDetail};
use crate::error::{Error, Result};
use crate::persistence::Store;
use crate::types::{ImageFormat, NewAsset};

/// Outcome of scanning one directory
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanSummary {
    /// Supported image files seen during the walk
    pub found: usize,
    /// Files added to the store by this scan
    pub new: usize,
    /// Files that were already known
    pub skipped: usize,
    pub errors: usize,
    pub error_files: Vec<ErrorDetail>,
    pub interrupted: bool,
}

/// Returns if the given path has a supported image extension
pub fn is_image_path(path: &Path) -> bool {
    get_image_format(path).is_some()
}

/// Get image format from file extension
pub fn get_image_format(path: &Path) -> Option<ImageFormat> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(ImageFormat::from_extension)
}

/// Scan `root` for images and record the ones the store has not seen.
///
/// Known paths are loaded once up front, so running the same scan twice adds
/// nothing the second time. A file whose metadata cannot be read is reported
/// in the summary and the walk continues. Accepted files are written in a
/// single transaction at the end.
pub fn scan_directory(
    root: &Path,
    recursive: bool,
    store: &Store,
    executor: &BatchExecutor,
) -> Result<ScanSummary> {
    if !root.exists() {
        return Err(Error::FileNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(Error::InvalidInput(format!(
            "Path is not a directory: {}",
            root.display()
        )));
    }
    let root = fs::canonicalize(root)?;

    let known = store.list_known_paths()?;
    let (candidates, walk_errors) = find_images(&root, recursive);

    let mut summary = ScanSummary {
        found: candidates.len(),
        ..Default::default()
    };

    let mut fresh = Vec::new();
    for path in candidates {
        if known.contains(path.to_string_lossy().as_ref()) {
            summary.skipped += 1;
        } else {
            fresh.push(path);
        }
    }

    let output = executor.run("scan", &fresh, read_new_asset);

    summary.new = store.insert_assets(&output.outputs)?;
    summary.errors = output.summary.errors + walk_errors.len();
    summary.error_files = walk_errors;
    summary.error_files.extend(output.summary.error_details);
    summary.error_files.truncate(executor.error_detail_limit());
    summary.interrupted = output.summary.interrupted;

    info!(
        "Scanned {}: found {}, added {}, skipped {}, errors {}",
        root.display(),
        summary.found,
        summary.new,
        summary.skipped,
        summary.errors
    );

    Ok(summary)
}

/// Collect supported image files under `root`.
///
/// Entries the walker cannot read are returned separately as error details.
pub fn find_images(root: &Path, recursive: bool) -> (Vec<PathBuf>, Vec<ErrorDetail>) {
    let mut walker = WalkDir::new(root).min_depth(1);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut images = Vec::new();
    let mut errors = Vec::new();

    for entry in walker {
        match entry {
            Ok(entry) => {
                // Links are kept here; reading their metadata decides if they are usable
                if !entry.file_type().is_dir() && is_image_path(entry.path()) {
                    images.push(entry.into_path());
                }
            }
            Err(e) => {
                let file = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                warn!("Error walking {}: {}", file, e);
                errors.push(ErrorDetail {
                    image_id: None,
                    file,
                    error: e.to_string(),
                });
            }
        }
    }

    (images, errors)
}

fn read_new_asset(path: &PathBuf) -> Result<NewAsset> {
    let metadata = fs::metadata(path).map_err(|e| {
        crate::logging::log_file_error(path, "metadata", &e);
        e
    })?;
    if !metadata.is_file() {
        return Err(Error::InvalidInput(format!(
            "Not a regular file: {}",
            path.display()
        )));
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(NewAsset {
        path: path.clone(),
        file_name,
        size: metadata.len(),
    })
}

// -- Tests --

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::fs::File;
    use std::io::Write;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn create_test_image(dir: &Path, name: &str, ext: &str) -> PathBuf {
        let file_path = dir.join(format!("{}.{}", name, ext));
        let mut file = File::create(&file_path).unwrap();
        // Write some dummy data to simulate an image
        file.write_all(b"DUMMY IMAGE DATA").unwrap();
        file_path
    }

    fn setup_test_directory() -> (tempfile::TempDir, Vec<PathBuf>) {
        let dir = tempdir().unwrap();

        let subdir_path = dir.path().join("subdir");
        fs::create_dir(&subdir_path).unwrap();

        let files = vec![
            create_test_image(dir.path(), "image1", "jpg"),
            create_test_image(dir.path(), "image2", "PNG"),
            create_test_image(dir.path(), "image3", "tiff"),
            create_test_image(dir.path(), "image4", "heic"),
            create_test_image(&subdir_path, "subdir_image1", "jpeg"),
            create_test_image(&subdir_path, "subdir_image2", "webp"),
        ];

        let mut file = File::create(dir.path().join("document.txt")).unwrap();
        file.write_all(b"NOT AN IMAGE").unwrap();

        (dir, files)
    }

    fn executor() -> BatchExecutor {
        BatchExecutor::new(&Config::default(), Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn test_is_image_path() {
        for name in [
            "a.jpg", "a.JPEG", "a.png", "a.gif", "a.bmp", "a.tiff", "a.tif", "a.heic", "a.HEIF",
            "a.webp",
        ] {
            assert!(is_image_path(Path::new(name)), "{} should be an image", name);
        }
        assert!(!is_image_path(Path::new("test.txt")));
        assert!(!is_image_path(Path::new("test.raw")));
        assert!(!is_image_path(Path::new("test")));
        assert!(!is_image_path(Path::new("jpg")));
    }

    #[test]
    fn test_find_images_recursive() {
        let (dir, files) = setup_test_directory();

        let (found, errors) = find_images(dir.path(), true);

        assert_eq!(found.len(), 6);
        assert!(errors.is_empty());
        for file_path in &files {
            assert!(found.contains(file_path));
        }
        assert!(!found.contains(&dir.path().join("document.txt")));
    }

    #[test]
    fn test_find_images_immediate_children_only() {
        let (dir, _) = setup_test_directory();

        let (found, _) = find_images(dir.path(), false);

        assert_eq!(found.len(), 4);
        for file in &found {
            assert_eq!(file.parent().unwrap(), dir.path());
        }
    }

    #[test]
    fn test_scan_nonexistent_directory() {
        let store = Store::open_in_memory().unwrap();
        let result = scan_directory(
            Path::new("/path/that/does/not/exist"),
            true,
            &store,
            &executor(),
        );

        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[test]
    fn test_scan_file_instead_of_directory() {
        let (dir, files) = setup_test_directory();
        let store = Store::open_in_memory().unwrap();

        let result = scan_directory(&files[0], true, &store, &executor());

        assert!(matches!(result, Err(Error::InvalidInput(_))));
        drop(dir);
    }

    #[test]
    fn test_rescan_is_idempotent() {
        let (dir, _) = setup_test_directory();
        let store = Store::open_in_memory().unwrap();

        let first = scan_directory(dir.path(), true, &store, &executor()).unwrap();
        assert_eq!(first.found, 6);
        assert_eq!(first.new, 6);
        assert_eq!(first.skipped, 0);
        assert_eq!(first.errors, 0);

        let second = scan_directory(dir.path(), true, &store, &executor()).unwrap();
        assert_eq!(second.found, 6);
        assert_eq!(second.new, 0);
        assert_eq!(second.skipped, second.found);

        assert_eq!(store.all_assets().unwrap().len(), 6);
    }

    #[test]
    fn test_scan_picks_up_only_new_files() {
        let (dir, _) = setup_test_directory();
        let store = Store::open_in_memory().unwrap();

        scan_directory(dir.path(), false, &store, &executor()).unwrap();
        create_test_image(dir.path(), "image5", "gif");

        let summary = scan_directory(dir.path(), true, &store, &executor()).unwrap();
        assert_eq!(summary.found, 7);
        assert_eq!(summary.new, 3);
        assert_eq!(summary.skipped, 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_follows_links_and_counts_unreadable_file() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let target_dir = tempdir().unwrap();
        let target = create_test_image(target_dir.path(), "real", "jpg");
        symlink(&target, dir.path().join("linked.jpg")).unwrap();
        symlink(dir.path().join("missing.jpg"), dir.path().join("broken.jpg")).unwrap();
        let store = Store::open_in_memory().unwrap();

        let summary = scan_directory(dir.path(), true, &store, &executor()).unwrap();

        assert_eq!(summary.found, 2);
        assert_eq!(summary.new, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.error_files.len(), 1);
        assert!(summary.error_files[0].file.ends_with("broken.jpg"));
        assert!(!summary.error_files[0].error.is_empty());

        let assets = store.all_assets().unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].file_name, "linked.jpg");
        assert_eq!(assets[0].size, b"DUMMY IMAGE DATA".len() as u64);
    }

    #[test]
    fn test_scanned_assets_have_absolute_paths_and_sizes() {
        let (dir, _) = setup_test_directory();
        let store = Store::open_in_memory().unwrap();

        scan_directory(dir.path(), true, &store, &executor()).unwrap();

        for asset in store.all_assets().unwrap() {
            assert!(asset.path.is_absolute());
            assert_eq!(asset.size, b"DUMMY IMAGE DATA".len() as u64);
            assert_eq!(
                asset.file_name,
                asset.path.file_name().unwrap().to_string_lossy()
            );
        }
    }
}
