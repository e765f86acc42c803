use camino::{Utf8Path, Utf8PathBuf};
use std::future::Future;
use walkdir::WalkDir;

/// Extensions accepted for compression (lowercase, no dot)
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["png", "jpeg", "jpg", "gif", "webp", "tiff"];

/// Metadata gathered about a source image before it is compressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub filename: String,
    /// Extension without the leading dot; empty when the file has none
    pub extension: String,
    pub size: u64,
}

/// Looks up file metadata for a job
///
/// Failures are plain messages; they end up verbatim in the job's error field.
pub trait FileInfoService: Send + Sync + 'static {
    fn file_info(&self, path: &Utf8Path) -> impl Future<Output = Result<FileInfo, String>> + Send;
}

/// [`FileInfoService`] backed by the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsFileInfoService;

impl FileInfoService for FsFileInfoService {
    async fn file_info(&self, path: &Utf8Path) -> Result<FileInfo, String> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| format!("Error getting file size: {}", e))?;

        Ok(FileInfo {
            filename: path.file_name().unwrap_or(path.as_str()).to_string(),
            extension: path.extension().unwrap_or_default().to_string(),
            size: metadata.len(),
        })
    }
}

/// Check whether a path names an existing file with a supported image extension
pub fn is_image(path: &Utf8Path) -> bool {
    path.is_file() && has_image_extension(path)
}

/// Expand a user-supplied path into the images it refers to
///
/// A supported image yields itself; a directory is searched recursively in file
/// name order. Symlinks below the root are not followed, so every image is found
/// under one path only. Missing paths and unreadable entries yield nothing.
pub fn collect_images(path: &Utf8Path) -> Vec<Utf8PathBuf> {
    if !path.is_dir() {
        return if is_image(path) {
            vec![path.to_path_buf()]
        } else {
            Vec::new()
        };
    }

    WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {}", path, e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.into_path()).ok())
        .filter(|path| has_image_extension(path))
        .collect()
}

/// [`collect_images`] on the blocking thread pool, for use from async code
pub async fn find_images(path: Utf8PathBuf) -> Vec<Utf8PathBuf> {
    let root = path.clone();
    tokio::task::spawn_blocking(move || collect_images(&path))
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Image discovery under {} failed: {}", root, e);
            Vec::new()
        })
}

fn has_image_extension(path: &Utf8Path) -> bool {
    path.extension()
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
