//! Image store contract and filesystem implementation.
//!
//! # Invariants
//! - `copy_to_managed` never returns an error to the caller; failures are
//!   logged and reported as `None`.
//! - Managed uris use the `file://` scheme with an absolute path.

use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const FILE_URI_PREFIX: &str = "file://";
const DEFAULT_IMAGE_EXTENSION: &str = "jpg";
const KNOWN_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "heic", "bmp"];

/// Image read/write failure.
#[derive(Debug)]
pub enum ImageIoError {
    Io {
        uri: String,
        source: std::io::Error,
    },
    /// The uri does not point at a local file.
    InvalidUri(String),
}

impl Display for ImageIoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { uri, source } => write!(f, "image i/o failed for `{uri}`: {source}"),
            Self::InvalidUri(uri) => write!(f, "unsupported image uri `{uri}`"),
        }
    }
}

impl Error for ImageIoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::InvalidUri(_) => None,
        }
    }
}

/// Storage for images referenced by image blocks.
pub trait ImageStore: Send + Sync {
    /// Copies `source` (a path or `file://` uri) into managed storage.
    fn copy_to_managed(&self, source: &str) -> Option<String>;
    /// Reads the bytes behind a managed uri.
    fn read(&self, uri: &str) -> Result<Vec<u8>, ImageIoError>;
    /// Writes `bytes` to a new uniquely-named managed file.
    fn write_new(&self, filename_hint: &str, bytes: &[u8]) -> Result<String, ImageIoError>;
}

impl<S: ImageStore + ?Sized> ImageStore for &S {
    fn copy_to_managed(&self, source: &str) -> Option<String> {
        (**self).copy_to_managed(source)
    }

    fn read(&self, uri: &str) -> Result<Vec<u8>, ImageIoError> {
        (**self).read(uri)
    }

    fn write_new(&self, filename_hint: &str, bytes: &[u8]) -> Result<String, ImageIoError> {
        (**self).write_new(filename_hint, bytes)
    }
}

/// Image store keeping files in one directory.
#[derive(Debug, Clone)]
pub struct FsImageStore {
    dir: PathBuf,
}

impl FsImageStore {
    /// Opens (creating when missing) the managed image directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ImageIoError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| ImageIoError::Io {
            uri: path_to_uri(&dir),
            source,
        })?;
        let dir = dir.canonicalize().unwrap_or(dir);
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ImageStore for FsImageStore {
    fn copy_to_managed(&self, source: &str) -> Option<String> {
        let source_path = source_to_path(source);
        let extension = image_extension(&source_path);
        let target = self.dir.join(format!("{}.{extension}", Uuid::new_v4()));

        match std::fs::copy(&source_path, &target) {
            Ok(bytes) => {
                info!(
                    "event=image_copy module=image status=ok bytes={} extension={}",
                    bytes, extension
                );
                Some(path_to_uri(&target))
            }
            Err(err) => {
                warn!(
                    "event=image_copy module=image status=error error_code=copy_failed error={}",
                    err
                );
                None
            }
        }
    }

    fn read(&self, uri: &str) -> Result<Vec<u8>, ImageIoError> {
        let path = uri_to_path(uri).ok_or_else(|| ImageIoError::InvalidUri(uri.to_string()))?;
        std::fs::read(&path).map_err(|source| ImageIoError::Io {
            uri: uri.to_string(),
            source,
        })
    }

    fn write_new(&self, filename_hint: &str, bytes: &[u8]) -> Result<String, ImageIoError> {
        let hint = sanitize_filename_hint(filename_hint)
            .unwrap_or_else(|| format!("image.{DEFAULT_IMAGE_EXTENSION}"));
        let target = self.dir.join(format!("{}_{hint}", Uuid::new_v4()));
        let uri = path_to_uri(&target);
        std::fs::write(&target, bytes).map_err(|source| ImageIoError::Io {
            uri: uri.clone(),
            source,
        })?;
        Ok(uri)
    }
}

/// Returns the last path segment of a uri, used as an export filename.
pub fn uri_filename(uri: &str) -> Option<&str> {
    uri.trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .filter(|segment| !segment.is_empty() && !segment.ends_with(':'))
}

/// Converts a local path to a `file://` uri.
pub fn path_to_uri(path: &Path) -> String {
    format!("{FILE_URI_PREFIX}{}", path.display())
}

/// Converts a `file://` uri back to a path. Other schemes are rejected.
pub fn uri_to_path(uri: &str) -> Option<PathBuf> {
    let path = uri.strip_prefix(FILE_URI_PREFIX)?;
    if path.is_empty() {
        return None;
    }
    Some(PathBuf::from(path))
}

fn source_to_path(source: &str) -> PathBuf {
    uri_to_path(source).unwrap_or_else(|| PathBuf::from(source))
}

fn image_extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|ext| KNOWN_IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| DEFAULT_IMAGE_EXTENSION.to_string())
}

fn sanitize_filename_hint(hint: &str) -> Option<String> {
    let name = uri_filename(hint.trim())?;
    let cleaned = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}
