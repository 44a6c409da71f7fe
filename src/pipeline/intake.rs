//! File intake: validate a picked or dropped file and hold it for conversion.
//!
//! The browser hands a web page a `File` with a MIME type already attached.
//! A CLI has only a path, so [`CandidateFile::from_path`] derives the type
//! the same way a browser does (from the extension), falling back to
//! magic-byte sniffing when the extension says nothing. Validation is a
//! strict allow-list: anything outside [`SUPPORTED_MIME_TYPES`] is rejected
//! before any state changes.

use crate::error::SvgrError;
use crate::output::ImageInfo;
use crate::pipeline::preview::PreviewHandle;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// MIME types the conversion service accepts.
pub const SUPPORTED_MIME_TYPES: [&str; 5] = [
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/bmp",
    "image/gif",
];

const FALLBACK_MIME: &str = "application/octet-stream";

/// Pixel size of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

/// A file offered for selection, not yet validated.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

impl CandidateFile {
    /// A candidate with an explicit MIME type, e.g. from an HTTP upload.
    pub fn new(
        bytes: Vec<u8>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
        }
    }

    /// A candidate whose MIME type is derived from its name and contents.
    pub fn from_bytes(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        let mime_type = detect_mime(&file_name, &bytes);
        Self {
            bytes,
            file_name,
            mime_type,
        }
    }

    /// Read a local file, mapping I/O failures to intake errors.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, SvgrError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SvgrError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => SvgrError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => SvgrError::Internal(format!("Failed to read '{}': {e}", path.display())),
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        debug!("Read {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::from_bytes(bytes, file_name))
    }
}

/// Browser-style MIME detection: extension first, then content sniffing.
pub fn detect_mime(file_name: &str, bytes: &[u8]) -> String {
    let ext = Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());

    if let Some(mime) = ext.as_deref().and_then(mime_for_extension) {
        return mime.to_string();
    }

    image::guess_format(bytes)
        .map(|f| f.to_mime_type().to_string())
        .unwrap_or_else(|_| FALLBACK_MIME.to_string())
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "png" => "image/png",
        "jpg" | "jpeg" | "jfif" | "pjpeg" | "pjp" => "image/jpeg",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "tif" | "tiff" => "image/tiff",
        "ico" => "image/x-icon",
        "avif" => "image/avif",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "json" => "application/json",
        _ => return None,
    };
    Some(mime)
}

/// Whether `mime_type` is on the allow-list (case-insensitive).
pub fn is_supported(mime_type: &str) -> bool {
    let mime = mime_type.trim().to_ascii_lowercase();
    SUPPORTED_MIME_TYPES.contains(&mime.as_str())
}

/// Reject anything outside the allow-list.
pub fn validate(candidate: &CandidateFile) -> Result<(), SvgrError> {
    if is_supported(&candidate.mime_type) {
        Ok(())
    } else {
        Err(SvgrError::InvalidFileType {
            file_name: candidate.file_name.clone(),
            mime_type: candidate.mime_type.clone(),
        })
    }
}

/// A validated image held for conversion.
///
/// Owns its preview handle; dropping or [`release`](Self::release)-ing the
/// image removes the preview file.
#[derive(Debug)]
pub struct SelectedImage {
    bytes: Arc<[u8]>,
    mime_type: String,
    file_name: String,
    dimensions: Option<ImageDimensions>,
    preview: PreviewHandle,
}

impl SelectedImage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the bytes, for work that outlives a borrow.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// `None` until the probe finishes, and for good if decoding failed.
    pub fn dimensions(&self) -> Option<ImageDimensions> {
        self.dimensions
    }

    pub(crate) fn set_dimensions(&mut self, dims: Option<ImageDimensions>) {
        self.dimensions = dims;
    }

    pub fn preview_path(&self) -> &Path {
        self.preview.path()
    }

    /// Snapshot of the metadata, detached from the bytes and preview.
    pub fn info(&self) -> ImageInfo {
        ImageInfo {
            file_name: self.file_name.clone(),
            mime_type: self.mime_type.clone(),
            byte_size: self.byte_size(),
            dimensions: self.dimensions,
        }
    }

    /// Drop the image and release its preview file immediately.
    pub fn release(self) {
        self.preview.release();
    }
}

/// Validate `candidate` and turn it into a [`SelectedImage`].
///
/// Dimensions are left empty; call [`probe_dimensions`] afterwards so the
/// selection itself never waits on a decode.
pub fn accept(candidate: CandidateFile) -> Result<SelectedImage, SvgrError> {
    validate(&candidate)?;

    let extension = preview_extension(&candidate.file_name, &candidate.mime_type);
    let preview = PreviewHandle::allocate(&candidate.bytes, &extension)?;

    info!(
        "Accepted {} ({}, {} bytes)",
        candidate.file_name,
        candidate.mime_type,
        candidate.bytes.len()
    );

    Ok(SelectedImage {
        bytes: Arc::from(candidate.bytes),
        mime_type: candidate.mime_type.trim().to_ascii_lowercase(),
        file_name: candidate.file_name,
        dimensions: None,
        preview,
    })
}

fn preview_extension(file_name: &str, mime_type: &str) -> String {
    Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_else(|| {
            mime_type
                .rsplit('/')
                .next()
                .unwrap_or("img")
                .to_ascii_lowercase()
        })
}

/// Decode just enough of the image header to learn its size.
pub fn read_dimensions(bytes: &[u8]) -> Result<ImageDimensions, image::ImageError> {
    let (width, height) = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()?;
    Ok(ImageDimensions { width, height })
}

/// Probe dimensions on a blocking thread; any failure yields `None`.
pub async fn probe_dimensions(bytes: Arc<[u8]>) -> Option<ImageDimensions> {
    match tokio::task::spawn_blocking(move || read_dimensions(&bytes)).await {
        Ok(Ok(dims)) => {
            debug!("Probed dimensions {}x{}", dims.width, dims.height);
            Some(dims)
        }
        Ok(Err(e)) => {
            debug!("Could not decode image dimensions: {}", e);
            None
        }
        Err(e) => {
            debug!("Dimension probe task failed: {}", e);
            None
        }
    }
}
