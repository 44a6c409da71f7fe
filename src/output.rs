//! Result types returned by the conversion and export entry points.

use crate::pipeline::export::ExportFormat;
use crate::pipeline::intake::ImageDimensions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Metadata of a selected image, without its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub file_name: String,
    pub mime_type: String,
    pub byte_size: u64,
    pub dimensions: Option<ImageDimensions>,
}

/// Timing and size figures for one conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Size of the original image.
    pub input_bytes: u64,
    /// Size of the base64 payload sent to the service.
    pub encoded_bytes: usize,
    /// Length of the returned SVG markup.
    pub svg_bytes: usize,
    /// Wall-clock time of the service round trip.
    pub request_duration_ms: u64,
    /// Wall-clock time from reading the file to having the SVG.
    pub total_duration_ms: u64,
}

/// A finished conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    pub svg: String,
    pub image: ImageInfo,
    pub stats: ConversionStats,
}

/// Where an export landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReceipt {
    pub path: PathBuf,
    pub format: ExportFormat,
    pub bytes_written: usize,
}
