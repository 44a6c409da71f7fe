//! Error types for the svgr library.
//!
//! Every failure the client can hit is a variant of [`SvgrError`]. None of
//! them is fatal to the host process: the [`crate::session::ConvertSession`]
//! folds conversion failures into its state machine, blocked exports into
//! [`crate::session::ExportOutcome::Blocked`], and usage-recording failures
//! into a log line. Only the top-level `convert*` helpers surface them as
//! `Err` so scripts can exit non-zero.

use std::path::PathBuf;
use thiserror::Error;

/// Message shown when the service answered but gave no usable reason.
pub const GENERIC_CONVERSION_FAILURE: &str = "Conversion failed";

/// All errors returned by the svgr library.
#[derive(Debug, Error)]
pub enum SvgrError {
    // ── Intake errors ─────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file's MIME type is outside the supported set.
    #[error("Unsupported file type '{mime_type}' for '{file_name}'\nPlease select an image file (PNG, JPG, WEBP, BMP, GIF).")]
    InvalidFileType {
        file_name: String,
        mime_type: String,
    },

    /// An operation needed a selected image but none is held.
    #[error("No image selected")]
    NoImageSelected,

    /// An export was requested before any SVG was produced.
    #[error("Nothing to export: no conversion result is available")]
    NoConversionResult,

    // ── Conversion errors ─────────────────────────────────────────────────
    /// Network or HTTP-level failure talking to the conversion service.
    #[error("{reason}")]
    ConversionTransportFailure { reason: String },

    /// The conversion request exceeded the configured timeout.
    #[error("Conversion request timed out after {secs}s\nIncrease --timeout.")]
    ConversionTimeout { secs: u64 },

    /// The service reported success but the payload lacked the SVG.
    #[error("Malformed conversion response: {detail}")]
    ConversionResponseMalformed { detail: String },

    /// The conversion attempt ended in the `Failed` state.
    #[error("{message}")]
    ConversionFailed { message: String },

    // ── Entitlement errors ────────────────────────────────────────────────
    /// Export blocked because the credit balance is exhausted.
    #[error("Insufficient credits (balance: {balance})\nBuy more at {purchase_route}.")]
    InsufficientCredits { balance: i64, purchase_route: String },

    /// Usage could not be recorded. Never surfaced to users; logged only.
    #[error("Failed to record usage for '{label}': {reason}")]
    UsageRecordingFailed { label: String, reason: String },

    /// Balance, catalog, or purchase call failed.
    #[error("Entitlement service unavailable: {reason}")]
    EntitlementUnavailable { reason: String },

    /// The identity provider could not produce a token.
    #[error("Authentication failed: {reason}")]
    IdentityFailed { reason: String },

    // ── Export errors ─────────────────────────────────────────────────────
    /// The SVG markup could not be parsed.
    #[error("Invalid SVG: {detail}")]
    InvalidSvg { detail: String },

    /// svg2pdf failed to embed the drawing.
    #[error("PDF embedding failed: {detail}")]
    PdfEmbedFailed { detail: String },

    /// Could not create or write an exported file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Locale errors ─────────────────────────────────────────────────────
    /// A translation table could not be loaded.
    #[error("Failed to load locale '{lang}': {reason}")]
    LocaleLoadFailed { lang: String, reason: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SvgrError {
    /// The message a conversion failure leaves in the session state.
    ///
    /// Transport problems keep their own text; a malformed success payload
    /// collapses to the generic message.
    pub fn conversion_message(&self) -> String {
        match self {
            SvgrError::ConversionResponseMalformed { .. } => GENERIC_CONVERSION_FAILURE.to_string(),
            other => {
                let msg = other.to_string();
                if msg.trim().is_empty() {
                    GENERIC_CONVERSION_FAILURE.to_string()
                } else {
                    msg
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_file_type_display() {
        let e = SvgrError::InvalidFileType {
            file_name: "notes.txt".into(),
            mime_type: "text/plain".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("text/plain"), "got: {msg}");
        assert!(msg.contains("PNG, JPG, WEBP, BMP, GIF"));
    }

    #[test]
    fn insufficient_credits_display() {
        let e = SvgrError::InsufficientCredits {
            balance: 0,
            purchase_route: "/en/credits".into(),
        };
        assert!(e.to_string().contains("/en/credits"));
    }

    #[test]
    fn malformed_response_collapses_to_generic_message() {
        let e = SvgrError::ConversionResponseMalformed {
            detail: "missing data.svg".into(),
        };
        assert_eq!(e.conversion_message(), GENERIC_CONVERSION_FAILURE);
    }

    #[test]
    fn transport_failure_keeps_reason() {
        let e = SvgrError::ConversionTransportFailure {
            reason: "connection refused".into(),
        };
        assert_eq!(e.conversion_message(), "connection refused");
    }

    #[test]
    fn empty_transport_reason_falls_back() {
        let e = SvgrError::ConversionTransportFailure { reason: " ".into() };
        assert_eq!(e.conversion_message(), GENERIC_CONVERSION_FAILURE);
    }
}
