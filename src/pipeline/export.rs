//! Result export: write the converted SVG, or an SVG-embedding PDF, to disk.
//!
//! Both exports are the CLI counterpart of a browser download: the file lands
//! under the original image's base name with a new extension. Writes go to a
//! temporary sibling first and are renamed into place, so an interrupted
//! export never leaves a truncated `.svg` or `.pdf` behind.

use crate::error::SvgrError;
use crate::output::ExportReceipt;
use crate::pipeline::layout::{derive_layout, fit_to_page, PageLayout};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Base name used when the original file name is unknown.
pub const FALLBACK_BASE_NAME: &str = "converted";

static EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[^.]+$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Svg,
    Pdf,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Svg => "svg",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Svg => "image/svg+xml",
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// `photo.png` → `photo.svg`; no name → `converted.svg`.
///
/// Only the last extension is replaced and any directory part is dropped.
pub fn export_file_name(original: Option<&str>, format: ExportFormat) -> String {
    let base = original
        .and_then(|name| Path::new(name).file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .map(|name| EXTENSION.replace(&name, "").into_owned())
        .filter(|base| !base.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_BASE_NAME.to_string());
    format!("{}.{}", base, format.extension())
}

/// Write `svg` verbatim as `<base>.svg` in `out_dir`.
pub async fn write_svg(
    svg: &str,
    original_name: Option<&str>,
    out_dir: &Path,
) -> Result<ExportReceipt, SvgrError> {
    let path = out_dir.join(export_file_name(original_name, ExportFormat::Svg));
    write_atomic(&path, svg.as_bytes()).await?;
    info!("Saved SVG {} ({} bytes)", path.display(), svg.len());

    Ok(ExportReceipt {
        path,
        format: ExportFormat::Svg,
        bytes_written: svg.len(),
    })
}

/// Embed `svg` on a single page sized to its declared dimensions.
///
/// usvg parsing and svg2pdf embedding are CPU-bound, so they run on a
/// blocking thread.
pub async fn render_pdf(svg: &str) -> Result<(Vec<u8>, PageLayout), SvgrError> {
    let layout = derive_layout(svg)?;
    let sized = fit_to_page(svg, &layout)?;
    debug!(
        "PDF page {}x{} ({:?})",
        layout.width, layout.height, layout.orientation
    );

    let pdf = tokio::task::spawn_blocking(move || embed_svg(&sized))
        .await
        .map_err(|e| SvgrError::Internal(format!("PDF task panicked: {e}")))??;

    Ok((pdf, layout))
}

fn embed_svg(svg: &str) -> Result<Vec<u8>, SvgrError> {
    let options = usvg::Options::default();
    let tree = usvg::Tree::from_str(svg, &options).map_err(|e| SvgrError::InvalidSvg {
        detail: e.to_string(),
    })?;

    svg2pdf::to_pdf(
        &tree,
        svg2pdf::ConversionOptions::default(),
        svg2pdf::PageOptions::default(),
    )
    .map_err(|e| SvgrError::PdfEmbedFailed {
        detail: e.to_string(),
    })
}

/// Render `svg` to PDF and write it as `<base>.pdf` in `out_dir`.
pub async fn write_pdf(
    svg: &str,
    original_name: Option<&str>,
    out_dir: &Path,
) -> Result<(ExportReceipt, PageLayout), SvgrError> {
    let (pdf, layout) = render_pdf(svg).await?;
    let path = out_dir.join(export_file_name(original_name, ExportFormat::Pdf));
    write_atomic(&path, &pdf).await?;
    info!("Saved PDF {} ({} bytes)", path.display(), pdf.len());

    Ok((
        ExportReceipt {
            path,
            format: ExportFormat::Pdf,
            bytes_written: pdf.len(),
        },
        layout,
    ))
}

/// Write to `<path>.tmp` then rename over `path`; the temp file never survives.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SvgrError> {
    let write_err = |source: std::io::Error| SvgrError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = tmp_sibling(path);
    if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }

    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::layout::Orientation;

    const SQUARE: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="100"><rect x="10" y="10" width="80" height="80" fill="blue"/></svg>"#;

    #[test]
    fn file_names_replace_last_extension() {
        assert_eq!(export_file_name(Some("photo.png"), ExportFormat::Svg), "photo.svg");
        assert_eq!(export_file_name(Some("photo.png"), ExportFormat::Pdf), "photo.pdf");
        assert_eq!(export_file_name(Some("a.b.jpeg"), ExportFormat::Svg), "a.b.svg");
        assert_eq!(export_file_name(Some("scan"), ExportFormat::Svg), "scan.svg");
        assert_eq!(export_file_name(None, ExportFormat::Svg), "converted.svg");
        assert_eq!(export_file_name(Some(".png"), ExportFormat::Pdf), "converted.pdf");
        assert_eq!(
            export_file_name(Some("../../etc/logo.gif"), ExportFormat::Svg),
            "logo.svg"
        );
    }

    #[test]
    fn format_metadata() {
        assert_eq!(ExportFormat::Svg.mime_type(), "image/svg+xml");
        assert_eq!(ExportFormat::Pdf.mime_type(), "application/pdf");
        assert_eq!(ExportFormat::Pdf.to_string(), "pdf");
    }

    #[tokio::test]
    async fn svg_export_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let svg = "<svg xmlns=\"http://www.w3.org/2000/svg\">\u{e9}\n</svg>";
        let receipt = write_svg(svg, Some("café.png"), dir.path()).await.unwrap();

        assert_eq!(receipt.path, dir.path().join("café.svg"));
        assert_eq!(receipt.bytes_written, svg.len());
        assert_eq!(std::fs::read(&receipt.path).unwrap(), svg.as_bytes());
        assert!(!dir.path().join("café.svg.tmp").exists());
    }

    #[tokio::test]
    async fn export_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("out/vectors");
        let receipt = write_svg("<svg/>", None, &nested).await.unwrap();
        assert!(receipt.path.exists());
    }

    #[tokio::test]
    async fn pdf_export_writes_pdf_with_derived_layout() {
        let dir = tempfile::tempdir().unwrap();
        let (receipt, layout) = write_pdf(SQUARE, Some("shape.webp"), dir.path())
            .await
            .unwrap();

        assert_eq!(receipt.path, dir.path().join("shape.pdf"));
        assert_eq!(layout.orientation, Orientation::Landscape);
        assert_eq!((layout.width, layout.height), (200.0, 100.0));

        let bytes = std::fs::read(&receipt.path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert_eq!(bytes.len(), receipt.bytes_written);
    }

    #[tokio::test]
    async fn pdf_of_invalid_svg_fails_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_pdf("not an svg", Some("x.png"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, SvgrError::InvalidSvg { .. }));
        assert!(!dir.path().join("x.pdf").exists());
    }
}
