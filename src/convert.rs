//! Top-level entry points: one call per file, or per batch of files.
//!
//! Each input gets its own [`ConvertSession`], so the single-request and
//! reset rules of the session apply unchanged. These helpers are the only
//! place where a `Failed` state is turned into an `Err`, which is what a
//! script wants from `convert("logo.png", &config)?`.

use crate::config::ConversionConfig;
use crate::entitlement::EntitlementGate;
use crate::error::SvgrError;
use crate::output::{ConversionOutput, ConversionStats, ImageInfo};
use crate::pipeline::client::{ConversionService, HttpConversionClient};
use crate::pipeline::export::ExportFormat;
use crate::pipeline::intake::{self, CandidateFile};
use crate::progress::NoopProgressCallback;
use crate::session::{ConvertOutcome, ConvertSession, ExportOutcome, IgnoreReason};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A conversion plus whatever its exports produced, in the order requested.
#[derive(Debug)]
pub struct FileConversion {
    pub output: ConversionOutput,
    pub exports: Vec<ExportOutcome>,
}

impl FileConversion {
    /// True when the gate refused at least one export.
    pub fn any_blocked(&self) -> bool {
        self.exports
            .iter()
            .any(|e| matches!(e, ExportOutcome::Blocked(_)))
    }
}

/// One input of a batch and how it went.
#[derive(Debug)]
pub struct BatchItem<T> {
    pub input: PathBuf,
    pub result: Result<T, SvgrError>,
}

/// Convert an image file to SVG.
///
/// # Errors
/// Intake errors (`FileNotFound`, `PermissionDenied`, `InvalidFileType`) as
/// they are, and any failed attempt as [`SvgrError::ConversionFailed`]
/// carrying the message the session recorded.
pub async fn convert(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, SvgrError> {
    let wiring = Wiring::from_config(config)?;
    let session = wiring.session(config);
    run(&session, input.as_ref()).await
}

/// Convert `input` and export the result into `out_dir` once per format.
///
/// A blocked export is reported in [`FileConversion::exports`], not as an
/// error. Usage records run in the background; their handles are in the
/// `Saved` outcomes.
pub async fn convert_to_file(
    input: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    formats: &[ExportFormat],
    config: &ConversionConfig,
) -> Result<FileConversion, SvgrError> {
    let wiring = Wiring::from_config(config)?;
    convert_and_export(&wiring, config, input.as_ref(), out_dir.as_ref(), formats).await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, SvgrError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| SvgrError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input, config))
}

/// Convert several files, `config.concurrency` at a time.
///
/// Results come back in input order; one file failing does not stop the rest.
pub async fn convert_batch(
    inputs: &[PathBuf],
    config: &ConversionConfig,
) -> Result<Vec<BatchItem<ConversionOutput>>, SvgrError> {
    let wiring = Wiring::from_config(config)?;
    let wiring = &wiring;
    Ok(run_batch(inputs, config.concurrency, |input| async move {
        let session = wiring.session(config);
        run(&session, &input).await
    })
    .await)
}

/// [`convert_batch`] followed by [`convert_to_file`]-style exports.
pub async fn convert_batch_to_files(
    inputs: &[PathBuf],
    out_dir: &Path,
    formats: &[ExportFormat],
    config: &ConversionConfig,
) -> Result<Vec<BatchItem<FileConversion>>, SvgrError> {
    let wiring = Wiring::from_config(config)?;
    let wiring = &wiring;
    Ok(run_batch(inputs, config.concurrency, |input| async move {
        convert_and_export(wiring, config, &input, out_dir, formats).await
    })
    .await)
}

/// Read and validate an image without converting it.
///
/// Needs no service, token, or credits.
pub async fn inspect(input: impl AsRef<Path>) -> Result<ImageInfo, SvgrError> {
    let candidate = CandidateFile::from_path(input).await?;
    intake::validate(&candidate)?;

    let byte_size = candidate.bytes.len() as u64;
    let dimensions = intake::probe_dimensions(Arc::from(candidate.bytes)).await;
    Ok(ImageInfo {
        file_name: candidate.file_name,
        mime_type: candidate.mime_type.trim().to_ascii_lowercase(),
        byte_size,
        dimensions,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Service and gate resolved once per call and shared by its sessions.
struct Wiring {
    service: Arc<dyn ConversionService>,
    gate: EntitlementGate,
}

impl Wiring {
    /// An injected service wins; otherwise an HTTP client for
    /// `config.convert_url()`.
    fn from_config(config: &ConversionConfig) -> Result<Self, SvgrError> {
        let service: Arc<dyn ConversionService> = match &config.service {
            Some(service) => Arc::clone(service),
            None => Arc::new(HttpConversionClient::from_config(config)?),
        };
        let gate = EntitlementGate::from_store(config.entitlements.clone())
            .with_purchase_route(config.purchase_route.clone());
        debug!("Resolved wiring (gate enabled: {})", gate.is_enabled());
        Ok(Self { service, gate })
    }

    fn session(&self, config: &ConversionConfig) -> ConvertSession {
        let callback = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        ConvertSession::new(Arc::clone(&self.service))
            .with_gate(self.gate.clone())
            .with_progress_callback(callback)
            .with_parameters(config.parameters)
    }
}

async fn run(session: &ConvertSession, input: &Path) -> Result<ConversionOutput, SvgrError> {
    let total_start = Instant::now();
    info!("Starting conversion: {}", input.display());

    let candidate = CandidateFile::from_path(input).await?;
    let image = session.select_file(candidate).await?;
    let encoded_bytes = base64::encoded_len(image.byte_size as usize, true).unwrap_or(0);

    let request_start = Instant::now();
    let outcome = session.convert().await;
    let request_duration_ms = request_start.elapsed().as_millis() as u64;

    let svg = match outcome {
        ConvertOutcome::Succeeded => session.svg_markup().ok_or(SvgrError::NoConversionResult)?,
        ConvertOutcome::Failed(message) => return Err(SvgrError::ConversionFailed { message }),
        ConvertOutcome::Ignored(IgnoreReason::NoImage) => return Err(SvgrError::NoImageSelected),
        other => {
            return Err(SvgrError::Internal(format!(
                "unexpected outcome on a fresh session: {other:?}"
            )))
        }
    };

    let stats = ConversionStats {
        input_bytes: image.byte_size,
        encoded_bytes,
        svg_bytes: svg.len(),
        request_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Conversion complete: {} → {} bytes SVG, {}ms total",
        image.file_name, stats.svg_bytes, stats.total_duration_ms
    );

    Ok(ConversionOutput { svg, image, stats })
}

async fn convert_and_export(
    wiring: &Wiring,
    config: &ConversionConfig,
    input: &Path,
    out_dir: &Path,
    formats: &[ExportFormat],
) -> Result<FileConversion, SvgrError> {
    let session = wiring.session(config);
    let output = run(&session, input).await?;

    let mut exports = Vec::with_capacity(formats.len());
    for format in formats {
        let outcome = session.export(*format, out_dir).await?;
        if let ExportOutcome::Blocked(notice) = &outcome {
            warn!(
                "{} export of {} blocked (balance {})",
                format, output.image.file_name, notice.balance
            );
        }
        exports.push(outcome);
    }
    session.clear();

    Ok(FileConversion { output, exports })
}

async fn run_batch<T, F, Fut>(inputs: &[PathBuf], concurrency: usize, job: F) -> Vec<BatchItem<T>>
where
    F: Fn(PathBuf) -> Fut,
    Fut: Future<Output = Result<T, SvgrError>>,
{
    info!(
        "Batch of {} files, {} at a time",
        inputs.len(),
        concurrency.max(1)
    );
    let mut items: Vec<(usize, BatchItem<T>)> =
        stream::iter(inputs.iter().cloned().enumerate().map(|(idx, input)| {
            let fut = job(input.clone());
            async move {
                let result = fut.await;
                if let Err(ref e) = result {
                    warn!("{}: {}", input.display(), e);
                }
                (idx, BatchItem { input, result })
            }
        }))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    items.sort_by_key(|(idx, _)| *idx);
    items.into_iter().map(|(_, item)| item).collect()
}
