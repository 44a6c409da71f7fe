//! The per-image conversion session.
//!
//! A [`ConvertSession`] owns at most one [`SelectedImage`], the current
//! [`ConversionParameters`], and the state of the last conversion attempt:
//!
//! ```text
//!            select_file / clear (from any state)
//!         ┌──────────────────────────────────────┐
//!         ▼                                      │
//!       Idle ── convert ──▶ InFlight ──┬──▶ Succeeded(svg)
//!                                      └──▶ Failed(message)
//! ```
//!
//! Every selection or clear bumps a generation counter. A request remembers
//! the generation it was issued for, and when it resolves under a newer one
//! its result is dropped and reported as [`ConvertOutcome::Superseded`].
//! Until that happens the request is still outstanding, and `convert` keeps
//! answering [`IgnoreReason::InFlight`]: the service never sees two requests
//! from one session at once.
//!
//! State sits behind a `std::sync::Mutex` that is only taken between awaits,
//! so reads and parameter changes stay available while a request runs.

use crate::config::ConversionParameters;
use crate::entitlement::{CreditNotice, EntitlementGate, GateDecision};
use crate::error::SvgrError;
use crate::output::{ExportReceipt, ImageInfo};
use crate::pipeline::client::{ConversionService, ConvertEnvelope};
use crate::pipeline::encode;
use crate::pipeline::export::{self, ExportFormat};
use crate::pipeline::intake::{self, CandidateFile, SelectedImage};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// State of the most recent conversion attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConversionState {
    #[default]
    Idle,
    InFlight,
    Succeeded(String),
    Failed(String),
}

/// The last attempt's output; at most one side is populated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub svg: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoImage,
    InFlight,
}

/// What a call to [`ConvertSession::convert`] amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertOutcome {
    /// The session now holds the SVG.
    Succeeded,
    /// The session is in `Failed` with this message.
    Failed(String),
    /// Nothing was sent.
    Ignored(IgnoreReason),
    /// The selection changed while the request ran; its result was dropped.
    Superseded,
}

/// Result of an export attempt that got as far as the gate.
#[derive(Debug)]
pub enum ExportOutcome {
    Saved {
        receipt: ExportReceipt,
        /// Background usage record; `None` in free mode. Awaiting it is
        /// optional and it never yields an error.
        usage_task: Option<JoinHandle<()>>,
    },
    /// Refused for lack of credits; nothing was written.
    Blocked(CreditNotice),
}

#[derive(Debug, Default)]
struct SessionState {
    image: Option<SelectedImage>,
    params: ConversionParameters,
    request: ConversionState,
    generation: u64,
    outstanding: bool,
}

/// One image, one parameter set, one conversion at a time.
pub struct ConvertSession {
    service: Arc<dyn ConversionService>,
    gate: EntitlementGate,
    callback: ProgressCallback,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for ConvertSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.lock();
        f.debug_struct("ConvertSession")
            .field("image", &st.image.as_ref().map(SelectedImage::file_name))
            .field("params", &st.params)
            .field("request", &st.request)
            .field("generation", &st.generation)
            .field("gate", &self.gate)
            .finish()
    }
}

impl ConvertSession {
    pub fn new(service: Arc<dyn ConversionService>) -> Self {
        Self {
            service,
            gate: EntitlementGate::free(),
            callback: Arc::new(NoopProgressCallback),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn with_gate(mut self, gate: EntitlementGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = callback;
        self
    }

    pub fn with_parameters(self, params: ConversionParameters) -> Self {
        self.lock().params = params;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        lock_state(&self.state)
    }

    // ── Selection ───────────────────────────────────────────────────────

    /// Validate and select `candidate`, replacing any current image.
    ///
    /// A rejected file leaves the session exactly as it was. An accepted one
    /// resets the conversion state to `Idle` and releases the previous
    /// preview. The returned info carries dimensions when the header could
    /// be decoded.
    pub async fn select_file(&self, candidate: CandidateFile) -> Result<ImageInfo, SvgrError> {
        let image = intake::accept(candidate).inspect_err(|e| warn!("Selection rejected: {}", e))?;
        let mut info = image.info();
        let bytes = image.shared_bytes();

        let (generation, previous) = {
            let mut st = self.lock();
            st.generation += 1;
            st.request = ConversionState::Idle;
            (st.generation, st.image.replace(image))
        };
        if let Some(previous) = previous {
            debug!("Releasing previous selection {}", previous.file_name());
            previous.release();
        }
        self.callback.on_file_selected(&info.file_name, info.byte_size);

        info.dimensions = intake::probe_dimensions(bytes).await;

        let mut st = self.lock();
        if st.generation == generation {
            if let Some(image) = st.image.as_mut() {
                image.set_dimensions(info.dimensions);
            }
        }
        Ok(info)
    }

    /// Drop the selection and any result.
    pub fn clear(&self) {
        let previous = {
            let mut st = self.lock();
            st.generation += 1;
            st.request = ConversionState::Idle;
            st.image.take()
        };
        if let Some(previous) = previous {
            info!("Cleared selection {}", previous.file_name());
            previous.release();
        }
    }

    // ── Parameters ──────────────────────────────────────────────────────

    /// Clamped to the quality range.
    pub fn set_quality(&self, quality: i64) {
        self.lock().params.set_quality(quality);
    }

    pub fn set_transparent_background(&self, transparent: bool) {
        self.lock().params.set_transparent_background(transparent);
    }

    pub fn parameters(&self) -> ConversionParameters {
        self.lock().params
    }

    // ── Observation ─────────────────────────────────────────────────────

    pub fn state(&self) -> ConversionState {
        self.lock().request.clone()
    }

    pub fn is_converting(&self) -> bool {
        self.lock().request == ConversionState::InFlight
    }

    /// An image is selected and no request is outstanding.
    pub fn can_convert(&self) -> bool {
        let st = self.lock();
        st.image.is_some() && !st.outstanding
    }

    pub fn selected_image(&self) -> Option<ImageInfo> {
        self.lock().image.as_ref().map(SelectedImage::info)
    }

    pub fn svg_markup(&self) -> Option<String> {
        match &self.lock().request {
            ConversionState::Succeeded(svg) => Some(svg.clone()),
            _ => None,
        }
    }

    pub fn result(&self) -> ConversionResult {
        match &self.lock().request {
            ConversionState::Succeeded(svg) => ConversionResult {
                svg: Some(svg.clone()),
                error: None,
            },
            ConversionState::Failed(message) => ConversionResult {
                svg: None,
                error: Some(message.clone()),
            },
            _ => ConversionResult::default(),
        }
    }

    // ── Conversion ──────────────────────────────────────────────────────

    /// Send the selected image to the service once.
    ///
    /// Failures end in `Failed(message)`, never in a panic or an `Err`.
    /// There is no retry.
    pub async fn convert(&self) -> ConvertOutcome {
        let (request, generation) = {
            let mut st = self.lock();
            if st.outstanding {
                debug!("Conversion already in flight; ignoring");
                return ConvertOutcome::Ignored(IgnoreReason::InFlight);
            }
            let Some(image) = st.image.as_ref() else {
                debug!("No image selected; ignoring convert");
                return ConvertOutcome::Ignored(IgnoreReason::NoImage);
            };
            let request = encode::build_request(image, &st.params);
            st.outstanding = true;
            st.request = ConversionState::InFlight;
            (request, st.generation)
        };
        let guard = Outstanding {
            state: &self.state,
            generation,
        };
        let file_name = request.filename.clone();

        info!(
            "Converting {} (quality {}, transparent {})",
            file_name, request.quality, request.transparent_background
        );
        self.callback.on_convert_start(&file_name);

        let result = self
            .service
            .convert(&request)
            .await
            .and_then(ConvertEnvelope::into_svg);

        let outcome = {
            let mut st = self.lock();
            if st.generation != generation {
                info!("Discarding result for {}: selection changed", file_name);
                ConvertOutcome::Superseded
            } else {
                match &result {
                    Ok(svg) => {
                        st.request = ConversionState::Succeeded(svg.clone());
                        ConvertOutcome::Succeeded
                    }
                    Err(e) => {
                        let message = e.conversion_message();
                        st.request = ConversionState::Failed(message.clone());
                        ConvertOutcome::Failed(message)
                    }
                }
            }
        };
        drop(guard);

        match (&outcome, &result) {
            (ConvertOutcome::Succeeded, Ok(svg)) => {
                info!("Converted {} ({} bytes of SVG)", file_name, svg.len());
                self.callback.on_convert_complete(&file_name, svg.len());
            }
            (ConvertOutcome::Failed(message), Err(e)) => {
                warn!("Conversion of {} failed: {}", file_name, e);
                self.callback.on_convert_error(&file_name, message);
            }
            _ => {}
        }
        outcome
    }

    // ── Export ──────────────────────────────────────────────────────────

    /// Write the SVG verbatim into `out_dir`.
    pub async fn export_svg(&self, out_dir: &Path) -> Result<ExportOutcome, SvgrError> {
        self.export(ExportFormat::Svg, out_dir).await
    }

    /// Write a one-page PDF of the SVG into `out_dir`.
    pub async fn export_pdf(&self, out_dir: &Path) -> Result<ExportOutcome, SvgrError> {
        self.export(ExportFormat::Pdf, out_dir).await
    }

    pub async fn export(
        &self,
        format: ExportFormat,
        out_dir: &Path,
    ) -> Result<ExportOutcome, SvgrError> {
        let (svg, original_name) = {
            let st = self.lock();
            let ConversionState::Succeeded(svg) = &st.request else {
                return Err(SvgrError::NoConversionResult);
            };
            let name = st.image.as_ref().map(|i| i.file_name().to_string());
            (svg.clone(), name)
        };

        if let GateDecision::Block(notice) = self.gate.check() {
            info!(
                "{} export blocked: balance {}",
                format.extension().to_uppercase(),
                notice.balance
            );
            self.callback.on_export_blocked(notice.balance);
            return Ok(ExportOutcome::Blocked(notice));
        }

        let name = original_name.as_deref();
        let receipt = match format {
            ExportFormat::Svg => export::write_svg(&svg, name, out_dir).await?,
            ExportFormat::Pdf => export::write_pdf(&svg, name, out_dir).await?.0,
        };
        self.callback
            .on_export_saved(&receipt.path, receipt.bytes_written);

        let label = receipt
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| export::export_file_name(name, format));
        let usage_task = self.gate.record_usage_in_background(label);

        Ok(ExportOutcome::Saved {
            receipt,
            usage_task,
        })
    }
}

fn lock_state(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the outstanding flag when a request ends, including when the
/// `convert` future is dropped mid-flight.
struct Outstanding<'a> {
    state: &'a Mutex<SessionState>,
    generation: u64,
}

impl Drop for Outstanding<'_> {
    fn drop(&mut self) {
        let mut st = lock_state(self.state);
        st.outstanding = false;
        if st.generation == self.generation && st.request == ConversionState::InFlight {
            st.request = ConversionState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entitlement::{CreditPackage, EntitlementStore, PurchaseReceipt};
    use crate::pipeline::encode::ConvertRequest;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    const SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="100"><rect width="10" height="10"/></svg>"#;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbImage::new(w, h);
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn candidate(name: &str) -> CandidateFile {
        CandidateFile::new(png(4, 3), name, "image/png")
    }

    /// Answers with a fixed envelope, optionally waiting for a release first.
    struct FakeService {
        reply: Result<ConvertEnvelope, String>,
        hold: Option<Arc<Notify>>,
        calls: AtomicUsize,
        last: Mutex<Option<ConvertRequest>>,
    }

    impl FakeService {
        fn replying(envelope: ConvertEnvelope) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(envelope),
                hold: None,
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }

        fn held(envelope: ConvertEnvelope, hold: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(envelope),
                hold: Some(hold),
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }

        fn unreachable() -> Arc<Self> {
            Arc::new(Self {
                reply: Err("connection refused".into()),
                hold: None,
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl ConversionService for FakeService {
        async fn convert(&self, request: &ConvertRequest) -> Result<ConvertEnvelope, SvgrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(request.clone());
            if let Some(hold) = &self.hold {
                hold.notified().await;
            }
            self.reply
                .clone()
                .map_err(|reason| SvgrError::ConversionTransportFailure { reason })
        }
    }

    struct FixedBalance(Option<i64>);

    #[async_trait]
    impl EntitlementStore for FixedBalance {
        fn cached_balance(&self) -> Option<i64> {
            self.0
        }
        async fn refresh_balance(&self) -> Result<i64, SvgrError> {
            Ok(self.0.unwrap_or(0))
        }
        async fn packages(&self, _: &str) -> Result<Vec<CreditPackage>, SvgrError> {
            Ok(vec![])
        }
        async fn purchase(&self, id: &str, _: &str) -> Result<PurchaseReceipt, SvgrError> {
            Ok(PurchaseReceipt {
                package_id: id.into(),
                balance: None,
                checkout_url: None,
            })
        }
        async fn record_usage(&self, _: &str) -> Result<(), SvgrError> {
            Ok(())
        }
    }

    async fn wait_for_call(service: &FakeService) {
        while service.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn convert_without_image_is_ignored() {
        let service = FakeService::replying(ConvertEnvelope::success(SVG));
        let session = ConvertSession::new(service.clone());
        assert_eq!(
            session.convert().await,
            ConvertOutcome::Ignored(IgnoreReason::NoImage)
        );
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
        assert!(!session.can_convert());
    }

    #[tokio::test]
    async fn select_probes_dimensions() {
        let session = ConvertSession::new(FakeService::replying(ConvertEnvelope::success(SVG)));
        let info = session.select_file(candidate("a.png")).await.unwrap();
        let dims = info.dimensions.unwrap();
        assert_eq!((dims.width, dims.height), (4, 3));
        assert_eq!(session.selected_image().unwrap().dimensions, Some(dims));
    }

    #[tokio::test]
    async fn rejected_file_leaves_selection_untouched() {
        let session = ConvertSession::new(FakeService::replying(ConvertEnvelope::success(SVG)));
        session.select_file(candidate("keep.png")).await.unwrap();
        session.convert().await;

        let err = session
            .select_file(CandidateFile::new(b"%PDF".to_vec(), "doc.pdf", "application/pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, SvgrError::InvalidFileType { .. }));
        assert_eq!(session.selected_image().unwrap().file_name, "keep.png");
        assert_eq!(session.state(), ConversionState::Succeeded(SVG.into()));
    }

    #[tokio::test]
    async fn success_stores_svg_and_sends_parameters() {
        let service = FakeService::replying(ConvertEnvelope::success(SVG));
        let session = ConvertSession::new(service.clone());
        session.select_file(candidate("a.png")).await.unwrap();
        session.set_quality(99);
        session.set_transparent_background(true);

        assert_eq!(session.convert().await, ConvertOutcome::Succeeded);
        assert_eq!(session.svg_markup().as_deref(), Some(SVG));
        assert_eq!(session.result().error, None);

        let sent = service.last.lock().unwrap().clone().unwrap();
        assert_eq!(sent.quality, 10);
        assert!(sent.transparent_background);
        assert_eq!(sent.filename, "a.png");
    }

    #[tokio::test]
    async fn failures_land_in_failed_state() {
        let cases = [
            (
                FakeService::replying(ConvertEnvelope::failure("too large")),
                "too large",
            ),
            (
                FakeService::replying(ConvertEnvelope {
                    success: true,
                    data: None,
                    error: None,
                }),
                "Conversion failed",
            ),
        ];
        for (service, expected) in cases {
            let session = ConvertSession::new(service);
            session.select_file(candidate("a.png")).await.unwrap();
            assert_eq!(
                session.convert().await,
                ConvertOutcome::Failed(expected.into())
            );
            assert_eq!(session.state(), ConversionState::Failed(expected.into()));
            assert_eq!(session.result().svg, None);
        }

        let session = ConvertSession::new(FakeService::unreachable());
        session.select_file(candidate("a.png")).await.unwrap();
        match session.convert().await {
            ConvertOutcome::Failed(message) => assert!(message.contains("connection refused")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(session.can_convert());
    }

    #[tokio::test]
    async fn second_convert_while_in_flight_is_ignored() {
        let hold = Arc::new(Notify::new());
        let service = FakeService::held(ConvertEnvelope::success(SVG), hold.clone());
        let session = Arc::new(ConvertSession::new(service.clone()));
        session.select_file(candidate("a.png")).await.unwrap();

        let first = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.convert().await }
        });
        wait_for_call(&service).await;

        assert!(session.is_converting());
        assert!(!session.can_convert());
        assert_eq!(
            session.convert().await,
            ConvertOutcome::Ignored(IgnoreReason::InFlight)
        );

        hold.notify_one();
        assert_eq!(first.await.unwrap(), ConvertOutcome::Succeeded);
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn new_selection_supersedes_outstanding_request() {
        let hold = Arc::new(Notify::new());
        let service = FakeService::held(ConvertEnvelope::success(SVG), hold.clone());
        let session = Arc::new(ConvertSession::new(service.clone()));
        session.select_file(candidate("old.png")).await.unwrap();

        let first = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.convert().await }
        });
        wait_for_call(&service).await;

        session.select_file(candidate("new.png")).await.unwrap();
        assert_eq!(session.state(), ConversionState::Idle);
        assert_eq!(
            session.convert().await,
            ConvertOutcome::Ignored(IgnoreReason::InFlight)
        );

        hold.notify_one();
        assert_eq!(first.await.unwrap(), ConvertOutcome::Superseded);
        assert_eq!(session.state(), ConversionState::Idle);
        assert_eq!(session.svg_markup(), None);
        assert!(session.can_convert());
    }

    #[tokio::test]
    async fn clear_resets_and_releases_preview() {
        let session = ConvertSession::new(FakeService::replying(ConvertEnvelope::success(SVG)));
        session.select_file(candidate("a.png")).await.unwrap();
        let preview = session
            .lock()
            .image
            .as_ref()
            .unwrap()
            .preview_path()
            .to_path_buf();
        assert!(preview.exists());
        session.convert().await;

        session.clear();
        assert!(!preview.exists());
        assert_eq!(session.state(), ConversionState::Idle);
        assert_eq!(session.selected_image(), None);
    }

    #[tokio::test]
    async fn export_needs_a_result() {
        let dir = tempfile::tempdir().unwrap();
        let session = ConvertSession::new(FakeService::replying(ConvertEnvelope::success(SVG)));
        session.select_file(candidate("a.png")).await.unwrap();
        assert!(matches!(
            session.export_svg(dir.path()).await,
            Err(SvgrError::NoConversionResult)
        ));
    }

    #[tokio::test]
    async fn blocked_export_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let session = ConvertSession::new(FakeService::replying(ConvertEnvelope::success(SVG)))
            .with_gate(EntitlementGate::new(Arc::new(FixedBalance(Some(0)))));
        session.select_file(candidate("a.png")).await.unwrap();
        session.convert().await;

        for outcome in [
            session.export_svg(dir.path()).await.unwrap(),
            session.export_pdf(dir.path()).await.unwrap(),
        ] {
            match outcome {
                ExportOutcome::Blocked(notice) => assert_eq!(notice.balance, 0),
                other => panic!("expected block, got {other:?}"),
            }
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn optimistic_export_saves_and_records_usage() {
        let dir = tempfile::tempdir().unwrap();
        let session = ConvertSession::new(FakeService::replying(ConvertEnvelope::success(SVG)))
            .with_gate(EntitlementGate::new(Arc::new(FixedBalance(None))));
        session.select_file(candidate("photo.png")).await.unwrap();
        session.convert().await;

        match session.export_pdf(dir.path()).await.unwrap() {
            ExportOutcome::Saved {
                receipt,
                usage_task,
            } => {
                assert_eq!(receipt.path, dir.path().join("photo.pdf"));
                usage_task.expect("gate is enabled").await.unwrap();
            }
            other => panic!("expected save, got {other:?}"),
        }
    }
}
