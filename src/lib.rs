//! # svgr
//!
//! Convert raster images (PNG, JPEG, WEBP, BMP, GIF) to scalable vector
//! graphics through a remote vectorisation service, then save the result as
//! SVG or as a one-page PDF.
//!
//! The vectorisation itself happens server-side. This crate owns everything
//! around it: validating what the user picked, building the request, the
//! one-request-at-a-time conversion state machine, the exports, and the
//! credit check that gates them.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image file
//!  │
//!  ├─ 1. Intake   MIME allow-list, preview temp file, dimension probe
//!  ├─ 2. Encode   bytes → base64 JSON request with quality / transparency
//!  ├─ 3. Convert  one POST to the service; Idle → InFlight → Succeeded | Failed
//!  ├─ 4. Gate     credit balance check (free mode when no store is set)
//!  └─ 5. Export   SVG verbatim, or PDF page sized from the SVG root
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use svgr::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .api_url("https://vectorize.example.com")
//!         .quality(7)
//!         .build()?;
//!     let output = convert("logo.png", &config).await?;
//!     println!("{}", output.svg);
//!     Ok(())
//! }
//! ```
//!
//! For interactive hosts, drive a [`ConvertSession`] directly: it keeps the
//! selection, parameters and last result, and exposes the state machine.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `svgr` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! svgr = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod entitlement;
pub mod error;
pub mod identity;
pub mod locale;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod session;

#[cfg(test)]
mod testing;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, ConversionParameters, APP_NAME};
pub use convert::{
    convert, convert_batch, convert_batch_to_files, convert_sync, convert_to_file, inspect,
    BatchItem, FileConversion,
};
pub use entitlement::{
    CreditNotice, CreditPackage, EntitlementGate, EntitlementStore, GateDecision,
    HttpEntitlementStore,
};
pub use error::SvgrError;
pub use identity::{AnonymousIdentity, AuthUser, IdentityProvider, StaticTokenIdentity};
pub use locale::{DirLocaleProvider, LocaleProvider, Translator};
pub use output::{ConversionOutput, ConversionStats, ExportReceipt, ImageInfo};
pub use pipeline::client::{ConversionService, ConvertEnvelope, HttpConversionClient};
pub use pipeline::encode::ConvertRequest;
pub use pipeline::export::ExportFormat;
pub use pipeline::intake::CandidateFile;
pub use pipeline::layout::{Orientation, PageLayout};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use session::{
    ConversionResult, ConversionState, ConvertOutcome, ConvertSession, ExportOutcome,
    IgnoreReason,
};
