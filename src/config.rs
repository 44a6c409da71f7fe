//! Configuration types for image-to-vector conversion.
//!
//! All client behaviour is controlled through [`ConversionConfig`], built via
//! its [`ConversionConfigBuilder`]. The user-adjustable dials that travel with
//! each request live in [`ConversionParameters`], which clamps on every write
//! so an out-of-range quality can never reach the wire.

use crate::entitlement::{EntitlementStore, DEFAULT_PURCHASE_ROUTE};
use crate::error::SvgrError;
use crate::identity::IdentityProvider;
use crate::pipeline::client::ConversionService;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Product name shown in the CLI banner and user agent.
pub const APP_NAME: &str = "SVGR";

/// Conversion service used when neither the builder nor `SVGR_API_URL` sets one.
pub const DEFAULT_API_URL: &str = "http://localhost:8027";

/// Path of the conversion endpoint, relative to the API base URL.
pub const DEFAULT_CONVERT_PATH: &str = "/api/v1/convert";

/// Credit offering queried for purchasable packages.
pub const DEFAULT_OFFERING_ID: &str = "credits";

/// Lowest quality level accepted by the service.
pub const QUALITY_MIN: u8 = 1;
/// Highest quality level accepted by the service.
pub const QUALITY_MAX: u8 = 10;
/// Mid-range default quality.
pub const QUALITY_DEFAULT: u8 = 5;

/// User-adjustable parameters forwarded with each conversion request.
///
/// `quality` is an opaque dial for the remote service; the client only
/// guarantees it stays within [`QUALITY_MIN`]..=[`QUALITY_MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionParameters {
    quality: u8,
    transparent_background: bool,
}

impl Default for ConversionParameters {
    fn default() -> Self {
        Self {
            quality: QUALITY_DEFAULT,
            transparent_background: false,
        }
    }
}

impl ConversionParameters {
    /// Build parameters, clamping `quality` into range.
    pub fn new(quality: i64, transparent_background: bool) -> Self {
        let mut params = Self::default();
        params.set_quality(quality);
        params.transparent_background = transparent_background;
        params
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn transparent_background(&self) -> bool {
        self.transparent_background
    }

    /// Store `quality` clamped to the supported range.
    pub fn set_quality(&mut self, quality: i64) {
        self.quality = quality.clamp(QUALITY_MIN as i64, QUALITY_MAX as i64) as u8;
    }

    pub fn set_transparent_background(&mut self, v: bool) {
        self.transparent_background = v;
    }
}

/// Configuration for the conversion client.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use svgr::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .api_url("https://vectorize.example.com")
///     .quality(8)
///     .transparent_background(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.parameters.quality(), 8);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Base URL of the conversion and credits API. Default: [`DEFAULT_API_URL`].
    pub api_url: String,

    /// Endpoint path appended to `api_url` for conversions.
    pub convert_path: String,

    /// Quality level and transparent-background flag sent with each request.
    pub parameters: ConversionParameters,

    /// Per-request timeout in seconds. Default: 120.
    ///
    /// Vectorising a large photo can take a while server-side; the timeout
    /// only bounds a hung connection.
    pub request_timeout_secs: u64,

    /// Sessions run at once by [`crate::convert::convert_batch`]. Default: 4.
    pub concurrency: usize,

    /// Credit offering used when listing packages. Default: `"credits"`.
    pub offering_id: String,

    /// Where a user blocked for lack of credits is sent. Default: `/credits`.
    pub purchase_route: String,

    /// Pre-constructed conversion service. Takes precedence over `api_url`.
    pub service: Option<Arc<dyn ConversionService>>,

    /// Identity used to authenticate requests. `None` sends no token.
    pub identity: Option<Arc<dyn IdentityProvider>>,

    /// Credit store gating exports. `None` runs in free mode.
    pub entitlements: Option<Arc<dyn EntitlementStore>>,

    /// Optional observer for lifecycle events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            convert_path: DEFAULT_CONVERT_PATH.to_string(),
            parameters: ConversionParameters::default(),
            request_timeout_secs: 120,
            concurrency: 4,
            offering_id: DEFAULT_OFFERING_ID.to_string(),
            purchase_route: DEFAULT_PURCHASE_ROUTE.to_string(),
            service: None,
            identity: None,
            entitlements: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("api_url", &self.api_url)
            .field("convert_path", &self.convert_path)
            .field("parameters", &self.parameters)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("offering_id", &self.offering_id)
            .field("purchase_route", &self.purchase_route)
            .field("service", &self.service.as_ref().map(|_| "<dyn ConversionService>"))
            .field("identity", &self.identity.as_ref().map(|_| "<dyn IdentityProvider>"))
            .field("entitlements", &self.entitlements.as_ref().map(|_| "<dyn EntitlementStore>"))
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Full URL of the conversion endpoint.
    pub fn convert_url(&self) -> String {
        join_url(&self.api_url, &self.convert_path)
    }
}

/// Join a base URL and a path without doubling or dropping the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionConfigBuilder {
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    pub fn convert_path(mut self, path: impl Into<String>) -> Self {
        self.config.convert_path = path.into();
        self
    }

    pub fn parameters(mut self, params: ConversionParameters) -> Self {
        self.config.parameters = params;
        self
    }

    pub fn quality(mut self, quality: i64) -> Self {
        self.config.parameters.set_quality(quality);
        self
    }

    pub fn transparent_background(mut self, v: bool) -> Self {
        self.config.parameters.set_transparent_background(v);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn offering_id(mut self, id: impl Into<String>) -> Self {
        self.config.offering_id = id.into();
        self
    }

    pub fn purchase_route(mut self, route: impl Into<String>) -> Self {
        self.config.purchase_route = route.into();
        self
    }

    pub fn service(mut self, service: Arc<dyn ConversionService>) -> Self {
        self.config.service = Some(service);
        self
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.config.identity = Some(identity);
        self
    }

    pub fn entitlements(mut self, store: Arc<dyn EntitlementStore>) -> Self {
        self.config.entitlements = Some(store);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, SvgrError> {
        let c = &self.config;
        if c.service.is_none()
            && !(c.api_url.starts_with("http://") || c.api_url.starts_with("https://"))
        {
            return Err(SvgrError::InvalidConfig(format!(
                "API URL must start with http:// or https://, got '{}'",
                c.api_url
            )));
        }
        if c.offering_id.trim().is_empty() {
            return Err(SvgrError::InvalidConfig(
                "Offering id must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_name_is_svgr() {
        assert_eq!(APP_NAME, "SVGR");
        assert!(!DEFAULT_API_URL.is_empty());
    }

    #[test]
    fn default_parameters_are_mid_range() {
        let p = ConversionParameters::default();
        assert_eq!(p.quality(), QUALITY_DEFAULT);
        assert!(QUALITY_MIN < p.quality() && p.quality() < QUALITY_MAX);
        assert!(!p.transparent_background());
    }

    #[test]
    fn quality_is_clamped_on_every_write() {
        let mut p = ConversionParameters::default();
        for q in [-50, 0, 1, 3, 10, 11, 1_000, i64::MIN, i64::MAX] {
            p.set_quality(q);
            assert!(
                (QUALITY_MIN..=QUALITY_MAX).contains(&p.quality()),
                "quality {q} stored as {}",
                p.quality()
            );
        }
        p.set_quality(-3);
        assert_eq!(p.quality(), QUALITY_MIN);
        p.set_quality(42);
        assert_eq!(p.quality(), QUALITY_MAX);
        p.set_quality(7);
        assert_eq!(p.quality(), 7);
    }

    #[test]
    fn builder_clamps_quality() {
        let config = ConversionConfig::builder().quality(99).build().unwrap();
        assert_eq!(config.parameters.quality(), QUALITY_MAX);
    }

    #[test]
    fn builder_rejects_non_http_url() {
        let err = ConversionConfig::builder()
            .api_url("ftp://example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, SvgrError::InvalidConfig(_)));
    }

    #[test]
    fn convert_url_joins_cleanly() {
        let config = ConversionConfig::builder()
            .api_url("https://api.example.com/")
            .convert_path("/api/v1/convert")
            .build()
            .unwrap();
        assert_eq!(config.convert_url(), "https://api.example.com/api/v1/convert");
    }

    #[test]
    fn concurrency_floor_is_one() {
        let config = ConversionConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(config.concurrency, 1);
    }
}
