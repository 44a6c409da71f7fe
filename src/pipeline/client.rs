//! Conversion service seam and its HTTP implementation.
//!
//! The session talks to the remote vectoriser only through
//! [`ConversionService`], so tests and embedders can substitute their own
//! transport. [`HttpConversionClient`] is the production implementation:
//! one JSON `POST` per conversion, bearer-authenticated through the
//! configured [`IdentityProvider`].
//!
//! ## Response envelope
//!
//! ```json
//! { "success": true,  "data": { "svg": "<svg …>" } }
//! { "success": false, "error": "Image too large" }
//! ```
//!
//! Transport problems (DNS, TLS, timeouts, non-JSON error pages) become
//! `Err`; anything the service actually said comes back as a
//! [`ConvertEnvelope`] for the session to interpret.

use crate::config::{ConversionConfig, APP_NAME};
use crate::error::{SvgrError, GENERIC_CONVERSION_FAILURE};
use crate::identity::{AnonymousIdentity, IdentityProvider};
use crate::pipeline::encode::ConvertRequest;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Payload of a successful conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertData {
    #[serde(default)]
    pub svg: Option<String>,
}

/// Tagged success/failure envelope returned by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ConvertData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConvertEnvelope {
    pub fn success(svg: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(ConvertData {
                svg: Some(svg.into()),
            }),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Extract the SVG markup, or the failure the envelope describes.
    ///
    /// A success flag without `data.svg` is [`SvgrError::ConversionResponseMalformed`];
    /// a failure flag is [`SvgrError::ConversionFailed`] carrying the service's
    /// message, or the generic one when it sent none.
    pub fn into_svg(self) -> Result<String, SvgrError> {
        if self.success {
            return self.data.and_then(|d| d.svg).ok_or_else(|| {
                SvgrError::ConversionResponseMalformed {
                    detail: "success response without data.svg".into(),
                }
            });
        }
        let message = self
            .error
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| GENERIC_CONVERSION_FAILURE.to_string());
        Err(SvgrError::ConversionFailed { message })
    }
}

/// Anything that can turn a [`ConvertRequest`] into a [`ConvertEnvelope`].
#[async_trait]
pub trait ConversionService: Send + Sync {
    /// Send exactly one conversion request.
    async fn convert(&self, request: &ConvertRequest) -> Result<ConvertEnvelope, SvgrError>;
}

/// reqwest-backed [`ConversionService`].
pub struct HttpConversionClient {
    http: reqwest::Client,
    endpoint: String,
    timeout_secs: u64,
    identity: Arc<dyn IdentityProvider>,
}

impl std::fmt::Debug for HttpConversionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConversionClient")
            .field("endpoint", &self.endpoint)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl HttpConversionClient {
    pub fn new(
        endpoint: impl Into<String>,
        timeout_secs: u64,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self, SvgrError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent())
            .build()
            .map_err(|e| SvgrError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            timeout_secs,
            identity,
        })
    }

    /// Client for `config.convert_url()` using `config.identity`, or no
    /// identity at all when none is configured.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, SvgrError> {
        let identity = config
            .identity
            .clone()
            .unwrap_or_else(|| Arc::new(AnonymousIdentity));
        Self::new(config.convert_url(), config.request_timeout_secs, identity)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(
        &self,
        request: &ConvertRequest,
        token: Option<&str>,
    ) -> Result<reqwest::Response, SvgrError> {
        let mut builder = self.http.post(&self.endpoint).json(request);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        builder.send().await.map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, e: reqwest::Error) -> SvgrError {
        if e.is_timeout() {
            SvgrError::ConversionTimeout {
                secs: self.timeout_secs,
            }
        } else {
            SvgrError::ConversionTransportFailure {
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl ConversionService for HttpConversionClient {
    async fn convert(&self, request: &ConvertRequest) -> Result<ConvertEnvelope, SvgrError> {
        info!("POST {} ({})", self.endpoint, request.filename);

        let token = self.identity.id_token(false).await?;
        let mut response = self.send(request, token.as_deref()).await?;

        if response.status() == StatusCode::UNAUTHORIZED && token.is_some() {
            warn!("Conversion request rejected with 401; refreshing token");
            let fresh = self.identity.id_token(true).await?;
            response = self.send(request, fresh.as_deref()).await?;
        }

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        debug!("Conversion response: HTTP {} ({} bytes)", status, body.len());

        parse_response(status, &body)
    }
}

/// Interpret a raw HTTP response from the conversion endpoint.
///
/// Error statuses that still carry an envelope with an `error` field are
/// application-level failures, not transport ones.
pub fn parse_response(status: StatusCode, body: &str) -> Result<ConvertEnvelope, SvgrError> {
    let parsed = serde_json::from_str::<ConvertEnvelope>(body);
    match parsed {
        Ok(envelope) if status.is_success() => Ok(envelope),
        Ok(envelope) if envelope.error.is_some() => Ok(ConvertEnvelope {
            success: false,
            ..envelope
        }),
        Err(e) if status.is_success() => Err(SvgrError::ConversionResponseMalformed {
            detail: format!("response body is not a conversion envelope: {e}"),
        }),
        _ => Err(SvgrError::ConversionTransportFailure {
            reason: format!("HTTP {}", status),
        }),
    }
}

fn user_agent() -> String {
    format!("{}/{}", APP_NAME, env!("CARGO_PKG_VERSION"))
}
