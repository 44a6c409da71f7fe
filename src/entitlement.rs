//! Credit gate in front of exports.
//!
//! In the credit-bearing deployment every export costs one credit. The
//! balance lives in an external billing backend reached through
//! [`EntitlementStore`]; this module only reads its cached value and decides.
//!
//! ## Decision table
//!
//! | store configured | cached balance | decision |
//! |------------------|----------------|----------|
//! | no               | -              | allow (free mode) |
//! | yes              | not loaded     | allow (optimistic) |
//! | yes              | > 0            | allow |
//! | yes              | ≤ 0            | block, point at the purchase route |
//!
//! ## Usage recording is fire-and-forget
//!
//! After a permitted export has been written, usage is recorded by
//! [`EntitlementGate::record_usage_in_background`] on a spawned task. A
//! failure there is logged and dropped. The export already happened and
//! stays happened: callers must not await this task before reporting
//! success, and must not turn its failure into an error.

use crate::config::join_url;
use crate::error::SvgrError;
use crate::identity::{AnonymousIdentity, IdentityProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Route a blocked user is sent to.
pub const DEFAULT_PURCHASE_ROUTE: &str = "/credits";

/// A purchasable bundle of credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditPackage {
    pub id: String,
    pub title: String,
    pub credits: i64,
    #[serde(default)]
    pub price: Option<String>,
}

/// Outcome of a purchase request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    pub package_id: String,
    /// Balance after the purchase, when the backend settled it immediately.
    #[serde(default)]
    pub balance: Option<i64>,
    /// Hosted checkout page, when payment must finish in a browser.
    #[serde(default)]
    pub checkout_url: Option<String>,
}

/// External credit balance and billing operations.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Last known balance; `None` while it has not loaded yet.
    fn cached_balance(&self) -> Option<i64>;

    /// Fetch the balance from the backend and update the cache.
    async fn refresh_balance(&self) -> Result<i64, SvgrError>;

    /// Packages available in `offering_id`.
    async fn packages(&self, offering_id: &str) -> Result<Vec<CreditPackage>, SvgrError>;

    /// Buy `package_id` from `offering_id`.
    async fn purchase(
        &self,
        package_id: &str,
        offering_id: &str,
    ) -> Result<PurchaseReceipt, SvgrError>;

    /// Record one consumed credit tagged with `label` (the exported file name).
    ///
    /// Best-effort. The gate calls this from a detached task and discards
    /// any error; implementations must not rely on it being awaited.
    async fn record_usage(&self, label: &str) -> Result<(), SvgrError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowReason {
    /// No entitlement store configured.
    FreeMode,
    /// Store configured but the balance has not loaded yet.
    Optimistic,
    /// Balance is positive.
    Funded,
}

/// Why an export was refused, and where to buy more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNotice {
    pub balance: i64,
    pub purchase_route: String,
}

impl CreditNotice {
    pub fn into_error(self) -> SvgrError {
        SvgrError::InsufficientCredits {
            balance: self.balance,
            purchase_route: self.purchase_route,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow(AllowReason),
    Block(CreditNotice),
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow(_))
    }
}

/// Checks the cached balance before an export and records usage after it.
#[derive(Clone)]
pub struct EntitlementGate {
    store: Option<Arc<dyn EntitlementStore>>,
    purchase_route: String,
}

impl Default for EntitlementGate {
    fn default() -> Self {
        Self::free()
    }
}

impl std::fmt::Debug for EntitlementGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitlementGate")
            .field("enabled", &self.is_enabled())
            .field("purchase_route", &self.purchase_route)
            .finish()
    }
}

impl EntitlementGate {
    /// A gate that always allows and records nothing.
    pub fn free() -> Self {
        Self {
            store: None,
            purchase_route: DEFAULT_PURCHASE_ROUTE.to_string(),
        }
    }

    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self {
            store: Some(store),
            purchase_route: DEFAULT_PURCHASE_ROUTE.to_string(),
        }
    }

    pub fn from_store(store: Option<Arc<dyn EntitlementStore>>) -> Self {
        match store {
            Some(store) => Self::new(store),
            None => Self::free(),
        }
    }

    pub fn with_purchase_route(mut self, route: impl Into<String>) -> Self {
        self.purchase_route = route.into();
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn check(&self) -> GateDecision {
        let Some(store) = &self.store else {
            return GateDecision::Allow(AllowReason::FreeMode);
        };
        match store.cached_balance() {
            None => GateDecision::Allow(AllowReason::Optimistic),
            Some(balance) if balance > 0 => GateDecision::Allow(AllowReason::Funded),
            Some(balance) => GateDecision::Block(CreditNotice {
                balance,
                purchase_route: self.purchase_route.clone(),
            }),
        }
    }

    /// Spawn the usage record for `label`. Returns `None` in free mode.
    ///
    /// The handle is only for hosts that want to let the task finish before
    /// shutting down; the task itself never reports failure.
    pub fn record_usage_in_background(&self, label: impl Into<String>) -> Option<JoinHandle<()>> {
        let store = Arc::clone(self.store.as_ref()?);
        let label = label.into();
        Some(tokio::spawn(async move {
            match store.record_usage(&label).await {
                Ok(()) => debug!("Recorded usage for {}", label),
                Err(e) => warn!("Usage recording failed for {} (ignored): {}", label, e),
            }
        }))
    }
}

/// [`EntitlementStore`] backed by the consumables HTTP API.
///
/// Endpoints, relative to the API base URL:
///
/// | call | request |
/// |------|---------|
/// | balance | `GET  /api/v1/consumables/balance` → `{"balance": n}` |
/// | packages | `GET  /api/v1/consumables/offerings/{id}` → `{"packages": [...]}` |
/// | purchase | `POST /api/v1/consumables/purchase` `{"packageId", "offeringId"}` |
/// | usage | `POST /api/v1/consumables/usage` `{"label"}` |
pub struct HttpEntitlementStore {
    http: reqwest::Client,
    base_url: String,
    identity: Arc<dyn IdentityProvider>,
    balance: RwLock<Option<i64>>,
}

#[derive(Deserialize)]
struct BalanceBody {
    balance: i64,
}

#[derive(Deserialize)]
struct PackagesBody {
    #[serde(default)]
    packages: Vec<CreditPackage>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseBody<'a> {
    package_id: &'a str,
    offering_id: &'a str,
}

#[derive(Serialize)]
struct UsageBody<'a> {
    label: &'a str,
}

impl HttpEntitlementStore {
    pub fn new(
        api_url: impl Into<String>,
        timeout_secs: u64,
        identity: Option<Arc<dyn IdentityProvider>>,
    ) -> Result<Self, SvgrError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SvgrError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: api_url.into(),
            identity: identity.unwrap_or_else(|| Arc::new(AnonymousIdentity)),
            balance: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, &format!("api/v1/consumables/{path}"))
    }

    fn set_balance(&self, balance: i64) {
        *self.balance.write().unwrap_or_else(PoisonError::into_inner) = Some(balance);
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, SvgrError> {
        let unavailable = |reason: String| SvgrError::EntitlementUnavailable { reason };

        let builder = match self.identity.id_token(false).await? {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };
        let response = builder.send().await.map_err(|e| unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(unavailable(format!("HTTP {}", response.status())));
        }
        Ok(response)
    }
}

#[async_trait]
impl EntitlementStore for HttpEntitlementStore {
    fn cached_balance(&self) -> Option<i64> {
        *self.balance.read().unwrap_or_else(PoisonError::into_inner)
    }

    async fn refresh_balance(&self) -> Result<i64, SvgrError> {
        let body: BalanceBody = self
            .send(self.http.get(self.url("balance")))
            .await?
            .json()
            .await
            .map_err(|e| SvgrError::EntitlementUnavailable {
                reason: format!("bad balance payload: {e}"),
            })?;
        self.set_balance(body.balance);
        debug!("Balance refreshed: {}", body.balance);
        Ok(body.balance)
    }

    async fn packages(&self, offering_id: &str) -> Result<Vec<CreditPackage>, SvgrError> {
        let body: PackagesBody = self
            .send(self.http.get(self.url(&format!("offerings/{offering_id}"))))
            .await?
            .json()
            .await
            .map_err(|e| SvgrError::EntitlementUnavailable {
                reason: format!("bad packages payload: {e}"),
            })?;
        Ok(body.packages)
    }

    async fn purchase(
        &self,
        package_id: &str,
        offering_id: &str,
    ) -> Result<PurchaseReceipt, SvgrError> {
        info!("Purchasing package {} from {}", package_id, offering_id);
        let request = self.http.post(self.url("purchase")).json(&PurchaseBody {
            package_id,
            offering_id,
        });
        let receipt: PurchaseReceipt =
            self.send(request)
                .await?
                .json()
                .await
                .map_err(|e| SvgrError::EntitlementUnavailable {
                    reason: format!("bad purchase payload: {e}"),
                })?;
        if let Some(balance) = receipt.balance {
            self.set_balance(balance);
        }
        Ok(receipt)
    }

    async fn record_usage(&self, label: &str) -> Result<(), SvgrError> {
        let request = self
            .http
            .post(self.url("usage"))
            .json(&UsageBody { label });
        self.send(request)
            .await
            .map_err(|e| SvgrError::UsageRecordingFailed {
                label: label.to_string(),
                reason: e.to_string(),
            })?;
        if let Err(e) = self.refresh_balance().await {
            debug!("Balance refresh after usage failed: {}", e);
        }
        Ok(())
    }
}
