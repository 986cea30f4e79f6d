//! License resolution and background re-validation.
//!
//! [`LicenseManager::resolve_license`] is a local read: cache, then the
//! encrypted store, then the free default. It never awaits the network. When
//! an exchanged token is stale or close to expiry it spawns one background
//! re-validation onto the current Tokio runtime; an in-process flag keeps at
//! most one such call in flight.

use crate::config::LicenseConfig;
use crate::error::{LicenseError, LicenseResult};
use crate::signature::verify_signature;
use crate::store::SecureStore;
use crate::token::{
    days_remaining, EntitlementToken, ExchangedToken, ProductType, Tier, FREE_FEATURES,
};
use crate::trial::TrialGuard;
use crate::validator::{EntitlementValidator, PolarValidator, ValidationStatus};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Age of `validated_at`, and distance to `expires_at`, that make an exchanged token due.
pub const REVALIDATION_WINDOW_DAYS: i64 = 7;

/// Where a resolution result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseSource {
    /// No usable token.
    DefaultFree,
    /// A signed token.
    ActivatedKey,
    /// An exchanged token from the entitlement authority.
    PolarKey,
}

/// The answer to "what can this process do right now".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub tier: Tier,
    pub features: Vec<String>,
    pub product_type: Option<ProductType>,
    pub source: LicenseSource,
    pub expires_at: Option<DateTime<Utc>>,
    pub days_remaining: Option<i64>,
    pub signature_verified: bool,
    pub hardware_verified: bool,
    pub errors: Vec<String>,
}

impl ResolutionResult {
    /// The free tier with no token behind it.
    #[must_use]
    pub fn default_free() -> Self {
        Self {
            tier: Tier::Free,
            features: FREE_FEATURES.iter().map(|f| (*f).to_string()).collect(),
            product_type: None,
            source: LicenseSource::DefaultFree,
            expires_at: None,
            days_remaining: None,
            signature_verified: false,
            hardware_verified: false,
            errors: Vec::new(),
        }
    }

    /// Describes an accepted token. Product type is re-derived from `expires_at`.
    #[must_use]
    pub fn from_token(token: &EntitlementToken, now: DateTime<Utc>, hardware_verified: bool) -> Self {
        let expires_at = token.expires_at();
        let (source, signature_verified) = match token {
            EntitlementToken::Exchanged(_) => (LicenseSource::PolarKey, false),
            EntitlementToken::Signed(_) => (LicenseSource::ActivatedKey, true),
        };

        Self {
            tier: token.tier(),
            features: token.enabled_features().to_vec(),
            product_type: Some(ProductType::classify(expires_at, now)),
            source,
            expires_at,
            days_remaining: expires_at.map(|exp| days_remaining(exp, now)),
            signature_verified,
            hardware_verified,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }

    /// Returns true for trial and licensed tiers.
    #[must_use]
    pub fn is_premium(&self) -> bool {
        self.tier != Tier::Free
    }

    #[must_use]
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

/// Result of one re-validation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevalidationOutcome {
    /// Authority granted; a fresh token was stored and cached.
    Refreshed,
    /// Authority revoked or disabled the key; the token was deleted.
    Revoked,
    /// Authority unreachable or answer inconclusive; nothing changed.
    Unchanged,
    /// Nothing to re-validate, or a round was already running.
    Skipped,
}

/// Checks that a token may be honored at `now`.
///
/// Free-tier tokens are never valid, expired tokens are rejected, and signed
/// tokens must verify against `public_key`. Exchanged tokens are trusted on
/// provenance, so callers pass them here only when they come from the secure
/// store or a fresh validation.
pub fn accept_token(
    token: &EntitlementToken,
    public_key: &[u8; 32],
    now: DateTime<Utc>,
) -> LicenseResult<()> {
    if token.tier() == Tier::Free {
        return Err(LicenseError::InvalidPayload(
            "free tier does not carry a token".to_string(),
        ));
    }

    if let Some(exp) = token.expires_at().filter(|exp| *exp <= now) {
        return Err(LicenseError::Expired(exp.to_rfc3339()));
    }

    if let EntitlementToken::Signed(signed) = token {
        if !verify_signature(&signed.signing_payload(), signed.signature(), public_key) {
            return Err(LicenseError::InvalidSignature);
        }
    }

    Ok(())
}

/// Returns true if an exchanged token should be confirmed with the authority.
#[must_use]
pub fn revalidation_due(token: &ExchangedToken, now: DateTime<Utc>) -> bool {
    let window = Duration::days(REVALIDATION_WINDOW_DAYS);
    let stale = now - token.validated_at > window;
    let expiring = token.expires_at.is_some_and(|exp| exp - now <= window);
    stale || expiring
}

#[derive(Debug, Clone)]
struct CachedEntitlement {
    token: EntitlementToken,
    hardware_verified: bool,
}

pub(crate) struct Inner {
    pub(crate) config: LicenseConfig,
    pub(crate) store: SecureStore,
    pub(crate) trial: TrialGuard,
    pub(crate) validator: Arc<dyn EntitlementValidator>,
    cache: Mutex<Option<CachedEntitlement>>,
    revalidating: AtomicBool,
}

/// Clears the re-validation flag when the round ends, however it ends.
struct RevalidationGuard(Arc<Inner>);

impl Drop for RevalidationGuard {
    fn drop(&mut self) {
        self.0.revalidating.store(false, Ordering::Release);
    }
}

/// Handle owning all licensing state for one installation.
///
/// Cheap to clone; clones share the cache and the re-validation flag.
#[derive(Clone)]
pub struct LicenseManager {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for LicenseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseManager")
            .field("data_dir", &self.inner.config.data_dir)
            .field("revalidating", &self.inner.revalidating.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl LicenseManager {
    /// Creates a manager that validates against the Polar authorities in `config`.
    #[must_use]
    pub fn new(config: LicenseConfig) -> Self {
        let validator = Arc::new(PolarValidator::new(&config));
        Self::with_validator(config, validator)
    }

    /// Creates a manager with a custom validator.
    #[must_use]
    pub fn with_validator(config: LicenseConfig, validator: Arc<dyn EntitlementValidator>) -> Self {
        let store = SecureStore::for_config(&config);
        let trial = TrialGuard::for_config(&config);
        Self::from_parts(config, store, trial, validator)
    }

    /// Creates a manager from explicit components.
    #[must_use]
    pub fn from_parts(
        config: LicenseConfig,
        store: SecureStore,
        trial: TrialGuard,
        validator: Arc<dyn EntitlementValidator>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                trial,
                validator,
                cache: Mutex::new(None),
                revalidating: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &LicenseConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn store(&self) -> &SecureStore {
        &self.inner.store
    }

    #[must_use]
    pub fn trial_guard(&self) -> &TrialGuard {
        &self.inner.trial
    }

    /// Returns true while a re-validation round is running.
    #[must_use]
    pub fn is_revalidating(&self) -> bool {
        self.inner.revalidating.load(Ordering::Acquire)
    }

    fn cache(&self) -> MutexGuard<'_, Option<CachedEntitlement>> {
        self.inner.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn cache_token(&self, token: EntitlementToken, hardware_verified: bool) {
        *self.cache() = Some(CachedEntitlement {
            token,
            hardware_verified,
        });
    }

    /// Drops the in-process cache so the next resolution re-reads the store.
    pub fn invalidate_cache(&self) {
        *self.cache() = None;
    }

    /// Encrypts and stores `token`. Failures are logged, not returned.
    pub(crate) fn persist_quietly(&self, token: &EntitlementToken) -> bool {
        match token.to_json().and_then(|json| self.inner.store.persist(&json)) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to persist license token");
                false
            }
        }
    }

    /// Resolves the current tier. Never blocks on the network and never fails.
    #[must_use]
    pub fn resolve_license(&self) -> ResolutionResult {
        let now = Utc::now();

        let cached = self.cache().clone();
        if let Some(entry) = cached {
            if !entry.token.is_expired(now) {
                self.spawn_revalidation_if_due(&entry.token);
                return ResolutionResult::from_token(&entry.token, now, entry.hardware_verified);
            }
            debug!("cached license expired, evicting");
            self.invalidate_cache();
        }

        match self.load_from_store(now) {
            Ok(Some(token)) => {
                let result = ResolutionResult::from_token(&token, now, true);
                self.cache_token(token.clone(), true);
                self.spawn_revalidation_if_due(&token);
                result
            }
            Ok(None) => ResolutionResult::default_free(),
            Err(e) => {
                debug!(error = %e, "stored license rejected, using free tier");
                ResolutionResult::default_free().with_error(e.to_string())
            }
        }
    }

    fn load_from_store(&self, now: DateTime<Utc>) -> LicenseResult<Option<EntitlementToken>> {
        let Some(bytes) = self.inner.store.load() else {
            return Ok(None);
        };
        let token = EntitlementToken::from_json(&bytes)?;
        accept_token(&token, &self.inner.config.public_key, now)?;
        Ok(Some(token))
    }

    /// Deletes the stored token and drops to the free tier.
    pub fn deactivate(&self) -> LicenseResult<()> {
        self.invalidate_cache();
        self.inner.store.clear()?;
        info!("license deactivated");
        Ok(())
    }

    fn try_begin_revalidation(&self) -> Option<RevalidationGuard> {
        self.inner
            .revalidating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RevalidationGuard(Arc::clone(&self.inner)))
    }

    /// Spawns a background re-validation if `token` is due and none is running.
    ///
    /// Returns the task handle when one was spawned. Requires a Tokio runtime;
    /// without one the check is skipped.
    pub fn spawn_revalidation_if_due(
        &self,
        token: &EntitlementToken,
    ) -> Option<JoinHandle<RevalidationOutcome>> {
        let exchanged = token.as_exchanged()?;
        if !revalidation_due(exchanged, Utc::now()) {
            return None;
        }

        let Ok(runtime) = Handle::try_current() else {
            debug!("no async runtime, skipping background re-validation");
            return None;
        };

        let Some(guard) = self.try_begin_revalidation() else {
            debug!("re-validation already in flight");
            return None;
        };

        let manager = self.clone();
        let opaque_id = exchanged.opaque_id.clone();
        Some(runtime.spawn(async move {
            let _guard = guard;
            manager.run_revalidation(&opaque_id).await
        }))
    }

    /// Re-validates the current exchanged token now, regardless of staleness.
    pub async fn revalidate_now(&self) -> RevalidationOutcome {
        let now = Utc::now();
        let cached = self.cache().clone();
        let token = match cached {
            Some(entry) => Some(entry.token),
            None => self.load_from_store(now).ok().flatten(),
        };

        let Some(EntitlementToken::Exchanged(exchanged)) = token else {
            return RevalidationOutcome::Skipped;
        };

        let Some(_guard) = self.try_begin_revalidation() else {
            return RevalidationOutcome::Skipped;
        };

        self.run_revalidation(&exchanged.opaque_id).await
    }

    /// Returns true if the active token is the exchanged token for `opaque_id`.
    fn is_current_key(&self, opaque_id: &str) -> bool {
        let cached = self.cache().clone();
        let token = match cached {
            Some(entry) => Some(entry.token),
            None => self
                .inner
                .store
                .load()
                .and_then(|bytes| EntitlementToken::from_json(&bytes).ok()),
        };
        token
            .as_ref()
            .and_then(EntitlementToken::as_exchanged)
            .is_some_and(|current| current.opaque_id == opaque_id)
    }

    async fn run_revalidation(&self, opaque_id: &str) -> RevalidationOutcome {
        let outcome = match self.inner.validator.validate(opaque_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "re-validation failed, keeping current license");
                return RevalidationOutcome::Unchanged;
            }
        };

        if !self.is_current_key(opaque_id) {
            debug!("license changed during re-validation, discarding answer");
            return RevalidationOutcome::Unchanged;
        }

        match outcome.status {
            ValidationStatus::Granted => {
                match ExchangedToken::from_validation(opaque_id, &outcome, Utc::now()) {
                    Ok(fresh) => {
                        let token = EntitlementToken::Exchanged(fresh);
                        let persisted = self.persist_quietly(&token);
                        self.cache_token(token, persisted);
                        debug!("license re-validated");
                        RevalidationOutcome::Refreshed
                    }
                    Err(e) => {
                        warn!(error = %e, "could not rebuild re-validated token");
                        RevalidationOutcome::Unchanged
                    }
                }
            }
            ValidationStatus::Revoked | ValidationStatus::Disabled => {
                info!(status = %outcome.status, "license no longer valid, dropping to free tier");
                self.invalidate_cache();
                if let Err(e) = self.inner.store.clear() {
                    warn!(error = %e, "failed to delete revoked license token");
                }
                RevalidationOutcome::Revoked
            }
            ValidationStatus::Invalid => {
                warn!("authority did not recognize license key, keeping current license");
                RevalidationOutcome::Unchanged
            }
        }
    }
}
