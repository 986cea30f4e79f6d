//! License activation.
//!
//! A key is `PREFIX + body`. A body that is a hyphenated UUID is a license key
//! issued by the entitlement authority and is exchanged remotely; any other
//! body is decoded as a base64url signed token and verified locally.

use crate::error::{LicenseError, LicenseResult};
use crate::resolver::{accept_token, LicenseManager, LicenseSource, ResolutionResult};
use crate::token::{EntitlementToken, ExchangedToken, ProductType, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

const UUID_HYPHENATED_LEN: usize = 36;

/// Outcome of an activation attempt. Failures are values, never panics or errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationResult {
    pub activated: bool,
    pub tier: Tier,
    pub product_type: Option<ProductType>,
    pub source: LicenseSource,
    pub features: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub days_remaining: Option<i64>,
    pub customer_email: Option<String>,
    pub error: Option<String>,
}

impl ActivationResult {
    fn success(result: ResolutionResult, customer_email: Option<String>) -> Self {
        Self {
            activated: true,
            tier: result.tier,
            product_type: result.product_type,
            source: result.source,
            features: result.features,
            expires_at: result.expires_at,
            days_remaining: result.days_remaining,
            customer_email,
            error: None,
        }
    }

    fn failure(error: &LicenseError) -> Self {
        let free = ResolutionResult::default_free();
        Self {
            activated: false,
            tier: free.tier,
            product_type: None,
            source: free.source,
            features: free.features,
            expires_at: None,
            days_remaining: None,
            customer_email: None,
            error: Some(error.to_string()),
        }
    }
}

/// Returns true if `body` has the shape of an authority-issued license key.
#[must_use]
pub fn is_license_identifier(body: &str) -> bool {
    body.len() == UUID_HYPHENATED_LEN && Uuid::try_parse(body).is_ok()
}

impl LicenseManager {
    /// Activates `raw_key` and, on success, persists and caches the resulting token.
    pub async fn activate_license(&self, raw_key: &str) -> ActivationResult {
        let key = raw_key.trim();
        let prefix = &self.inner.config.key_prefix;

        let Some(body) = key.strip_prefix(prefix.as_str()) else {
            return ActivationResult::failure(&LicenseError::InvalidKeyFormat(format!(
                "license key must start with {prefix}"
            )));
        };

        let attempt = if is_license_identifier(body) {
            self.activate_identifier(key).await
        } else {
            self.activate_token(body)
        };

        attempt.unwrap_or_else(|e| {
            warn!(error = %e, "license activation failed");
            ActivationResult::failure(&e)
        })
    }

    async fn activate_identifier(&self, key: &str) -> LicenseResult<ActivationResult> {
        let outcome = self.inner.validator.validate(key).await?;
        let now = Utc::now();
        let exchanged = ExchangedToken::from_validation(key, &outcome, now)?;

        if let Some(exp) = exchanged.expires_at.filter(|exp| *exp <= now) {
            return Err(LicenseError::Expired(exp.to_rfc3339()));
        }

        if exchanged.product_type == ProductType::Trial {
            if self.inner.trial.has_used_trial() {
                return Err(LicenseError::TrialAlreadyUsed);
            }
            if let Err(e) = self.inner.trial.record_trial_usage() {
                warn!(error = %e, "failed to record trial usage");
            }
        }

        let token = EntitlementToken::Exchanged(exchanged);
        let result = self.commit(token, now)?;
        info!(tier = ?result.tier, product_type = ?result.product_type, "license key activated");
        Ok(ActivationResult::success(result, outcome.customer_email))
    }

    /// Only signed tokens may be pasted. Exchanged tokens are trusted on
    /// provenance, which a user-supplied key never has.
    fn activate_token(&self, body: &str) -> LicenseResult<ActivationResult> {
        let token = match EntitlementToken::decode_key_body(body)? {
            token @ EntitlementToken::Signed(_) => token,
            EntitlementToken::Exchanged(_) => {
                return Err(LicenseError::InvalidKeyFormat(
                    "license key does not carry a signed token".to_string(),
                ));
            }
        };
        let now = Utc::now();
        let result = self.commit(token, now)?;
        info!(tier = ?result.tier, source = ?result.source, "license token activated");
        Ok(ActivationResult::success(result, None))
    }

    /// Accepts, persists and caches `token`. A failed write still activates in memory.
    fn commit(&self, token: EntitlementToken, now: DateTime<Utc>) -> LicenseResult<ResolutionResult> {
        accept_token(&token, &self.inner.config.public_key, now)?;
        let persisted = self.persist_quietly(&token);
        let result = ResolutionResult::from_token(&token, now, persisted);
        self.cache_token(token, persisted);
        Ok(result)
    }
}
