//! Remote entitlement validation.
//!
//! License keys are validated against Polar's customer-portal endpoint. The
//! configured authorities are tried in order; a transport failure or server
//! error falls through to the next one, and the first structural answer wins.

use crate::config::LicenseConfig;
use crate::error::{LicenseError, LicenseResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

const VALIDATE_PATH: &str = "/v1/customer-portal/license-keys/validate";

/// What the authority said about a license key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Granted,
    Revoked,
    Disabled,
    /// Unknown key, or a status this client does not recognize.
    #[serde(other)]
    Invalid,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Granted => "granted",
            Self::Revoked => "revoked",
            Self::Disabled => "disabled",
            Self::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// A structural answer from the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub status: ValidationStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub benefit_id: Option<String>,
    pub customer_email: Option<String>,
}

impl ValidationOutcome {
    /// An `invalid` answer with no details.
    #[must_use]
    pub fn invalid() -> Self {
        Self {
            status: ValidationStatus::Invalid,
            expires_at: None,
            benefit_id: None,
            customer_email: None,
        }
    }
}

/// Something that can confirm a license key's remote status.
#[async_trait]
pub trait EntitlementValidator: Send + Sync {
    /// Validates `opaque_id`.
    ///
    /// # Errors
    ///
    /// [`LicenseError::ValidationUnavailable`] when no authority produced a
    /// structural answer. This is not a revocation.
    async fn validate(&self, opaque_id: &str) -> LicenseResult<ValidationOutcome>;
}

#[derive(Debug, Serialize)]
struct ValidateRequest<'a> {
    key: &'a str,
    organization_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    status: ValidationStatus,
    expires_at: Option<DateTime<Utc>>,
    benefit_id: Option<String>,
    customer: Option<Customer>,
}

#[derive(Debug, Deserialize)]
struct Customer {
    email: Option<String>,
}

impl From<ValidateResponse> for ValidationOutcome {
    fn from(resp: ValidateResponse) -> Self {
        Self {
            status: resp.status,
            expires_at: resp.expires_at,
            benefit_id: resp.benefit_id,
            customer_email: resp.customer.and_then(|c| c.email),
        }
    }
}

/// HTTP validator for the Polar license-key API.
pub struct PolarValidator {
    client: Client,
    endpoints: Vec<String>,
    organization_id: String,
}

impl PolarValidator {
    /// Creates a validator for the authorities in `config`.
    #[must_use]
    pub fn new(config: &LicenseConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            endpoints: config.authority_endpoints.clone(),
            organization_id: config.organization_id.clone(),
        }
    }

    /// Asks a single authority. `Err` means fall through to the next one.
    async fn validate_at(&self, base_url: &str, opaque_id: &str) -> LicenseResult<ValidationOutcome> {
        let url = format!("{}{VALIDATE_PATH}", base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&ValidateRequest {
                key: opaque_id,
                organization_id: &self.organization_id,
            })
            .send()
            .await
            .map_err(|e| LicenseError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: ValidateResponse = response
                .json()
                .await
                .map_err(|e| LicenseError::Network(format!("unparseable answer: {e}")))?;
            return Ok(body.into());
        }

        match status {
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                Ok(ValidationOutcome::invalid())
            }
            other => Err(LicenseError::Network(format!("authority returned {other}"))),
        }
    }
}

#[async_trait]
impl EntitlementValidator for PolarValidator {
    async fn validate(&self, opaque_id: &str) -> LicenseResult<ValidationOutcome> {
        let mut failures = Vec::new();

        for endpoint in &self.endpoints {
            match self.validate_at(endpoint, opaque_id).await {
                Ok(outcome) => {
                    debug!(%endpoint, status = %outcome.status, "license key validated");
                    return Ok(outcome);
                }
                Err(e) => {
                    warn!(%endpoint, error = %e, "entitlement authority unavailable, trying next");
                    failures.push(format!("{endpoint}: {e}"));
                }
            }
        }

        if failures.is_empty() {
            failures.push("no authority endpoints configured".to_string());
        }
        Err(LicenseError::ValidationUnavailable(failures.join("; ")))
    }
}
