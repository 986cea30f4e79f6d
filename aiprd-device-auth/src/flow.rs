//! Device-authorization grant against an OAuth authority.
//!
//! The user confirms a short code in a browser while the application polls
//! the token endpoint. The resulting bearer token is held only in memory.

use crate::config::DeviceFlowConfig;
use crate::error::{DeviceFlowError, DeviceFlowResult};
use crate::token::BearerToken;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Poll interval used when the authority does not supply one.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Added to the poll interval on every `slow_down` answer.
pub const SLOW_DOWN_INCREMENT_SECS: u64 = 5;

/// What the user needs to complete authorization in a browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePrompt {
    pub user_code: String,
    pub verification_uri: String,
    /// Seconds until the device code expires.
    pub expires_in: u64,
    /// Seconds to wait between polls.
    pub interval: u64,
}

/// Result of [`DeviceFlow::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A session was opened; show the prompt to the user.
    Pending(DevicePrompt),
    /// A bearer token is already held; no session was opened.
    AlreadyAuthenticated,
}

/// Result of a single [`DeviceFlow::poll`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollOutcome {
    Authorized { bearer_token: BearerToken },
    AuthorizationPending { retry_after_secs: u64 },
    SlowDown { retry_after_secs: u64 },
}

impl PollOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, PollOutcome::Authorized { .. })
    }
}

#[derive(Debug, Clone)]
struct DeviceSession {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_at: DateTime<Utc>,
    poll_interval: u64,
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    #[serde(alias = "verification_url")]
    verification_uri: String,
    expires_in: u64,
    interval: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    interval: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// One device-authorization flow and the credential it produced.
///
/// At most one session is pending at a time; starting again replaces it.
#[derive(Clone)]
pub struct DeviceFlow {
    config: DeviceFlowConfig,
    client: Client,
    session: Arc<Mutex<Option<DeviceSession>>>,
    token: Arc<RwLock<Option<BearerToken>>>,
}

impl DeviceFlow {
    pub fn new(config: DeviceFlowConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            config,
            client,
            session: Arc::new(Mutex::new(None)),
            token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn config(&self) -> &DeviceFlowConfig {
        &self.config
    }

    /// Requests a device code and opens a pending session.
    pub async fn start(&self) -> DeviceFlowResult<StartOutcome> {
        if self.is_authenticated().await {
            debug!("device flow start skipped, already authenticated");
            return Ok(StartOutcome::AlreadyAuthenticated);
        }

        let response = self
            .client
            .post(&self.config.device_code_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("scope", self.config.scope.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(authority_error(&body, status.as_u16()));
        }

        let granted: DeviceCodeResponse = match serde_json::from_str(&body) {
            Ok(granted) => granted,
            Err(_) => return Err(authority_error(&body, status.as_u16())),
        };
        let interval = granted.interval.unwrap_or(DEFAULT_POLL_INTERVAL_SECS);

        let prompt = DevicePrompt {
            user_code: granted.user_code,
            verification_uri: granted.verification_uri,
            expires_in: granted.expires_in,
            interval,
        };
        let session = DeviceSession {
            device_code: granted.device_code,
            user_code: prompt.user_code.clone(),
            verification_uri: prompt.verification_uri.clone(),
            expires_at: session_deadline(granted.expires_in)?,
            poll_interval: interval,
        };
        if self.session.lock().await.replace(session).is_some() {
            debug!("replaced pending device flow session");
        }

        info!(uri = %prompt.verification_uri, "device flow started");
        Ok(StartOutcome::Pending(prompt))
    }

    /// Polls the token endpoint once for the pending session.
    ///
    /// Errors with [`DeviceFlowError::NoSession`] if [`start`](Self::start)
    /// has not been called, or if the session was replaced or signed out while
    /// the request was in flight. Terminal errors discard the session. A
    /// transport failure keeps it so the caller can poll again. The session
    /// lock is not held across the request.
    pub async fn poll(&self) -> DeviceFlowResult<PollOutcome> {
        let device_code = {
            let mut guard = self.session.lock().await;
            let Some(session) = guard.as_ref() else {
                return Err(DeviceFlowError::NoSession);
            };

            if Utc::now() >= session.expires_at {
                *guard = None;
                warn!("device code expired before authorization");
                return Err(DeviceFlowError::Expired);
            }
            session.device_code.clone()
        };

        let response = self
            .client
            .post(&self.config.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("device_code", device_code.as_str()),
                ("grant_type", DEVICE_CODE_GRANT),
            ])
            .send()
            .await?;

        // Pending answers arrive as 200 from some authorities and 400 from others.
        let status = response.status().as_u16();
        let body = response.text().await?;

        // The session may have been replaced or dropped while the request was out.
        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_mut().filter(|s| s.device_code == device_code) else {
            debug!("device flow session changed during poll, discarding answer");
            return Err(DeviceFlowError::NoSession);
        };

        let answer: TokenResponse = match serde_json::from_str(&body) {
            Ok(answer) => answer,
            Err(_) => {
                *guard = None;
                return Err(authority_error(&body, status));
            }
        };

        if let Some(access_token) = answer.access_token.filter(|t| !t.is_empty()) {
            *guard = None;
            let token = BearerToken::new(access_token);
            *self.token.write().await = Some(token.clone());
            info!("device flow authorized");
            return Ok(PollOutcome::Authorized {
                bearer_token: token,
            });
        }

        match answer.error.as_deref() {
            Some("authorization_pending") => Ok(PollOutcome::AuthorizationPending {
                retry_after_secs: session.poll_interval,
            }),
            Some("slow_down") => {
                let bumped = session.poll_interval.saturating_add(SLOW_DOWN_INCREMENT_SECS);
                session.poll_interval = answer.interval.map_or(bumped, |i| i.max(bumped));
                debug!(interval = session.poll_interval, "authority asked to slow down");
                Ok(PollOutcome::SlowDown {
                    retry_after_secs: session.poll_interval,
                })
            }
            Some("expired_token") => {
                *guard = None;
                Err(DeviceFlowError::Expired)
            }
            Some("access_denied") => {
                *guard = None;
                warn!("device flow denied by user");
                Err(DeviceFlowError::AccessDenied)
            }
            Some(code) => {
                let err = DeviceFlowError::Authority {
                    code: code.to_string(),
                    description: answer.error_description,
                };
                *guard = None;
                warn!(error = %err, "device flow failed");
                Err(err)
            }
            None => {
                *guard = None;
                Err(authority_error(&body, status))
            }
        }
    }

    /// Returns true while a device code is awaiting authorization.
    pub async fn has_pending_session(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// The prompt for the pending session, with `expires_in` counted from now.
    pub async fn pending_prompt(&self) -> Option<DevicePrompt> {
        let session = self.session.lock().await;
        session.as_ref().map(|s| DevicePrompt {
            user_code: s.user_code.clone(),
            verification_uri: s.verification_uri.clone(),
            expires_in: (s.expires_at - Utc::now()).num_seconds().max(0) as u64,
            interval: s.poll_interval,
        })
    }

    /// Current poll interval of the pending session, if any.
    pub async fn poll_interval(&self) -> Option<u64> {
        self.session.lock().await.as_ref().map(|s| s.poll_interval)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    pub async fn bearer_token(&self) -> Option<BearerToken> {
        self.token.read().await.clone()
    }

    /// Attaches the bearer token to an outgoing request.
    pub async fn authorize(&self, request: RequestBuilder) -> DeviceFlowResult<RequestBuilder> {
        let token = self.token.read().await;
        match token.as_ref() {
            Some(token) => Ok(request.bearer_auth(token.expose())),
            None => Err(DeviceFlowError::NotAuthenticated),
        }
    }

    /// Drops the bearer token and any pending session.
    pub async fn sign_out(&self) {
        *self.session.lock().await = None;
        if self.token.write().await.take().is_some() {
            info!("signed out of device credential");
        }
    }
}

fn session_deadline(expires_in: u64) -> DeviceFlowResult<DateTime<Utc>> {
    i64::try_from(expires_in)
        .ok()
        .and_then(ChronoDuration::try_seconds)
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .ok_or_else(|| DeviceFlowError::Authority {
            code: "invalid_expires_in".to_string(),
            description: Some(format!("expires_in {expires_in} is out of range")),
        })
}

fn authority_error(body: &str, status: u16) -> DeviceFlowError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => DeviceFlowError::Authority {
            code: parsed.error,
            description: parsed.error_description,
        },
        Err(_) => DeviceFlowError::Authority {
            code: format!("http_{status}"),
            description: None,
        },
    }
}
