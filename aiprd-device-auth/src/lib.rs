//! Device-authorization sign-in for third-party API credentials.
//!
//! Implements the OAuth 2.0 device authorization grant (RFC 8628): request a
//! user code, let the user confirm it in a browser, then poll for a bearer
//! token. The token lives in memory only and is never persisted.

mod config;
mod error;
mod flow;
mod token;

pub use config::DeviceFlowConfig;
pub use error::{DeviceFlowError, DeviceFlowResult};
pub use flow::{
    DeviceFlow, DevicePrompt, PollOutcome, StartOutcome, DEFAULT_POLL_INTERVAL_SECS,
    SLOW_DOWN_INCREMENT_SECS,
};
pub use token::BearerToken;
