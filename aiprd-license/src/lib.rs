//! Licensing and activation for AIPRD.
//!
//! This module handles:
//! - Resolving the current tier (free, trial, licensed) from a local cache and
//!   a machine-bound encrypted store, without touching the network
//! - Ed25519 verification of offline-issued signed tokens
//! - Exchanging license keys with the Polar entitlement authority
//! - Single-use trial tracking with a tamper-evident record
//! - Background re-validation of exchanged tokens
//!
//! # Design Principles
//!
//! - **Local reads**: `resolve_license` is safe on every privileged call path
//! - **Degrade, don't crash**: corrupt, expired or forged state resolves to the free tier
//! - **Fail open on outages**: an unreachable authority never revokes an accepted license
//! - **Explicit context**: all mutable state lives in a [`LicenseManager`] handle
//!
//! # License Key Format
//!
//! Keys are `AIPRD-` followed by either a hyphenated UUID issued by the
//! authority, or `base64url(token JSON)` for a signed token.

mod activation;
mod config;
mod device;
mod error;
mod resolver;
mod signature;
mod store;
mod token;
mod trial;
mod validator;

pub use activation::{is_license_identifier, ActivationResult};
pub use config::{
    LicenseConfig, DEFAULT_KEY_PREFIX, LICENSE_PUBLIC_KEY, POLAR_PRODUCTION_URL, POLAR_SANDBOX_URL,
};
pub use device::MachineIdentity;
pub use error::{LicenseError, LicenseResult};
pub use resolver::{
    accept_token, revalidation_due, LicenseManager, LicenseSource, ResolutionResult,
    RevalidationOutcome, REVALIDATION_WINDOW_DAYS,
};
pub use signature::{canonicalize, signing_bytes, verify_signature};
pub use store::SecureStore;
pub use token::{
    days_remaining, EntitlementToken, ExchangedToken, ProductType, SignedToken, Tier,
    FREE_FEATURES, PREMIUM_FEATURES, TRIAL_THRESHOLD_DAYS,
};
pub use trial::{TrialGuard, TrialRecord};
pub use validator::{EntitlementValidator, PolarValidator, ValidationOutcome, ValidationStatus};
