//! Entitlement tokens.
//!
//! A token is one of two shapes, told apart by the presence of `polar_uuid`:
//!
//! - [`SignedToken`]: `{tier, expires_at, enabled_features, signature}`, issued
//!   offline and verified against the embedded Ed25519 key
//! - [`ExchangedToken`]: `{tier, expires_at, enabled_features, polar_uuid,
//!   product_type, validated_at}`, produced by trading a license key with the
//!   entitlement authority and trusted because only the machine-bound store or
//!   a fresh validation can produce it
//!
//! User-facing keys in token shape are `PREFIX + base64url(token JSON)`.

use crate::error::{LicenseError, LicenseResult};
use crate::validator::{ValidationOutcome, ValidationStatus};
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Features every installation has.
pub const FREE_FEATURES: &[&str] = &["prd_generation", "markdown_export"];

/// Features unlocked by a trial or a paid license obtained through the authority.
pub const PREMIUM_FEATURES: &[&str] = &[
    "prd_generation",
    "markdown_export",
    "advanced_templates",
    "multi_provider",
    "pdf_export",
    "unlimited_documents",
];

/// Remaining days at or below which a license is classified as a trial.
pub const TRIAL_THRESHOLD_DAYS: i64 = 14;

const SECS_PER_DAY: i64 = 24 * 60 * 60;

const SIGNATURE_FIELD: &str = "signature";

/// Capability tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// No token; the default state.
    Free,
    /// Time-limited evaluation.
    Trial,
    /// Paid license.
    Licensed,
}

/// Commercial shape of a license, derived from its expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    /// Never expires.
    Lifetime,
    /// Expires within [`TRIAL_THRESHOLD_DAYS`].
    Trial,
    /// Recurring subscription.
    Monthly,
}

impl ProductType {
    /// Classifies a license by its expiry relative to `now`.
    #[must_use]
    pub fn classify(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match expires_at {
            None => Self::Lifetime,
            Some(exp) if days_remaining(exp, now) <= TRIAL_THRESHOLD_DAYS => Self::Trial,
            Some(_) => Self::Monthly,
        }
    }
}

/// Whole days until `expires_at`, rounded up. Negative once expired.
#[must_use]
pub fn days_remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (expires_at - now).num_seconds();
    secs.div_euclid(SECS_PER_DAY) + i64::from(secs.rem_euclid(SECS_PER_DAY) != 0)
}

/// A token whose authenticity is proven by an Ed25519 signature.
///
/// The signed claims are kept exactly as issued, so verification sees the
/// issuer's own spelling of every field, including fields this version does
/// not know. The typed accessors are parsed from those claims and cannot be
/// changed independently of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken {
    claims: Map<String, Value>,
    signature: String,
    tier: Tier,
    expires_at: Option<DateTime<Utc>>,
    enabled_features: Vec<String>,
}

#[derive(Deserialize)]
struct SignedClaims {
    tier: Tier,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    enabled_features: Vec<String>,
}

impl SignedToken {
    /// Builds a token from its claims (everything except `signature`) and the
    /// standard base64 signature over them.
    pub fn from_claims(
        mut claims: Map<String, Value>,
        signature: impl Into<String>,
    ) -> LicenseResult<Self> {
        claims.remove(SIGNATURE_FIELD);
        let parsed: SignedClaims = serde_json::from_value(Value::Object(claims.clone()))
            .map_err(|e| LicenseError::InvalidPayload(format!("signed claims: {e}")))?;
        Ok(Self {
            claims,
            signature: signature.into(),
            tier: parsed.tier,
            expires_at: parsed.expires_at,
            enabled_features: parsed.enabled_features,
        })
    }

    #[must_use]
    pub fn tier(&self) -> Tier {
        self.tier
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    #[must_use]
    pub fn enabled_features(&self) -> &[String] {
        &self.enabled_features
    }

    /// Standard base64 Ed25519 signature over [`SignedToken::signing_payload`].
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The claims as issued, without the signature.
    #[must_use]
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// The claims as a JSON object. The verifier canonicalizes this before checking.
    #[must_use]
    pub fn signing_payload(&self) -> Value {
        Value::Object(self.claims.clone())
    }
}

impl Serialize for SignedToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut object = self.claims.clone();
        object.insert(SIGNATURE_FIELD.to_string(), Value::String(self.signature.clone()));
        object.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SignedToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut object = Map::deserialize(deserializer)?;
        let signature = match object.remove(SIGNATURE_FIELD) {
            Some(Value::String(signature)) => signature,
            Some(_) => return Err(D::Error::custom("signature must be a string")),
            None => return Err(D::Error::missing_field(SIGNATURE_FIELD)),
        };
        Self::from_claims(object, signature).map_err(D::Error::custom)
    }
}

/// A token obtained by exchanging a license key with the entitlement authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangedToken {
    pub tier: Tier,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub enabled_features: Vec<String>,
    /// The license key as issued by the authority.
    #[serde(rename = "polar_uuid")]
    pub opaque_id: String,
    pub product_type: ProductType,
    pub validated_at: DateTime<Utc>,
}

impl ExchangedToken {
    /// Builds a token from a `granted` validation answer.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Revoked`] for any other status.
    pub fn from_validation(
        opaque_id: &str,
        outcome: &ValidationOutcome,
        now: DateTime<Utc>,
    ) -> LicenseResult<Self> {
        if outcome.status != ValidationStatus::Granted {
            return Err(LicenseError::Revoked(outcome.status.to_string()));
        }

        let product_type = ProductType::classify(outcome.expires_at, now);
        let tier = match product_type {
            ProductType::Trial => Tier::Trial,
            ProductType::Lifetime | ProductType::Monthly => Tier::Licensed,
        };

        Ok(Self {
            tier,
            expires_at: outcome.expires_at,
            enabled_features: PREMIUM_FEATURES.iter().map(|f| (*f).to_string()).collect(),
            opaque_id: opaque_id.to_string(),
            product_type,
            validated_at: now,
        })
    }
}

/// Either token shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntitlementToken {
    /// Listed first: only this shape carries `polar_uuid`.
    Exchanged(ExchangedToken),
    Signed(SignedToken),
}

impl EntitlementToken {
    /// Parses token JSON into whichever shape it is.
    pub fn from_json(bytes: &[u8]) -> LicenseResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| LicenseError::InvalidPayload(format!("unrecognized token: {e}")))
    }

    /// Serializes the token to JSON.
    pub fn to_json(&self) -> LicenseResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes the base64 body of a token-shaped license key.
    pub fn decode_key_body(body: &str) -> LicenseResult<Self> {
        let body = body.trim();
        let json = URL_SAFE_NO_PAD
            .decode(body)
            .or_else(|_| STANDARD.decode(body))
            .map_err(|e| LicenseError::InvalidKeyFormat(format!("invalid token base64: {e}")))?;
        Self::from_json(&json)
    }

    /// Encodes the token as the body of a license key.
    pub fn encode_key_body(&self) -> LicenseResult<String> {
        Ok(URL_SAFE_NO_PAD.encode(self.to_json()?))
    }

    #[must_use]
    pub fn tier(&self) -> Tier {
        match self {
            Self::Exchanged(t) => t.tier,
            Self::Signed(t) => t.tier(),
        }
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Exchanged(t) => t.expires_at,
            Self::Signed(t) => t.expires_at(),
        }
    }

    #[must_use]
    pub fn enabled_features(&self) -> &[String] {
        match self {
            Self::Exchanged(t) => &t.enabled_features,
            Self::Signed(t) => t.enabled_features(),
        }
    }

    /// Returns true once `expires_at` is at or before `now`. Lifetime tokens never expire.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|exp| exp <= now)
    }

    /// Returns the exchanged shape, if this is one.
    #[must_use]
    pub fn as_exchanged(&self) -> Option<&ExchangedToken> {
        match self {
            Self::Exchanged(t) => Some(t),
            Self::Signed(_) => None,
        }
    }
}
