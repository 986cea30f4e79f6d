use aiprd_license::LicenseError;

#[test]
fn error_display_invalid_key_format() {
    let err = LicenseError::InvalidKeyFormat("bad format".into());
    assert!(format!("{err}").contains("invalid license key format"));
}

#[test]
fn error_display_invalid_signature() {
    let err = LicenseError::InvalidSignature;
    assert!(format!("{err}").contains("signature"));
}

#[test]
fn error_display_invalid_payload() {
    let err = LicenseError::InvalidPayload("missing field".into());
    let msg = format!("{err}");
    assert!(msg.contains("invalid license payload"));
    assert!(msg.contains("missing field"));
}

#[test]
fn error_display_expired() {
    let err = LicenseError::Expired("2025-01-01".into());
    assert!(format!("{err}").contains("expired"));
}

#[test]
fn error_display_revoked() {
    let err = LicenseError::Revoked("disabled".into());
    assert_eq!(format!("{err}"), "license key disabled");
}

#[test]
fn error_display_trial_already_used() {
    let err = LicenseError::TrialAlreadyUsed;
    assert!(format!("{err}").contains("trial already used"));
}

#[test]
fn error_display_validation_unavailable() {
    let err = LicenseError::ValidationUnavailable("all down".into());
    let msg = format!("{err}");
    assert!(msg.contains("unavailable"));
    assert!(msg.contains("all down"));
}

#[test]
fn error_display_network() {
    let err = LicenseError::Network("timeout".into());
    assert!(format!("{err}").contains("network"));
}

#[test]
fn error_from_io() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: LicenseError = io.into();
    assert!(matches!(err, LicenseError::Storage(_)));
    assert!(format!("{err}").contains("denied"));
}

#[test]
fn error_from_serde() {
    let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: LicenseError = serde_err.into();
    assert!(matches!(err, LicenseError::Serialization(_)));
}

#[test]
fn error_from_crypto() {
    let err: LicenseError = aiprd_crypto::CryptoError::Malformed { len: 3 }.into();
    assert!(format!("{err}").contains("crypto error"));
}
