use aiprd_license::{LicenseConfig, MachineIdentity};
use std::path::PathBuf;

#[test]
fn identity_collection() {
    let identity = MachineIdentity::collect("/opt/aiprd");
    assert!(!identity.hostname.is_empty());
    assert!(!identity.username.is_empty());
    assert_eq!(identity.install_path, "/opt/aiprd");
}

#[test]
fn fingerprint_stability() {
    let a = MachineIdentity::collect("/opt/aiprd");
    let b = MachineIdentity::collect("/opt/aiprd");
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.storage_key().as_bytes(), b.storage_key().as_bytes());
}

#[test]
fn fingerprint_is_hex_sha256() {
    let fp = MachineIdentity::collect("/opt/aiprd").fingerprint();
    assert_eq!(fp.len(), 64);
    assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn install_path_changes_identity() {
    let a = MachineIdentity::collect("/opt/aiprd");
    let b = MachineIdentity::collect("/home/user/aiprd");
    assert_ne!(a.fingerprint(), b.fingerprint());
    assert_ne!(a.storage_key().as_bytes(), b.storage_key().as_bytes());
}

#[test]
fn fingerprint_does_not_reveal_storage_key() {
    let identity = MachineIdentity::collect("/opt/aiprd");
    assert_ne!(identity.fingerprint(), hex::encode(identity.storage_key().as_bytes()));
}

#[test]
fn identity_serde_roundtrip() {
    let identity = MachineIdentity::collect("/opt/aiprd");
    let json = serde_json::to_string(&identity).unwrap();
    let parsed: MachineIdentity = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, identity);
}

// ── LicenseConfig ───────────────────────────────────────────────

#[test]
fn config_paths_live_under_data_dir() {
    let cfg = LicenseConfig::with_data_dir("/tmp/aiprd-test");
    assert_eq!(cfg.token_path(), PathBuf::from("/tmp/aiprd-test/license.enc"));
    assert_eq!(cfg.trial_path(), PathBuf::from("/tmp/aiprd-test/trial.json"));
}

#[test]
fn config_default_data_dir_is_app_specific() {
    let cfg = LicenseConfig::default();
    assert!(cfg.data_dir.ends_with("aiprd"));
    assert!(cfg.organization_id.is_empty());
    assert_eq!(cfg.public_key, aiprd_license::LICENSE_PUBLIC_KEY);
}

#[test]
fn config_serde_roundtrip() {
    let cfg = LicenseConfig {
        organization_id: "org_123".to_string(),
        ..LicenseConfig::with_data_dir("/var/lib/aiprd")
    };
    let json = serde_json::to_string(&cfg).unwrap();
    let parsed: LicenseConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.organization_id, "org_123");
    assert_eq!(parsed.data_dir, PathBuf::from("/var/lib/aiprd"));
    assert_eq!(parsed.authority_endpoints, cfg.authority_endpoints);
}
