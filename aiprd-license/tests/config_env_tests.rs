//! Environment overrides. Kept in its own test binary: it mutates the process
//! environment, so no other test may run alongside it.

use aiprd_license::{LicenseConfig, POLAR_PRODUCTION_URL};
use std::path::PathBuf;

#[test]
fn from_env_applies_overrides() {
    // SAFETY: this binary runs a single test, so nothing reads the
    // environment concurrently.
    unsafe {
        std::env::set_var("AIPRD_DATA_DIR", "/srv/aiprd-data");
        std::env::set_var("AIPRD_POLAR_ORGANIZATION_ID", "org_from_env");
    }

    let cfg = LicenseConfig::from_env();
    assert_eq!(cfg.data_dir, PathBuf::from("/srv/aiprd-data"));
    assert_eq!(cfg.token_path(), PathBuf::from("/srv/aiprd-data/license.enc"));
    assert_eq!(cfg.organization_id, "org_from_env");
    assert_eq!(cfg.authority_endpoints[0], POLAR_PRODUCTION_URL);

    // SAFETY: as above.
    unsafe {
        std::env::remove_var("AIPRD_DATA_DIR");
        std::env::remove_var("AIPRD_POLAR_ORGANIZATION_ID");
    }

    let cfg = LicenseConfig::from_env();
    assert!(cfg.data_dir.ends_with("aiprd"));
    assert!(cfg.organization_id.is_empty());
}
