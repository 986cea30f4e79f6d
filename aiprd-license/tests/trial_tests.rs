mod common;

use aiprd_license::{MachineIdentity, TrialGuard, TrialRecord};
use chrono::Utc;
use common::init_tracing;
use std::fs;
use tempfile::TempDir;

fn guard_in(dir: &TempDir) -> TrialGuard {
    init_tracing();
    TrialGuard::new(dir.path().join("trial.json"), &MachineIdentity::collect(dir.path()))
}

fn trial_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("trial.json")
}

fn read_record(dir: &TempDir) -> TrialRecord {
    serde_json::from_str(&fs::read_to_string(trial_path(dir)).unwrap()).unwrap()
}

fn write_record(dir: &TempDir, record: &TrialRecord) {
    fs::write(trial_path(dir), serde_json::to_string(record).unwrap()).unwrap();
}

#[test]
fn fresh_machine_has_not_used_trial() {
    let dir = tempfile::tempdir().unwrap();
    assert!(!guard_in(&dir).has_used_trial());
}

#[test]
fn recorded_trial_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let guard = guard_in(&dir);
    guard.record_trial_usage().unwrap();
    assert!(guard.has_used_trial());
    assert!(guard_in(&dir).has_used_trial());
}

#[test]
fn record_contains_fingerprint_and_tag() {
    let dir = tempfile::tempdir().unwrap();
    let guard = guard_in(&dir);
    guard.record_trial_usage().unwrap();

    let record = read_record(&dir);
    assert_eq!(record.fingerprint, guard.fingerprint());
    assert_eq!(record.integrity_tag.len(), 64);
    assert!(record.verify(guard.fingerprint()));
    assert_eq!(guard.verified_record(), Some(record));
}

#[test]
fn flipped_tag_byte_fails() {
    let dir = tempfile::tempdir().unwrap();
    let guard = guard_in(&dir);
    guard.record_trial_usage().unwrap();

    let mut record = read_record(&dir);
    let mut tag = record.integrity_tag.into_bytes();
    tag[0] = if tag[0] == b'0' { b'1' } else { b'0' };
    record.integrity_tag = String::from_utf8(tag).unwrap();
    write_record(&dir, &record);

    assert!(!guard.has_used_trial());
}

#[test]
fn edited_timestamp_fails() {
    let dir = tempfile::tempdir().unwrap();
    let guard = guard_in(&dir);
    guard.record_trial_usage().unwrap();

    let mut record = read_record(&dir);
    record.activated_at = "2020-01-01T00:00:00Z".to_string();
    write_record(&dir, &record);

    assert!(!guard.has_used_trial());
}

#[test]
fn record_from_other_machine_fails() {
    let dir = tempfile::tempdir().unwrap();
    let other = MachineIdentity {
        hostname: "other-host".to_string(),
        ..MachineIdentity::collect(dir.path())
    };
    let foreign = TrialRecord::new(&other.fingerprint(), Utc::now()).unwrap();
    assert!(foreign.verify(&other.fingerprint()));
    write_record(&dir, &foreign);

    assert!(!guard_in(&dir).has_used_trial());
}

#[test]
fn unparseable_record_treated_as_unused() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(trial_path(&dir), "{ not json").unwrap();
    assert!(!guard_in(&dir).has_used_trial());
}

#[test]
fn record_is_deterministic_for_timestamp() {
    let at = Utc::now();
    let a = TrialRecord::new("fp", at).unwrap();
    let b = TrialRecord::new("fp", at).unwrap();
    assert_eq!(a, b);
    assert_ne!(a.integrity_tag, TrialRecord::new("fp2", at).unwrap().integrity_tag);
}

#[cfg(unix)]
#[test]
fn trial_record_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    guard_in(&dir).record_trial_usage().unwrap();
    let mode = fs::metadata(trial_path(&dir)).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
