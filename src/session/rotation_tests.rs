//! Tests for rotation bookkeeping.

use super::*;

#[test]
fn test_ids_start_at_one_and_increase() {
    let mut record = RotationRecord::new();
    let first = record.begin().unwrap();
    assert_eq!(first, 1);
    record.complete(first, PathBuf::from("/traces/archives/chunk-000001"));

    let second = record.begin().unwrap();
    assert_eq!(second, 2);
}

#[test]
fn test_pending_rotation_refuses_another() {
    let mut record = RotationRecord::new();
    let id = record.begin().unwrap();
    let err = record.begin().unwrap_err();
    assert!(matches!(err, CommandError::Busy { .. }));

    // Completing clears the pending slot.
    record.complete(id, PathBuf::from("/chunk"));
    assert!(record.begin().is_ok());
}

#[test]
fn test_info_tracks_pending_then_completed() {
    let mut record = RotationRecord::new();
    let id = record.begin().unwrap();
    assert_eq!(record.info(id).unwrap().state, RotationInfoState::Pending);
    assert!(record.info(id).unwrap().chunk_path.is_none());

    record.complete(id, PathBuf::from("/traces/archives/chunk-000001"));
    let info = record.info(id).unwrap();
    assert_eq!(info.state, RotationInfoState::Completed);
    assert_eq!(
        info.chunk_path.as_deref(),
        Some("/traces/archives/chunk-000001")
    );
}

#[test]
fn test_failed_rotation_reports_error_state() {
    let mut record = RotationRecord::new();
    let id = record.begin().unwrap();
    record.fail(id);
    assert_eq!(record.info(id).unwrap().state, RotationInfoState::Error);
    assert!(!record.is_pending());
}

#[test]
fn test_forgotten_ids_are_not_retained() {
    let mut record = RotationRecord::new();
    let first = record.begin().unwrap();
    record.complete(first, PathBuf::from("/c1"));
    let second = record.begin().unwrap();
    record.complete(second, PathBuf::from("/c2"));

    // Only the most recent completion is kept.
    assert!(record.info(first).is_none());
    assert!(record.info(second).is_some());
}

#[test]
fn test_chunk_dir_name_is_zero_padded() {
    assert_eq!(RotationRecord::chunk_dir_name(7), "archives/chunk-000007");
}
