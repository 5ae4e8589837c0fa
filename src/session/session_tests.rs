//! Tests for the session model.

use super::*;
use crate::consumer::output::ConsumerOutput;
use std::path::PathBuf;

fn test_session() -> Session {
    Session::new(
        "s1".to_string(),
        ConsumerOutput::local(PathBuf::from("/tmp/traces")),
    )
}

#[test]
fn test_new_session_is_inactive_with_no_domains() {
    let session = test_session();
    assert_eq!(session.state, SessionState::Inactive);
    assert!(session.domains.is_empty());
    assert!(!session.rotation.is_pending());
}

#[test]
fn test_attach_domain_is_idempotent() {
    let mut session = test_session();
    session.attach_domain(TraceDomain::UserUid);
    session.attach_domain(TraceDomain::UserUid);
    assert_eq!(session.domains.len(), 1);

    session.attach_domain(TraceDomain::Kernel);
    assert_eq!(session.domains.len(), 2);
}

#[test]
fn test_attached_domain_inherits_base_output() {
    let mut session = test_session();
    let domain = session.attach_domain(TraceDomain::Kernel);
    assert!(!domain.output.is_net());
    assert_eq!(domain.output.describe(), "/tmp/traces");
}

#[test]
fn test_channel_keys_are_unique() {
    let mut session = test_session();
    let first = session.allocate_channel_key();
    let second = session.allocate_channel_key();
    assert_ne!(first, second);
}

#[test]
fn test_output_immutable_during_rotation() {
    let mut session = test_session();
    assert!(session.output_mutable().is_ok());

    session.rotation.begin().unwrap();
    let err = session.output_mutable().unwrap_err();
    assert!(matches!(err, crate::error::CommandError::Busy { .. }));
}

#[test]
fn test_output_immutable_during_snapshot() {
    let mut session = test_session();
    session.snapshot_in_progress = true;
    assert!(session.output_mutable().is_err());
}

#[test]
fn test_summary_reflects_state_and_domains() {
    let mut session = test_session();
    session.attach_domain(TraceDomain::UserPid);
    session.state = SessionState::Active;

    let summary = session.summary();
    assert_eq!(summary.name, "s1");
    assert_eq!(summary.state, SessionState::Active);
    assert_eq!(summary.domains, vec!["ust-pid".to_string()]);
}
