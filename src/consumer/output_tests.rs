//! Tests for the consumer output value type.

use super::*;
use crate::error::CommandError;
use crate::uri::{StreamRole, TraceUri};
use std::path::PathBuf;

fn uri(s: &str, role: StreamRole) -> TraceUri {
    TraceUri::parse(s, role).unwrap()
}

#[test]
fn test_matching_hosts_accepted() {
    let mut output = ConsumerOutput::net();
    output
        .set_network_uri(StreamRole::Control, uri("tcp://relay:5342", StreamRole::Control))
        .unwrap();
    output
        .set_network_uri(StreamRole::Data, uri("tcp://relay:5343", StreamRole::Data))
        .unwrap();
    assert!(output.network_ready());
}

#[test]
fn test_mismatched_hosts_rejected() {
    let mut output = ConsumerOutput::net();
    output
        .set_network_uri(StreamRole::Control, uri("tcp://host-a:5342", StreamRole::Control))
        .unwrap();
    let err = output
        .set_network_uri(StreamRole::Data, uri("tcp://host-b:5343", StreamRole::Data))
        .unwrap_err();
    assert!(matches!(err, CommandError::InvalidDestination { .. }));
    assert!(!output.network_ready());
}

#[test]
fn test_mismatch_also_rejected_when_data_set_first() {
    let mut output = ConsumerOutput::net();
    output
        .set_network_uri(StreamRole::Data, uri("tcp://host-b:5343", StreamRole::Data))
        .unwrap();
    let err = output
        .set_network_uri(StreamRole::Control, uri("tcp://host-a:5342", StreamRole::Control))
        .unwrap_err();
    assert!(matches!(err, CommandError::InvalidDestination { .. }));
}

#[test]
fn test_local_output_converts_to_net_on_first_uri() {
    let mut output = ConsumerOutput::local(PathBuf::from("/tmp/traces"));
    assert!(!output.is_net());
    output
        .set_network_uri(StreamRole::Control, uri("tcp://relay", StreamRole::Control))
        .unwrap();
    assert!(output.is_net());
    assert!(!output.network_ready());
}

#[test]
fn test_copies_are_independent() {
    let mut original = ConsumerOutput::net();
    original
        .set_network_uri(StreamRole::Control, uri("tcp://relay", StreamRole::Control))
        .unwrap();

    let mut copy = original.clone();
    copy.subdir = "snapshot-1".to_string();
    copy.set_network_uri(StreamRole::Data, uri("tcp://relay:9000", StreamRole::Data))
        .unwrap();

    assert!(original.subdir.is_empty());
    assert!(original.data_uri().is_none());
    assert!(copy.network_ready());
}

#[test]
fn test_consumer_pathname_local_includes_subdir() {
    let mut output = ConsumerOutput::local(PathBuf::from("/tmp/traces"));
    output.subdir = "k".to_string();
    assert_eq!(output.consumer_pathname(), "/tmp/traces/k");
}
