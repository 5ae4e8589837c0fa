//! Tests for trace URI parsing.

use super::*;

#[test]
fn test_parse_with_explicit_port() {
    let uri = TraceUri::parse("tcp://relay.example.com:5400", StreamRole::Control).unwrap();
    assert_eq!(uri.host, "relay.example.com");
    assert_eq!(uri.port, 5400);
}

#[test]
fn test_parse_applies_role_default_port() {
    let control = TraceUri::parse("tcp://relay", StreamRole::Control).unwrap();
    let data = TraceUri::parse("tcp://relay", StreamRole::Data).unwrap();
    assert_eq!(control.port, DEFAULT_CONTROL_PORT);
    assert_eq!(data.port, DEFAULT_DATA_PORT);
}

#[test]
fn test_parse_rejects_unknown_scheme() {
    let err = TraceUri::parse("udp://relay:5342", StreamRole::Control).unwrap_err();
    assert!(matches!(err, CommandError::InvalidDestination { .. }));
}

#[test]
fn test_parse_rejects_missing_host() {
    let err = TraceUri::parse("tcp://:5342", StreamRole::Control).unwrap_err();
    assert!(matches!(err, CommandError::InvalidDestination { .. }));
}

#[test]
fn test_parse_rejects_bad_port() {
    let err = TraceUri::parse("tcp://relay:notaport", StreamRole::Data).unwrap_err();
    assert!(matches!(err, CommandError::InvalidDestination { .. }));
}

#[test]
fn test_display_round_trip() {
    let uri = TraceUri::parse("tcp://relay:5342", StreamRole::Control).unwrap();
    assert_eq!(uri.to_string(), "tcp://relay:5342");
}
