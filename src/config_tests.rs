//! Tests for daemon configuration loading.

use super::*;
use serial_test::serial;
use std::io::Write;

#[test]
#[serial]
fn test_defaults_without_file() {
    std::env::remove_var(TRACING_GROUP_ENV);
    let config = DaemonConfig::load(None).unwrap();
    assert_eq!(config.tracing_group, "tracing");
    assert_eq!(config.consumer.command_timeout_secs, 30);
    assert_eq!(config.relay.connect_timeout_secs, 10);
}

#[test]
#[serial]
fn test_partial_file_fills_defaults() {
    std::env::remove_var(TRACING_GROUP_ENV);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{{\"tracing_group\": \"trace-ops\"}}").unwrap();
    let config = DaemonConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.tracing_group, "trace-ops");
    assert_eq!(config.consumer.command_timeout_secs, 30);
}

#[test]
#[serial]
fn test_env_overrides_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{{\"tracing_group\": \"from-file\"}}").unwrap();
    std::env::set_var(TRACING_GROUP_ENV, "from-env");
    let config = DaemonConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.tracing_group, "from-env");
    std::env::remove_var(TRACING_GROUP_ENV);
}

#[test]
#[serial]
fn test_malformed_file_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "not json").unwrap();
    assert!(DaemonConfig::load(Some(file.path())).is_err());
}
