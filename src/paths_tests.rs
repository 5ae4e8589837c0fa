//! Tests for run-directory and socket path derivation.

use super::*;
use serial_test::serial;

#[test]
#[serial]
fn test_run_dir_env_override() {
    std::env::set_var(RUN_DIR_ENV, "/tmp/spoor-test-run");
    let dir = run_dir().unwrap();
    assert_eq!(dir, PathBuf::from("/tmp/spoor-test-run"));
    std::env::remove_var(RUN_DIR_ENV);
}

#[test]
#[serial]
fn test_health_sock_env_override() {
    std::env::set_var(HEALTH_SOCK_ENV, "/tmp/custom-health.sock");
    let path = health_sock_path().unwrap();
    assert_eq!(path, PathBuf::from("/tmp/custom-health.sock"));
    std::env::remove_var(HEALTH_SOCK_ENV);
}

#[test]
#[serial]
fn test_sockets_live_under_run_dir() {
    std::env::set_var(RUN_DIR_ENV, "/tmp/spoor-test-run");
    let client = client_sock_path().unwrap();
    let health = health_sock_path().unwrap();
    assert_eq!(client.parent().unwrap(), Path::new("/tmp/spoor-test-run"));
    assert_eq!(health.parent().unwrap(), Path::new("/tmp/spoor-test-run"));
    std::env::remove_var(RUN_DIR_ENV);
}

#[test]
#[serial]
fn test_create_run_dir_sets_owner_only_mode() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("run");
    create_run_dir_with_perm(&dir, None).unwrap();
    let mode = std::fs::metadata(&dir).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o700);
}

#[test]
#[serial]
fn test_consumer_sock_paths_are_per_domain() {
    std::env::set_var(RUN_DIR_ENV, "/tmp/spoor-test-run");
    let kernel = consumer_cmd_sock_path(crate::domain::TraceDomain::Kernel).unwrap();
    let ust = consumer_cmd_sock_path(crate::domain::TraceDomain::UserUid).unwrap();
    assert_ne!(kernel, ust);
    assert!(kernel.to_string_lossy().contains("kernel"));
    std::env::remove_var(RUN_DIR_ENV);
}
