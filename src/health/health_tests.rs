//! Tests for the health registry and the check responder.

use super::responder::{run_health_responder, HEALTH_CMD_CHECK, REPLY_LEN};
use super::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::broadcast;

#[test]
fn test_registry_starts_all_healthy() {
    let registry = HealthRegistry::new();
    for subsystem in HealthSubsystem::ALL {
        assert_eq!(registry.report(subsystem), HealthStatus::Healthy);
    }
    assert_eq!(registry.degraded_mask(), 0);
}

#[test]
fn test_degraded_subsystem_sets_its_bit() {
    let registry = HealthRegistry::new();
    registry.set_degraded(HealthSubsystem::KernelConsumer);
    assert_eq!(
        registry.report(HealthSubsystem::KernelConsumer),
        HealthStatus::Unhealthy
    );
    assert_eq!(
        registry.degraded_mask(),
        HealthSubsystem::KernelConsumer.bit()
    );

    registry.set_healthy(HealthSubsystem::KernelConsumer);
    assert_eq!(registry.degraded_mask(), 0);
}

/// Spawn a responder on a socket under a fresh temp dir.
fn start_responder(
    registry: Arc<HealthRegistry>,
    socket_path: &Path,
) -> (broadcast::Sender<()>, tokio::task::JoinHandle<()>) {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let path = socket_path.to_path_buf();
    let handle = tokio::spawn(async move {
        let _ = run_health_responder(registry, &path, shutdown_rx).await;
    });
    (shutdown_tx, handle)
}

async fn wait_for_socket(path: &Path) {
    for _ in 0..100 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("health socket never appeared at {}", path.display());
}

async fn query_mask(path: &Path) -> u64 {
    let mut stream = UnixStream::connect(path).await.unwrap();
    stream
        .write_all(&HEALTH_CMD_CHECK.to_le_bytes())
        .await
        .unwrap();
    let mut reply = [0u8; REPLY_LEN];
    stream.read_exact(&mut reply).await.unwrap();
    u64::from_le_bytes(reply)
}

#[tokio::test]
async fn test_check_round_trip_reports_degraded_bit() {
    let tmp = tempfile::tempdir().unwrap();
    let socket_path = tmp.path().join("health.sock");
    let registry = Arc::new(HealthRegistry::new());
    let (shutdown_tx, handle) = start_responder(registry.clone(), &socket_path);
    wait_for_socket(&socket_path).await;

    assert_eq!(query_mask(&socket_path).await, 0);

    registry.set_degraded(HealthSubsystem::RotationScheduler);
    let mask = query_mask(&socket_path).await;
    assert_eq!(mask, HealthSubsystem::RotationScheduler.bit());

    let _ = shutdown_tx.send(());
    handle.await.unwrap();
}

#[tokio::test]
async fn test_short_request_gets_no_reply_and_next_client_works() {
    let tmp = tempfile::tempdir().unwrap();
    let socket_path = tmp.path().join("health.sock");
    let registry = Arc::new(HealthRegistry::new());
    let (shutdown_tx, handle) = start_responder(registry.clone(), &socket_path);
    wait_for_socket(&socket_path).await;

    // Two bytes, then EOF: the responder must close without replying.
    {
        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        stream.write_all(&[0u8, 0u8]).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut reply = Vec::new();
        let read = stream.read_to_end(&mut reply).await.unwrap();
        assert_eq!(read, 0, "short request must not receive a reply");
    }

    // The responder stays up for well-formed clients.
    assert_eq!(query_mask(&socket_path).await, 0);

    let _ = shutdown_tx.send(());
    handle.await.unwrap();
}
