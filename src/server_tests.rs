//! Tests for the client control socket.

use super::*;
use crate::protocol::{ClientReply, ClientRequest};
use crate::testutil::TestHarness;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

async fn wait_for_socket(path: &Path) {
    for _ in 0..100 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("control socket never appeared at {}", path.display());
}

struct TestServer {
    h: TestHarness,
    socket_path: PathBuf,
    task: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let h = TestHarness::new();
        let tmp = tempfile::tempdir().unwrap();
        let socket_path = tmp.path().join("client.sock");
        // Leak the dir so the socket outlives this scope; the temp root is
        // cleaned up by the OS.
        std::mem::forget(tmp);

        let ctx = h.ctx.clone();
        let path = socket_path.clone();
        let task = tokio::spawn(async move { run_control_server(ctx, &path).await });
        wait_for_socket(&socket_path).await;
        Self {
            h,
            socket_path,
            task,
        }
    }

    async fn connect(&self) -> (BufReader<tokio::net::unix::OwnedReadHalf>, tokio::net::unix::OwnedWriteHalf) {
        let stream = UnixStream::connect(&self.socket_path).await.unwrap();
        let (reader, writer) = stream.into_split();
        (BufReader::new(reader), writer)
    }
}

async fn round_trip(
    reader: &mut BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    line: &str,
) -> ClientReply {
    writer.write_all(format!("{}\n", line).as_bytes()).await.unwrap();
    let mut reply = String::new();
    reader.read_line(&mut reply).await.unwrap();
    serde_json::from_str(&reply).unwrap()
}

#[tokio::test]
async fn test_request_reply_over_the_socket() {
    let server = TestServer::start().await;
    let (mut reader, mut writer) = server.connect().await;

    let request = serde_json::to_string(&ClientRequest::CreateSession {
        name: "wire".to_string(),
        output_path: Some(PathBuf::from("/tmp/spoor-test-wire")),
    })
    .unwrap();
    let reply = round_trip(&mut reader, &mut writer, &request).await;
    assert!(matches!(reply, ClientReply::Session(_)));

    // The connection is persistent: a second exchange works.
    let request = serde_json::to_string(&ClientRequest::ListSessions).unwrap();
    let reply = round_trip(&mut reader, &mut writer, &request).await;
    let ClientReply::Sessions(sessions) = reply else {
        panic!("unexpected reply");
    };
    assert_eq!(sessions.len(), 1);

    server.h.ctx.signal_shutdown();
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_malformed_request_gets_an_error_reply() {
    let server = TestServer::start().await;
    let (mut reader, mut writer) = server.connect().await;

    let reply = round_trip(&mut reader, &mut writer, "this is not json").await;
    assert!(matches!(
        reply,
        ClientReply::Error(crate::error::CommandError::InvalidState { .. })
    ));

    server.h.ctx.signal_shutdown();
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_second_server_on_live_socket_refuses() {
    let server = TestServer::start().await;

    let h2 = TestHarness::new();
    let result = run_control_server(h2.ctx.clone(), &server.socket_path).await;
    assert!(result.is_err());

    // The first server is unaffected.
    let (mut reader, mut writer) = server.connect().await;
    let request = serde_json::to_string(&ClientRequest::Version).unwrap();
    let reply = round_trip(&mut reader, &mut writer, &request).await;
    assert!(matches!(reply, ClientReply::Version { .. }));

    server.h.ctx.signal_shutdown();
    server.task.await.unwrap().unwrap();
}
