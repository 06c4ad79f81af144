//! End-to-end scenarios against a running server.
//!
//! Each test binds its own socket in a fresh temp directory, drives real
//! clients (the library handle or a raw protocol client) and asserts on
//! the backing file the server writes.

use logc_client::{Level, LogHandle};
use logc_proto::{InitResponse, Request, REQ_SIZE, RESP_SIZE};
use logc_ring::{RingBuf, ShmRegion};
use logc_server::{Server, ServerConfig, ShutdownSignal};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::sleep;

struct TestServer {
    dir: TempDir,
    socket_path: String,
    signal: ShutdownSignal,
    task: JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(ServerConfig::default()).await
    }

    async fn start_with(mut config: ServerConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("logc.server").display().to_string();
        config.socket_path.clone_from(&socket_path);

        let server = Server::bind(config).unwrap();
        let signal = server.shutdown_signal();
        let task = tokio::spawn(server.run());

        Self {
            dir,
            socket_path,
            signal,
            task,
        }
    }

    fn log_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    async fn stop(self) {
        self.signal.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not stop")
            .unwrap();
    }
}

/// A client that speaks the wire protocol directly, for scenarios the
/// library handle deliberately cannot produce (abrupt disconnects, raw
/// frames).
struct RawClient {
    ring: RingBuf,
    _region: ShmRegion,
    socket: std::os::unix::net::UnixStream,
    region_name: String,
}

fn raw_connect(socket_path: &str, log_path: &Path, append: bool) -> RawClient {
    let mut socket = std::os::unix::net::UnixStream::connect(socket_path).unwrap();

    let mut frame = [0u8; REQ_SIZE];
    let len = Request::Init {
        append,
        path: log_path.display().to_string(),
    }
    .encode(&mut frame)
    .unwrap();
    socket.write_all(&frame[..len]).unwrap();

    let mut resp = [0u8; RESP_SIZE];
    socket.read_exact(&mut resp).unwrap();
    let region_name = match InitResponse::parse(&resp).unwrap() {
        InitResponse::Ok { region_name } => region_name,
        InitResponse::Err { errno } => panic!("init refused with errno {errno}"),
    };

    let region = ShmRegion::open(&region_name).unwrap();
    let ring = unsafe { RingBuf::from_raw(region.as_ptr(), region.len()) }.unwrap();
    RawClient {
        ring,
        _region: region,
        socket,
        region_name,
    }
}

impl RawClient {
    fn send(&mut self, request: &Request) {
        let mut frame = [0u8; REQ_SIZE];
        let len = request.encode(&mut frame).unwrap();
        self.socket.write_all(&frame[..len]).unwrap();
    }
}

async fn wait_for_file(path: &Path, expected_len: usize) -> Vec<u8> {
    for _ in 0..500 {
        if let Ok(data) = std::fs::read(path) {
            if data.len() >= expected_len {
                return data;
            }
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "'{}' never reached {expected_len} bytes (has {:?})",
        path.display(),
        std::fs::read(path).map(|d| d.len())
    );
}

async fn wait_until_unlinked(region_name: &str) {
    for _ in 0..500 {
        if ShmRegion::open(region_name).is_err() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("region '{region_name}' was never unlinked");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn basic_round_trip_preserves_record_order() {
    let server = TestServer::start().await;
    let log_path = server.log_path("app.log");

    let mut handle = LogHandle::new(log_path.display().to_string(), Level::All, true)
        .with_socket_path(&server.socket_path);
    handle.connect().unwrap();

    handle.append_record(b"a\n");
    handle.append_record(b"bb\n");
    handle.append_record(b"ccc\n");
    handle.flush();

    let data = wait_for_file(&log_path, 9).await;
    assert_eq!(data, b"a\nbb\nccc\n");

    handle.close();
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn threshold_crossing_drains_without_explicit_flush() {
    let server = TestServer::start().await;
    let log_path = server.log_path("big.log");

    let mut handle = LogHandle::new(log_path.display().to_string(), Level::All, false)
        .with_socket_path(&server.socket_path);
    handle.connect().unwrap();

    // 8200 bytes crosses the half-region threshold in one append; the
    // handle notifies on its own.
    let record = vec![b'x'; 8200];
    handle.append_record(&record);

    let data = wait_for_file(&log_path, 8200).await;
    assert_eq!(data.len(), 8200);
    assert!(data.iter().all(|&b| b == b'x'));

    handle.close();
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn append_mode_keeps_existing_content() {
    let server = TestServer::start().await;
    let log_path = server.log_path("appended.log");
    std::fs::write(&log_path, b"old|").unwrap();

    let mut handle = LogHandle::new(log_path.display().to_string(), Level::All, true)
        .with_socket_path(&server.socket_path);
    handle.connect().unwrap();
    handle.append_record(b"new\n");
    handle.flush();

    let data = wait_for_file(&log_path, 8).await;
    assert_eq!(data, b"old|new\n");

    handle.close();
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn truncate_mode_discards_existing_content() {
    let server = TestServer::start().await;
    let log_path = server.log_path("truncated.log");
    std::fs::write(&log_path, b"stale bytes that must go").unwrap();

    let mut client = raw_connect(&server.socket_path, &log_path, false);
    assert_eq!(std::fs::read(&log_path).unwrap(), b"");

    client.ring.append(b"fresh\n");
    client.send(&Request::Write);

    let data = wait_for_file(&log_path, 6).await;
    assert_eq!(data, b"fresh\n");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_without_close_still_drains() {
    let server = TestServer::start().await;
    let log_path = server.log_path("abrupt.log");

    let region_name;
    {
        let client = raw_connect(&server.socket_path, &log_path, false);
        region_name = client.region_name.clone();
        client.ring.append(&[b'y'; 100]);
        // No WRITE, no CLOSE: the socket just drops.
    }

    let data = wait_for_file(&log_path, 100).await;
    assert_eq!(data.len(), 100);
    wait_until_unlinked(&region_name).await;

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn init_failure_reports_errno_and_keeps_nothing() {
    let server = TestServer::start().await;
    let log_path = server.dir.path().join("no-such-dir").join("app.log");

    let mut handle = LogHandle::new(log_path.display().to_string(), Level::All, true)
        .with_socket_path(&server.socket_path);
    match handle.connect() {
        Err(logc_client::ClientError::Refused { errno }) => assert_eq!(errno, libc::ENOENT),
        other => panic!("unexpected: {other:?}"),
    }
    assert!(!handle.is_connected());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn coalesced_notifications_drain_everything_once() {
    let server = TestServer::start().await;
    let log_path = server.log_path("coalesced.log");

    let mut client = raw_connect(&server.socket_path, &log_path, false);
    client.ring.append(b"one\n");
    client.ring.append(b"two\n");
    // Two notifications back to back; one drain may serve both.
    client.send(&Request::Write);
    client.send(&Request::Write);

    let data = wait_for_file(&log_path, 8).await;
    assert_eq!(data, b"one\ntwo\n");

    client.send(&Request::Close);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_opcode_is_ignored_not_fatal() {
    let server = TestServer::start().await;
    let log_path = server.log_path("tolerant.log");

    let mut client = raw_connect(&server.socket_path, &log_path, false);
    client.socket.write_all(&[9u8]).unwrap();
    // Let the server consume the junk frame on its own before the real
    // one, so the two cannot coalesce into a single read.
    sleep(Duration::from_millis(100)).await;

    // The connection must survive the unknown frame.
    client.ring.append(b"still here\n");
    client.send(&Request::Write);

    let data = wait_for_file(&log_path, 11).await;
    assert_eq!(data, b"still here\n");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_runs_final_drain_for_live_clients() {
    let server = TestServer::start().await;
    let log_path = server.log_path("shutdown.log");

    let client = raw_connect(&server.socket_path, &log_path, false);
    client.ring.append(b"below threshold, never notified\n");

    // Stopping the server broadcasts shutdown; the driver's teardown must
    // still drain the ring.
    server.stop().await;

    let data = std::fs::read(&log_path).unwrap();
    assert_eq!(data, b"below threshold, never notified\n");
    drop(client);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_performs_final_drain() {
    let server = TestServer::start().await;
    let log_path = server.log_path("closed.log");

    let mut handle = LogHandle::new(log_path.display().to_string(), Level::All, false)
        .with_socket_path(&server.socket_path);
    handle.connect().unwrap();

    // Appended but never notified: only the CLOSE-side drain can save it.
    handle.append_record(b"last words\n");
    handle.close();

    let data = wait_for_file(&log_path, 11).await;
    assert_eq!(data, b"last words\n");

    server.stop().await;
}
