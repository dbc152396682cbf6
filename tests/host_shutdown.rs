// tests/host_shutdown.rs
#![cfg(unix)]

mod common;
use crate::common::builders::{CommandConfigBuilder, ConfigFileBuilder};
use crate::common::{init_tracing, wait_until, with_timeout};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use http_exec::app::App;
use http_exec::exec::{ShutdownReport, is_process_alive};

struct Host {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<anyhow::Result<ShutdownReport>>,
}

async fn start_host(app: Arc<App>) -> Host {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(app.serve(listener, async move {
        let _ = stopped.await;
    }));
    Host { addr, stop, task }
}

async fn post(addr: SocketAddr, path: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let req = format!(
        "POST {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(req.as_bytes()).await.unwrap();
    stream
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_signal_stops_untimed_in_flight_command() {
    init_tracing();
    let cfg = ConfigFileBuilder::new()
        .grace_period("300ms")
        .with_command(
            "long",
            CommandConfigBuilder::new("sleep")
                .arg("30")
                .timeout("none")
                .path("/long")
                .build(),
        )
        .build();
    let app = Arc::new(App::from_config(&cfg).unwrap());
    let tracker = Arc::clone(app.registry().tracker());
    let host = start_host(app).await;

    let mut client = post(host.addr, "/long").await;
    assert!(wait_until(Duration::from_secs(2), || tracker.len() == 1).await);
    let pid = tracker.pids_for("long")[0];

    host.stop.send(()).unwrap();

    let report = tokio::time::timeout(Duration::from_secs(5), host.task)
        .await
        .expect("host did not finish after the shutdown signal")
        .unwrap()
        .unwrap();
    assert!(report.is_clean());
    assert!(!is_process_alive(pid));
    assert!(tracker.is_empty());

    let mut response = String::new();
    with_timeout(client.read_to_string(&mut response)).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 500"), "response: {response}");
    assert!(response.contains(r#"{"error":"terminated during shutdown"}"#));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_disconnect_does_not_stop_the_command() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cfg = ConfigFileBuilder::new()
        .with_command(
            "job",
            CommandConfigBuilder::shell("sleep 1; touch done")
                .dir(dir.path())
                .timeout("none")
                .path("/job")
                .build(),
        )
        .build();
    let app = Arc::new(App::from_config(&cfg).unwrap());
    let tracker = Arc::clone(app.registry().tracker());
    let host = start_host(app).await;

    let client = post(host.addr, "/job").await;
    assert!(wait_until(Duration::from_secs(2), || tracker.len() == 1).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    drop(client);

    let marker = dir.path().join("done");
    assert!(wait_until(Duration::from_secs(3), || marker.exists()).await);
    assert!(wait_until(Duration::from_secs(2), || tracker.is_empty()).await);

    host.stop.send(()).unwrap();
    let report = with_timeout(host.task).await.unwrap().unwrap();
    assert!(report.is_clean());
}

#[tokio::test]
async fn immediate_signal_still_tears_down_lifecycle_processes() {
    let cfg = ConfigFileBuilder::new()
        .with_command(
            "daemon",
            CommandConfigBuilder::new("sleep")
                .arg("30")
                .timeout("none")
                .route_scoped(false)
                .foreground(false)
                .at(http_exec::types::LifecycleEvent::Startup)
                .build(),
        )
        .build();
    let app = Arc::new(App::from_config(&cfg).unwrap());
    assert_eq!(app.startup().await, 0);
    let tracker = Arc::clone(app.registry().tracker());
    let pid = tracker.pids_for("daemon")[0];

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let report = with_timeout(Arc::clone(&app).serve(listener, async {})).await.unwrap();
    assert!(report.is_clean());
    assert!(wait_until(Duration::from_secs(2), || !is_process_alive(pid)).await);
}
