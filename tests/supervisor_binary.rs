//! End-to-end runs of the supervisor binary against a fake proxy.

#![cfg(unix)]

use std::net::SocketAddr;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

mod common;

fn spawn_supervisor(bin: &Path, config: &Path, health: SocketAddr, mgmt: SocketAddr) -> Child {
    Command::new(env!("CARGO_BIN_EXE_proxy-supervisor"))
        .env_clear()
        .env("PATH", std::env::var("PATH").unwrap_or_default())
        .env("XRAY_BIN", bin)
        .env("XRAY_CONFIG", config)
        .env("HEALTH_ADDR", health.to_string())
        .env("XRAY_MGMT_SOCKET", mgmt.to_string())
        .env("GRACE_PERIOD", "2s")
        .env("SHUTDOWN_TIMEOUT", "1s")
        .env("RUST_LOG", "proxy_supervisor=debug")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .expect("supervisor binary should launch")
}

async fn wait_exit(child: &mut Child, limit: Duration) -> ExitStatus {
    tokio::time::timeout(limit, child.wait())
        .await
        .expect("supervisor did not exit in time")
        .unwrap()
}

fn signal_pid(pid: u32, signal: Signal) {
    kill(Pid::from_raw(pid as i32), signal).unwrap();
}

#[tokio::test]
async fn test_sigterm_shuts_everything_down() {
    let dir = tempfile::tempdir().unwrap();
    let bin = common::fake_binary(dir.path(), "echo $$ > \"$2.pid\"\nexec sleep 30");
    let config = dir.path().join("config.json");
    let health = common::free_addr();
    let mgmt = common::start_mgmt_endpoint().await;

    let mut supervisor = spawn_supervisor(&bin, &config, health, mgmt);
    let client = common::client();
    let url = format!("http://{}/", health);
    assert!(common::wait_until_serving(&client, &url, Duration::from_secs(10)).await);

    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);

    let pid_file = dir.path().join("config.json.pid");
    let mut child_pid = None;
    for _ in 0..100 {
        if let Ok(raw) = std::fs::read_to_string(&pid_file) {
            if let Ok(pid) = raw.trim().parse::<i32>() {
                child_pid = Some(pid);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let child_pid = child_pid.expect("fake proxy never wrote its pid");

    signal_pid(supervisor.id().unwrap(), Signal::SIGTERM);
    let status = wait_exit(&mut supervisor, Duration::from_secs(10)).await;

    assert_eq!(status.code(), Some(0));
    assert!(kill(Pid::from_raw(child_pid), None).is_err(), "child outlived the supervisor");
    assert!(client.get(&url).send().await.is_err());
}

#[tokio::test]
async fn test_missing_binary_exits_fatal_without_serving() {
    let dir = tempfile::tempdir().unwrap();
    let health = common::free_addr();
    let mgmt = common::start_mgmt_endpoint().await;

    let mut supervisor = spawn_supervisor(
        &dir.path().join("does-not-exist"),
        &dir.path().join("config.json"),
        health,
        mgmt,
    );
    let status = wait_exit(&mut supervisor, Duration::from_secs(10)).await;

    assert_eq!(status.code(), Some(2));
    assert!(tokio::net::TcpStream::connect(health).await.is_err());
}

#[tokio::test]
async fn test_failed_child_propagates_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let bin = common::fake_binary(dir.path(), "sleep 0.2\nexit 3");
    let health = common::free_addr();
    let mgmt = common::start_mgmt_endpoint().await;

    let mut supervisor = spawn_supervisor(&bin, &dir.path().join("config.json"), health, mgmt);
    let status = wait_exit(&mut supervisor, Duration::from_secs(10)).await;

    assert_eq!(status.code(), Some(1));
}

#[tokio::test]
async fn test_clean_child_exit_is_success() {
    let dir = tempfile::tempdir().unwrap();
    let bin = common::fake_binary(dir.path(), "exit 0");
    let health = common::free_addr();
    let mgmt = common::start_mgmt_endpoint().await;

    let mut supervisor = spawn_supervisor(&bin, &dir.path().join("config.json"), health, mgmt);
    let status = wait_exit(&mut supervisor, Duration::from_secs(10)).await;

    assert_eq!(status.code(), Some(0));
}

#[tokio::test]
async fn test_client_identity_is_templated_before_launch() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.json");
    let template = r#"{"id":"${XRAY_CLIENT_UUID}","email":"${XRAY_CLIENT_EMAIL}"}"#;
    std::fs::write(&config, template).unwrap();
    let bin = common::fake_binary(dir.path(), "cat \"$2\" > \"$2.seen\"\nexit 0");
    let health = common::free_addr();
    let mgmt = common::start_mgmt_endpoint().await;

    let mut supervisor = Command::new(env!("CARGO_BIN_EXE_proxy-supervisor"))
        .env("XRAY_BIN", &bin)
        .env("XRAY_CONFIG", &config)
        .env("HEALTH_ADDR", health.to_string())
        .env("XRAY_MGMT_SOCKET", mgmt.to_string())
        .env("XRAY_CLIENT_UUID", "0b5e6f1c-3c1d-4a39-9f1e-2d8c0e4d7a11")
        .env("XRAY_CLIENT_EMAIL", "ops@example.com")
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    let status = wait_exit(&mut supervisor, Duration::from_secs(10)).await;
    assert_eq!(status.code(), Some(0));

    let seen = std::fs::read_to_string(dir.path().join("config.json.seen")).unwrap();
    assert!(seen.contains("0b5e6f1c-3c1d-4a39-9f1e-2d8c0e4d7a11"));
    assert!(seen.contains("ops@example.com"));
    assert!(!seen.contains("${XRAY_CLIENT_UUID}"));
}
