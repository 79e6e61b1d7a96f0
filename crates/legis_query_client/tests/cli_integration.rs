//! Integration tests for the legis-query binary.
//! Uses assert_cmd to run the binary, a real temp config, and an in-process
//! WebSocket server. No mocks.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write as _;
use std::net::TcpListener as StdTcpListener;

/// Pick a free port by binding to :0 and extracting the assigned port.
fn free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Write a minimal YAML config to a temp file pointing at `port`.
fn write_config(dir: &tempfile::TempDir, port: u16) -> std::path::PathBuf {
    let path = dir.path().join("config.yaml");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(
        f,
        "server:\n  host: 127.0.0.1\n  port: {}\n  path: /ws\nclient:\n  timeout_secs: 10",
        port
    )
    .unwrap();
    path
}

/// Spawn a minimal WebSocket server that waits for one query, then replies
/// with the given frames.
fn spawn_test_server(port: u16, frames: Vec<String>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
                .await
                .unwrap();

            // Accept one connection (the binary under test).
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let (mut write, mut read) = ws.split();

            use futures_util::{SinkExt, StreamExt};
            use tokio_tungstenite::tungstenite::Message;

            // Wait for the query message.
            let _ = read.next().await;

            for frame in frames {
                write.send(Message::Text(frame)).await.unwrap();
            }

            // Small delay so the client can read before we drop.
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        });
    })
}

fn answering_server(port: u16) -> std::thread::JoinHandle<()> {
    spawn_test_server(
        port,
        vec![
            r#"{"state":"PROCESSING"}"#.into(),
            r#"{"state":"SUCCESS","query":"What is the notice period?","result":"Test answer.","sources":[{"text":"Notice must be given in writing.","citation":"Employment Act - https://example.org/ea"},{"text":"Other text","citation":"Section 1.2"}]}"#.into(),
        ],
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn prints_answer_and_citations() {
    let port = free_port();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, port);

    let _server = answering_server(port);
    // Give server a moment to bind.
    std::thread::sleep(std::time::Duration::from_millis(100));

    let mut cmd = Command::from(cargo_bin_cmd!("legis-query"));
    cmd.arg("--config")
        .arg(&config_path)
        .write_stdin("What is the notice period?\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Your Query"))
        .stdout(predicate::str::contains("Test answer."))
        .stdout(predicate::str::contains("Employment Act"))
        .stdout(predicate::str::contains("<https://example.org/ea>"))
        .stdout(predicate::str::contains("Section 1.2"));
}

#[test]
fn config_from_env_var_and_positional_question() {
    let port = free_port();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, port);

    let _server = answering_server(port);
    std::thread::sleep(std::time::Duration::from_millis(100));

    let mut cmd = Command::from(cargo_bin_cmd!("legis-query"));
    cmd.env("LEGIS_QUERY_CONFIG", &config_path)
        .arg("What is the notice period?");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Test answer."));
}

#[test]
fn url_flag_overrides_config_and_json_output() {
    let port = free_port();
    let _server = answering_server(port);
    std::thread::sleep(std::time::Duration::from_millis(100));

    let mut cmd = Command::from(cargo_bin_cmd!("legis-query"));
    cmd.env_remove("LEGIS_QUERY_CONFIG")
        .env("HOME", tempfile::tempdir().unwrap().path())
        .arg("--url")
        .arg(format!("ws://127.0.0.1:{}/ws", port))
        .arg("--json")
        .arg("What is the notice period?");

    let assert = cmd
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""isLoading":true"#));

    // One line per published snapshot; the last one is the answer.
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert!(lines.len() >= 3, "got {:?}", lines);
    let last: serde_json::Value = serde_json::from_str(lines[lines.len() - 1]).unwrap();
    assert_eq!(last["isLoading"], false);
    assert_eq!(last["result"], "Test answer.");
}

#[test]
fn unrecognized_state_exits_with_error() {
    let port = free_port();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, port);

    let _server = spawn_test_server(port, vec![r#"{"state":"WEIRD"}"#.into()]);
    std::thread::sleep(std::time::Duration::from_millis(100));

    let mut cmd = Command::from(cargo_bin_cmd!("legis-query"));
    cmd.arg("--config").arg(&config_path).arg("anything");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unexpected response"))
        .stderr(predicate::str::contains("WEIRD"));
}

#[test]
fn server_down_shows_error() {
    // Point the config at a port where nothing is listening.
    let port = free_port();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, port);

    let mut cmd = Command::from(cargo_bin_cmd!("legis-query"));
    cmd.arg("--config")
        .arg(&config_path)
        .write_stdin("hello\n");

    cmd.assert()
        .failure()
        .stderr(predicate::str::is_match("(?i)(connect|refused)").unwrap());
}

#[test]
fn empty_question_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, free_port());

    let mut cmd = Command::from(cargo_bin_cmd!("legis-query"));
    cmd.arg("--config").arg(&config_path).write_stdin("   \n");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("no question provided"));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = Command::from(cargo_bin_cmd!("legis-query"));
    cmd.arg("--config")
        .arg(dir.path().join("nope.yaml"))
        .arg("question");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}
