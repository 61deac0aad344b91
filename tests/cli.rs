use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ytchat_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ytchat"))
}

fn setup_test_env(base_url: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/ytchat.sqlite"

[server]
bind = "127.0.0.1:0"

[services]
base_url = "{}"
metadata_timeout_secs = 5
chat_timeout_secs = 5
analysis_timeout_secs = 5

[log]
level = "warn"
"#,
        root.display(),
        base_url
    );

    let config_path = config_dir.join("ytchat.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ytchat(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ytchat_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ytchat binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Runs the binary off the async runtime so a mock server can answer it.
async fn run_ytchat_async(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let config_path = config_path.to_path_buf();
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    tokio::task::spawn_blocking(move || {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_ytchat(&config_path, &args)
    })
    .await
    .unwrap()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env("http://127.0.0.1:9");

    let (stdout, stderr, success) = run_ytchat(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/ytchat.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");

    let (_, _, first) = run_ytchat(&config_path, &["init"]);
    assert!(first, "First init failed");
    let (_, _, second) = run_ytchat(&config_path, &["init"]);
    assert!(second, "Second init failed (not idempotent)");
}

#[test]
fn test_empty_listings() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    run_ytchat(&config_path, &["init"]);

    let (stdout, _, success) = run_ytchat(&config_path, &["videos", "list"]);
    assert!(success);
    assert!(stdout.contains("No videos registered"));

    let (stdout, _, success) = run_ytchat(&config_path, &["history"]);
    assert!(success);
    assert!(stdout.contains("No chat history"));
}

#[test]
fn test_invalid_url_rejected() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    run_ytchat(&config_path, &["init"]);

    let (_, stderr, success) = run_ytchat(
        &config_path,
        &["videos", "add", "https://vimeo.com/12345"],
    );
    assert!(!success);
    assert!(stderr.contains("not a recognised video URL"), "stderr={}", stderr);
}

#[test]
fn test_remove_missing_video_fails() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    run_ytchat(&config_path, &["init"]);

    let (_, stderr, success) = run_ytchat(&config_path, &["videos", "remove", "42"]);
    assert!(!success);
    assert!(stderr.contains("not found"), "stderr={}", stderr);
}

#[test]
fn test_invalid_config_rejected() {
    let (_tmp, config_path) = setup_test_env("ftp://example.com");

    let (_, stderr, success) = run_ytchat(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("http or https"), "stderr={}", stderr);
}

#[test]
fn test_missing_config_reports_path() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let (_, stderr, success) = run_ytchat(&missing, &["init"]);
    assert!(!success);
    assert!(stderr.contains("nope.toml"), "stderr={}", stderr);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_add_waits_for_analysis_then_ask() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/video/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "title": "Rust in 100 Seconds",
            "description": "D",
            "thumbnail": "",
            "duration": 120
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/video/abc123/analyze"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "segments": [
                {"start_time": 0, "end_time": 30, "content": "intro", "summary": "Introduction"},
                {"start_time": 30, "end_time": 120, "content": "body", "summary": "Ownership"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "answer": "It opens with an intro.",
            "youtube_id": "abc123",
            "start_time": 0,
            "end_time": 30
        })))
        .mount(&server)
        .await;

    let (_tmp, config_path) = setup_test_env(&server.uri());

    let (stdout, stderr, success) = run_ytchat_async(
        &config_path,
        &["videos", "add", "https://www.youtube.com/watch?v=abc123"],
    )
    .await;
    assert!(success, "add failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Analysis complete: 2 segments"), "stdout={}", stdout);

    let (stdout, _, success) = run_ytchat_async(&config_path, &["videos", "list"]).await;
    assert!(success);
    assert!(stdout.contains("Rust in 100 Seconds"));
    assert!(stdout.contains("Ownership"));

    let (stdout, _, success) =
        run_ytchat_async(&config_path, &["ask", "what happens at the start"]).await;
    assert!(success);
    assert!(stdout.contains("It opens with an intro."));
    assert!(stdout.contains("watch?v=abc123&t=0s"), "stdout={}", stdout);

    let (stdout, _, success) = run_ytchat_async(&config_path, &["history", "--limit", "5"]).await;
    assert!(success);
    assert!(stdout.contains("Q: what happens at the start"));
    assert!(stdout.contains("cites video 1"));

    let (stdout, _, success) =
        run_ytchat_async(&config_path, &["videos", "add", "youtu.be/abc123"]).await;
    assert!(!success, "duplicate add should fail: {}", stdout);
}
