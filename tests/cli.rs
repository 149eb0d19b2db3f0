use std::process::Command;

use predicates::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

fn fixture(name: &str) -> String {
    format!("{}/{}", FIXTURES, name)
}

fn postmedia() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("postmedia").expect("postmedia binary");
    cmd.env("RUST_LOG", "off");
    cmd
}

fn run_json(args: &[&str]) -> Value {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.yaml");
    let output = postmedia()
        .arg("--config")
        .arg(&config)
        .args(args)
        .output()
        .expect("run postmedia");
    assert!(
        output.status.success(),
        "stderr was: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("json output")
}

#[test]
fn prints_version() {
    let exe = env!("CARGO_BIN_EXE_postmedia");
    let output = Command::new(exe)
        .arg("--version")
        .output()
        .expect("run postmedia --version");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("stdout utf8");
    assert!(
        stdout.contains(env!("CARGO_PKG_VERSION")),
        "stdout was: {}",
        stdout.trim()
    );
}

#[test]
fn prints_help() {
    postmedia()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--compact").and(predicate::str::contains("--version")));
}

#[test]
fn rejects_unknown_flags() {
    postmedia()
        .arg("--bogus")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown flag"));
}

#[test]
fn extracts_streamable_code() {
    let value = run_json(&[fixture("streamable_post.json").as_str()]);
    assert_eq!(value["kind"], "streamable");
    assert_eq!(value["code"], "abc12");
}

#[test]
fn self_posts_print_null() {
    let value = run_json(&[fixture("self_post.json").as_str()]);
    assert!(value.is_null());
}

#[test]
fn gallery_from_thing_envelope() {
    let value = run_json(&[fixture("gallery_post.json").as_str()]);
    assert_eq!(value["kind"], "images");
    let images = value["images"].as_array().expect("images array");
    let urls: Vec<&str> = images.iter().map(|img| img["url"].as_str().unwrap()).collect();
    assert_eq!(
        urls,
        vec![
            "https://i.redd.it/aaa111.jpg",
            "https://i.redd.it/bbb222.png",
            "https://i.redd.it/ccc333.gif"
        ]
    );
    let widths: Vec<u64> = images
        .iter()
        .map(|img| img["request"]["target"]["width"].as_u64().unwrap())
        .collect();
    assert_eq!(widths, vec![350, 350, 716]);
}

#[test]
fn compact_gallery_keeps_gif_animated() {
    let value = run_json(&["--compact", fixture("gallery_post.json").as_str()]);
    let images = value["images"].as_array().expect("images array");
    for img in &images[..2] {
        assert_eq!(img["request"]["target"]["width"], 144);
        assert_eq!(img["request"]["thumbnail"], true);
    }
    assert_eq!(images[2]["request"]["thumbnail"], false);
}

#[test]
fn reads_post_from_stdin() {
    let dir = tempdir().unwrap();
    postmedia()
        .arg("--config")
        .arg(dir.path().join("config.yaml"))
        .arg("-")
        .write_stdin(r#"{"url": "https://www.redgifs.com/watch/abcDEF", "domain": "redgifs.com"}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"redgifs\"").and(predicate::str::contains("abcDEF")));
}
