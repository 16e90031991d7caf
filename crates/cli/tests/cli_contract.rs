use assert_cmd::cargo::cargo_bin_cmd;
use pdf_engine::testing::{single_page_pdf, SampleRun};
use pdf_engine::{LopdfEngine, PageDecoder};
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn sample_pdf(dir: &Path) -> PathBuf {
    let bytes = single_page_pdf(&[
        SampleRun::new("Hello", 50.0, 700.0, 12.0),
        SampleRun::new("world", 90.0, 700.0, 12.0),
        SampleRun::new("Second line", 50.0, 600.0, 12.0),
    ])
    .expect("sample should build");
    let path = dir.join("sample.pdf");
    fs::write(&path, bytes).expect("sample should be written");
    path
}

fn stdout_json(assert: assert_cmd::assert::Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("stdout should contain valid json")
}

fn letter_lines(file: &Path) -> Value {
    stdout_json(
        cargo_bin_cmd!("retext")
            .arg("lines")
            .arg(file)
            .args(["--scale", "1", "--viewport-width", "636"])
            .env_remove("RETEXT_RENDER_SCALE")
            .env_remove("RETEXT_VIEWPORT_WIDTH")
            .assert()
            .success(),
    )
}

#[test]
fn info_emits_stable_json_contract() {
    let temp = TempDir::new().expect("temp dir should be created");

    let mut value = stdout_json(
        cargo_bin_cmd!("retext").arg("info").arg(sample_pdf(temp.path())).assert().success(),
    );
    value["path"] = Value::String("<FIXTURE>".to_owned());

    insta::assert_json_snapshot!("cli_info_sample_pdf", value);
}

#[test]
fn lines_reports_merged_lines_in_canvas_units() {
    let temp = TempDir::new().expect("temp dir should be created");

    let value = letter_lines(&sample_pdf(temp.path()));

    assert_eq!(value["mode"], "lines");
    assert_eq!(value["raster"]["width"], 612);
    assert_eq!(value["canvas"]["width"], 612.0);
    let texts: Vec<&str> = value["lines"]
        .as_array()
        .expect("lines should be an array")
        .iter()
        .map(|line| line["text"].as_str().expect("text should be a string"))
        .collect();
    assert_eq!(texts, vec!["Hello world", "Second line"]);
}

#[test]
fn lines_rejects_invalid_scale_from_config_file() {
    let temp = TempDir::new().expect("temp dir should be created");
    let config = temp.path().join("retext.toml");
    fs::write(&config, "render_scale = -1.0\n").expect("config should be written");

    cargo_bin_cmd!("retext")
        .arg("lines")
        .arg(sample_pdf(temp.path()))
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config"));
}

#[test]
fn render_writes_png_file() {
    let temp = TempDir::new().expect("temp dir should be created");
    let output_path = temp.path().join("page.png");

    cargo_bin_cmd!("retext")
        .arg("render")
        .arg(sample_pdf(temp.path()))
        .args(["--scale", "0.5"])
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    let image = image::open(&output_path).expect("render should be a readable image");
    assert_eq!((image.width(), image.height()), (306, 396));
}

#[test]
fn apply_writes_an_edited_pdf() {
    let temp = TempDir::new().expect("temp dir should be created");
    let file = sample_pdf(temp.path());
    let line_id = letter_lines(&file)["lines"][0]["id"]
        .as_str()
        .expect("line id should be a string")
        .to_owned();
    let edits = temp.path().join("edits.json");
    fs::write(
        &edits,
        serde_json::json!([
            { "command": "edit_line", "line_id": line_id, "text": "Goodbye" },
            { "command": "add_rectangle" }
        ])
        .to_string(),
    )
    .expect("edits should be written");
    let output_path = temp.path().join("out").join("edited.pdf");

    cargo_bin_cmd!("retext")
        .arg("apply")
        .arg(&file)
        .arg("--edits")
        .arg(&edits)
        .arg("--output")
        .arg(&output_path)
        .args(["--scale", "1", "--viewport-width", "636"])
        .assert()
        .success()
        .stdout(predicate::str::contains("edited.pdf"));

    let written = fs::read(&output_path).expect("edited pdf should exist");
    let page = LopdfEngine::new().decode(&written, 1.0).expect("edited pdf should decode");
    assert!(page.text_runs.iter().any(|run| run.text == "Goodbye"));
}

#[test]
fn apply_fails_for_unknown_line() {
    let temp = TempDir::new().expect("temp dir should be created");
    let edits = temp.path().join("edits.json");
    fs::write(&edits, r#"[{ "command": "edit_line", "line_id": "line-9-9", "text": "x" }]"#)
        .expect("edits should be written");

    cargo_bin_cmd!("retext")
        .arg("apply")
        .arg(sample_pdf(temp.path()))
        .arg("--edits")
        .arg(&edits)
        .arg("--output")
        .arg(temp.path().join("never.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("edit #1 could not be applied"));

    assert!(!temp.path().join("never.pdf").exists());
}

#[test]
fn state_save_then_load_round_trips() {
    let temp = TempDir::new().expect("temp dir should be created");

    cargo_bin_cmd!("retext")
        .args(["state", "save", "--session", "abc", "--title", "Invoice"])
        .args(["--content", r#"{"zoom":2}"#])
        .arg("--root")
        .arg(temp.path())
        .assert()
        .success();

    let loaded = stdout_json(
        cargo_bin_cmd!("retext")
            .args(["state", "load", "--session", "abc"])
            .arg("--root")
            .arg(temp.path())
            .assert()
            .success(),
    );

    assert_eq!(loaded["doc_id"], "editor-main");
    assert_eq!(loaded["title"], "Invoice");
    assert_eq!(loaded["content"]["zoom"], 2);
}

#[test]
fn state_rejects_blank_session() {
    let temp = TempDir::new().expect("temp dir should be created");

    cargo_bin_cmd!("retext")
        .args(["state", "load", "--session", "  "])
        .arg("--root")
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("sessionId is required"));
}

#[test]
fn info_fails_for_missing_file() {
    cargo_bin_cmd!("retext")
        .arg("info")
        .arg("/definitely/missing.pdf")
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn info_fails_for_invalid_pdf() {
    let temp = TempDir::new().expect("temp dir should be created");
    let path = temp.path().join("invalid.pdf");
    fs::write(&path, b"definitely not a pdf").expect("fixture should be written");

    cargo_bin_cmd!("retext")
        .arg("info")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open PDF"));
}

#[test]
fn info_fails_for_encrypted_marker_pdf() {
    let temp = TempDir::new().expect("temp dir should be created");
    let path = sample_pdf(temp.path());
    let mut bytes = fs::read(&path).expect("sample should be readable");
    bytes.extend_from_slice(b"\n% /Encrypt\n");
    fs::write(&path, bytes).expect("fixture should be written");

    cargo_bin_cmd!("retext")
        .arg("info")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("encrypted documents are not supported"));
}
