//! Integration tests for the pdflin CLI

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{tempdir, TempDir};

/// Test helper to get the CLI binary path
fn get_cli_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pdflin"))
}

fn setup_temp_dir() -> TempDir {
    tempdir().expect("Failed to create temp directory")
}

fn run_cli_command(args: &[&str]) -> Result<std::process::Output> {
    let output = Command::new(get_cli_path()).args(args).output()?;
    Ok(output)
}

/// Two-page PDF with a correct cross-reference table
fn write_sample_pdf(path: &Path) {
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>",
        "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 /MediaBox [0 0 612 792] >>",
        "<< /Type /Page /Parent 2 0 R /Contents 5 0 R >>",
        "<< /Type /Page /Parent 2 0 R /Contents 6 0 R >>",
        "<< /Length 8 >>\nstream\nBT 1 ET\n\nendstream",
        "<< /Length 8 >>\nstream\nBT 2 ET\n\nendstream",
    ];
    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }
    let xref = out.len();
    out.extend_from_slice(
        format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes(),
    );
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    fs::write(path, out).expect("Failed to write sample PDF");
}

fn assert_pdf_exists_and_valid(path: &Path) {
    assert!(path.exists(), "PDF file should exist: {}", path.display());
    let content = fs::read(path).expect("Failed to read PDF file");
    assert!(
        content.starts_with(b"%PDF-"),
        "File should start with PDF header"
    );
}

#[test]
fn test_cli_version() {
    let output = run_cli_command(&["version"]).expect("CLI should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("pdflin "));
}

#[test]
fn test_cli_rewrite() {
    let temp_dir = setup_temp_dir();
    let input = temp_dir.path().join("in.pdf");
    let output_path = temp_dir.path().join("out.pdf");
    write_sample_pdf(&input);

    let output = run_cli_command(&[
        "rewrite",
        input.to_str().unwrap(),
        output_path.to_str().unwrap(),
        "--xref-stream",
        "--static-id",
    ])
    .expect("CLI command should run");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_pdf_exists_and_valid(&output_path);
    assert!(fs::read(&output_path).unwrap().starts_with(b"%PDF-1.5"));
}

#[test]
fn test_cli_linearize_then_check() {
    let temp_dir = setup_temp_dir();
    let input = temp_dir.path().join("in.pdf");
    let output_path = temp_dir.path().join("linear.pdf");
    write_sample_pdf(&input);

    let output = run_cli_command(&[
        "linearize",
        input.to_str().unwrap(),
        output_path.to_str().unwrap(),
    ])
    .expect("CLI command should run");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_pdf_exists_and_valid(&output_path);

    let output = run_cli_command(&["check", output_path.to_str().unwrap()])
        .expect("CLI command should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No linearization errors"));
}

#[test]
fn test_cli_check_json() {
    let temp_dir = setup_temp_dir();
    let input = temp_dir.path().join("in.pdf");
    let output_path = temp_dir.path().join("linear.pdf");
    write_sample_pdf(&input);

    let output = run_cli_command(&[
        "linearize",
        input.to_str().unwrap(),
        output_path.to_str().unwrap(),
    ])
    .unwrap();
    assert!(output.status.success());

    let output = run_cli_command(&["check", output_path.to_str().unwrap(), "--json"]).unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(report["linearized"], serde_json::Value::Bool(true));
    assert_eq!(report["parameters"]["page_count"], serde_json::json!(2));
}

#[test]
fn test_cli_check_plain_file_fails() {
    let temp_dir = setup_temp_dir();
    let input = temp_dir.path().join("in.pdf");
    write_sample_pdf(&input);

    let output = run_cli_command(&["check", input.to_str().unwrap()]).unwrap();
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("not linearized"));
}

#[test]
fn test_cli_missing_input() {
    let temp_dir = setup_temp_dir();
    let output_path = temp_dir.path().join("out.pdf");

    let output = run_cli_command(&[
        "rewrite",
        "/nonexistent/file.pdf",
        output_path.to_str().unwrap(),
    ])
    .unwrap();
    assert!(!output.status.success());
    assert!(!output_path.exists());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("/nonexistent/file.pdf"));
}

#[test]
fn test_cli_encrypted_input() {
    let temp_dir = setup_temp_dir();
    let input = temp_dir.path().join("enc.pdf");
    let output_path = temp_dir.path().join("out.pdf");
    let mut data = Vec::new();
    data.extend_from_slice(b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
    data.extend_from_slice(b"trailer\n<< /Root 1 0 R /Encrypt << /V 1 >> >>\n%%EOF\n");
    fs::write(&input, data).unwrap();

    let output = run_cli_command(&[
        "linearize",
        input.to_str().unwrap(),
        output_path.to_str().unwrap(),
    ])
    .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.to_lowercase().contains("encrypted"), "{stderr}");
}
