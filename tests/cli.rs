//! End-to-end tests of the `html2pdf` binary: exit codes and output files.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use html2pdf_forge::layout_config::LayoutConfig;

fn html2pdf(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_html2pdf"))
        .args(args)
        .current_dir(cwd)
        .output()
        .expect("html2pdf binary runs")
}

#[test]
fn converts_a_fragment() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("note.html"),
        "<html><body><h1>Minutes</h1><p>Mail a@b.com</p><p></p></body></html>",
    )
    .unwrap();

    let out = html2pdf(
        &["--autolink", "--title", "Minutes", "note.html", "note.pdf", "-"],
        dir.path(),
    );
    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));
    let pdf = fs::read(dir.path().join("note.pdf")).unwrap();
    assert!(pdf.starts_with(b"%PDF-"));
}

#[test]
fn writes_the_layout_dump() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("in.html"), "<p>Dumped</p>").unwrap();

    let out = html2pdf(
        &["--layout-json", "layout.json", "--page-size", "Letter", "in.html", "out.pdf"],
        dir.path(),
    );
    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));
    let json = fs::read_to_string(dir.path().join("layout.json")).unwrap();
    let layout = LayoutConfig::from_json(&json).unwrap();
    assert_eq!(layout.text_lines(), vec!["Dumped".to_string()]);
    assert!((layout.page_width_pt - 612.0).abs() < 0.1);
}

#[test]
fn images_resolve_against_the_base_directory() {
    let dir = tempfile::tempdir().unwrap();
    let assets = dir.path().join("assets");
    fs::create_dir(&assets).unwrap();
    image::RgbImage::new(8, 8)
        .save(assets.join("logo.png"))
        .unwrap();
    fs::write(dir.path().join("in.html"), "<p><img src=\"logo.png\"></p>").unwrap();

    let out = html2pdf(&["in.html", "out.pdf", "assets"], dir.path());
    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(dir.path().join("out.pdf").exists());
}

#[test]
fn wrong_argument_count_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    for args in [&[][..], &["only.html"][..], &["a", "b", "c", "d"][..]] {
        let out = html2pdf(args, dir.path());
        assert_eq!(out.status.code(), Some(1), "{args:?}");
        assert!(String::from_utf8_lossy(&out.stderr).contains("Usage:"));
    }
}

#[test]
fn malformed_flags_are_usage_errors() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("in.html"), "<p>x</p>").unwrap();
    for args in [
        &["--nope", "in.html", "out.pdf"][..],
        &["--empty-paragraphs", "sometimes", "in.html", "out.pdf"][..],
        &["--margins", "1 2 3", "in.html", "out.pdf"][..],
        &["--font", "no-family.ttf", "in.html", "out.pdf"][..],
    ] {
        let out = html2pdf(args, dir.path());
        assert_eq!(out.status.code(), Some(1), "{args:?}");
    }
    assert!(!dir.path().join("out.pdf").exists());
}

#[test]
fn missing_input_exits_2_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let out = html2pdf(&["missing.html", "out.pdf"], dir.path());
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("missing.html"));
    assert!(!dir.path().join("out.pdf").exists());
}

#[test]
fn unreadable_font_exits_3_without_output() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("in.html"), "<p>x</p>").unwrap();
    let out = html2pdf(
        &["--font", "absent.ttf=Body", "in.html", "out.pdf"],
        dir.path(),
    );
    assert_eq!(out.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&out.stderr).contains("absent.ttf"));
    assert!(!dir.path().join("out.pdf").exists());
}

#[test]
fn help_exits_0() {
    let dir = tempfile::tempdir().unwrap();
    let out = html2pdf(&["--help"], dir.path());
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stderr).contains("--empty-paragraphs"));
}
