use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

fn lcloc_bin() -> &'static str {
    env!("CARGO_BIN_EXE_lcloc")
}

fn write_file(path: &Path, contents: &str) {
    fs::write(path, contents).expect("failed to write test file");
}

#[test]
fn cli_help_exits_cleanly_before_scanning() {
    for flag in ["--help", "-h"] {
        let output = Command::new(lcloc_bin())
            .arg(flag)
            .arg("does-not-exist")
            .output()
            .expect("failed to execute lcloc");

        assert!(
            output.status.success(),
            "{flag}: expected success, got status {:?}",
            output.status.code()
        );
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("--color"), "{flag} missing --color: {stdout}");
        assert!(stdout.contains("--all"), "{flag} missing --all: {stdout}");
        assert!(
            !stdout.contains("total across"),
            "{flag} must not scan: {stdout}"
        );
        assert!(output.stderr.is_empty(), "{flag} must not warn");
    }
}

#[test]
fn cli_prints_total_for_basic_run() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    write_file(
        &temp_dir.path().join("main.c"),
        "#include <stdio.h>\n\n// entry\nint main(void) { return 0; }\n",
    );

    let output = Command::new(lcloc_bin())
        .arg(temp_dir.path())
        .output()
        .expect("failed to execute lcloc");

    assert!(
        output.status.success(),
        "expected success, got status {:?}, stderr: {}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout,
        "total across 1 file(s):\ncode    2\nblank   2\ncomment 1\n"
    );
}

#[test]
fn cli_all_prints_each_file_before_total() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let sub_dir = temp_dir.path().join("lib");
    fs::create_dir(&sub_dir).expect("failed to create sub directory");
    write_file(&sub_dir.join("list.h"), "/* list */\nstruct list;");
    write_file(&temp_dir.path().join("app.cpp"), "int app;");

    let output = Command::new(lcloc_bin())
        .arg("--all")
        .arg(temp_dir.path())
        .output()
        .expect("failed to execute lcloc");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let app = stdout.find("app.cpp:").expect("app.cpp report missing");
    let list = stdout.find("list.h:").expect("list.h report missing");
    let total = stdout
        .find("total across 2 file(s):")
        .expect("total missing");
    assert!(app < list && list < total, "unexpected order: {stdout}");
}

#[test]
fn cli_color_emits_ansi_sequences() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    write_file(&temp_dir.path().join("a.c"), "int a;\n");

    let colored = Command::new(lcloc_bin())
        .arg("-c")
        .arg(temp_dir.path())
        .output()
        .expect("failed to execute lcloc");
    assert!(colored.status.success());
    let stdout = String::from_utf8_lossy(&colored.stdout);
    assert!(stdout.contains("\u{1b}["), "expected ANSI codes: {stdout:?}");

    let plain = Command::new(lcloc_bin())
        .arg(temp_dir.path())
        .output()
        .expect("failed to execute lcloc");
    let stdout = String::from_utf8_lossy(&plain.stdout);
    assert!(!stdout.contains('\u{1b}'), "unexpected ANSI codes: {stdout:?}");
}

#[test]
fn cli_missing_path_warns_and_still_succeeds() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    write_file(&temp_dir.path().join("ok.c"), "int ok;");
    let missing = temp_dir.path().join("missing");

    let output = Command::new(lcloc_bin())
        .arg(&missing)
        .arg(temp_dir.path())
        .output()
        .expect("failed to execute lcloc");

    assert!(
        output.status.success(),
        "per-path failures must not change the exit code: {:?}",
        output.status.code()
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("failed to stat") && stderr.contains("missing"),
        "stderr did not mention missing path: {stderr}"
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("total across 1 file(s):"),
        "stdout: {stdout}"
    );
}

#[test]
fn cli_without_paths_reports_zero() {
    let output = Command::new(lcloc_bin())
        .output()
        .expect("failed to execute lcloc");

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "total across 0 file(s):\ncode    0\nblank   0\ncomment 0\n"
    );
}
