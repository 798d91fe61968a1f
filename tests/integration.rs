//! Black-box integration tests driving the `dh` binary as a subprocess,
//! grounded in the same spawn-and-capture-stdout style the pack's own
//! CLI tools test with.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn dh_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("dh");
    path
}

fn setup_test_env() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let files_dir = root.join("docs");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("index.html"),
        "<html><head><title>Ownership</title></head><body>\
         <p>Ownership and borrowing are the core of the Rust memory model.</p>\
         </body></html>",
    )
    .unwrap();

    let config_path = root.join("dh.toml");
    fs::write(
        &config_path,
        format!(
            "[store]\npath = \"{}\"\n",
            root.join("data/dh.sqlite").display()
        ),
    )
    .unwrap();

    (tmp, config_path, files_dir)
}

fn run_dh(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = dh_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run dh binary at {binary:?}: {e}"));

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[test]
fn scrape_then_search_roundtrip() {
    let (_tmp, config, files_dir) = setup_test_env();
    let url = url::Url::from_file_path(files_dir.join("index.html")).unwrap();

    let (stdout, stderr, ok) = run_dh(
        &config,
        &["scrape", url.as_str(), "rust-book", "--max-pages", "1"],
    );
    assert!(ok, "scrape failed: stdout={stdout} stderr={stderr}");
    assert!(stdout.contains("Completed"), "unexpected scrape output: {stdout}");

    let (stdout, _stderr, ok) = run_dh(&config, &["search", "rust-book", "ownership"]);
    assert!(ok);
    assert!(stdout.contains("Ownership") || stdout.contains("ownership"), "{stdout}");
}

#[test]
fn libraries_lists_indexed_versions() {
    let (_tmp, config, files_dir) = setup_test_env();
    let url = url::Url::from_file_path(files_dir.join("index.html")).unwrap();

    let (_stdout, _stderr, ok) = run_dh(&config, &["scrape", url.as_str(), "rust-book"]);
    assert!(ok);

    let (stdout, _stderr, ok) = run_dh(&config, &["libraries"]);
    assert!(ok);
    assert!(stdout.contains("rust-book"), "{stdout}");
}

#[test]
fn search_unknown_library_reports_no_match() {
    let (_tmp, config, _files_dir) = setup_test_env();
    let (_stdout, stderr, ok) = run_dh(&config, &["search", "no-such-library", "anything"]);
    assert!(!ok, "expected a failure for an unindexed library");
    assert!(!stderr.is_empty());
}

#[test]
fn remove_version_drops_it_from_listing() {
    let (_tmp, config, files_dir) = setup_test_env();
    let url = url::Url::from_file_path(files_dir.join("index.html")).unwrap();
    let (_stdout, _stderr, ok) = run_dh(&config, &["scrape", url.as_str(), "rust-book"]);
    assert!(ok);

    let (_stdout, _stderr, ok) = run_dh(&config, &["remove-version", "rust-book", ""]);
    assert!(ok);

    let (stdout, _stderr, _ok) = run_dh(&config, &["libraries"]);
    assert!(!stdout.contains("(unversioned)"), "{stdout}");
}

#[test]
fn max_pages_one_indexes_only_the_seed_url() {
    let (_tmp, config, files_dir) = setup_test_env();
    fs::write(
        files_dir.join("other.html"),
        "<html><body>a second page that is not linked from the seed</body></html>",
    )
    .unwrap();
    let url = url::Url::from_file_path(files_dir.join("index.html")).unwrap();

    let (_stdout, _stderr, ok) = run_dh(
        &config,
        &["scrape", url.as_str(), "bounded", "--max-pages", "1"],
    );
    assert!(ok);

    let (stdout, _stderr, ok) = run_dh(&config, &["libraries"]);
    assert!(ok);
    assert!(stdout.contains("1 docs"), "{stdout}");
}
