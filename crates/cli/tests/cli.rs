// ABOUTME: Integration tests for the jobscout CLI binary.
// ABOUTME: Tests offline HTML mode, HTTP scraping against a mock portal, output options and argument errors.

use assert_cmd::assert::OutputAssertExt;
use assert_cmd::cargo::CommandCargoExt;
use httpmock::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

const LISTING: &str = r#"<!DOCTYPE html>
<html><body><main>
  <div class="job-card"><h3><a href="/jobs/1">Rust Developer</a></h3><span class="company">Ferris Inc</span></div>
  <div class="job-card"><h3><a href="/jobs/2">Site Reliability Engineer</a></h3><span class="company">Ferris Inc</span></div>
</main></body></html>"#;

fn jobscout_cmd() -> Command {
    let mut cmd = Command::cargo_bin("jobscout").unwrap();
    cmd.env("RUST_LOG", "warn");
    cmd
}

fn parse_records(stdout: &[u8]) -> Vec<serde_json::Value> {
    serde_json::from_slice(stdout).unwrap()
}

#[test]
fn scrape_html_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let html_path = temp_dir.path().join("listing.html");
    fs::write(&html_path, LISTING).unwrap();

    let output = jobscout_cmd()
        .arg("scrape")
        .arg("--html")
        .arg(&html_path)
        .arg("--url")
        .arg("https://careers.example.com/search")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let records = parse_records(&output);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["title"], "Rust Developer");
    assert_eq!(records[0]["company"], "Ferris Inc");
    assert_eq!(records[0]["url"], "https://careers.example.com/jobs/1");
    assert_eq!(records[1]["title"], "Site Reliability Engineer");
}

#[test]
fn compact_output_to_file() {
    let temp_dir = TempDir::new().unwrap();
    let html_path = temp_dir.path().join("listing.html");
    let out_path = temp_dir.path().join("jobs.json");
    fs::write(&html_path, LISTING).unwrap();

    jobscout_cmd()
        .args(["scrape", "--compact", "--output"])
        .arg(&out_path)
        .arg("--html")
        .arg(&html_path)
        .args(["--url", "https://careers.example.com/search"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let written = fs::read_to_string(&out_path).unwrap();
    assert_eq!(written.lines().count(), 1);
    assert!(written.contains("\"employmentType\":\"\""));
}

#[test]
fn scrape_url_over_http() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/search").query_param("q", "rust");
        then.status(200)
            .header("content-type", "text/html; charset=utf-8")
            .body(LISTING);
    });

    let output = jobscout_cmd()
        .arg("scrape")
        .arg(server.url("/search?q=rust"))
        .args(["--portal", "generic", "--no-details"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    mock.assert();
    let records = parse_records(&output);
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["url"], server.url("/jobs/2"));
}

#[test]
fn search_uses_portal_config_file() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/find")
            .query_param("term", "rust developer")
            .query_param("where", "Berlin");
        then.status(200).body(LISTING);
    });

    let temp_dir = TempDir::new().unwrap();
    let portals_path = temp_dir.path().join("portals.json");
    fs::write(
        &portals_path,
        format!(
            r#"{{"acme": {{"base_url": "{}", "keyword_param": "term", "location_param": "where"}}}}"#,
            server.url("/find")
        ),
    )
    .unwrap();

    let output = jobscout_cmd()
        .args(["search", "--portal", "acme", "--keywords", "rust developer"])
        .args(["--location", "Berlin", "--no-details", "--portals"])
        .arg(&portals_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    mock.assert();
    assert_eq!(parse_records(&output).len(), 2);
}

#[test]
fn search_for_unconfigured_portal_fails() {
    jobscout_cmd()
        .args(["search", "--portal", "generic", "--keywords", "rust"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no search URL configured"));
}

#[test]
fn html_without_context_url_fails() {
    let temp_dir = TempDir::new().unwrap();
    let html_path = temp_dir.path().join("listing.html");
    fs::write(&html_path, LISTING).unwrap();

    jobscout_cmd()
        .arg("scrape")
        .arg("--html")
        .arg(&html_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--url is required"));
}

#[test]
fn invalid_url_is_reported() {
    jobscout_cmd()
        .args(["scrape", "ftp://example.com/jobs", "--no-details"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration"));
}
