#![allow(deprecated)]
//! Drive the `cmsport` binary end to end.
//!
//! Stdout is not a terminal under the test harness, so every command
//! answers in JSON.

use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const SITE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<export>
  <info><creator>Admin</creator><export_version>10</export_version></info>
  <files>
    <file>
      <source>a.html</source>
      <destination>a.html</destination>
      <type>plain</type>
      <properties><property><name>Title</name><value>A</value></property></properties>
    </file>
    <file><destination>b</destination><type>folder</type></file>
    <file>
      <source>b/c.html</source>
      <destination>b/c.html</destination>
      <type>plain</type>
      <relations><relation><path>/a.html</path><type>CATEGORY</type></relation></relations>
    </file>
  </files>
</export>"#;

fn cmsport(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("cmsport").unwrap();
    cmd.env_remove("CMSPORT_DB")
        .env_remove("CMSPORT_ACTOR")
        .env("CMSPORT_CONFIG", home.join("config.json"))
        .env_remove("RUST_LOG");
    cmd
}

fn json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("command did not print JSON")
}

fn site_archive(root: &Path) -> std::path::PathBuf {
    let dir = root.join("site");
    fs::create_dir_all(dir.join("b")).unwrap();
    fs::write(dir.join("manifest.xml"), SITE).unwrap();
    fs::write(dir.join("a.html"), "<p>a</p>").unwrap();
    fs::write(dir.join("b").join("c.html"), "<p>c</p>").unwrap();
    dir
}

#[test]
fn test_version_lists_formats() {
    let home = TempDir::new().unwrap();
    let out = cmsport(home.path()).arg("version").assert().success();
    let v = json(&out.get_output().stdout);
    assert_eq!(v["import_formats"], serde_json::json!([10, 7, 4, 2]));
    assert_eq!(v["export_format"], 10);
}

#[test]
fn test_import_requires_init() {
    let home = TempDir::new().unwrap();
    let archive = site_archive(home.path());
    let out = cmsport(home.path())
        .arg("--db")
        .arg(home.path().join("missing.db"))
        .arg("import")
        .arg(&archive)
        .assert()
        .code(2);
    let err = json(&out.get_output().stderr);
    assert_eq!(err["error"]["code"], "NOT_INITIALIZED");
}

#[test]
fn test_info_rejects_unknown_version() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join("odd");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("manifest.xml"),
        "<export><info><export_version>3</export_version></info></export>",
    )
    .unwrap();
    let out = cmsport(home.path()).arg("info").arg(&dir).assert().code(5);
    let err = json(&out.get_output().stderr);
    assert_eq!(err["error"]["code"], "UNSUPPORTED_VERSION");
}

#[test]
fn test_import_export_import() {
    let home = TempDir::new().unwrap();
    let first = home.path().join("first.db");
    let second = home.path().join("second.db");
    let archive = site_archive(home.path());
    let exported = home.path().join("out.zip");

    cmsport(home.path()).arg("--db").arg(&first).arg("init").assert().success();
    let out = cmsport(home.path())
        .arg("--db")
        .arg(&first)
        .arg("import")
        .arg(&archive)
        .assert()
        .success();
    let v = json(&out.get_output().stdout);
    assert_eq!(v["stats"]["resources"]["created"], 3);
    assert_eq!(v["stats"]["relations"]["created"], 1);

    let out = cmsport(home.path())
        .arg("--db")
        .arg(&first)
        .args(["export", "--path", "/"])
        .arg(&exported)
        .assert()
        .success();
    let v = json(&out.get_output().stdout);
    assert_eq!(v["stats"]["files"], 2);
    assert_eq!(v["stats"]["folders"], 1);

    let out = cmsport(home.path()).arg("info").arg(&exported).assert().success();
    let v = json(&out.get_output().stdout);
    assert_eq!(v["format"], "v10");
    assert_eq!(v["version"], 10);

    cmsport(home.path()).arg("--db").arg(&second).arg("init").assert().success();
    let out = cmsport(home.path())
        .arg("--db")
        .arg(&second)
        .arg("import")
        .arg(&exported)
        .assert()
        .success();
    let v = json(&out.get_output().stdout);
    assert_eq!(v["stats"]["resources"]["created"], 3);
    assert_eq!(v["stats"]["relations"]["created"], 1);
}

#[test]
fn test_completions() {
    let home = TempDir::new().unwrap();
    let out = cmsport(home.path()).args(["completions", "bash"]).assert().success();
    let script = String::from_utf8_lossy(&out.get_output().stdout).into_owned();
    assert!(script.contains("cmsport"));
}
