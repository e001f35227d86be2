//! End-to-end import scenarios through the public API.

use cmsport::archive::{ArchiveWriter, ZipArchiveWriter, open_archive};
use cmsport::config::{ConvergenceConfig, TransferConfig};
use cmsport::error::Error;
use cmsport::model::PrincipalRef;
use cmsport::report::{ImportStats, MemoryReport, Severity};
use cmsport::repository::events::EventType;
use cmsport::repository::{Repository, ResourceFilter, SqliteRepository};
use cmsport::{ArchiveManager, ImportParameters};
use std::time::Duration;
use tempfile::TempDir;

fn zip_archive(dir: &TempDir, manifest: &str, entries: &[(&str, &[u8])]) -> std::path::PathBuf {
    let path = dir.path().join("archive.zip");
    let mut writer = ZipArchiveWriter::create(&path).unwrap();
    for (name, bytes) in entries {
        writer.write_entry(name, bytes, None).unwrap();
    }
    writer.write_manifest(&mut manifest.as_bytes()).unwrap();
    writer.finish().unwrap();
    path
}

fn import(
    manager: &ArchiveManager<SqliteRepository>,
    path: &std::path::Path,
) -> Result<(ImportStats, MemoryReport), Error> {
    let mut archive = open_archive(path)?;
    let mut report = MemoryReport::new();
    let stats = manager.import(archive.as_mut(), &ImportParameters::default(), &mut report)?;
    Ok((stats, report))
}

fn fresh() -> ArchiveManager<SqliteRepository> {
    ArchiveManager::new(SqliteRepository::open_memory().unwrap(), TransferConfig::default())
}

// ── Relations by path ──────────────────────────────────────────

const RELATION_BY_PATH: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<export>
  <info><export_version>10</export_version></info>
  <files>
    <file>
      <source>a.html</source>
      <destination>a.html</destination>
      <type>plain</type>
      <relations>
        <relation><path>/b/c.html</path><type>CATEGORY</type></relation>
      </relations>
    </file>
    <file>
      <source>b/c.html</source>
      <destination>b/c.html</destination>
      <type>plain</type>
    </file>
  </files>
</export>"#;

#[test]
fn test_relation_to_later_file_is_created() {
    let dir = TempDir::new().unwrap();
    let path = zip_archive(&dir, RELATION_BY_PATH, &[("a.html", b"a"), ("b/c.html", b"c")]);
    let manager = fresh();
    let (stats, report) = import(&manager, &path).unwrap();

    assert_eq!(stats.relations.created, 1, "{:?}", report.entries);
    assert_eq!(stats.unresolved, 0);
    let repo = manager.into_inner();
    let relations = repo.read_relations("/a.html").unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].target_path, "/b/c.html");
    // The parent folder was created on the way.
    assert!(repo.read_resource("/b", ResourceFilter::DEFAULT).unwrap().unwrap().is_folder);
}

#[test]
fn test_relation_to_missing_target_is_reported() {
    let manifest = RELATION_BY_PATH.replace("/b/c.html</path>", "/nowhere.html</path>");
    let dir = TempDir::new().unwrap();
    let path = zip_archive(&dir, &manifest, &[("a.html", b"a"), ("b/c.html", b"c")]);
    let manager = fresh();
    let (stats, report) = import(&manager, &path).unwrap();

    assert_eq!(stats.relations.created, 0);
    assert_eq!(stats.unresolved, 1);
    assert!(report.contains(Severity::Warning, "/nowhere.html"));
    assert_eq!(stats.resources.failed, 0);
}

// ── Accounts declared out of order ─────────────────────────────

const V7_LATE_GROUP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<export>
  <info><export_version>7</export_version></info>
  <accounts><orgunits>
    <orgunit>
      <name>/</name>
      <users>
        <user>
          <name>jdoe</name><password>x</password><flags>0</flags>
          <datecreated>Tue, 03 Sep 2024 10:00:00 GMT</datecreated>
          <userinfo><entry name="department">sales</entry></userinfo>
          <usergroups><usergroup>editors</usergroup></usergroups>
        </user>
      </users>
      <groups>
        <group><name>editors</name><flags>0</flags><parentgroup>staff</parentgroup></group>
        <group><name>staff</name><flags>0</flags></group>
      </groups>
    </orgunit>
  </orgunits></accounts>
</export>"#;

#[test]
fn test_user_joins_group_declared_later() {
    let dir = TempDir::new().unwrap();
    let path = zip_archive(&dir, V7_LATE_GROUP, &[]);
    let manager = fresh();
    let (stats, report) = import(&manager, &path).unwrap();

    assert_eq!(stats.format_version, 7);
    assert_eq!(stats.users.created, 1, "{:?}", report.entries);
    assert_eq!(stats.groups.created, 2);
    assert_eq!(stats.unresolved, 0);

    let repo = manager.into_inner();
    let jdoe = repo.read_user("jdoe").unwrap().unwrap();
    assert_eq!(jdoe.groups, vec!["editors".to_string()]);
    assert_eq!(
        jdoe.info.get("department"),
        Some(&cmsport::model::InfoValue::Text("sales".into()))
    );
    let editors = repo.read_group("editors").unwrap().unwrap();
    assert_eq!(editors.parent.as_deref(), Some("staff"));
}

// ── Version exclusivity ────────────────────────────────────────

fn role_acl_manifest(version: u32) -> String {
    format!(
        r#"<export>
  <info><export_version>{version}</export_version></info>
  <files>
    <file>
      <source>a.html</source>
      <destination>a.html</destination>
      <type>plain</type>
      <accesscontrol>
        <accessentry>
          <uuidprincipal>ROLE.WORKPLACE_USER</uuidprincipal><flags>512</flags>
          <permissionset><allowed>1</allowed><denied>0</denied></permissionset>
        </accessentry>
        <accessentry>
          <uuidprincipal>ALL_OTHERS</uuidprincipal><flags>128</flags>
          <permissionset><allowed>1</allowed><denied>0</denied></permissionset>
        </accessentry>
      </accesscontrol>
    </file>
  </files>
</export>"#
    )
}

#[test]
fn test_each_dialect_reads_only_its_own_rules() {
    // Role principals arrived with version 7, the fixed principals with 10.
    let dir = TempDir::new().unwrap();
    let imported = |version: u32| {
        let path = zip_archive(&dir, &role_acl_manifest(version), &[("a.html", b"a")]);
        let manager = fresh();
        let (stats, report) = import(&manager, &path).unwrap();
        assert_eq!(stats.format_version, version);
        assert_eq!(stats.resources.created, 1);
        let repo = manager.into_inner();
        let principals: Vec<_> = repo
            .read_aces("/a.html")
            .unwrap()
            .iter()
            .filter_map(|ace| repo.describe_principal(&ace.principal_id).unwrap())
            .collect();
        (principals, report)
    };

    let (v10, _) = imported(10);
    assert_eq!(v10.len(), 2);
    assert!(v10.contains(&PrincipalRef::AllOthers));

    let (v7, report) = imported(7);
    assert_eq!(v7, vec![PrincipalRef::Role("WORKPLACE_USER".into())]);
    assert!(report.contains(Severity::Warning, "ALL_OTHERS"));

    let (v4, report) = imported(4);
    assert!(v4.is_empty());
    assert!(report.contains(Severity::Warning, "ROLE.WORKPLACE_USER"));
}

#[test]
fn test_unknown_version_is_refused_before_any_change() {
    let dir = TempDir::new().unwrap();
    let path = zip_archive(&dir, &role_acl_manifest(8), &[("a.html", b"a")]);
    let manager = fresh();
    let err = import(&manager, &path).unwrap_err();
    assert!(matches!(err, Error::UnsupportedVersion { version: 8 }));
    let repo = manager.into_inner();
    assert!(!repo.exists("/a.html").unwrap());
    assert_eq!(repo.count_resources().unwrap(), 1);
}

#[test]
fn test_missing_archive_is_unreadable() {
    let dir = TempDir::new().unwrap();
    let err = import(&fresh(), &dir.path().join("nope.zip")).unwrap_err();
    assert!(matches!(err, Error::ArchiveUnreadable { .. }));
}

// ── Link rewrite ───────────────────────────────────────────────

const LINKED_SITE: &str = r#"<export>
  <info><export_version>10</export_version></info>
  <files>
    <file>
      <source>index.html</source>
      <destination>index.html</destination>
      <type>containerpage</type>
      <uuidstructure>s-index</uuidstructure>
    </file>
    <file>
      <source>site.config</source>
      <destination>site.config</destination>
      <type>module_config</type>
      <uuidstructure>s-config</uuidstructure>
    </file>
  </files>
</export>"#;

const INDEX_CONTENT: &[u8] =
    br#"<page><link type="strong"><target>/site.config</target></link></page>"#;

#[test]
fn test_configuration_rewritten_before_pages() {
    let repo = SqliteRepository::open_memory()
        .unwrap()
        .with_configuration_types(vec!["module_config".into()], Duration::from_millis(40));
    let config = TransferConfig {
        convergence: ConvergenceConfig {
            attempts: 50,
            interval_ms: 10,
        },
        ..TransferConfig::default()
    };
    let manager = ArchiveManager::new(repo, config);

    let dir = TempDir::new().unwrap();
    let path = zip_archive(
        &dir,
        LINKED_SITE,
        &[("index.html", INDEX_CONTENT), ("site.config", b"<config/>")],
    );
    let (stats, report) = import(&manager, &path).unwrap();
    assert_eq!(stats.rewritten.updated, 2, "{:?}", report.entries);
    assert!(!report.contains(Severity::Warning, "not yet visible"));

    let repo = manager.into_inner();
    let locked_at = |path: &str| {
        repo.events("resource", path)
            .unwrap()
            .into_iter()
            .find(|e| e.event_type == EventType::Locked)
            .map(|e| e.id)
            .unwrap()
    };
    assert!(locked_at("/site.config") < locked_at("/index.html"));

    // The page link is bound to the configuration resource now.
    let content = String::from_utf8(repo.read_content("/index.html").unwrap()).unwrap();
    assert!(content.contains("<uuid>s-config</uuid>"), "{content}");
    let relations = repo.read_relations("/index.html").unwrap();
    assert!(relations.iter().any(|r| r.target_path == "/site.config"));
}

#[test]
fn test_rewrite_can_be_skipped() {
    let dir = TempDir::new().unwrap();
    let path = zip_archive(
        &dir,
        LINKED_SITE,
        &[("index.html", INDEX_CONTENT), ("site.config", b"<config/>")],
    );
    let manager = fresh();
    let mut archive = open_archive(&path).unwrap();
    let mut report = MemoryReport::new();
    let params = ImportParameters {
        rewrite_links: false,
        ..ImportParameters::default()
    };
    let stats = manager.import(archive.as_mut(), &params, &mut report).unwrap();
    assert_eq!(stats.rewritten.total(), 0);
    let repo = manager.into_inner();
    assert_eq!(repo.read_content("/index.html").unwrap(), INDEX_CONTENT);
}

const REPEATED_PAGE: &str = r#"<export>
  <info><export_version>10</export_version></info>
  <files>
    <file>
      <source>p.html</source>
      <destination>p.html</destination>
      <type>containerpage</type>
      <datelastmodified>Tue, 03 Sep 2024 10:00:00 GMT</datelastmodified>
    </file>
    <file>
      <source>p.html</source>
      <destination>p.html</destination>
      <type>containerpage</type>
      <datelastmodified>Wed, 04 Sep 2024 10:00:00 GMT</datelastmodified>
    </file>
  </files>
</export>"#;

#[test]
fn test_rewrite_restores_date_of_last_entry() {
    let dir = TempDir::new().unwrap();
    let path = zip_archive(&dir, REPEATED_PAGE, &[("p.html", b"<page/>")]);
    let manager = fresh();
    let (stats, report) = import(&manager, &path).unwrap();
    assert_eq!(stats.resources.created, 1);
    assert_eq!(stats.resources.updated, 1);
    assert_eq!(stats.rewritten.updated, 1, "{:?}", report.entries);

    let repo = manager.into_inner();
    let page = repo.read_resource("/p.html", ResourceFilter::DEFAULT).unwrap().unwrap();
    assert_eq!(page.date_last_modified, 1_725_444_000_000);
}
