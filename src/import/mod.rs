//! Archive import.
//!
//! An import runs in four steps:
//!
//! 1. [`registry`] reads the manifest header and picks exactly one dialect.
//! 2. The dialect's rule table drives a streaming walk; entities are
//!    accumulated and stored as they close.
//! 3. The deferred graphs are drained: relations, group parents and
//!    memberships, org unit resources.
//! 4. [`rewrite`] re-writes link-parseable content in dependency order.
//!
//! # Submodules
//!
//! - [`formats`] - Dialect rule tables and shared element handlers
//! - [`registry`] - Header pre-pass and format selection
//! - [`rewrite`] - Post-import link rewriting

mod accumulator;
mod builder;
mod deferred;
pub mod formats;
mod principals;
pub mod registry;
pub mod rewrite;
mod session;

pub use formats::{Handler, ImportFormat};
pub use registry::{FormatRegistry, ManifestInfo, read_info};
pub use rewrite::{ImportedResource, LinkCategory, LinkRewriter};
pub use session::ImportSession;

/// Caller choices for one import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportParameters {
    /// Repository folder the archive's relative paths are placed under.
    pub base_path: String,
    /// Leave the access entries of resources that already exist alone.
    pub keep_permissions: bool,
    /// Run the link rewriting pass after the import.
    pub rewrite_links: bool,
}

impl Default for ImportParameters {
    fn default() -> Self {
        Self {
            base_path: "/".to_string(),
            keep_permissions: false,
            rewrite_links: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveReader, ArchiveWriter, DirArchiveReader, DirArchiveWriter};
    use crate::config::TransferConfig;
    use crate::manager::ArchiveManager;
    use crate::model::{PrincipalRef, PropertyValue};
    use crate::report::{ImportStats, MemoryReport, Severity};
    use crate::repository::{Repository, ResourceFilter, SqliteRepository};
    use tempfile::TempDir;

    fn run_with(
        repo: SqliteRepository,
        config: TransferConfig,
        manifest: &str,
        entries: &[(&str, &[u8])],
        params: &ImportParameters,
    ) -> (SqliteRepository, ImportStats, MemoryReport) {
        let dir = TempDir::new().unwrap();
        let mut writer = DirArchiveWriter::create(dir.path()).unwrap();
        for (name, bytes) in entries {
            writer.write_entry(name, bytes, Some(1_600_000_000_000)).unwrap();
        }
        writer.write_manifest(&mut manifest.as_bytes()).unwrap();
        writer.finish().unwrap();

        let mut archive = DirArchiveReader::open(dir.path()).unwrap();
        let manager = ArchiveManager::new(repo, config);
        let mut report = MemoryReport::new();
        let stats = manager.import(&mut archive, params, &mut report).unwrap();
        (manager.into_inner(), stats, report)
    }

    fn run(manifest: &str, entries: &[(&str, &[u8])]) -> (SqliteRepository, ImportStats, MemoryReport) {
        run_with(
            SqliteRepository::open_memory().unwrap(),
            TransferConfig::default(),
            manifest,
            entries,
            &ImportParameters::default(),
        )
    }

    fn principals(repo: &SqliteRepository, path: &str) -> Vec<PrincipalRef> {
        repo.read_aces(path)
            .unwrap()
            .iter()
            .filter_map(|ace| repo.describe_principal(&ace.principal_id).unwrap())
            .collect()
    }

    const V10_SITE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<export>
  <info><creator>Admin</creator><export_version>10</export_version></info>
  <accounts><orgunits>
    <orgunit>
      <name>/</name>
      <groups>
        <group><name>Users</name><description>all users</description><flags>0</flags></group>
      </groups>
      <users>
        <user>
          <name>jdoe</name><password>hash</password><email>jdoe@example.org</email><flags>0</flags>
          <userinfo><entry name="logins" type="long">3</entry></userinfo>
          <usergroups><usergroup>Users</usergroup></usergroups>
        </user>
      </users>
    </orgunit>
  </orgunits></accounts>
  <files>
    <file>
      <source>a.html</source>
      <destination>a.html</destination>
      <type>plain</type>
      <uuidstructure>s-a</uuidstructure>
      <uuidresource>r-a</uuidresource>
      <datelastmodified>${FILETIME}</datelastmodified>
      <datecreated>Tue, 03 Sep 2024 10:00:00 GMT</datecreated>
      <flags>0</flags>
      <properties>
        <property><name>Title</name><value>A</value></property>
        <property type="shared"><name>Keywords</name><value>k</value></property>
      </properties>
      <relations>
        <relation><id>s-c</id><path>/b/c.html</path><type>CATEGORY</type></relation>
        <relation><path>/b/c.html</path><type>XML_WEAK</type></relation>
      </relations>
      <accesscontrol>
        <accessentry>
          <uuidprincipal>GROUP.Users</uuidprincipal><flags>2</flags>
          <permissionset><allowed>3</allowed><denied>0</denied></permissionset>
        </accessentry>
        <accessentry>
          <uuidprincipal>ALL_OTHERS</uuidprincipal><flags>0</flags>
          <permissionset><allowed>1</allowed><denied>0</denied></permissionset>
        </accessentry>
      </accesscontrol>
    </file>
    <file>
      <destination>b</destination>
      <type>folder</type>
    </file>
    <file>
      <source>b/c.html</source>
      <destination>b/c.html</destination>
      <type>plain</type>
      <uuidstructure>s-c</uuidstructure>
      <uuidresource>r-c</uuidresource>
    </file>
    <file>
      <destination>b/c-copy.html</destination>
      <type>plain</type>
      <uuidresource>r-c</uuidresource>
    </file>
  </files>
</export>"#;

    #[test]
    fn test_v10_resources_properties_and_acl() {
        let (repo, stats, report) = run(V10_SITE, &[("a.html", b"<p>a</p>"), ("b/c.html", b"<p>c</p>")]);

        assert_eq!(stats.format_version, 10);
        assert_eq!(stats.resources.created, 4, "{:?}", report.lines(Severity::Error).collect::<Vec<_>>());
        assert_eq!(stats.resources.failed, 0);

        let a = repo.read_resource("/a.html", ResourceFilter::DEFAULT).unwrap().unwrap();
        assert_eq!(a.structure_id, "s-a");
        assert_eq!(a.date_created, 1_725_357_600_000);
        assert_eq!(repo.read_content("/a.html").unwrap(), b"<p>a</p>");

        let props = repo.read_properties("/a.html").unwrap();
        assert!(props.contains(&PropertyValue::individual("Title", "A")));
        assert!(props.contains(&PropertyValue::shared("Keywords", "k")));

        let acl = principals(&repo, "/a.html");
        assert!(acl.contains(&PrincipalRef::Group("Users".into())));
        assert!(acl.contains(&PrincipalRef::AllOthers));
    }

    #[test]
    fn test_relation_declared_before_target() {
        let (repo, stats, _) = run(V10_SITE, &[("a.html", b"a"), ("b/c.html", b"c")]);
        let relations = repo.read_relations("/a.html").unwrap();
        let declared: Vec<_> = relations.iter().filter(|r| !r.is_content_defined()).collect();
        assert_eq!(declared.len(), 1);
        assert_eq!(declared[0].target_path, "/b/c.html");
        assert_eq!(declared[0].relation_type, "CATEGORY");
        assert_eq!(stats.relations.created, 1);
    }

    #[test]
    fn test_siblings_share_content() {
        let (repo, _, _) = run(V10_SITE, &[("a.html", b"a"), ("b/c.html", b"<p>c</p>")]);
        let copy = repo
            .read_resource("/b/c-copy.html", ResourceFilter::DEFAULT)
            .unwrap()
            .unwrap();
        assert_eq!(copy.resource_id, "r-c");
        assert_eq!(repo.read_content("/b/c-copy.html").unwrap(), b"<p>c</p>");
    }

    #[test]
    fn test_accounts_imported() {
        let (repo, stats, _) = run(V10_SITE, &[("a.html", b"a"), ("b/c.html", b"c")]);
        assert_eq!(stats.groups.created, 1);
        assert_eq!(stats.users.created, 1);
        assert_eq!(stats.org_units.skipped, 1);
        let user = repo.read_user("jdoe").unwrap().unwrap();
        assert_eq!(user.groups, vec!["Users".to_string()]);
        assert_eq!(
            user.info.get("logins"),
            Some(&crate::model::InfoValue::Number(3))
        );
    }

    #[test]
    fn test_base_path_prefixes_destinations() {
        let params = ImportParameters {
            base_path: "/sites/demo".into(),
            ..ImportParameters::default()
        };
        let (repo, _, _) = run_with(
            SqliteRepository::open_memory().unwrap(),
            TransferConfig::default(),
            V10_SITE,
            &[("a.html", b"a"), ("b/c.html", b"c")],
            &params,
        );
        assert!(repo.exists("/sites/demo/a.html").unwrap());
        assert!(repo.exists("/sites/demo/b/c.html").unwrap());
        assert!(!repo.exists("/a.html").unwrap());
    }

    #[test]
    fn test_bad_entity_does_not_stop_the_import() {
        let manifest = r#"<export><info><export_version>10</export_version></info><files>
            <file><destination>bad.html</destination><type>plain</type>
              <datereleased>someday</datereleased></file>
            <file><destination>good.html</destination><type>plain</type></file>
            <file><type>plain</type></file>
        </files></export>"#;
        let (repo, stats, report) = run(manifest, &[]);
        assert_eq!(stats.resources.created, 1);
        assert_eq!(stats.resources.failed, 2);
        assert!(repo.exists("/good.html").unwrap());
        assert!(!repo.exists("/bad.html").unwrap());
        assert!(report.contains(Severity::Error, "bad.html"));
    }

    #[test]
    fn test_immutable_existing_resource_is_skipped() {
        let mut repo = SqliteRepository::open_memory().unwrap();
        let manifest = r#"<export><info><export_version>10</export_version></info><files>
            <file><source>a.html</source><destination>a.html</destination><type>plain</type></file>
        </files></export>"#;
        let first;
        (repo, first, _) = run_with(
            repo,
            TransferConfig::default(),
            manifest,
            &[("a.html", b"original")],
            &ImportParameters::default(),
        );
        assert_eq!(first.resources.created, 1);

        let config = TransferConfig {
            immutable_resources: vec!["/a.html".into()],
            ..TransferConfig::default()
        };
        let (repo, stats, report) = run_with(
            repo,
            config,
            manifest,
            &[("a.html", b"replacement")],
            &ImportParameters::default(),
        );
        assert_eq!(stats.resources.skipped, 1);
        assert_eq!(repo.read_content("/a.html").unwrap(), b"original");
        assert!(report.contains(Severity::Notice, "immutable"));
    }

    #[test]
    fn test_v2_legacy_principals_and_dates() {
        let manifest = r#"<export><info><creator>Admin</creator></info>
          <usergroupdata>
            <groupdata><name>Editors</name><description>d</description><flags>0</flags></groupdata>
            <userdata><name>old</name><password>x</password><flags>0</flags>
              <datecreated>1000</datecreated>
              <usergroups><usergroup>Editors</usergroup></usergroups></userdata>
          </usergroupdata>
          <files>
            <file><source>a.txt</source><destination>a.txt</destination><type>plain</type>
              <lastmodified>1234567890000</lastmodified>
              <properties><property type="shared"><name>Title</name><value>T</value></property></properties>
              <accesscontrol>
                <accessentry><uuidprincipal>Editors</uuidprincipal><flags>32</flags>
                  <permissionset><allowed>3</allowed><denied>0</denied></permissionset></accessentry>
                <accessentry><uuidprincipal>old</uuidprincipal><flags>16</flags>
                  <permissionset><allowed>1</allowed><denied>0</denied></permissionset></accessentry>
                <accessentry><uuidprincipal>nobody</uuidprincipal><flags>0</flags>
                  <permissionset><allowed>1</allowed><denied>0</denied></permissionset></accessentry>
              </accesscontrol></file>
          </files></export>"#;
        let params = ImportParameters {
            rewrite_links: false,
            ..ImportParameters::default()
        };
        let (repo, stats, report) = run_with(
            SqliteRepository::open_memory().unwrap(),
            TransferConfig::default(),
            manifest,
            &[("a.txt", b"text")],
            &params,
        );

        assert_eq!(stats.format_version, 2);
        let a = repo.read_resource("/a.txt", ResourceFilter::DEFAULT).unwrap().unwrap();
        assert_eq!(a.date_last_modified, 1_234_567_890_000);
        // legacy properties are never shared
        assert_eq!(
            repo.read_properties("/a.txt").unwrap(),
            vec![PropertyValue::individual("Title", "T")]
        );
        let acl = principals(&repo, "/a.txt");
        assert_eq!(acl.len(), 2);
        assert!(acl.contains(&PrincipalRef::Group("Editors".into())));
        assert!(acl.contains(&PrincipalRef::User("old".into())));
        assert!(report.contains(Severity::Warning, "nobody"));
        assert_eq!(repo.read_user("old").unwrap().unwrap().date_created, 1000);
    }

    #[test]
    fn test_v4_rejects_role_principals() {
        let manifest = r#"<export><info><export_version>4</export_version></info><files>
            <file><destination>a.txt</destination><type>plain</type>
              <uuidstructure>s-a</uuidstructure>
              <accesscontrol>
                <accessentry><uuidprincipal>ROLE.EDITOR</uuidprincipal><flags>0</flags>
                  <permissionset><allowed>3</allowed><denied>0</denied></permissionset></accessentry>
              </accesscontrol></file>
        </files></export>"#;
        let (repo, stats, report) = run(manifest, &[]);
        assert_eq!(stats.format_version, 4);
        assert_eq!(stats.resources.created, 1);
        assert!(repo.read_aces("/a.txt").unwrap().is_empty());
        assert!(report.contains(Severity::Warning, "ROLE.EDITOR"));
    }

    #[test]
    fn test_v7_accepts_roles_and_untyped_info() {
        let manifest = r#"<export><info><export_version>7</export_version></info>
          <accounts><orgunits><orgunit><name>/</name><users>
            <user><name>ann</name><userinfo><entry name="team">blue</entry></userinfo>
              <userroles><userrole>EDITOR</userrole></userroles></user>
          </users></orgunit></orgunits></accounts>
          <files>
            <file><destination>a.txt</destination><type>plain</type>
              <accesscontrol>
                <accessentry><uuidprincipal>ROLE.EDITOR</uuidprincipal><flags>0</flags>
                  <permissionset><allowed>3</allowed><denied>0</denied></permissionset></accessentry>
                <accessentry><uuidprincipal>OVERWRITE_ALL</uuidprincipal><flags>0</flags>
                  <permissionset><allowed>0</allowed><denied>0</denied></permissionset></accessentry>
              </accesscontrol></file>
          </files></export>"#;
        let (repo, _, report) = run(manifest, &[]);
        assert_eq!(principals(&repo, "/a.txt"), vec![PrincipalRef::Role("EDITOR".into())]);
        assert!(report.contains(Severity::Warning, "OVERWRITE_ALL"));
        let ann = repo.read_user("ann").unwrap().unwrap();
        assert_eq!(ann.roles, vec!["EDITOR".to_string()]);
        assert_eq!(
            ann.info.get("team"),
            Some(&crate::model::InfoValue::Text("blue".into()))
        );
    }

    #[test]
    fn test_membership_and_parent_declared_later() {
        let manifest = r#"<export><info><export_version>10</export_version></info>
          <accounts><orgunits>
            <orgunit><name>/</name>
              <groups>
                <group><name>authors</name><parentgroup>editors</parentgroup></group>
              </groups>
              <users>
                <user><name>jdoe</name><usergroups><usergroup>editors</usergroup></usergroups></user>
              </users>
            </orgunit>
            <orgunit><name>dept</name><resources><resource>/dept/</resource></resources>
              <groups><group><name>editors</name></group></groups>
            </orgunit>
          </orgunits></accounts>
          <files><file><destination>dept</destination><type>folder</type></file></files>
        </export>"#;
        let (repo, stats, report) = run(manifest, &[]);

        assert_eq!(stats.groups.created, 2, "{:?}", report.lines(Severity::Error).collect::<Vec<_>>());
        assert_eq!(stats.unresolved, 0);
        let authors = repo.read_group("authors").unwrap().unwrap();
        assert_eq!(authors.parent.as_deref(), Some("editors"));
        let jdoe = repo.read_user("jdoe").unwrap().unwrap();
        assert!(jdoe.groups.contains(&"editors".to_string()));

        let dept = repo.read_org_unit("dept/").unwrap().unwrap();
        assert_eq!(dept.resources, vec!["/dept".to_string()]);
        assert_eq!(repo.read_group("editors").unwrap().unwrap().org_unit, "dept/");
    }

    #[test]
    fn test_missing_parent_group_reported() {
        let manifest = r#"<export><info><export_version>10</export_version></info>
          <accounts><orgunits><orgunit><name>/</name><groups>
            <group><name>orphans</name><parentgroup>ghosts</parentgroup></group>
          </groups></orgunit></orgunits></accounts></export>"#;
        let (repo, stats, report) = run(manifest, &[]);
        assert_eq!(stats.unresolved, 1);
        assert_eq!(repo.read_group("orphans").unwrap().unwrap().parent, None);
        assert!(report.contains(Severity::Warning, "ghosts"));
    }

    #[test]
    fn test_keep_permissions_leaves_existing_acl() {
        let with_acl = r#"<export><info><export_version>10</export_version></info><files>
            <file><destination>a.txt</destination><type>plain</type>
              <accesscontrol><accessentry><uuidprincipal>ALL_OTHERS</uuidprincipal><flags>0</flags>
                <permissionset><allowed>1</allowed><denied>0</denied></permissionset></accessentry>
              </accesscontrol></file></files></export>"#;
        let without_acl = r#"<export><info><export_version>10</export_version></info><files>
            <file><destination>a.txt</destination><type>plain</type></file></files></export>"#;

        let (repo, _, _) = run(with_acl, &[]);
        let keep = ImportParameters {
            keep_permissions: true,
            ..ImportParameters::default()
        };
        let (repo, stats, _) = run_with(repo, TransferConfig::default(), without_acl, &[], &keep);
        assert_eq!(stats.resources.updated, 1);
        assert_eq!(principals(&repo, "/a.txt"), vec![PrincipalRef::AllOthers]);

        let (repo, _, _) = run_with(
            repo,
            TransferConfig::default(),
            without_acl,
            &[],
            &ImportParameters::default(),
        );
        assert!(repo.read_aces("/a.txt").unwrap().is_empty());
    }

    #[test]
    fn test_existing_folder_without_id_is_skipped() {
        let folder = r#"<export><info><export_version>10</export_version></info><files>
            <file><destination>b</destination><type>folder</type></file></files></export>"#;
        let (repo, stats, _) = run(folder, &[]);
        assert_eq!(stats.resources.created, 1);
        let before = repo.read_resource("/b", ResourceFilter::DEFAULT).unwrap().unwrap();

        let (repo, stats, _) = run_with(
            repo,
            TransferConfig::default(),
            folder,
            &[],
            &ImportParameters::default(),
        );
        assert_eq!(stats.resources.skipped, 1);
        assert_eq!(stats.resources.updated, 0);
        let after = repo.read_resource("/b", ResourceFilter::DEFAULT).unwrap().unwrap();
        assert_eq!(before.structure_id, after.structure_id);
        assert_eq!(before.resource_id, after.resource_id);
    }

    /// Directory archive that remembers which entries were read.
    struct CountingReader {
        inner: DirArchiveReader,
        reads: Vec<String>,
    }

    impl ArchiveReader for CountingReader {
        fn location(&self) -> &std::path::Path {
            self.inner.location()
        }

        fn manifest(&mut self) -> crate::error::Result<Box<dyn std::io::BufRead>> {
            self.inner.manifest()
        }

        fn read_entry(&mut self, name: &str) -> crate::error::Result<Option<Vec<u8>>> {
            self.reads.push(name.to_string());
            self.inner.read_entry(name)
        }

        fn entry_time(&mut self, name: &str) -> crate::error::Result<Option<i64>> {
            self.inner.entry_time(name)
        }
    }

    #[test]
    fn test_sibling_with_source_reads_content_once() {
        let manifest = r#"<export><info><export_version>10</export_version></info><files>
            <file><source>a.html</source><destination>a.html</destination><type>plain</type>
              <uuidresource>r1</uuidresource></file>
            <file><source>a.html</source><destination>copy.html</destination><type>plain</type>
              <uuidresource>r1</uuidresource></file>
            </files></export>"#;
        let dir = TempDir::new().unwrap();
        let mut writer = DirArchiveWriter::create(dir.path()).unwrap();
        writer.write_entry("a.html", b"shared", None).unwrap();
        writer.write_manifest(&mut manifest.as_bytes()).unwrap();
        writer.finish().unwrap();

        let mut archive = CountingReader {
            inner: DirArchiveReader::open(dir.path()).unwrap(),
            reads: Vec::new(),
        };
        let manager = ArchiveManager::new(
            SqliteRepository::open_memory().unwrap(),
            TransferConfig::default(),
        );
        let mut report = MemoryReport::new();
        let stats = manager
            .import(&mut archive, &ImportParameters::default(), &mut report)
            .unwrap();

        assert_eq!(stats.resources.created, 2);
        assert_eq!(archive.reads, vec!["a.html".to_string()]);
        let repo = manager.into_inner();
        let copy = repo
            .read_resource("/copy.html", ResourceFilter::DEFAULT)
            .unwrap()
            .unwrap();
        assert_eq!(copy.resource_id, "r1");
        assert_eq!(repo.read_content("/copy.html").unwrap(), b"shared");
    }
}
