//! State of one import operation.
//!
//! An [`ImportSession`] is created per import and owns what the operation
//! carries from one entity to the next: the sequence-index table, the
//! content dedup set and the deferred graphs. The entity being read belongs
//! to the walk, see [`Reading`](super::formats::Reading). Nothing in here
//! outlives the operation.

use std::collections::{BTreeMap, HashSet};

use tracing::{info, warn};

use super::ImportParameters;
use super::deferred::{GroupGraph, OrgUnitGraph, RelationGraph};
use super::rewrite::{ImportedResource, LinkRewriter};
use crate::archive::ArchiveReader;
use crate::config::TransferConfig;
use crate::error::Result;
use crate::report::{ImportStats, ReportSink};
use crate::repository::Repository;

/// One in-flight import.
pub struct ImportSession<'a> {
    pub(crate) repo: &'a mut dyn Repository,
    pub(crate) archive: &'a mut dyn ArchiveReader,
    pub(crate) report: &'a mut dyn ReportSink,
    pub(crate) config: &'a TransferConfig,
    pub(crate) params: &'a ImportParameters,
    /// Start of the operation, in Unix milliseconds.
    pub(crate) import_time: i64,
    pub(crate) stats: ImportStats,

    /// Sequence index of the next file entry.
    pub(crate) sequence: usize,
    /// Structure id each successfully stored entry ended up with.
    pub(crate) materialized: BTreeMap<usize, String>,
    /// Resource ids whose content was already taken from the archive.
    pub(crate) imported_contents: HashSet<String>,
    /// Candidates for link rewriting.
    pub(crate) imported: Vec<ImportedResource>,

    pub(crate) relations: RelationGraph,
    pub(crate) groups: GroupGraph,
    pub(crate) org_units: OrgUnitGraph,
}

impl<'a> ImportSession<'a> {
    pub fn new(
        repo: &'a mut dyn Repository,
        archive: &'a mut dyn ArchiveReader,
        report: &'a mut dyn ReportSink,
        config: &'a TransferConfig,
        params: &'a ImportParameters,
    ) -> Self {
        Self {
            repo,
            archive,
            report,
            config,
            params,
            import_time: chrono::Utc::now().timestamp_millis(),
            stats: ImportStats::default(),
            sequence: 0,
            materialized: BTreeMap::new(),
            imported_contents: HashSet::new(),
            imported: Vec::new(),
            relations: RelationGraph::default(),
            groups: GroupGraph::default(),
            org_units: OrgUnitGraph::default(),
        }
    }

    /// Report an entity that could not be transferred.
    pub(crate) fn entity_failed(&mut self, kind: &str, name: &str, reason: &str) {
        warn!(kind, name, reason, "Entity not imported");
        self.report
            .error(&format!("{kind} {name} not imported: {reason}"));
    }

    /// Give up on an import the walk could not complete.
    ///
    /// Deferred associations are dropped unresolved; they are counted in the
    /// log and the report so the partial state is visible.
    pub fn abandon(mut self, reason: &str) {
        let pending = self.relations.len() + self.groups.len() + self.org_units.len();
        warn!(pending, reason, "Import stopped, deferred work abandoned");
        self.report.warning(&format!(
            "import stopped before deferred resolution, {pending} pending associations dropped: {reason}"
        ));
    }

    /// Run the deferred phases and return the statistics.
    ///
    /// Phases, in order: relations, group parents and memberships, org unit
    /// resources, then link rewriting unless disabled.
    ///
    /// # Errors
    ///
    /// Returns an error only if the repository cannot be queried at all;
    /// individual misses are reported.
    pub fn finish(mut self) -> Result<ImportStats> {
        info!(
            resources = self.stats.resources.total(),
            relations = self.relations.len(),
            "Resolving relations"
        );
        let relations = std::mem::take(&mut self.relations);
        self.stats.relations = relations.resolve(
            &self.materialized,
            &mut *self.repo,
            &self.params.base_path,
            &mut *self.report,
        )?;
        self.stats.unresolved += self.stats.relations.failed;

        info!("Resolving group hierarchy");
        let groups = std::mem::take(&mut self.groups);
        self.stats.unresolved += groups.resolve(&mut *self.report);

        info!(org_units = self.org_units.len(), "Resolving org unit resources");
        let org_units = std::mem::take(&mut self.org_units);
        self.stats.unresolved += org_units.resolve(&mut *self.repo, &mut *self.report)?;

        if self.params.rewrite_links {
            let imported = std::mem::take(&mut self.imported);
            info!(candidates = imported.len(), "Rewriting links");
            let mut rewriter = LinkRewriter::new(
                &mut *self.repo,
                &self.config.link_types,
                self.config.convergence,
            );
            self.stats.rewritten = rewriter.rewrite(imported, &mut *self.report)?;
        }

        Ok(self.stats)
    }
}
