//! Progress reporting and operation statistics.
//!
//! Import and export talk to the user through a [`ReportSink`]. The CLI
//! prints to the terminal with [`ConsoleReport`]; tests and library callers
//! collect lines with [`MemoryReport`]. Everything reported is also logged
//! through `tracing` by the code that reports it.

use colored::Colorize;
use serde::Serialize;

/// How serious a reported line is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Progress information.
    Info,
    /// Something was deliberately skipped.
    Notice,
    /// Something failed but the operation goes on.
    Warning,
    /// An entity could not be transferred.
    Error,
}

/// User-visible progress sink.
pub trait ReportSink {
    fn report(&mut self, severity: Severity, message: &str);

    fn info(&mut self, message: &str) {
        self.report(Severity::Info, message);
    }

    fn notice(&mut self, message: &str) {
        self.report(Severity::Notice, message);
    }

    fn warning(&mut self, message: &str) {
        self.report(Severity::Warning, message);
    }

    fn error(&mut self, message: &str) {
        self.report(Severity::Error, message);
    }
}

/// Prints report lines to stderr.
#[derive(Debug, Default)]
pub struct ConsoleReport {
    /// Suppress info and notice lines.
    pub quiet: bool,
}

impl ConsoleReport {
    #[must_use]
    pub const fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ReportSink for ConsoleReport {
    fn report(&mut self, severity: Severity, message: &str) {
        match severity {
            Severity::Info if !self.quiet => eprintln!("{message}"),
            Severity::Notice if !self.quiet => eprintln!("{} {message}", "note:".cyan()),
            Severity::Warning => eprintln!("{} {message}", "warning:".yellow().bold()),
            Severity::Error => eprintln!("{} {message}", "error:".red().bold()),
            Severity::Info | Severity::Notice => {}
        }
    }
}

/// Collects report lines in memory.
#[derive(Debug, Default, Clone, Serialize)]
pub struct MemoryReport {
    pub entries: Vec<(Severity, String)>,
}

impl MemoryReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines of the given severity.
    pub fn lines(&self, severity: Severity) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(move |(s, _)| *s == severity)
            .map(|(_, m)| m.as_str())
    }

    /// Whether any line of the given severity contains `needle`.
    #[must_use]
    pub fn contains(&self, severity: Severity, needle: &str) -> bool {
        self.lines(severity).any(|line| line.contains(needle))
    }
}

impl ReportSink for MemoryReport {
    fn report(&mut self, severity: Severity, message: &str) {
        self.entries.push((severity, message.to_string()));
    }
}

/// Outcome counts for one kind of entity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntityStats {
    /// Entities that did not exist before.
    pub created: usize,
    /// Entities that replaced an existing one.
    pub updated: usize,
    /// Entities deliberately left alone.
    pub skipped: usize,
    /// Entities that failed to build or persist.
    pub failed: usize,
}

impl EntityStats {
    /// Total number of entities seen.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.created + self.updated + self.skipped + self.failed
    }
}

/// Statistics for an import operation.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ImportStats {
    pub format_version: u32,
    pub resources: EntityStats,
    pub users: EntityStats,
    pub groups: EntityStats,
    pub org_units: EntityStats,
    pub projects: EntityStats,
    /// Relations created after the parse.
    pub relations: EntityStats,
    /// Resources whose links were rewritten.
    pub rewritten: EntityStats,
    /// Deferred references that never resolved.
    pub unresolved: usize,
}

impl ImportStats {
    /// Total number of entities processed.
    #[must_use]
    pub const fn total_processed(&self) -> usize {
        self.resources.total()
            + self.users.total()
            + self.groups.total()
            + self.org_units.total()
            + self.projects.total()
    }

    /// Total number of failures across all entity kinds.
    #[must_use]
    pub const fn total_failed(&self) -> usize {
        self.resources.failed
            + self.users.failed
            + self.groups.failed
            + self.org_units.failed
            + self.projects.failed
            + self.relations.failed
            + self.rewritten.failed
    }
}

/// Statistics for an export operation.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ExportStats {
    pub folders: usize,
    pub files: usize,
    /// Content entries written; lower than `files` when siblings share content.
    pub contents: usize,
    pub users: usize,
    pub groups: usize,
    pub org_units: usize,
    pub projects: usize,
}

impl ExportStats {
    /// Total number of resources exported.
    #[must_use]
    pub const fn resources(&self) -> usize {
        self.folders + self.files
    }

    /// Returns true if nothing was exported.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.resources() + self.users + self.groups + self.org_units + self.projects == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_report_filters_by_severity() {
        let mut report = MemoryReport::new();
        report.notice("skipped /system/config.xml");
        report.warning("relation target /missing.html not found");
        report.info("done");

        assert!(report.contains(Severity::Notice, "/system/config.xml"));
        assert!(!report.contains(Severity::Warning, "/system/config.xml"));
        assert_eq!(report.lines(Severity::Warning).count(), 1);
    }

    #[test]
    fn test_stats_totals() {
        let mut stats = ImportStats::default();
        stats.resources.created = 3;
        stats.resources.failed = 1;
        stats.users.skipped = 2;
        stats.relations.failed = 1;
        assert_eq!(stats.total_processed(), 6);
        assert_eq!(stats.total_failed(), 2);
        assert!(ExportStats::default().is_empty());
    }
}
