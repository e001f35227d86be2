//! Post-import link rewriting.
//!
//! Links inside imported content may point at stale ids or at resources
//! that only arrived later in the archive. Once everything is stored, each
//! link-parseable resource is re-written with link correction on. The order
//! matters: configuration first, then pages (which read configuration),
//! then the rest, each category by ascending path.

use std::collections::BTreeMap;
use std::thread;

use tracing::{debug, info, warn};

use crate::config::{ConvergenceConfig, LinkTypes};
use crate::error::Result;
use crate::report::{EntityStats, ReportSink};
use crate::repository::{LockState, Repository, WriteOptions};

/// How link rewriting treats a resource type.
///
/// Variants are ordered by processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LinkCategory {
    Configuration,
    Page,
    Other,
    NotParseable,
}

impl LinkCategory {
    /// Classify a type name against the configured type lists.
    #[must_use]
    pub fn of(type_name: &str, types: &LinkTypes) -> Self {
        let listed = |list: &[String]| list.iter().any(|t| t == type_name);
        if listed(&types.configuration) {
            Self::Configuration
        } else if listed(&types.page) {
            Self::Page
        } else if listed(&types.other) {
            Self::Other
        } else {
            Self::NotParseable
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Page => "page",
            Self::Other => "other",
            Self::NotParseable => "not_parseable",
        }
    }
}

/// A resource stored by the import, candidate for rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedResource {
    pub path: String,
    pub type_name: String,
    /// Last-modified date to restore after the rewrite.
    pub date_last_modified: i64,
}

/// A planned rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteTarget {
    pub category: LinkCategory,
    pub resource: ImportedResource,
}

/// Order link-parseable resources for rewriting, dropping the rest.
///
/// A path imported twice is rewritten once, with what the later entry
/// stored.
#[must_use]
pub fn plan(resources: Vec<ImportedResource>, types: &LinkTypes) -> Vec<RewriteTarget> {
    let latest: BTreeMap<String, ImportedResource> = resources
        .into_iter()
        .map(|resource| (resource.path.clone(), resource))
        .collect();
    let mut targets: Vec<RewriteTarget> = latest
        .into_values()
        .map(|resource| RewriteTarget {
            category: LinkCategory::of(&resource.type_name, types),
            resource,
        })
        .filter(|t| t.category != LinkCategory::NotParseable)
        .collect();
    targets.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then_with(|| a.resource.path.cmp(&b.resource.path))
    });
    targets
}

/// Rewrites imported content with link correction.
pub struct LinkRewriter<'a> {
    repo: &'a mut dyn Repository,
    types: &'a LinkTypes,
    convergence: ConvergenceConfig,
}

impl<'a> LinkRewriter<'a> {
    pub fn new(
        repo: &'a mut dyn Repository,
        types: &'a LinkTypes,
        convergence: ConvergenceConfig,
    ) -> Self {
        Self {
            repo,
            types,
            convergence,
        }
    }

    /// Rewrite every link-parseable resource in category order.
    ///
    /// Failures are reported per resource and never stop the pass.
    ///
    /// # Errors
    ///
    /// Returns an error only if the configuration state cannot be polled.
    pub fn rewrite(
        &mut self,
        resources: Vec<ImportedResource>,
        report: &mut dyn ReportSink,
    ) -> Result<EntityStats> {
        let mut stats = EntityStats::default();
        let targets = plan(resources, self.types);
        let configuration_count = targets
            .iter()
            .filter(|t| t.category == LinkCategory::Configuration)
            .count();

        let mut waited = configuration_count == 0;
        for target in targets {
            if !waited && target.category != LinkCategory::Configuration {
                self.wait_for_configuration(report)?;
                waited = true;
            }
            self.rewrite_one(&target.resource, report, &mut stats);
        }
        if !waited {
            self.wait_for_configuration(report)?;
        }

        info!(
            rewritten = stats.updated,
            skipped = stats.skipped,
            failed = stats.failed,
            "Link rewriting done"
        );
        Ok(stats)
    }

    fn rewrite_one(
        &mut self,
        resource: &ImportedResource,
        report: &mut dyn ReportSink,
        stats: &mut EntityStats,
    ) {
        let path = resource.path.as_str();
        let acquired = match self.take_lock(path) {
            Ok(Some(acquired)) => acquired,
            Ok(None) => {
                report.warning(&format!("{path} is locked in another project, links not rewritten"));
                stats.skipped += 1;
                return;
            }
            Err(e) => {
                warn!(path, error = %e, "Could not lock for rewriting");
                report.warning(&format!("could not lock {path} for rewriting: {e}"));
                stats.failed += 1;
                return;
            }
        };

        let result = self.rewrite_content(resource);
        let released = if acquired { self.repo.unlock(path) } else { Ok(()) };

        match result.and(released) {
            Ok(()) => {
                debug!(path, "Links rewritten");
                report.info(&format!("rewrote links in {path}"));
                stats.updated += 1;
            }
            Err(e) => {
                warn!(path, error = %e, "Link rewrite failed");
                report.warning(&format!("could not rewrite links in {path}: {e}"));
                stats.failed += 1;
            }
        }
    }

    /// Make sure we hold the lock. `Some(true)` if this call took it,
    /// `Some(false)` if it was already held in our project, `None` if
    /// another project holds it.
    fn take_lock(&mut self, path: &str) -> Result<Option<bool>> {
        match self.repo.lock_state(path)? {
            LockState::Unlocked => {
                self.repo.lock(path)?;
                Ok(Some(true))
            }
            LockState::Exclusive { owner, project } if project == self.repo.current_project() => {
                if owner != self.repo.current_user() {
                    self.repo.change_lock(path)?;
                }
                Ok(Some(false))
            }
            LockState::Exclusive { .. } => Ok(None),
        }
    }

    fn rewrite_content(&mut self, resource: &ImportedResource) -> Result<()> {
        let content = self.repo.read_content(&resource.path)?;
        self.repo.write_content(
            &resource.path,
            &content,
            WriteOptions {
                auto_correct_links: true,
            },
        )?;
        self.repo
            .set_date_last_modified(&resource.path, resource.date_last_modified)
    }

    /// Poll until configuration changes are visible, a bounded number of times.
    fn wait_for_configuration(&mut self, report: &mut dyn ReportSink) -> Result<()> {
        for attempt in 0..self.convergence.attempts.max(1) {
            if self.repo.configuration_converged()? {
                debug!(attempt, "Configuration converged");
                return Ok(());
            }
            thread::sleep(self.convergence.interval());
        }
        if self.repo.configuration_converged()? {
            return Ok(());
        }
        warn!(attempts = self.convergence.attempts, "Configuration did not converge");
        report.warning("configuration changes not yet visible, rewriting pages anyway");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imported(path: &str, type_name: &str) -> ImportedResource {
        ImportedResource {
            path: path.to_string(),
            type_name: type_name.to_string(),
            date_last_modified: 0,
        }
    }

    #[test]
    fn test_classification() {
        let types = LinkTypes::default();
        assert_eq!(LinkCategory::of("module_config", &types), LinkCategory::Configuration);
        assert_eq!(LinkCategory::of("containerpage", &types), LinkCategory::Page);
        assert_eq!(LinkCategory::of("xmlcontent", &types), LinkCategory::Other);
        assert_eq!(LinkCategory::of("image", &types), LinkCategory::NotParseable);
    }

    #[test]
    fn test_plan_orders_by_category_then_path() {
        let types = LinkTypes::default();
        let planned = plan(
            vec![
                imported("/b.html", "containerpage"),
                imported("/z.config", "module_config"),
                imported("/logo.png", "image"),
                imported("/a.xml", "xmlcontent"),
                imported("/a.html", "containerpage"),
                imported("/a.config", "sitemap_config"),
                imported("/a.html", "containerpage"),
            ],
            &types,
        );
        let order: Vec<&str> = planned.iter().map(|t| t.resource.path.as_str()).collect();
        assert_eq!(
            order,
            vec!["/a.config", "/z.config", "/a.html", "/b.html", "/a.xml"]
        );
    }

    #[test]
    fn test_plan_keeps_last_entry_for_a_path() {
        let types = LinkTypes::default();
        let mut earlier = imported("/p.html", "containerpage");
        earlier.date_last_modified = 1_000;
        let mut later = imported("/p.html", "xmlcontent");
        later.date_last_modified = 2_000;

        let planned = plan(vec![earlier, later], &types);
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].category, LinkCategory::Other);
        assert_eq!(planned[0].resource.date_last_modified, 2_000);
    }
}
