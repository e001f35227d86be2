//! Import command implementation.

use serde::Serialize;

use super::Context;
use crate::archive::open_archive;
use crate::cli::ImportArgs;
use crate::error::Result;
use crate::import::ImportParameters;
use crate::report::{ConsoleReport, ImportStats, MemoryReport, ReportSink, Severity};

#[derive(Serialize)]
struct ImportOutput<'a> {
    archive: String,
    stats: &'a ImportStats,
    messages: &'a [(Severity, String)],
}

/// Execute the import command.
///
/// # Errors
///
/// Returns an error if the repository cannot be opened, the archive cannot
/// be read, or its manifest version is not supported.
pub fn execute(args: &ImportArgs, ctx: &Context<'_>) -> Result<()> {
    let manager = ctx.open_manager()?;
    let mut archive = open_archive(&args.archive)?;
    let params = ImportParameters {
        base_path: args.dest.clone(),
        keep_permissions: args.keep_permissions,
        rewrite_links: !args.no_rewrite,
    };

    if ctx.json {
        let mut report = MemoryReport::new();
        let stats = manager.import(archive.as_mut(), &params, &mut report)?;
        let output = ImportOutput {
            archive: args.archive.display().to_string(),
            stats: &stats,
            messages: &report.entries,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    let mut report = ConsoleReport::new(ctx.quiet);
    let stats = manager.import(archive.as_mut(), &params, &mut report)?;
    if !ctx.quiet {
        print_summary(&stats);
    }
    if stats.total_failed() > 0 {
        report.warning(&format!("{} entities failed", stats.total_failed()));
    }
    Ok(())
}

fn print_summary(stats: &ImportStats) {
    println!("Imported archive (manifest version {})", stats.format_version);
    let rows = [
        ("resources", &stats.resources),
        ("users", &stats.users),
        ("groups", &stats.groups),
        ("org units", &stats.org_units),
        ("projects", &stats.projects),
        ("relations", &stats.relations),
        ("rewritten", &stats.rewritten),
    ];
    for (label, entity) in rows {
        if entity.total() == 0 {
            continue;
        }
        println!(
            "  {label:<10} {} created, {} updated, {} skipped, {} failed",
            entity.created, entity.updated, entity.skipped, entity.failed
        );
    }
    if stats.unresolved > 0 {
        println!("  {} references left unresolved", stats.unresolved);
    }
}
