//! Export command implementation.

use chrono::DateTime;
use serde::Serialize;

use super::Context;
use crate::archive::{create_archive, default_archive_name};
use crate::cli::ExportArgs;
use crate::error::{Error, Result};
use crate::export::ExportParameters;
use crate::report::{ConsoleReport, ExportStats, MemoryReport, Severity};

#[derive(Serialize)]
struct ExportOutput<'a> {
    archive: String,
    stats: &'a ExportStats,
    messages: &'a [(Severity, String)],
}

fn parse_since(raw: &str) -> Result<i64> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.timestamp_millis())
        .map_err(|_| Error::InvalidArgument(format!("--since '{raw}' is not an RFC 3339 time")))
}

/// Execute the export command.
///
/// # Errors
///
/// Returns an error if the repository cannot be opened, `--since` does not
/// parse, or the archive cannot be written.
pub fn execute(args: &ExportArgs, ctx: &Context<'_>) -> Result<()> {
    let modified_since = args.since.as_deref().map(parse_since).transpose()?;
    let manager = ctx.open_manager()?;
    let params = ExportParameters {
        roots: args.paths.clone(),
        include_accounts: args.accounts,
        include_projects: args.projects,
        reduced: args.reduced,
        modified_since,
        recursive: !args.no_recursive,
    };
    let target = match &args.archive {
        Some(path) => path.clone(),
        None if args.dir => default_archive_name().with_extension(""),
        None => default_archive_name(),
    };
    let mut writer = create_archive(&target, args.dir)?;

    if ctx.json {
        let mut report = MemoryReport::new();
        let stats = manager.export(writer.as_mut(), &params, &mut report)?;
        let output = ExportOutput {
            archive: target.display().to_string(),
            stats: &stats,
            messages: &report.entries,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    let mut report = ConsoleReport::new(ctx.quiet);
    let stats = manager.export(writer.as_mut(), &params, &mut report)?;
    if !ctx.quiet {
        println!(
            "Exported {} folders, {} files ({} content entries) to {}",
            stats.folders,
            stats.files,
            stats.contents,
            target.display()
        );
        if stats.org_units + stats.groups + stats.users > 0 {
            println!(
                "  {} org units, {} groups, {} users",
                stats.org_units, stats.groups, stats.users
            );
        }
        if stats.projects > 0 {
            println!("  {} projects", stats.projects);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_since() {
        assert_eq!(parse_since("1970-01-01T00:00:01Z").unwrap(), 1_000);
        assert!(matches!(
            parse_since("yesterday"),
            Err(Error::InvalidArgument(_))
        ));
    }
}
