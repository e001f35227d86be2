//! Info command implementation.

use colored::Colorize;
use serde::Serialize;
use std::path::Path;

use crate::archive::open_archive;
use crate::error::Result;
use crate::import::{FormatRegistry, ManifestInfo};

#[derive(Serialize)]
struct InfoOutput<'a> {
    archive: String,
    format: &'a str,
    #[serde(flatten)]
    info: &'a ManifestInfo,
}

/// Print the manifest header of an archive and the format that reads it.
///
/// Needs no repository.
///
/// # Errors
///
/// Returns an error if the archive cannot be read or no format accepts it.
pub fn execute(archive: &Path, json: bool) -> Result<()> {
    let mut reader = open_archive(archive)?;
    let registry = FormatRegistry::default();
    let (format, info) = registry.detect(reader.as_mut())?;

    if json {
        let output = InfoOutput {
            archive: archive.display().to_string(),
            format: format.name(),
            info: &info,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("{}", archive.display().to_string().bold());
    let declared = if info.version_declared { "" } else { " (assumed)" };
    println!("  format:   {} (version {}{declared})", format.name().green(), info.version);
    let fields = [
        ("creator", &info.creator),
        ("product", &info.product_version),
        ("created", &info.create_date),
        ("project", &info.info_project),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("  {label:<9} {value}");
        }
    }
    Ok(())
}
