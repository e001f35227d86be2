//! Version command implementation.

use crate::error::Result;
use crate::export::EXPORT_VERSION;
use crate::import::FormatRegistry;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    /// Manifest versions accepted on import, newest first.
    import_formats: Vec<u32>,
    export_format: u32,
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };
    let import_formats = FormatRegistry::default().versions();

    if json {
        let output = VersionOutput {
            version,
            build,
            import_formats,
            export_format: EXPORT_VERSION,
        };
        let payload = serde_json::to_string(&output)?;
        println!("{payload}");
        return Ok(());
    }

    let formats: Vec<String> = import_formats.iter().map(u32::to_string).collect();
    println!("cmsport version {version} ({build})");
    println!("  reads manifest versions {}, writes {EXPORT_VERSION}", formats.join(", "));
    Ok(())
}
