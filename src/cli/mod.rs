//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// cmsport - Versioned archive import/export for content repositories
#[derive(Parser, Debug)]
#[command(name = "cmsport", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.cmsport/data/repository.db)
    #[arg(long, global = true, env = "CMSPORT_DB")]
    pub db: Option<PathBuf>,

    /// Transfer settings file (default: ~/.cmsport/config.json)
    #[arg(long, global = true, env = "CMSPORT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Repository user to act as
    #[arg(long, global = true, env = "CMSPORT_ACTOR")]
    pub actor: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the repository database
    Init {
        /// Overwrite an existing database
        #[arg(long)]
        force: bool,
    },

    /// Print version information
    Version,

    /// Import an archive into the repository
    Import(ImportArgs),

    /// Export part of the repository into an archive
    Export(ExportArgs),

    /// Show an archive's manifest header and detected format
    Info {
        /// Zip file or directory
        archive: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Zip file or directory holding manifest.xml
    pub archive: PathBuf,

    /// Repository folder the archive is placed under
    #[arg(long, default_value = "/")]
    pub dest: String,

    /// Leave access entries of already existing resources alone
    #[arg(long)]
    pub keep_permissions: bool,

    /// Skip the link rewrite pass
    #[arg(long)]
    pub no_rewrite: bool,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Target zip file or directory (default: export-<timestamp>.zip)
    pub archive: Option<PathBuf>,

    /// Repository paths to export (repeatable)
    #[arg(long = "path", short = 'p', default_value = "/")]
    pub paths: Vec<String>,

    /// Write a directory instead of a zip file
    #[arg(long)]
    pub dir: bool,

    /// Include org units, groups and users
    #[arg(long)]
    pub accounts: bool,

    /// Include projects
    #[arg(long)]
    pub projects: bool,

    /// Leave out ids, user names and default dates
    #[arg(long)]
    pub reduced: bool,

    /// Only files modified since this time (RFC 3339)
    #[arg(long)]
    pub since: Option<String>,

    /// Do not descend into subfolders
    #[arg(long)]
    pub no_recursive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_export_paths_repeat() {
        let cli = Cli::parse_from([
            "cmsport", "export", "out.zip", "--path", "/a", "-p", "/b", "--reduced",
        ]);
        let Commands::Export(args) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(args.paths, vec!["/a", "/b"]);
        assert!(args.reduced);
        assert!(!args.dir);
        assert_eq!(args.archive, Some(PathBuf::from("out.zip")));
    }

    #[test]
    fn test_import_defaults() {
        let cli = Cli::parse_from(["cmsport", "import", "in.zip"]);
        let Commands::Import(args) = cli.command else {
            panic!("expected import");
        };
        assert_eq!(args.dest, "/");
        assert!(!args.keep_permissions);
        assert!(!args.no_rewrite);
    }
}
