//! Error types for cmsport.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=repository, 3=not_found, 4=validation, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers
//!
//! Only fatal conditions travel through [`Error`]. Per-entity failures during
//! an import are reported to the report sink and never bubble up.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cmsport operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Repository (exit 2)
    NotInitialized,
    AlreadyInitialized,
    RepositoryError,
    ImportInProgress,
    ResourceLocked,

    // Not Found (exit 3)
    ResourceNotFound,
    PrincipalNotFound,

    // Validation (exit 4)
    InvalidArgument,
    InvalidValue,

    // Archive (exit 5)
    ArchiveUnreadable,
    UnsupportedVersion,
    ManifestMalformed,

    // Export (exit 6)
    ExportFailed,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::RepositoryError => "REPOSITORY_ERROR",
            Self::ImportInProgress => "IMPORT_IN_PROGRESS",
            Self::ResourceLocked => "RESOURCE_LOCKED",
            Self::ResourceNotFound => "RESOURCE_NOT_FOUND",
            Self::PrincipalNotFound => "PRINCIPAL_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::InvalidValue => "INVALID_VALUE",
            Self::ArchiveUnreadable => "ARCHIVE_UNREADABLE",
            Self::UnsupportedVersion => "UNSUPPORTED_VERSION",
            Self::ManifestMalformed => "MANIFEST_MALFORMED",
            Self::ExportFailed => "EXPORT_FAILED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized
            | Self::AlreadyInitialized
            | Self::RepositoryError
            | Self::ImportInProgress
            | Self::ResourceLocked => 2,
            Self::ResourceNotFound | Self::PrincipalNotFound => 3,
            Self::InvalidArgument | Self::InvalidValue => 4,
            Self::ArchiveUnreadable | Self::UnsupportedVersion | Self::ManifestMalformed => 5,
            Self::ExportFailed => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether retrying the same command can succeed without changing input.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ImportInProgress | Self::RepositoryError | Self::ResourceLocked
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in cmsport operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `cmsport init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Another import is already running against this repository")]
    ImportInProgress,

    #[error("Resource {path} is locked by {owner}")]
    Locked { path: String, owner: String },

    #[error("Resource not found: {path}")]
    ResourceNotFound { path: String },

    #[error("Principal not found: {name}")]
    PrincipalNotFound { name: String },

    #[error("Archive unreadable: {path}: {reason}")]
    ArchiveUnreadable { path: PathBuf, reason: String },

    #[error("No registered import format accepts manifest version {version}")]
    UnsupportedVersion { version: u32 },

    #[error("Manifest malformed: {0}")]
    ManifestMalformed(String),

    #[error("Invalid {field} value '{value}'")]
    InvalidValue { field: &'static str, value: String },

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Repository error: {0}")]
    Repository(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Self::ManifestMalformed(err.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Other(format!("zip: {err}"))
    }
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::ImportInProgress => ErrorCode::ImportInProgress,
            Self::Locked { .. } => ErrorCode::ResourceLocked,
            Self::Repository(_) => ErrorCode::RepositoryError,
            Self::ResourceNotFound { .. } => ErrorCode::ResourceNotFound,
            Self::PrincipalNotFound { .. } => ErrorCode::PrincipalNotFound,
            Self::ArchiveUnreadable { .. } => ErrorCode::ArchiveUnreadable,
            Self::UnsupportedVersion { .. } => ErrorCode::UnsupportedVersion,
            Self::ManifestMalformed(_) => ErrorCode::ManifestMalformed,
            Self::InvalidValue { .. } => ErrorCode::InvalidValue,
            Self::Export(_) => ErrorCode::ExportFailed,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint for humans and scripts.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `cmsport init` to create the repository database".to_string())
            }
            Self::AlreadyInitialized { path } => Some(format!(
                "Repository already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),
            Self::ImportInProgress => {
                Some("Wait for the running import to finish, then retry.".to_string())
            }
            Self::ArchiveUnreadable { .. } => Some(
                "Archives are zip files or directories containing manifest.xml at the root."
                    .to_string(),
            ),
            Self::UnsupportedVersion { .. } => Some(format!(
                "Supported manifest versions: {}. Use `cmsport info <archive>` to inspect the header.",
                crate::import::FormatRegistry::default()
                    .versions()
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            Self::InvalidValue { field, .. } => match *field {
                "date" => Some(
                    "Dates are RFC 1123 (e.g. 'Tue, 03 Sep 2024 10:00:00 GMT') or RFC 3339"
                        .to_string(),
                ),
                "principal" => Some(
                    "Principals are GROUP.<name>, USER.<name>, ROLE.<name>, ALL_OTHERS or OVERWRITE_ALL"
                        .to_string(),
                ),
                _ => None,
            },
            Self::Locked { .. }
            | Self::ResourceNotFound { .. }
            | Self::PrincipalNotFound { .. }
            | Self::ManifestMalformed(_)
            | Self::Export(_)
            | Self::Repository(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(Error::NotInitialized.exit_code(), 2);
        assert_eq!(Error::UnsupportedVersion { version: 99 }.exit_code(), 5);
        assert_eq!(Error::Export("boom".into()).exit_code(), 6);
        assert_eq!(Error::Other("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_structured_json_includes_hint() {
        let err = Error::InvalidValue {
            field: "principal",
            value: "NOBODY".into(),
        };
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "INVALID_VALUE");
        assert!(json["error"]["hint"].as_str().unwrap().contains("GROUP."));
    }
}
