//! Transfer settings.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Type names grouped by how link rewriting treats them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkTypes {
    /// Configuration content, rewritten first.
    pub configuration: Vec<String>,
    /// Page content, rewritten once configuration is visible.
    pub page: Vec<String>,
    /// Any other link-parseable content.
    pub other: Vec<String>,
}

impl Default for LinkTypes {
    fn default() -> Self {
        Self {
            configuration: vec!["module_config".into(), "sitemap_config".into()],
            page: vec!["containerpage".into(), "xmlpage".into()],
            other: vec!["xmlcontent".into(), "jsp".into()],
        }
    }
}

/// Bounded wait for configuration changes to become visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceConfig {
    pub attempts: u32,
    pub interval_ms: u64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval_ms: 500,
        }
    }
}

impl ConvergenceConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Settings shared by import and export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Paths an import never overwrites once they exist.
    pub immutable_resources: Vec<String>,
    /// Property names dropped in both directions.
    pub ignored_properties: Vec<String>,
    pub link_types: LinkTypes,
    pub convergence: ConvergenceConfig,
    /// Delay before configuration writes become visible in the bundled
    /// repository.
    pub config_propagation_ms: u64,
}

impl TransferConfig {
    /// Load settings from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No transfer config, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(Error::Config(format!("{}: {e}", path.display()))),
        };
        serde_json::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Whether `path` is protected from being overwritten by an import.
    #[must_use]
    pub fn is_immutable(&self, path: &str) -> bool {
        self.immutable_resources.iter().any(|p| p == path)
    }

    #[must_use]
    pub const fn config_propagation(&self) -> Duration {
        Duration::from_millis(self.config_propagation_ms)
    }
}
