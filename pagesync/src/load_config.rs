/// `load_config` module: Loads a static YAML config into the typed settings of a run.
///
/// This module is the only place where untrusted YAML is parsed and mapped to
/// strongly-typed structs. Secrets (the Notion token) never live in the file;
/// they are read from the environment by [`crate::notion::NotionClient::new_from_env`].
///
/// # Accepted schema
///
/// ```yaml
/// source:
///   dir: ./docs
/// destination:
///   parent_url: https://www.notion.so/Workspace-0123456789abcdef0123456789abcdef
/// options:          # optional, both default to false
///   clean_sync: true
///   lock_page: false
/// ```
///
/// # Errors
/// All errors use `anyhow::Error` with the offending path, and are surfaced at the CLI boundary.
use anyhow::Result;
use pagesync_core::contract::SourceArgs;
use pagesync_core::SyncOptions;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    pub source: SourceSection,
    pub destination: DestinationSection,
    #[serde(default)]
    pub options: SyncOptions,
}

#[derive(Debug, Deserialize)]
pub struct SourceSection {
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct DestinationSection {
    /// URL (or bare id) of the page the tree is synchronised into.
    pub parent_url: String,
}

impl CliConfig {
    pub fn source_args(&self) -> SourceArgs {
        SourceArgs::new(self.source.dir.clone())
    }
}

/// Loads and parses the YAML config file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if config.destination.parent_url.trim().is_empty() {
        error!(config_path = ?path_ref, "destination.parent_url is empty");
        return Err(anyhow::anyhow!("destination.parent_url must not be empty"));
    }

    config.options.trace_loaded();
    Ok(config)
}
