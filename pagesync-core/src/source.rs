//! Local filesystem realization of [`Source`].

use std::path::Path;
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::contract::{CollaboratorError, File, Source, SourceArgs};
use crate::site_map::SEPARATOR;

/// Extensions treated as documents.
pub const DOCUMENT_EXTENSIONS: [&str; 4] = ["md", "markdown", "html", "htm"];

const SKIPPED_DIRS: [&str; 3] = [".git", "target", "node_modules"];

/// Reads markdown and html documents from a directory tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSource;

impl LocalSource {
    pub fn new() -> Self {
        Self
    }
}

fn document_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    DOCUMENT_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Recursively collects document paths relative to `root`, `/`-joined.
fn collect_documents(root: &Path) -> std::io::Result<Vec<String>> {
    fn visit_dir(dir: &Path, root: &Path, results: &mut Vec<String>) -> std::io::Result<()> {
        for entry_res in std::fs::read_dir(dir)? {
            let entry = entry_res?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                let dir_name = entry.file_name();
                let dir_name = dir_name.to_string_lossy();
                if dir_name.starts_with('.') || SKIPPED_DIRS.contains(&&*dir_name) {
                    debug!(path = %path.display(), "Skipping directory");
                    continue;
                }
                visit_dir(&path, root, results)?;
            } else if file_type.is_file() && document_extension(&path).is_some() {
                let Ok(rel_path) = path.strip_prefix(root) else {
                    continue;
                };
                let segments: Vec<String> = rel_path
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                results.push(segments.join(&SEPARATOR.to_string()));
            }
        }
        Ok(())
    }

    let mut results = Vec::new();
    visit_dir(root, root, &mut results)?;
    results.sort();
    Ok(results)
}

#[async_trait]
impl Source for LocalSource {
    async fn source_is_accessible(&self, args: &SourceArgs) -> Result<bool, CollaboratorError> {
        let accessible = match tokio::fs::metadata(&args.root).await {
            Ok(meta) => meta.is_dir() && tokio::fs::read_dir(&args.root).await.is_ok(),
            Err(e) => {
                debug!(root = %args.root.display(), error = %e, "Source root metadata unavailable");
                false
            }
        };
        Ok(accessible)
    }

    async fn get_file_path_list(&self, args: &SourceArgs) -> Result<Vec<String>, CollaboratorError> {
        let root = args.root.clone();
        let paths = tokio::task::spawn_blocking(move || collect_documents(&root))
            .await?
            .map_err(|e| {
                error!(root = %args.root.display(), error = ?e, "Failed to walk source directory");
                e
            })?;
        info!(root = %args.root.display(), count = paths.len(), "Collected source documents");
        Ok(paths)
    }

    async fn get_file(&self, args: &SourceArgs, file_path: &str) -> Result<File, CollaboratorError> {
        let full_path = file_path
            .split(SEPARATOR)
            .filter(|s| !s.is_empty())
            .fold(args.root.clone(), |acc, segment| acc.join(segment));

        let content = tokio::fs::read_to_string(&full_path).await.map_err(|e| {
            error!(path = %full_path.display(), error = ?e, "Failed to read source file");
            e
        })?;
        let last_updated = tokio::fs::metadata(&full_path)
            .await
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let name = full_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = full_path
            .extension()
            .map(|s| s.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        debug!(path = file_path, size = content.len(), "Read source file");
        Ok(File {
            name,
            icon: None,
            content,
            path: file_path.to_owned(),
            last_updated,
            extension,
        })
    }
}
