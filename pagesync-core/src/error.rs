use std::path::PathBuf;

use crate::contract::CollaboratorError;

/// Fatal outcome of a synchronisation run.
///
/// Clean-sync deletion failures are not represented here: they are logged and
/// the run continues.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to resolve destination parent page from `{reference}`")]
    ResolveParent {
        reference: String,
        #[source]
        source: CollaboratorError,
    },
    #[error("destination parent page `{parent_id}` is not accessible")]
    DestinationInaccessible { parent_id: String },
    #[error("failed to check access to destination parent page `{parent_id}`")]
    DestinationCheck {
        parent_id: String,
        #[source]
        source: CollaboratorError,
    },
    #[error("source `{}` is not accessible", .root.display())]
    SourceInaccessible { root: PathBuf },
    #[error("failed to check access to source `{}`", .root.display())]
    SourceCheck {
        root: PathBuf,
        #[source]
        source: CollaboratorError,
    },
    #[error("failed to list source files under `{}`", .root.display())]
    ListFiles {
        root: PathBuf,
        #[source]
        source: CollaboratorError,
    },
    #[error("failed to synchronise `{path}`")]
    Node {
        path: String,
        #[source]
        source: NodeError,
    },
}

impl SyncError {
    /// Source path of the node that failed, if the failure happened during traversal.
    pub fn path(&self) -> Option<&str> {
        match self {
            SyncError::Node { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// What went wrong while synchronising a single node.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("fetching the source file failed")]
    Fetch(#[source] CollaboratorError),
    #[error("converting the source file failed")]
    Convert(#[source] CollaboratorError),
    #[error("converter returned a `{kind}` element where a page was required")]
    NotAPage { kind: &'static str },
    #[error("creating the destination page failed")]
    Create(#[source] CollaboratorError),
    #[error("appending to destination page `{page_id}` failed")]
    Append {
        page_id: String,
        #[source]
        source: CollaboratorError,
    },
    #[error("destination created a page without returning its id")]
    MissingPageId,
}
