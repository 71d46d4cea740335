//! # contract: collaborator interfaces of the synchronisation engine
//!
//! The engine never touches the filesystem, the network or a markdown parser
//! directly. It talks to three collaborators:
//!
//! - [`Source`]: enumerates and reads source documents.
//! - [`Converter`]: turns a [`File`] into an [`Element`] tree.
//! - [`Destination`]: resolves, checks, clears and writes destination pages.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`, so tests (and downstream crates with the
//!   `test-export-mocks` feature) get `MockSource`, `MockDestination` and `MockConverter`.
//!
//! ## Errors
//! - Collaborators report failures as a boxed [`CollaboratorError`]; the engine wraps
//!   them with the operation and the offending path before surfacing them.

use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::element::{Element, PageElement};

/// Error type shared by all collaborator traits.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// Where the source documents live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceArgs {
    /// Root directory of the document tree.
    pub root: PathBuf,
}

impl SourceArgs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// A source document as read by a [`Source`].
#[derive(Debug, Clone)]
pub struct File {
    pub name: String,
    pub icon: Option<String>,
    pub content: String,
    /// Source path relative to [`SourceArgs::root`], `/`-separated.
    pub path: String,
    pub last_updated: SystemTime,
    /// Lowercased extension without the dot.
    pub extension: String,
}

/// Request for [`Destination::create_page`].
pub struct NewPage<'a> {
    pub page_element: &'a PageElement,
    pub parent_page_id: &'a str,
    /// Source path of the page, for traceability.
    pub file_path: &'a str,
    /// Lock the page against edits in the destination UI once created.
    pub lock_page: bool,
}

/// A page as returned by the destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Page {
    pub page_id: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub is_locked: bool,
}

/// Reads source documents.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Source: Send + Sync {
    async fn source_is_accessible(&self, args: &SourceArgs) -> Result<bool, CollaboratorError>;

    /// All document paths under the source, `/`-separated and relative to its root.
    async fn get_file_path_list(&self, args: &SourceArgs) -> Result<Vec<String>, CollaboratorError>;

    async fn get_file(&self, args: &SourceArgs, file_path: &str) -> Result<File, CollaboratorError>;
}

/// Writes pages into a hierarchical document store.
///
/// Implementations own transport, authentication and any retry policy; the engine
/// calls them strictly one at a time.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Destination: Send + Sync {
    async fn destination_is_accessible(&self, parent_id: &str) -> Result<bool, CollaboratorError>;

    /// Extracts a page id from a user-facing page URL (or accepts a bare id).
    async fn get_page_id_from_url(&self, url: &str) -> Result<String, CollaboratorError>;

    /// Removes every child block (pages included) under `parent_id`.
    async fn delete_child_blocks(&self, parent_id: &str) -> Result<(), CollaboratorError>;

    /// Creates a page from `req.page_element` as a child of `req.parent_page_id`.
    async fn create_page<'a>(&self, req: NewPage<'a>) -> Result<Page, CollaboratorError>;

    /// Appends the children of `page_element` to the existing page `page_id`.
    async fn append_to_page(
        &self,
        page_id: &str,
        page_element: &PageElement,
    ) -> Result<(), CollaboratorError>;
}

/// Turns a source [`File`] into an [`Element`] tree.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Converter: Send + Sync {
    /// Called before each conversion so path-relative assets can be resolved.
    fn set_current_file_path(&self, path: &str);

    fn convert_to_element(&self, file: &File) -> Result<Element, CollaboratorError>;
}
