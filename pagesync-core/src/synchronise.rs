//! High-level pipeline: orchestrates resolve → (clean) → check → map → write for one run.
//!
//! This module drives a single synchronisation of a source document tree into a
//! destination page. A run:
//!   - Resolves the destination parent page id from the user-supplied reference
//!   - Optionally deletes everything under that parent (clean sync)
//!   - Checks that destination and source are reachable
//!   - Builds the [`SiteMap`] from the source's file list
//!   - Walks the site map, creating one destination page per node
//!
//! # Major Types
//! - [`SyncContext`]: the three collaborators, built once at process start
//! - [`Synchroniser`]: owns the context and runs [`Synchroniser::execute`]
//! - [`SyncReport`]: what was written, for the caller to print or audit
//!
//! # Ordering
//! Everything is awaited in sequence. A page is created before any of its
//! children, siblings follow site map order, and at most one destination write
//! is in flight. Destination APIs are rate-limited and failures must point at a
//! single path, so there is no fan-out.
//!
//! # Error Handling
//! Clean-sync deletion failures are logged and the run continues. Every other
//! failure aborts the run and is returned as a [`SyncError`] carrying the path
//! of the failing node; nothing is retried here.

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, error, info, warn};

use crate::config::SyncOptions;
use crate::contract::{Converter, Destination, NewPage, Source, SourceArgs};
use crate::element::{Element, PageElement};
use crate::error::{NodeError, SyncError};
use crate::site_map::{NodeId, SiteMap};

/// Collaborators for a run, passed down explicitly.
pub struct SyncContext<S, D, C> {
    pub source: S,
    pub destination: D,
    pub converter: C,
}

/// Outcome of a successful run.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub parent_id: String,
    /// Clean sync was requested but deleting existing children failed.
    pub clean_sync_failed: bool,
    /// The root document was merged into the parent page.
    pub root_appended: Option<String>,
    /// Created pages, in creation order.
    pub pages: Vec<SyncedPage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedPage {
    pub path: String,
    pub page_id: Option<String>,
}

pub struct Synchroniser<S, D, C> {
    ctx: SyncContext<S, D, C>,
}

/// Checks the source and builds its normalized site map.
pub async fn build_site_map<S>(source: &S, args: &SourceArgs) -> Result<SiteMap, SyncError>
where
    S: Source + ?Sized,
{
    match source.source_is_accessible(args).await {
        Ok(true) => debug!(root = %args.root.display(), "[SYNC] Source is accessible"),
        Ok(false) => {
            error!(root = %args.root.display(), "[SYNC][ERROR] Source is not accessible");
            return Err(SyncError::SourceInaccessible {
                root: args.root.clone(),
            });
        }
        Err(e) => {
            error!(root = %args.root.display(), error = %e, "[SYNC][ERROR] Source access check failed");
            return Err(SyncError::SourceCheck {
                root: args.root.clone(),
                source: e,
            });
        }
    }

    let paths = source
        .get_file_path_list(args)
        .await
        .map_err(|e| SyncError::ListFiles {
            root: args.root.clone(),
            source: e,
        })?;
    info!(files = paths.len(), "[SYNC] Listed source files");

    let site_map = SiteMap::build_from_file_paths(&paths);
    debug!(nodes = site_map.len(), "[SYNC] Built site map");
    Ok(site_map)
}

/// Puts the table-of-contents header in front of a page body, and a closing
/// divider when nested pages will follow it.
pub fn decorate(page: &mut PageElement, has_children: bool) {
    page.children.insert(0, Element::TableOfContents);
    page.children.insert(0, Element::Divider);
    if has_children {
        page.children.push(Element::Divider);
    }
}

fn node_failure(path: &str, source: NodeError) -> SyncError {
    error!(path, error = %source, "[SYNC][ERROR] Node synchronisation failed");
    SyncError::Node {
        path: path.to_owned(),
        source,
    }
}

impl<S, D, C> Synchroniser<S, D, C>
where
    S: Source,
    D: Destination,
    C: Converter,
{
    pub fn new(ctx: SyncContext<S, D, C>) -> Self {
        Self { ctx }
    }

    /// Runs one synchronisation of `source_args` into the page referenced by
    /// `destination_reference` (a page URL or id).
    pub async fn execute(
        &self,
        source_args: &SourceArgs,
        destination_reference: &str,
        options: SyncOptions,
    ) -> Result<SyncReport, SyncError> {
        info!(
            source = %source_args.root.display(),
            destination = destination_reference,
            clean_sync = options.clean_sync,
            lock_page = options.lock_page,
            "[SYNC] Starting synchronisation"
        );

        let parent_id = self
            .ctx
            .destination
            .get_page_id_from_url(destination_reference)
            .await
            .map_err(|e| {
                error!(reference = destination_reference, error = %e, "[SYNC][ERROR] Could not resolve destination parent");
                SyncError::ResolveParent {
                    reference: destination_reference.to_owned(),
                    source: e,
                }
            })?;
        info!(parent_id = %parent_id, "[SYNC] Resolved destination parent");

        let mut report = SyncReport {
            parent_id: parent_id.clone(),
            ..SyncReport::default()
        };

        if options.clean_sync {
            match self.ctx.destination.delete_child_blocks(&parent_id).await {
                Ok(()) => info!(parent_id = %parent_id, "[SYNC] Deleted existing children before sync"),
                Err(e) => {
                    warn!(
                        parent_id = %parent_id,
                        error = %e,
                        "[SYNC] Clean sync failed, continuing against a destination that may not be empty"
                    );
                    report.clean_sync_failed = true;
                }
            }
        }

        match self.ctx.destination.destination_is_accessible(&parent_id).await {
            Ok(true) => debug!(parent_id = %parent_id, "[SYNC] Destination is accessible"),
            Ok(false) => {
                error!(parent_id = %parent_id, "[SYNC][ERROR] Destination is not accessible");
                return Err(SyncError::DestinationInaccessible { parent_id });
            }
            Err(e) => {
                error!(parent_id = %parent_id, error = %e, "[SYNC][ERROR] Destination access check failed");
                return Err(SyncError::DestinationCheck {
                    parent_id,
                    source: e,
                });
            }
        }

        let site_map = build_site_map(&self.ctx.source, source_args).await?;

        let root = site_map.node(site_map.root());
        if !root.is_grouping() {
            let page = self
                .load_page(source_args, &root.filepath)
                .await
                .map_err(|e| node_failure(&root.filepath, e))?;
            self.ctx
                .destination
                .append_to_page(&parent_id, &page)
                .await
                .map_err(|e| {
                    node_failure(
                        &root.filepath,
                        NodeError::Append {
                            page_id: parent_id.clone(),
                            source: e,
                        },
                    )
                })?;
            info!(path = %root.filepath, parent_id = %parent_id, "[SYNC] Appended root document to parent page");
            report.root_appended = Some(root.filepath.clone());
        }

        self.synchronise_tree_node(
            source_args,
            &site_map,
            site_map.root(),
            &parent_id,
            options,
            &mut report,
        )
        .await?;

        info!(pages = report.pages.len(), "[SYNC] Synchronisation complete");
        Ok(report)
    }

    /// Fetches and converts the file at `path`, requiring a page.
    async fn load_page(&self, args: &SourceArgs, path: &str) -> Result<PageElement, NodeError> {
        let file = self
            .ctx
            .source
            .get_file(args, path)
            .await
            .map_err(NodeError::Fetch)?;
        self.ctx.converter.set_current_file_path(path);
        let element = self
            .ctx
            .converter
            .convert_to_element(&file)
            .map_err(NodeError::Convert)?;
        element
            .into_page()
            .map_err(|other| NodeError::NotAPage { kind: other.kind() })
    }

    /// Creates a page for every child of `node` under `parent_id`, depth first.
    fn synchronise_tree_node<'a>(
        &'a self,
        args: &'a SourceArgs,
        site_map: &'a SiteMap,
        node: NodeId,
        parent_id: &'a str,
        options: SyncOptions,
        report: &'a mut SyncReport,
    ) -> BoxFuture<'a, Result<(), SyncError>> {
        async move {
            for (child_id, child) in site_map.children(node) {
                let path = if child.is_grouping() {
                    child.id.as_str()
                } else {
                    child.filepath.as_str()
                };

                let mut page = if child.is_grouping() {
                    debug!(node = %child.id, "[SYNC] Grouping node without document, creating placeholder page");
                    PageElement::new(child.name.clone())
                } else {
                    self.load_page(args, path)
                        .await
                        .map_err(|e| node_failure(path, e))?
                };
                decorate(&mut page, child.has_children());

                let created = self
                    .ctx
                    .destination
                    .create_page(NewPage {
                        page_element: &page,
                        parent_page_id: parent_id,
                        file_path: &child.filepath,
                        lock_page: options.lock_page,
                    })
                    .await
                    .map_err(|e| node_failure(path, NodeError::Create(e)))?;
                info!(path, parent_id, page_id = ?created.page_id, "[SYNC] Created page");

                if !child.has_children() {
                    report.pages.push(SyncedPage {
                        path: path.to_owned(),
                        page_id: created.page_id,
                    });
                    continue;
                }

                let Some(page_id) = created.page_id else {
                    return Err(node_failure(path, NodeError::MissingPageId));
                };
                report.pages.push(SyncedPage {
                    path: path.to_owned(),
                    page_id: Some(page_id.clone()),
                });
                self.synchronise_tree_node(args, site_map, child_id, &page_id, options, report)
                    .await?;
            }
            Ok(())
        }
        .boxed()
    }
}
