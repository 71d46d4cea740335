#![doc = "pagesync-core: core logic library for pagesync."]

//! This crate holds the data models and the synchronisation pipeline of pagesync:
//! the element tree, the site map builder, the content equality oracle, the
//! collaborator contracts and the engine that drives them. It also ships the
//! local filesystem source and the markdown converter.
//!
//! # Usage
//! Construct a [`synchronise::SyncContext`] from a [`contract::Source`], a
//! [`contract::Destination`] and a [`contract::Converter`], wrap it in a
//! [`synchronise::Synchroniser`] and call `execute`.

pub mod config;
pub mod contract;
pub mod element;
pub mod equality;
pub mod error;
pub mod markdown;
pub mod site_map;
pub mod source;
pub mod synchronise;

pub use config::SyncOptions;
pub use error::{NodeError, SyncError};
pub use site_map::SiteMap;
