//! cmsport - Versioned archive import/export for content repositories
//!
//! This crate provides the core functionality for the `cmsport` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`manager`] - Entry point running imports and exports against a repository
//! - [`import`] - Format registry, manifest dialects, import session and link rewrite
//! - [`export`] - Streaming exporter writing the newest manifest dialect
//! - [`manifest`] - Streaming manifest reader, writer and date codecs
//! - [`archive`] - Zip and directory archive containers
//! - [`repository`] - Repository collaborator trait and its SQLite implementation
//! - [`model`] - Transferred entities (resources, ACLs, principals, projects)
//! - [`config`] - Paths and transfer settings
//! - [`report`] - Progress sinks and statistics
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod hash;
pub mod import;
pub mod manager;
pub mod manifest;
pub mod model;
pub mod report;
pub mod repository;

pub use error::{Error, Result};
pub use export::{ExportParameters, Exporter};
pub use import::{FormatRegistry, ImportFormat, ImportParameters};
pub use manager::ArchiveManager;
