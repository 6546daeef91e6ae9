//! dashsync - cross-environment snapshot sync for the monitoring dashboard
//!
//! Moves a full relational snapshot between deployments that share no
//! network or database access: export, chunked upload through a blob
//! store, then an idempotent, dependency-ordered import.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`storage`] - SQLite database layer and the sync ledger
//! - [`sync`] - Export, chunked transport, import and status tracking
//! - [`config`] - Path resolution and settings
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
