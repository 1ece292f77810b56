//! Pipeboard - kanban boards for deal and broker pipelines
//!
//! This library provides the core functionality for Pipeboard, including:
//! - Stage tables mapping board columns to backend stages
//! - Optimistic drag handling with rollback and reconciliation
//! - A SQLite-backed entity ledger and its migrations
//! - CLI command parsing and execution
//!
//! # Example
//!
//! ```no_run
//! use pipeboard::cli::run;
//!
//! fn main() {
//!     if let Err(e) = run() {
//!         eprintln!("Error: {}", e);
//!         std::process::exit(1);
//!     }
//! }
//! ```

pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;
pub mod repo;
pub mod cli;
