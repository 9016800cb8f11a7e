//! # stagemerge
//!
//! Generates PostgreSQL merge procedures that move change rows from a staging
//! table into an incremental or target table, archiving everything they touch.
//!
//! The library is pure apart from [`output`]: [`MergeConfig`] validates a
//! configuration, [`build_procedure`] turns it into procedure text. The
//! `stagemerge` binary (crate `stagemerge-cli`) wires them to the filesystem
//! and decides exit codes.

pub mod config;
pub mod error;
pub mod output;
pub mod procedure;

pub use config::{load_raw_config, MergeConfig, RawConfig};
pub use error::{GenerateError, Result};
pub use output::{generate, GenerationReport, OutputLayout};
pub use procedure::{build_procedure, MergeTarget, ProcedureWriter};
