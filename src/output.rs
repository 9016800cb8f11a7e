//! Writing generated procedures to disk

use crate::config::MergeConfig;
use crate::error::{GenerateError, Result};
use crate::procedure::{build_procedure, MergeTarget};
use log::{error, info};
use std::fs;
use std::path::{Path, PathBuf};

/// Default root for generated scripts, relative to the working directory.
pub const DEFAULT_OUTPUT_ROOT: &str = "output";

/// Where generated scripts go.
///
/// Each [`MergeTarget`] gets its own directory under `root`, and every script
/// is named `<fileName>.sql`.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_ROOT)
    }
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir_for(&self, target: MergeTarget) -> PathBuf {
        self.root.join(target.output_dir_name())
    }

    pub fn path_for(&self, target: MergeTarget, file_name: &str) -> PathBuf {
        self.dir_for(target).join(format!("{}.sql", file_name))
    }

    /// Write one generated script, creating its directory if needed.
    ///
    /// # Errors
    ///
    /// - [`GenerateError::OutputDirectory`] if the directory cannot be created
    /// - [`GenerateError::OutputWrite`] if the file cannot be written
    pub fn write_procedure(&self, target: MergeTarget, file_name: &str, sql: &str) -> Result<PathBuf> {
        let dir = self.dir_for(target);
        fs::create_dir_all(&dir).map_err(|source| GenerateError::OutputDirectory {
            path: dir.clone(),
            source,
        })?;

        let path = self.path_for(target, file_name);
        fs::write(&path, sql).map_err(|source| GenerateError::OutputWrite {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }
}

/// Outcome of a generation run that got past every fatal check.
#[derive(Debug, Default)]
pub struct GenerationReport {
    /// Scripts written successfully
    pub written: Vec<PathBuf>,
    /// Scripts that could not be written; the run carried on without them
    pub failed: Vec<GenerateError>,
}

impl GenerationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Generate and write the incremental and target procedures for `config`.
///
/// A write failure for one script is logged and recorded in the report, and
/// the other script is still generated. Failing to create an output
/// directory stops the run.
pub fn generate(config: &MergeConfig, layout: &OutputLayout) -> Result<GenerationReport> {
    let mut report = GenerationReport::default();

    for target in MergeTarget::ALL {
        let sql = build_procedure(config, target);
        match layout.write_procedure(target, &config.file_name, &sql) {
            Ok(path) => {
                info!("SQL procedure generated successfully: {}", path.display());
                report.written.push(path);
            }
            Err(err) if !err.is_fatal() => {
                error!("{}", err);
                report.failed.push(err);
            }
            Err(err) => return Err(err),
        }
    }

    Ok(report)
}
