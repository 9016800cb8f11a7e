//! Error types for procedure generation

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can stop (or partially stop) a generation run.
///
/// All variants except [`GenerateError::OutputWrite`] are fatal: the caller
/// must not produce any output after receiving them. `OutputWrite` only
/// affects the file it names.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Wrong number of command-line arguments
    #[error("{0}")]
    Usage(String),

    /// The configuration source could not be read
    #[error("No such file: {}", path.display())]
    ConfigurationNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration source was read but could not be parsed
    #[error("Invalid configuration file {}: {message}", path.display())]
    MalformedConfiguration { path: PathBuf, message: String },

    /// The configuration source contains no keys at all
    #[error("Missing properties in file: {origin}")]
    EmptyConfiguration { origin: String },

    /// One or more required keys are absent or blank
    #[error("Missing required properties:\n{}", format_key_list(keys))]
    MissingRequiredKeys { keys: Vec<String> },

    /// An output directory could not be created
    #[error("Failed to create output directory {}: {source}", path.display())]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A generated procedure could not be written
    #[error("Error writing SQL file [{}]: {source}", path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GenerateError {
    /// Whether the run must stop when this error is raised.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, GenerateError::OutputWrite { .. })
    }
}

fn format_key_list(keys: &[String]) -> String {
    keys.iter().map(|key| format!(" - {}\n", key)).collect()
}

pub type Result<T> = std::result::Result<T, GenerateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_keys_message_lists_every_key() {
        let err = GenerateError::MissingRequiredKeys {
            keys: vec!["fileName".to_string(), "unitKeys".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Missing required properties:\n - fileName\n - unitKeys\n"
        );
    }

    #[test]
    fn test_only_write_errors_are_recoverable() {
        let write = GenerateError::OutputWrite {
            path: PathBuf::from("out/a.sql"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!write.is_fatal());
        assert!(GenerateError::EmptyConfiguration {
            origin: "a.properties".to_string()
        }
        .is_fatal());
        assert!(GenerateError::Usage("too many arguments".to_string()).is_fatal());
    }
}
