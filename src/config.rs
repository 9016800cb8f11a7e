//! Merge configuration loading and validation.
//!
//! A configuration file is read into a [`RawConfig`] (a flat string map) with
//! the `config` crate, then validated into an immutable [`MergeConfig`].
//! Column and unit-key lists are split once here; everything downstream works
//! on the parsed sequences.
//!
//! # Example
//!
//! ```
//! use stagemerge::{MergeConfig, RawConfig};
//!
//! let raw = RawConfig::from_pairs([
//!     ("fileName", "sync_orders"),
//!     ("schemaName", "dw"),
//!     ("tableName", "orders"),
//!     ("columns", "id, status, amount"),
//!     ("unitKeys", "id"),
//! ]);
//! let config = MergeConfig::from_raw(&raw).unwrap();
//! assert_eq!(config.columns, vec!["id", "status", "amount"]);
//! assert_eq!(config.source_timestamp_column, "source_timestamp_ms");
//! ```

use crate::error::{GenerateError, Result};
use config::{Config, File, FileFormat, ValueKind};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

pub const KEY_FILE_NAME: &str = "fileName";
pub const KEY_SCHEMA_NAME: &str = "schemaName";
pub const KEY_TABLE_NAME: &str = "tableName";
pub const KEY_COLUMNS: &str = "columns";
pub const KEY_UNIT_KEYS: &str = "unitKeys";
pub const KEY_SOURCE_TIMESTAMPS: &str = "source_timestamps";
pub const KEY_CREATED_TIMESTAMPS: &str = "created_timestamps";
pub const KEY_LAST_MODIFIED_TIMESTAMPS: &str = "last_modified_timestamps";

/// Keys that must be present and non-blank, in reporting order.
pub const REQUIRED_KEYS: [&str; 5] = [
    KEY_FILE_NAME,
    KEY_SCHEMA_NAME,
    KEY_TABLE_NAME,
    KEY_COLUMNS,
    KEY_UNIT_KEYS,
];

pub const DEFAULT_SOURCE_TIMESTAMP_COLUMN: &str = "source_timestamp_ms";
pub const DEFAULT_CREATED_TIMESTAMP_COLUMN: &str = "dw_created_timestamp_ms";
pub const DEFAULT_MODIFIED_TIMESTAMP_COLUMN: &str = "dw_last_modified_timestamp_ms";

/// Unvalidated key/value pairs read from a configuration source.
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    /// Where the entries came from, used in error messages
    origin: String,
    entries: BTreeMap<String, String>,
}

impl RawConfig {
    /// Build a raw configuration from in-memory pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            origin: "<inline>".to_string(),
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up a key, ignoring ASCII case.
    ///
    /// Some `config` sources normalise key case, so `fileName` may arrive
    /// as `filename`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    /// Trimmed value of `key`, or `None` when absent or blank.
    fn non_blank(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}

/// Pick the `config` file format for a path from its extension.
///
/// Java-style `.properties` files, `.ini` files and anything unrecognised
/// are read as INI; properties text goes through [`normalize_properties`]
/// first.
pub fn format_for_path(path: &Path) -> FileFormat {
    match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => FileFormat::Toml,
        Some("json") => FileFormat::Json,
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        _ => FileFormat::Ini,
    }
}

/// Whether a path holds Java-style properties rather than INI, TOML, JSON or YAML.
fn is_properties(path: &Path) -> bool {
    !matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("ini" | "toml" | "json" | "yaml" | "yml")
    )
}

/// Rewrite Java-properties text into the `key=value` lines the INI reader expects.
///
/// Drops `#` and `!` comment lines, joins lines ending in a backslash with the
/// next one, and turns the whitespace-separated `key value` form (or a bare
/// `key`) into `key=value`.
pub fn normalize_properties(content: &str) -> String {
    let mut out = String::new();
    let mut pending = String::new();

    for line in content.lines() {
        let line = if pending.is_empty() { line.trim() } else { line.trim_start() };
        if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }
        if let Some(head) = line.strip_suffix('\\') {
            pending.push_str(head);
            continue;
        }
        pending.push_str(line);

        let entry = std::mem::take(&mut pending);
        if entry.contains(['=', ':']) {
            out.push_str(&entry);
        } else {
            match entry.split_once(char::is_whitespace) {
                Some((key, value)) => {
                    out.push_str(key);
                    out.push('=');
                    out.push_str(value.trim_start());
                }
                None => {
                    out.push_str(&entry);
                    out.push('=');
                }
            }
        }
        out.push('\n');
    }
    if !pending.is_empty() {
        out.push_str(&pending);
        out.push('\n');
    }

    out
}

/// Read a configuration file into a [`RawConfig`].
///
/// # Errors
///
/// - [`GenerateError::ConfigurationNotFound`] if the file cannot be read
/// - [`GenerateError::MalformedConfiguration`] if it cannot be parsed
pub fn load_raw_config(path: &Path) -> Result<RawConfig> {
    let content = fs::read_to_string(path).map_err(|source| GenerateError::ConfigurationNotFound {
        path: path.to_path_buf(),
        source,
    })?;

    let malformed = |e: config::ConfigError| GenerateError::MalformedConfiguration {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let content = if is_properties(path) {
        normalize_properties(&content)
    } else {
        content
    };

    let settings = Config::builder()
        .add_source(File::from_str(&content, format_for_path(path)))
        .build()
        .map_err(malformed)?;

    let values: HashMap<String, config::Value> = settings.try_deserialize().map_err(malformed)?;

    let mut entries = BTreeMap::new();
    for (key, value) in values {
        if matches!(value.kind, ValueKind::Table(_)) {
            debug!("Ignoring nested section '{}' in {}", key, path.display());
            continue;
        }
        if matches!(value.kind, ValueKind::Nil) {
            continue;
        }
        let text = if matches!(value.kind, ValueKind::Array(_)) {
            value
                .into_array()
                .map_err(malformed)?
                .into_iter()
                .map(|item| item.into_string())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(malformed)?
                .join(",")
        } else {
            value.into_string().map_err(malformed)?
        };
        entries.insert(key, text);
    }

    debug!("Read {} entries from {}", entries.len(), path.display());

    Ok(RawConfig {
        origin: path.display().to_string(),
        entries,
    })
}

/// Split a comma-separated list, trimming each element and dropping empty ones.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Validated settings for one merge procedure pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConfig {
    /// Procedure name and output file stem
    pub file_name: String,
    pub schema_name: String,
    pub table_name: String,
    /// Declared columns, in declaration order
    pub columns: Vec<String>,
    /// MERGE join keys, in declaration order
    pub unit_keys: Vec<String>,
    pub source_timestamp_column: String,
    pub created_timestamp_column: String,
    pub modified_timestamp_column: String,
}

impl MergeConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = load_raw_config(path)?;
        Self::from_raw(&raw)
    }

    /// Validate a raw configuration.
    ///
    /// # Errors
    ///
    /// - [`GenerateError::EmptyConfiguration`] if `raw` has no entries at all
    /// - [`GenerateError::MissingRequiredKeys`] naming every required key that
    ///   is absent or blank
    pub fn from_raw(raw: &RawConfig) -> Result<Self> {
        if raw.is_empty() {
            return Err(GenerateError::EmptyConfiguration {
                origin: raw.origin().to_string(),
            });
        }

        let columns = raw.non_blank(KEY_COLUMNS).map(split_list).unwrap_or_default();
        let unit_keys = raw.non_blank(KEY_UNIT_KEYS).map(split_list).unwrap_or_default();

        let missing: Vec<String> = REQUIRED_KEYS
            .iter()
            .filter(|key| match **key {
                KEY_COLUMNS => columns.is_empty(),
                KEY_UNIT_KEYS => unit_keys.is_empty(),
                other => raw.non_blank(other).is_none(),
            })
            .map(|key| key.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(GenerateError::MissingRequiredKeys { keys: missing });
        }

        let required = |key: &str| raw.non_blank(key).unwrap_or_default().to_string();
        let optional = |key: &str, default: &str| raw.non_blank(key).unwrap_or(default).to_string();

        let config = Self {
            file_name: required(KEY_FILE_NAME),
            schema_name: required(KEY_SCHEMA_NAME),
            table_name: required(KEY_TABLE_NAME),
            columns,
            unit_keys,
            source_timestamp_column: optional(KEY_SOURCE_TIMESTAMPS, DEFAULT_SOURCE_TIMESTAMP_COLUMN),
            created_timestamp_column: optional(KEY_CREATED_TIMESTAMPS, DEFAULT_CREATED_TIMESTAMP_COLUMN),
            modified_timestamp_column: optional(
                KEY_LAST_MODIFIED_TIMESTAMPS,
                DEFAULT_MODIFIED_TIMESTAMP_COLUMN,
            ),
        };

        for key in &config.unit_keys {
            if !config.columns.iter().any(|c| c.eq_ignore_ascii_case(key)) {
                warn!(
                    "Unit key '{}' is not one of the declared columns of {}.{}",
                    key, config.schema_name, config.table_name
                );
            }
        }

        debug!(
            "Resolved configuration for {}.{}: {} column(s), unit keys [{}]",
            config.schema_name,
            config.table_name,
            config.columns.len(),
            config.unit_keys.join(", ")
        );

        Ok(config)
    }

    /// Whether `column` is one of the unit keys (ASCII case-insensitive).
    pub fn is_unit_key(&self, column: &str) -> bool {
        self.unit_keys.iter().any(|key| key.eq_ignore_ascii_case(column))
    }
}
