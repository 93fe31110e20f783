//! Core domain types shared by every pipeline stage.

use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroUsize;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FilesmithError, Result};

/// Record keys owned by the reader. Front matter never overwrites them.
pub const RESERVED_KEYS: [&str; 3] = ["contents", "mode", "stats"];

/// Shared, plugin-mutable metadata object.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Path key (relative, `/`-separated) → record.
pub type FileMap = BTreeMap<String, FileRecord>;

// ---------------------------------------------------------------------------
// FileStats
// ---------------------------------------------------------------------------

/// Point-in-time filesystem metadata for one entry.
///
/// Deliberately minimal so ignore predicates and plugins don't couple to a
/// platform-specific stat structure. Informational only: never written back.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileStats {
    pub is_file: bool,
    pub is_dir: bool,
    pub is_symlink: bool,
    /// Size in bytes.
    pub size: u64,
    /// Permission bits (`0o7777` mask).
    pub mode: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

impl FileStats {
    /// Snapshot `std::fs::Metadata`. `is_symlink` must come from an
    /// `lstat`, since `meta` usually follows the link.
    pub fn from_metadata(meta: &std::fs::Metadata, is_symlink: bool) -> Self {
        Self {
            is_file: meta.is_file(),
            is_dir: meta.is_dir(),
            is_symlink,
            size: meta.len(),
            mode: permission_bits(meta),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            accessed: meta.accessed().ok().map(DateTime::<Utc>::from),
            created: meta.created().ok().map(DateTime::<Utc>::from),
        }
    }

    /// Four-digit octal permission string, e.g. `"0644"`.
    pub fn mode_string(&self) -> String {
        format_mode(self.mode)
    }
}

#[cfg(unix)]
fn permission_bits(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(meta: &std::fs::Metadata) -> u32 {
    if meta.permissions().readonly() { 0o444 } else { 0o666 }
}

/// Format permission bits as a four-digit octal string.
pub fn format_mode(mode: u32) -> String {
    format!("{:04o}", mode & 0o7777)
}

/// Parse a four-digit (or shorter) octal permission string.
pub fn parse_mode(mode: &str) -> Option<u32> {
    let trimmed = mode.trim();
    if trimmed.is_empty() || trimmed.len() > 4 {
        return None;
    }
    u32::from_str_radix(trimmed, 8).ok()
}

// ---------------------------------------------------------------------------
// FileRecord
// ---------------------------------------------------------------------------

/// One file in the map: raw bytes, optional mode and stats, plus arbitrary
/// keys from front matter or plugins.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FileRecord {
    /// Raw contents. Always present, possibly empty.
    #[serde(default)]
    pub contents: Vec<u8>,
    /// Four-digit octal permission string, applied on write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Snapshot taken when the file was read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<FileStats>,
    /// Everything else.
    #[serde(flatten)]
    pub data: Metadata,
}

impl FileRecord {
    /// A record holding only `contents`.
    pub fn new(contents: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: contents.into(),
            ..Self::default()
        }
    }

    /// Builder-style `mode` setter.
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Builder-style setter for an additional key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Set an additional key. Reserved keys (`contents`, `mode`, `stats`)
    /// live in their own fields and are refused here; the record is left
    /// unchanged and `None` is returned.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Option<serde_json::Value> {
        let key = key.into();
        if RESERVED_KEYS.contains(&key.as_str()) {
            tracing::debug!(key = %key, "refusing to store reserved key as record data");
            return None;
        }
        self.data.insert(key, value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.data.remove(key)
    }

    /// Merge front-matter attributes. Reserved keys are skipped; front
    /// matter is applied to a fresh record so no other tie-break exists.
    pub fn merge_attributes(&mut self, attributes: Metadata) {
        for (key, value) in attributes {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            self.data.insert(key, value);
        }
    }

    /// Lossy UTF-8 view of the contents.
    pub fn contents_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.contents)
    }
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

/// Bound on simultaneous filesystem operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Concurrency {
    #[default]
    Unbounded,
    Limited(NonZeroUsize),
}

impl Concurrency {
    /// A positive limit. Zero is rejected.
    pub fn limited(limit: usize) -> Result<Self> {
        NonZeroUsize::new(limit)
            .map(Self::Limited)
            .ok_or_else(|| FilesmithError::config("concurrency must be a positive integer"))
    }

    /// Permit count, or `None` when unbounded.
    pub fn limit(&self) -> Option<usize> {
        match self {
            Self::Unbounded => None,
            Self::Limited(n) => Some(n.get()),
        }
    }

    /// Validate an untyped value: a positive integer or `"unbounded"`.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::String(s) if s == "unbounded" => Ok(Self::Unbounded),
            serde_json::Value::Number(n) => match n.as_u64() {
                Some(limit) if limit > 0 => usize::try_from(limit)
                    .map_err(|_| {
                        FilesmithError::config(format!(
                            "concurrency {limit} exceeds what this platform can address"
                        ))
                    })
                    .and_then(Self::limited),
                _ => Err(FilesmithError::config(format!(
                    "concurrency must be a positive integer, got {n}"
                ))),
            },
            other => Err(FilesmithError::config(format!(
                "concurrency must be a positive integer or \"unbounded\", got {other}"
            ))),
        }
    }
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => f.write_str("unbounded"),
            Self::Limited(n) => write!(f, "{n}"),
        }
    }
}
