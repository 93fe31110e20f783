//! Build configuration document for Filesmith.
//!
//! The CLI reads `filesmith.json` (or a `.toml` file passed with `-c`)
//! from the working directory. Values are kept untyped here and validated
//! when applied to a `Filesmith` instance, so a mistyped value surfaces as
//! a [`FilesmithError::Config`] naming the key.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FilesmithError, Result};
use crate::types::{Concurrency, Metadata};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "filesmith.json";

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Top-level configuration document. Keys mirror the builder accessors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clean: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontmatter: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,

    /// A single pattern or a list of patterns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore: Option<Value>,

    /// `{ "id": options, ... }` or `[{ "id": options }, ...]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Value>,
}

/// One plugin entry: identifier plus its options value.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginSpec {
    pub id: String,
    pub options: Value,
}

impl PluginSpec {
    /// Whether the identifier names a local path rather than a registry id.
    pub fn is_local(&self) -> bool {
        self.id.starts_with("./") || self.id.starts_with("../") || Path::new(&self.id).is_absolute()
    }
}

impl ConfigDocument {
    /// The document written by `filesmith config init`.
    pub fn starter() -> Self {
        Self {
            source: Some(Value::from("src")),
            destination: Some(Value::from("build")),
            clean: Some(Value::Bool(true)),
            frontmatter: Some(Value::Bool(true)),
            concurrency: None,
            metadata: Some(Value::Object(Metadata::new())),
            ignore: None,
            plugins: Some(Value::Object(serde_json::Map::new())),
        }
    }

    pub fn source(&self) -> Result<Option<&str>> {
        opt_str(self.source.as_ref(), "source")
    }

    pub fn destination(&self) -> Result<Option<&str>> {
        opt_str(self.destination.as_ref(), "destination")
    }

    pub fn clean(&self) -> Result<Option<bool>> {
        opt_bool(self.clean.as_ref(), "clean")
    }

    pub fn frontmatter(&self) -> Result<Option<bool>> {
        opt_bool(self.frontmatter.as_ref(), "frontmatter")
    }

    pub fn concurrency(&self) -> Result<Option<Concurrency>> {
        self.concurrency
            .as_ref()
            .map(Concurrency::from_value)
            .transpose()
    }

    pub fn metadata(&self) -> Result<Option<&Metadata>> {
        match &self.metadata {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(other) => Err(FilesmithError::config(format!(
                "`metadata` must be an object, got {other}"
            ))),
        }
    }

    /// Ignore patterns, in document order.
    pub fn ignore(&self) -> Result<Vec<String>> {
        match &self.ignore {
            None => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(vec![s.clone()]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(String::from).ok_or_else(|| {
                        FilesmithError::config(format!(
                            "`ignore` entries must be strings, got {item}"
                        ))
                    })
                })
                .collect(),
            Some(other) => Err(FilesmithError::config(format!(
                "`ignore` must be a string or a list of strings, got {other}"
            ))),
        }
    }

    /// Normalize `plugins` into an ordered list of specs.
    pub fn plugins(&self) -> Result<Vec<PluginSpec>> {
        let mut specs = Vec::new();
        match &self.plugins {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => push_specs(&mut specs, map),
            Some(Value::Array(items)) => {
                for item in items {
                    match item {
                        Value::Object(map) => push_specs(&mut specs, map),
                        Value::String(id) => specs.push(PluginSpec {
                            id: id.clone(),
                            options: Value::Null,
                        }),
                        other => {
                            return Err(FilesmithError::config(format!(
                                "`plugins` entries must be objects, got {other}"
                            )));
                        }
                    }
                }
            }
            Some(other) => {
                return Err(FilesmithError::config(format!(
                    "`plugins` must be an object or a list, got {other}"
                )));
            }
        }
        Ok(specs)
    }
}

fn push_specs(specs: &mut Vec<PluginSpec>, map: &serde_json::Map<String, Value>) {
    specs.extend(map.iter().map(|(id, options)| PluginSpec {
        id: id.clone(),
        options: options.clone(),
    }));
}

fn opt_str<'a>(value: Option<&'a Value>, key: &str) -> Result<Option<&'a str>> {
    match value {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(FilesmithError::config(format!(
            "`{key}` must be a string, got {other}"
        ))),
    }
}

fn opt_bool(value: Option<&Value>, key: &str) -> Result<Option<bool>> {
    match value {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(FilesmithError::config(format!(
            "`{key}` must be a boolean, got {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Locate the config file: `explicit` (relative to `dir`) or the default name.
pub fn find_config(dir: &Path, explicit: Option<&Path>) -> Result<PathBuf> {
    let path = dir.join(explicit.unwrap_or_else(|| Path::new(CONFIG_FILE_NAME)));
    if !path.is_file() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| CONFIG_FILE_NAME.to_string());
        return Err(FilesmithError::config(format!(
            "could not find a {name} configuration file."
        )));
    }
    Ok(path)
}

/// Load a config document from a specific path. `.toml` files are parsed
/// as TOML, everything else as JSON.
pub fn load_config_from(path: &Path) -> Result<ConfigDocument> {
    let content = std::fs::read_to_string(path).map_err(|e| FilesmithError::io(path, e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    let doc = if is_toml {
        toml::from_str(&content).map_err(|e| {
            FilesmithError::config(format!("failed to parse {}: {e}", path.display()))
        })?
    } else {
        serde_json::from_str(&content).map_err(|e| {
            FilesmithError::config(format!("failed to parse {}: {e}", path.display()))
        })?
    };

    tracing::debug!(?path, "loaded config document");
    Ok(doc)
}

/// Write the starter document into `dir`. Refuses to overwrite.
pub fn init_config(dir: &Path) -> Result<PathBuf> {
    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Err(FilesmithError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    let content = serde_json::to_string_pretty(&ConfigDocument::starter())
        .map_err(|e| FilesmithError::config(e.to_string()))?;
    std::fs::write(&path, content + "\n").map_err(|e| FilesmithError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
