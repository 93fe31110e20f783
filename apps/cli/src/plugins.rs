//! Plugin registry: turns configuration entries into runnable plugins.
//!
//! Built-in identifiers map to in-process plugins. Local paths (`./x`,
//! `../x`, `/x`) name executables that receive the file map on stdin and
//! return it on stdout as JSON.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use color_eyre::eyre::{Result, WrapErr, eyre};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use filesmith_core::{BoxError, FileMap, Filesmith, Metadata, Plugin, PluginResult};
use filesmith_shared::PluginSpec;

/// Identifiers resolved without touching the filesystem.
pub(crate) const BUILTINS: [&str; 2] = ["drafts", "metadata"];

/// Resolve one configuration entry. Local paths resolve against `base`.
pub(crate) fn resolve(spec: &PluginSpec, base: &Path) -> Result<Plugin> {
    let built = match spec.id.as_str() {
        "drafts" => drafts(&spec.options),
        "metadata" => metadata(&spec.options),
        _ if spec.is_local() => {
            let program = base.join(&spec.id);
            if !program.is_file() {
                return Err(eyre!("failed to require plugin \"{}\".", spec.id));
            }
            Ok(external(program, spec.options.clone()))
        }
        _ => {
            debug!(id = %spec.id, builtins = ?BUILTINS, "unknown plugin identifier");
            return Err(eyre!("failed to require plugin \"{}\".", spec.id));
        }
    };

    built
        .map(|plugin| plugin.named(spec.id.clone()))
        .map_err(|e| eyre!(e))
        .wrap_err_with(|| format!("error using plugin \"{}\"...", spec.id))
}

// ---------------------------------------------------------------------------
// Built-ins
// ---------------------------------------------------------------------------

/// Remove records marked `draft: true`.
///
/// Options: `true` keeps drafts, or `{ "include": bool, "default": bool }`
/// where `default` applies to records without a `draft` key.
fn drafts(options: &Value) -> std::result::Result<Plugin, BoxError> {
    let (include, default) = match options {
        Value::Null => (false, false),
        Value::Bool(include) => (*include, false),
        Value::Object(map) => (
            flag(map, "include")?.unwrap_or(false),
            flag(map, "default")?.unwrap_or(false),
        ),
        other => return Err(format!("options must be a boolean or an object, got {other}").into()),
    };

    Ok(Plugin::sync(move |files, _| {
        if include {
            return Ok(());
        }
        let before = files.len();
        files.retain(|_, record| {
            let is_draft = record.get("draft").and_then(Value::as_bool).unwrap_or(default);
            !is_draft
        });
        debug!(removed = before - files.len(), "drafts removed");
        Ok(())
    }))
}

/// Merge the options object into the shared metadata.
fn metadata(options: &Value) -> std::result::Result<Plugin, BoxError> {
    let extra = match options {
        Value::Object(map) => map.clone(),
        Value::Null => Metadata::new(),
        other => return Err(format!("options must be an object, got {other}").into()),
    };

    Ok(Plugin::sync(move |_, smith| {
        let metadata = smith.metadata_mut();
        for (key, value) in &extra {
            metadata.insert(key.clone(), value.clone());
        }
        Ok(())
    }))
}

fn flag(map: &Metadata, key: &str) -> std::result::Result<Option<bool>, BoxError> {
    match map.get(key) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(format!("`{key}` must be a boolean, got {other}").into()),
    }
}

// ---------------------------------------------------------------------------
// External executables
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Request<'a> {
    files: &'a FileMap,
    metadata: &'a Metadata,
    options: &'a Value,
}

#[derive(Deserialize)]
struct Response {
    files: FileMap,
    #[serde(default)]
    metadata: Option<Metadata>,
}

/// Raised when an external plugin exits unsuccessfully.
#[derive(Debug, thiserror::Error)]
#[error("plugin {program:?} exited with {status}: {stderr}")]
pub(crate) struct ExternalPluginError {
    pub program: PathBuf,
    pub status: std::process::ExitStatus,
    pub stderr: String,
}

fn external(program: PathBuf, options: Value) -> Plugin {
    Plugin::deferred(move |files, smith| {
        let program = program.clone();
        let options = options.clone();
        Box::pin(async move { run_external(&program, &options, files, smith).await })
    })
}

async fn run_external(
    program: &Path,
    options: &Value,
    files: &mut FileMap,
    smith: &mut Filesmith,
) -> PluginResult {
    let request = serde_json::to_vec(&Request {
        files,
        metadata: smith.metadata(),
        options,
    })?;

    let mut child = tokio::process::Command::new(program)
        .current_dir(smith.directory())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let mut stdin = child.stdin.take().ok_or("plugin stdin unavailable")?;

    let feed = async move {
        stdin.write_all(&request).await?;
        stdin.shutdown().await
    };
    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    let output = output?;

    if !output.status.success() {
        return Err(ExternalPluginError {
            program: program.to_path_buf(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }
    fed?;

    let response: Response = serde_json::from_slice(&output.stdout)?;
    debug!(
        program = %program.display(),
        files = response.files.len(),
        "external plugin finished"
    );
    *files = response.files;
    if let Some(metadata) = response.metadata {
        *smith.metadata_mut() = metadata;
    }
    Ok(())
}
