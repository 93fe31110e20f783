//! The build configuration object.
//!
//! [`Filesmith`] holds every setting a build needs plus the ordered plugin
//! and ignore lists. Relative source and destination paths are stored as
//! given and resolved against the working directory each time they are read,
//! so changing the working directory later moves them too.

use std::path::{Component, Path, PathBuf};

use tracing::debug;

use filesmith_shared::{Concurrency, ConfigDocument, FilesmithError, Metadata, Result};

use crate::ignore::IgnoreRule;
use crate::plugin::Plugin;

/// Default source directory, relative to the working directory.
pub const DEFAULT_SOURCE: &str = "src";
/// Default destination directory, relative to the working directory.
pub const DEFAULT_DESTINATION: &str = "build";

/// A build: directories, switches, shared metadata, plugins and ignores.
#[derive(Debug, Clone)]
pub struct Filesmith {
    directory: PathBuf,
    source: PathBuf,
    destination: PathBuf,
    clean: bool,
    frontmatter: bool,
    concurrency: Concurrency,
    metadata: Metadata,
    plugins: Vec<Plugin>,
    ignores: Vec<IgnoreRule>,
}

impl Filesmith {
    /// Create a build rooted at `directory`, resolved against the process
    /// working directory now.
    pub fn new(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = absolute(directory.as_ref())?;
        debug!(directory = %directory.display(), "new build");
        Ok(Self {
            directory,
            source: PathBuf::from(DEFAULT_SOURCE),
            destination: PathBuf::from(DEFAULT_DESTINATION),
            clean: true,
            frontmatter: true,
            concurrency: Concurrency::Unbounded,
            metadata: Metadata::new(),
            plugins: Vec::new(),
            ignores: Vec::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Directories
    // -----------------------------------------------------------------------

    /// Absolute working directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Replace the working directory. Relative values resolve against the
    /// process working directory.
    pub fn set_directory(&mut self, directory: impl AsRef<Path>) -> Result<&mut Self> {
        self.directory = absolute(directory.as_ref())?;
        Ok(self)
    }

    /// Absolute source directory.
    pub fn source(&self) -> PathBuf {
        resolve_path(&self.directory, &self.source)
    }

    pub fn set_source(&mut self, source: impl Into<PathBuf>) -> &mut Self {
        self.source = source.into();
        self
    }

    /// Absolute destination directory.
    pub fn destination(&self) -> PathBuf {
        resolve_path(&self.directory, &self.destination)
    }

    pub fn set_destination(&mut self, destination: impl Into<PathBuf>) -> &mut Self {
        self.destination = destination.into();
        self
    }

    /// Resolve `segments` against the working directory.
    pub fn path<I>(&self, segments: I) -> PathBuf
    where
        I: IntoIterator,
        I::Item: AsRef<Path>,
    {
        let joined = segments
            .into_iter()
            .fold(PathBuf::new(), |acc, seg| acc.join(seg));
        resolve_path(&self.directory, &joined)
    }

    // -----------------------------------------------------------------------
    // Switches
    // -----------------------------------------------------------------------

    /// Whether the destination is removed before writing.
    pub fn clean(&self) -> bool {
        self.clean
    }

    pub fn set_clean(&mut self, clean: bool) -> &mut Self {
        self.clean = clean;
        self
    }

    /// Whether front matter is parsed on read.
    pub fn frontmatter(&self) -> bool {
        self.frontmatter
    }

    pub fn set_frontmatter(&mut self, frontmatter: bool) -> &mut Self {
        self.frontmatter = frontmatter;
        self
    }

    pub fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    /// Limit simultaneous filesystem operations. Zero is rejected.
    pub fn set_concurrency(&mut self, limit: usize) -> Result<&mut Self> {
        self.concurrency = Concurrency::limited(limit)?;
        Ok(self)
    }

    pub fn set_concurrency_limit(&mut self, concurrency: Concurrency) -> &mut Self {
        self.concurrency = concurrency;
        self
    }

    // -----------------------------------------------------------------------
    // Metadata
    // -----------------------------------------------------------------------

    /// Shared metadata visible to every plugin.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Replace metadata from an untyped value. Only objects are accepted.
    pub fn set_metadata(&mut self, metadata: serde_json::Value) -> Result<&mut Self> {
        match metadata {
            serde_json::Value::Object(map) => {
                self.metadata = map;
                Ok(self)
            }
            other => Err(FilesmithError::config(format!(
                "metadata must be an object, got {other}"
            ))),
        }
    }

    /// Replace metadata with a copy of `metadata`.
    pub fn set_metadata_map(&mut self, metadata: &Metadata) -> &mut Self {
        self.metadata = metadata.clone();
        self
    }

    // -----------------------------------------------------------------------
    // Plugins and ignores
    // -----------------------------------------------------------------------

    /// Append a plugin. Plugins run in registration order.
    pub fn use_plugin(&mut self, plugin: Plugin) -> &mut Self {
        debug!(plugin = plugin.name(), index = self.plugins.len(), "plugin registered");
        self.plugins.push(plugin);
        self
    }

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    /// Append an ignore rule: a pattern string or [`IgnoreRule::predicate`].
    pub fn ignore(&mut self, rule: impl Into<IgnoreRule>) -> &mut Self {
        self.ignores.push(rule.into());
        self
    }

    /// Append several ignore rules at once.
    pub fn ignore_all<I>(&mut self, rules: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<IgnoreRule>,
    {
        self.ignores.extend(rules.into_iter().map(Into::into));
        self
    }

    pub fn ignores(&self) -> &[IgnoreRule] {
        &self.ignores
    }

    /// The live ignore list. Edits are seen by the next read.
    pub fn ignores_mut(&mut self) -> &mut Vec<IgnoreRule> {
        &mut self.ignores
    }

    // -----------------------------------------------------------------------
    // Configuration documents
    // -----------------------------------------------------------------------

    /// Apply every setting present in `doc`. Plugins are not touched; the
    /// caller resolves them. Nothing is applied unless every value is valid.
    pub fn configure(&mut self, doc: &ConfigDocument) -> Result<&mut Self> {
        let source = doc.source()?;
        let destination = doc.destination()?;
        let clean = doc.clean()?;
        let frontmatter = doc.frontmatter()?;
        let concurrency = doc.concurrency()?;
        let metadata = doc.metadata()?;
        let ignore = doc.ignore()?;

        if let Some(source) = source {
            self.set_source(source);
        }
        if let Some(destination) = destination {
            self.set_destination(destination);
        }
        if let Some(clean) = clean {
            self.set_clean(clean);
        }
        if let Some(frontmatter) = frontmatter {
            self.set_frontmatter(frontmatter);
        }
        if let Some(concurrency) = concurrency {
            self.set_concurrency_limit(concurrency);
        }
        if let Some(metadata) = metadata {
            self.set_metadata_map(metadata);
        }
        self.ignore_all(ignore);
        Ok(self)
    }
}

/// Resolve `directory` against the process working directory.
fn absolute(directory: &Path) -> Result<PathBuf> {
    if directory.is_absolute() {
        return Ok(normalize_lexically(directory));
    }
    let cwd = std::env::current_dir().map_err(|e| FilesmithError::io(".", e))?;
    Ok(resolve_path(&cwd, directory))
}

/// Join `path` onto `base` (unless already absolute) and fold away `.` and
/// `..` components without touching the filesystem.
pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_lexically(path)
    } else {
        normalize_lexically(&base.join(path))
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
