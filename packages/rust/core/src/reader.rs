//! Directory reader: walks a tree and loads every file into a [`FileMap`].

use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use filesmith_shared::{FileMap, FileRecord, FileStats, FilesmithError, Metadata, Result};

use crate::frontmatter;
use crate::governor::Governor;
use crate::ignore::{IgnoreMatcher, normalize};
use crate::smith::{Filesmith, resolve_path};

impl Filesmith {
    /// Read the source directory.
    pub async fn read(&self) -> Result<FileMap> {
        self.read_dir(self.source()).await
    }

    /// Read every non-ignored file under `dir` (relative to the working
    /// directory). Keys are `/`-separated paths relative to `dir`.
    /// Symbolic links are followed; ignored directories are not entered.
    #[instrument(skip_all, fields(dir = %dir.as_ref().display()))]
    pub async fn read_dir(&self, dir: impl AsRef<Path>) -> Result<FileMap> {
        let start = Instant::now();
        let root = resolve_path(self.directory(), dir.as_ref());
        let matcher = IgnoreMatcher::new(self.ignores())?;

        let walk_root = root.clone();
        let entries = tokio::task::spawn_blocking(move || walk(&walk_root, &matcher))
            .await
            .map_err(|e| join_failure(&root, e))??;
        debug!(count = entries.len(), "walk complete");

        let frontmatter = self.frontmatter();
        let records = Governor::new(self.concurrency())
            .run_all(entries.into_iter().map(|(key, path)| async move {
                let record = read_record(&path, frontmatter).await?;
                Ok::<_, FilesmithError>((key, record))
            }))
            .await?;

        let files: FileMap = records.into_iter().collect();
        info!(
            files = files.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "read complete"
        );
        Ok(files)
    }

    /// Read one file. Relative paths resolve against the source directory.
    pub async fn read_file(&self, path: impl AsRef<Path>) -> Result<FileRecord> {
        let path = resolve_path(&self.source(), path.as_ref());
        read_record(&path, self.frontmatter()).await
    }
}

/// Load one file: stats, mode, contents, and front matter when enabled and
/// the contents are valid UTF-8.
pub(crate) async fn read_record(path: &Path, frontmatter: bool) -> Result<FileRecord> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| FilesmithError::io(path, e))?;
    let is_symlink = tokio::fs::symlink_metadata(path)
        .await
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    let stats = FileStats::from_metadata(&meta, is_symlink);

    let buffer = tokio::fs::read(path)
        .await
        .map_err(|e| FilesmithError::io(path, e))?;

    let mut record = FileRecord {
        contents: buffer,
        mode: Some(stats.mode_string()),
        stats: Some(stats),
        data: Metadata::new(),
    };

    if frontmatter {
        let parsed = match std::str::from_utf8(&record.contents) {
            Ok(text) => frontmatter::parse(text)
                .map_err(|e| FilesmithError::front_matter(path, e.to_string()))?
                .map(|fm| (fm.attributes, fm.body.as_bytes().to_vec())),
            Err(_) => None,
        };
        if let Some((attributes, body)) = parsed {
            record.contents = body;
            record.merge_attributes(attributes);
        }
    }

    Ok(record)
}

/// Collect `(key, absolute path)` for every regular file under `root`.
fn walk(root: &Path, matcher: &IgnoreMatcher) -> Result<Vec<(String, PathBuf)>> {
    let meta = std::fs::metadata(root).map_err(|e| FilesmithError::io(root, e))?;
    if !meta.is_dir() {
        return Err(FilesmithError::io(
            root,
            io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
        ));
    }

    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || matcher.is_empty() {
                return true;
            }
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            match entry.metadata() {
                Ok(meta) => {
                    let stats = FileStats::from_metadata(&meta, entry.path_is_symlink());
                    !matcher.is_ignored(rel, &stats)
                }
                // Surface the failure when the entry itself is yielded.
                Err(_) => true,
            }
        });

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry.map_err(walk_error)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        entries.push((normalize(rel), entry.path().to_path_buf()));
    }
    Ok(entries)
}

fn walk_error(err: walkdir::Error) -> FilesmithError {
    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
    let message = err.to_string();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::other(message));
    FilesmithError::io(path, source)
}

/// A panicking walker is re-raised; a cancelled one becomes an I/O error.
pub(crate) fn join_failure(path: &Path, err: tokio::task::JoinError) -> FilesmithError {
    if err.is_panic() {
        std::panic::resume_unwind(err.into_panic());
    }
    FilesmithError::io(path, io::Error::new(io::ErrorKind::Interrupted, err.to_string()))
}
