//! Directory writer: materializes a [`FileMap`] on disk.

use std::io;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, instrument};

use filesmith_shared::{FileMap, FileRecord, FilesmithError, Result, parse_mode};

use crate::governor::Governor;
use crate::smith::{Filesmith, resolve_path};

impl Filesmith {
    /// Write `files` into the destination directory.
    pub async fn write(&self, files: &FileMap) -> Result<()> {
        self.write_dir(files, self.destination()).await
    }

    /// Write every record under `dir` (relative to the working directory),
    /// creating parent directories and applying each record's mode.
    #[instrument(skip_all, fields(dir = %dir.as_ref().display(), files = files.len()))]
    pub async fn write_dir(&self, files: &FileMap, dir: impl AsRef<Path>) -> Result<()> {
        let start = Instant::now();
        let root = resolve_path(self.directory(), dir.as_ref());

        Governor::new(self.concurrency())
            .run_all(files.iter().map(|(key, record)| {
                let target = root.join(key);
                async move { write_record(&target, record).await }
            }))
            .await?;

        info!(
            files = files.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "write complete"
        );
        Ok(())
    }

    /// Write one record. Relative paths resolve against the destination.
    pub async fn write_file(&self, path: impl AsRef<Path>, record: &FileRecord) -> Result<()> {
        let path = resolve_path(&self.destination(), path.as_ref());
        write_record(&path, record).await
    }
}

pub(crate) async fn write_record(path: &Path, record: &FileRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FilesmithError::io(parent, e))?;
    }
    tokio::fs::write(path, &record.contents)
        .await
        .map_err(|e| FilesmithError::io(path, e))?;

    if let Some(mode) = &record.mode {
        apply_mode(path, mode).await?;
    }
    debug!(path = %path.display(), bytes = record.contents.len(), "wrote file");
    Ok(())
}

async fn apply_mode(path: &Path, mode: &str) -> Result<()> {
    let bits = parse_mode(mode).ok_or_else(|| {
        FilesmithError::io(
            path,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid file mode {mode:?}"),
            ),
        )
    })?;
    tokio::fs::set_permissions(path, permissions_for(path, bits).await?)
        .await
        .map_err(|e| FilesmithError::io(path, e))
}

#[cfg(unix)]
async fn permissions_for(_path: &Path, bits: u32) -> Result<std::fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Ok(std::fs::Permissions::from_mode(bits))
}

#[cfg(not(unix))]
async fn permissions_for(path: &Path, bits: u32) -> Result<std::fs::Permissions> {
    let mut perms = tokio::fs::metadata(path)
        .await
        .map_err(|e| FilesmithError::io(path, e))?
        .permissions();
    perms.set_readonly(bits & 0o222 == 0);
    Ok(perms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn files() -> FileMap {
        let mut files = FileMap::new();
        files.insert("index.html".into(), FileRecord::new("<h1>hi</h1>"));
        files.insert("deep/er/page.html".into(), FileRecord::new("deep"));
        files
    }

    #[tokio::test]
    async fn writes_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let smith = Filesmith::new(dir.path()).unwrap();
        smith.write(&files()).await.unwrap();

        let build = dir.path().join("build");
        assert_eq!(fs::read_to_string(build.join("index.html")).unwrap(), "<h1>hi</h1>");
        assert_eq!(fs::read_to_string(build.join("deep/er/page.html")).unwrap(), "deep");
    }

    #[tokio::test]
    async fn write_file_resolves_against_destination() {
        let dir = tempfile::tempdir().unwrap();
        let mut smith = Filesmith::new(dir.path()).unwrap();
        smith.set_destination("out");
        smith
            .write_file("a/b.txt", &FileRecord::new("x"))
            .await
            .unwrap();
        assert_eq!(fs::read(dir.path().join("out/a/b.txt")).unwrap(), b"x");
    }

    #[tokio::test]
    async fn empty_map_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let smith = Filesmith::new(dir.path()).unwrap();
        smith.write(&FileMap::new()).await.unwrap();
        assert!(!dir.path().join("build").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn applies_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let smith = Filesmith::new(dir.path()).unwrap();
        let mut map = FileMap::new();
        map.insert("run.sh".into(), FileRecord::new("#!/bin/sh\n").with_mode("0777"));
        smith.write(&map).await.unwrap();

        let meta = fs::metadata(dir.path().join("build/run.sh")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o7777, 0o777);
    }

    #[tokio::test]
    async fn invalid_mode_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let smith = Filesmith::new(dir.path()).unwrap();
        let mut map = FileMap::new();
        map.insert("x".into(), FileRecord::new("x").with_mode("rwx"));
        let err = smith.write(&map).await.unwrap_err();
        match err {
            FilesmithError::Io { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::InvalidInput)
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
