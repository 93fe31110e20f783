//! Build orchestration: read → plugins → (clean) → write.

use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use filesmith_shared::{FileMap, FilesmithError, Result};

use crate::plugin::Plugin;
use crate::smith::Filesmith;

/// Summary handed to [`ProgressReporter::done`].
#[derive(Debug, Clone)]
pub struct BuildSummary {
    /// Number of records in the final map.
    pub files: usize,
    /// Where the files were written, or `None` for an in-memory run.
    pub destination: Option<PathBuf>,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before each plugin runs. `current` is 1-based.
    fn plugin_started(&self, name: &str, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, summary: &BuildSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn plugin_started(&self, _name: &str, _current: usize, _total: usize) {}
    fn done(&self, _summary: &BuildSummary) {}
}

impl Filesmith {
    /// Run the registered plugins over `files`.
    pub async fn run(&mut self, files: &mut FileMap) -> Result<()> {
        let plugins = self.plugins().to_vec();
        self.run_plugins(files, &plugins, &SilentProgress).await
    }

    /// Run an explicit plugin list over `files` instead of the registered one.
    pub async fn run_with(&mut self, files: &mut FileMap, plugins: &[Plugin]) -> Result<()> {
        self.run_plugins(files, plugins, &SilentProgress).await
    }

    /// Each plugin starts only after the previous one finished; the first
    /// failure stops the run.
    #[instrument(skip_all, fields(plugins = plugins.len()))]
    async fn run_plugins(
        &mut self,
        files: &mut FileMap,
        plugins: &[Plugin],
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        let total = plugins.len();
        for (i, plugin) in plugins.iter().enumerate() {
            progress.plugin_started(plugin.name(), i + 1, total);
            debug!(plugin = plugin.name(), index = i, "running plugin");
            plugin.invoke(files, self).await?;
        }
        Ok(())
    }

    /// Read the source and run every plugin without writing anything.
    pub async fn process(&mut self) -> Result<FileMap> {
        self.process_with(&SilentProgress).await
    }

    #[instrument(skip_all, fields(source = %self.source().display()))]
    pub async fn process_with(&mut self, progress: &dyn ProgressReporter) -> Result<FileMap> {
        let start = Instant::now();
        let files = self.read_and_run(progress).await?;
        progress.done(&BuildSummary {
            files: files.len(),
            destination: None,
            elapsed: start.elapsed(),
        });
        Ok(files)
    }

    /// Read, run plugins, clean the destination if enabled, then write.
    /// Returns the map that was written.
    pub async fn build(&mut self) -> Result<FileMap> {
        self.build_with(&SilentProgress).await
    }

    #[instrument(
        skip_all,
        fields(source = %self.source().display(), destination = %self.destination().display())
    )]
    pub async fn build_with(&mut self, progress: &dyn ProgressReporter) -> Result<FileMap> {
        let start = Instant::now();
        info!(clean = self.clean(), concurrency = %self.concurrency(), "starting build");

        let files = self.read_and_run(progress).await?;

        // Plugins may have changed the destination or the clean switch.
        let destination = self.destination();
        if self.clean() {
            progress.phase("Cleaning destination");
            remove_destination(&destination).await?;
        }

        progress.phase("Writing files");
        self.write(&files).await?;

        let summary = BuildSummary {
            files: files.len(),
            destination: Some(destination),
            elapsed: start.elapsed(),
        };
        info!(
            files = summary.files,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "build complete"
        );
        progress.done(&summary);
        Ok(files)
    }

    async fn read_and_run(&mut self, progress: &dyn ProgressReporter) -> Result<FileMap> {
        progress.phase("Reading source");
        let mut files = self.read().await?;

        progress.phase("Running plugins");
        let plugins = self.plugins().to_vec();
        self.run_plugins(&mut files, &plugins, progress).await?;
        Ok(files)
    }
}

async fn remove_destination(destination: &std::path::Path) -> Result<()> {
    match tokio::fs::remove_dir_all(destination).await {
        Ok(()) => {
            debug!(path = %destination.display(), "removed destination");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %destination.display(), "destination absent, nothing to clean");
            Ok(())
        }
        Err(e) => {
            warn!(path = %destination.display(), error = %e, "failed to clean destination");
            Err(FilesmithError::io(destination, e))
        }
    }
}
