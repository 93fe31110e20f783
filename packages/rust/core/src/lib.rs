//! Filesmith build pipeline.
//!
//! A [`Filesmith`] reads a source tree into a [`FileMap`], threads it
//! through an ordered list of [`Plugin`]s, and writes the result to a
//! destination tree:
//!
//! ```no_run
//! use filesmith_core::{Filesmith, Plugin};
//!
//! # async fn example() -> filesmith_core::Result<()> {
//! let mut smith = Filesmith::new("site")?;
//! smith
//!     .ignore("*.tmp")
//!     .use_plugin(Plugin::sync(|files, _| {
//!         files.retain(|path, _| !path.starts_with("drafts/"));
//!         Ok(())
//!     }));
//! smith.build().await?;
//! # Ok(())
//! # }
//! ```

pub mod frontmatter;
pub mod governor;
pub mod ignore;
pub mod pipeline;
pub mod plugin;
mod reader;
pub mod smith;
mod writer;

pub use governor::Governor;
pub use ignore::{IgnoreMatcher, IgnorePredicate, IgnoreRule};
pub use pipeline::{BuildSummary, ProgressReporter, SilentProgress};
pub use plugin::{Done, DoneDropped, Plugin, PluginKind, PluginResult};
pub use smith::{DEFAULT_DESTINATION, DEFAULT_SOURCE, Filesmith, resolve_path};

pub use filesmith_shared::{
    BoxError, Concurrency, FileMap, FileRecord, FileStats, FilesmithError, Metadata, Result,
};
