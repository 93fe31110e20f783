//! Plugins and the three ways they can signal completion.
//!
//! - [`Plugin::sync`] returns its result directly.
//! - [`Plugin::callback`] receives a [`Done`] signal and must consume it.
//! - [`Plugin::deferred`] returns a future.
//!
//! Every plugin gets the same mutable file map and the build it belongs to.
//! Whatever error a plugin produces is passed through unchanged inside
//! [`FilesmithError::Plugin`].

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tracing::{debug, instrument};

use filesmith_shared::{BoxError, FileMap, FilesmithError, Result};

use crate::smith::Filesmith;

/// What a plugin hands back.
pub type PluginResult = std::result::Result<(), BoxError>;

type SyncFn = dyn Fn(&mut FileMap, &mut Filesmith) -> PluginResult + Send + Sync;
type CallbackFn = dyn Fn(&mut FileMap, &mut Filesmith, Done) + Send + Sync;
type DeferredFn = dyn for<'a> Fn(&'a mut FileMap, &'a mut Filesmith) -> BoxFuture<'a, PluginResult>
    + Send
    + Sync;

/// Completion convention of a plugin.
#[derive(Clone)]
pub enum PluginKind {
    Sync(Arc<SyncFn>),
    Callback(Arc<CallbackFn>),
    Deferred(Arc<DeferredFn>),
}

/// A named unit of work applied to the file map.
#[derive(Clone)]
pub struct Plugin {
    name: String,
    kind: PluginKind,
}

impl Plugin {
    /// A plugin that finishes when it returns.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&mut FileMap, &mut Filesmith) -> PluginResult + Send + Sync + 'static,
    {
        Self::from_kind(PluginKind::Sync(Arc::new(f)))
    }

    /// A plugin that finishes when it consumes its [`Done`] signal.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&mut FileMap, &mut Filesmith, Done) + Send + Sync + 'static,
    {
        Self::from_kind(PluginKind::Callback(Arc::new(f)))
    }

    /// A plugin that finishes when its future resolves.
    pub fn deferred<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut FileMap, &'a mut Filesmith) -> BoxFuture<'a, PluginResult>
            + Send
            + Sync
            + 'static,
    {
        Self::from_kind(PluginKind::Deferred(Arc::new(f)))
    }

    fn from_kind(kind: PluginKind) -> Self {
        Self {
            name: String::from("anonymous"),
            kind,
        }
    }

    /// Give the plugin a name for logs and error messages.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &PluginKind {
        &self.kind
    }

    /// Run the plugin to completion.
    #[instrument(skip_all, fields(plugin = %self.name))]
    pub async fn invoke(&self, files: &mut FileMap, smith: &mut Filesmith) -> Result<()> {
        let outcome = match &self.kind {
            PluginKind::Sync(f) => f(files, smith),
            PluginKind::Callback(f) => {
                let (tx, rx) = oneshot::channel();
                f(files, smith, Done { tx });
                match rx.await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(Box::new(DoneDropped {
                        plugin: self.name.clone(),
                    }) as BoxError),
                }
            }
            PluginKind::Deferred(f) => f(files, smith).await,
        };

        match outcome {
            Ok(()) => {
                debug!(files = files.len(), "plugin finished");
                Ok(())
            }
            Err(err) => {
                debug!(error = %err, "plugin failed");
                Err(FilesmithError::Plugin(err))
            }
        }
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            PluginKind::Sync(_) => "sync",
            PluginKind::Callback(_) => "callback",
            PluginKind::Deferred(_) => "deferred",
        };
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Completion signal
// ---------------------------------------------------------------------------

/// One-shot completion signal handed to callback plugins.
///
/// Consuming it with [`Done::ok`], [`Done::fail`] or [`Done::finish`]
/// resumes the build. Dropping it unsignalled fails the build.
#[derive(Debug)]
pub struct Done {
    tx: oneshot::Sender<PluginResult>,
}

impl Done {
    pub fn ok(self) {
        self.finish(Ok(()));
    }

    pub fn fail(self, err: impl Into<BoxError>) {
        self.finish(Err(err.into()));
    }

    pub fn finish(self, outcome: PluginResult) {
        // The runner may already be gone if the build was cancelled.
        let _ = self.tx.send(outcome);
    }
}

/// Raised when a callback plugin drops its [`Done`] without signalling.
#[derive(Debug, thiserror::Error)]
#[error("plugin \"{plugin}\" dropped its completion signal without calling it")]
pub struct DoneDropped {
    pub plugin: String,
}
