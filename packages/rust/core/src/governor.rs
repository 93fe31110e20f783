//! Bounded concurrent execution of filesystem operations.
//!
//! Each [`Governor::run_all`] call owns its own permit pool, so separate
//! read and write calls never share a budget. Operations are polled from
//! the calling task; the blocking filesystem work inside them runs on
//! tokio's blocking pool, so at most `limit` of them are in flight.

use std::future::Future;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::Semaphore;
use tracing::debug;

use filesmith_shared::{Concurrency, FilesmithError, Result};

/// Runs a batch of fallible operations with at most `limit` in flight.
#[derive(Debug, Clone, Copy, Default)]
pub struct Governor {
    concurrency: Concurrency,
}

impl Governor {
    pub fn new(concurrency: Concurrency) -> Self {
        Self { concurrency }
    }

    pub fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    /// Run every operation and collect the results in completion order.
    ///
    /// An operation does not start until it holds a permit. On the first
    /// failure the permit pool is closed, the remaining operations are
    /// dropped without being started, and that failure is returned.
    pub async fn run_all<T, Fut>(&self, ops: impl IntoIterator<Item = Fut>) -> Result<Vec<T>>
    where
        Fut: Future<Output = Result<T>>,
    {
        // Limits past the permit ceiling can never be reached anyway.
        let semaphore = self
            .concurrency
            .limit()
            .map(|limit| Semaphore::new(limit.min(Semaphore::MAX_PERMITS)));

        let mut pending: FuturesUnordered<_> = ops
            .into_iter()
            .map(|op| {
                let semaphore = semaphore.as_ref();
                async move {
                    let _permit = match semaphore {
                        Some(sem) => Some(sem.acquire().await.map_err(|_| {
                            FilesmithError::config("operation pool closed before admission")
                        })?),
                        None => None,
                    };
                    op.await
                }
            })
            .collect();

        let total = pending.len();
        let mut results = Vec::with_capacity(total);

        while let Some(outcome) = pending.next().await {
            match outcome {
                Ok(value) => results.push(value),
                Err(err) => {
                    if let Some(sem) = &semaphore {
                        sem.close();
                    }
                    debug!(
                        completed = results.len(),
                        total,
                        "aborting remaining operations after failure"
                    );
                    return Err(err);
                }
            }
        }

        Ok(results)
    }
}
