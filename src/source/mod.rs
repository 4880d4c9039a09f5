//! Configuration sources.
//!
//! A [`Source`] produces payloads and may push fresh ones through a
//! [`WatchPush`] until told to stop. [`FileSource`] and [`EnvSource`]
//! cover the common cases; anything implementing the trait can feed a
//! [`Config`](crate::Config).

mod dataset;
mod env;
mod file;

pub use dataset::DataSet;
pub use env::EnvSource;
pub use file::FileSource;

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::errors::Result;

/// Push one freshly-read payload, or the failure to read it, into the
/// merge pipeline.
///
/// Returns whether the payload was decoded and merged; pushing an error
/// always returns false. Watchers that track a last-pushed state should
/// only advance it on true, so rejected payloads get retried.
pub type WatchPush = Arc<dyn Fn(Result<DataSet>) -> bool + Send + Sync>;

/// A provider of configuration payloads.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Source: Send + Sync + 'static {
    /// Stable identity used in logs and errors.
    fn id(&self) -> String;

    /// Read the current payload.
    async fn read(&self) -> Result<DataSet>;

    /// Start a background task pushing updates until `exit` fires.
    ///
    /// Sources without a live feed keep the default and return `Ok(None)`.
    async fn watch(
        &self,
        push: WatchPush,
        exit: CancellationToken,
    ) -> Result<Option<JoinHandle<()>>> {
        let _ = (push, exit);
        Ok(None)
    }
}

#[cfg(test)]
mod env_test;
#[cfg(test)]
mod file_test;
