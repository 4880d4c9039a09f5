use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use crate::errors::Result;
use crate::errors::SourceError;
use crate::source::dataset::checksum;
use crate::source::DataSet;
use crate::source::Source;
use crate::source::WatchPush;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Reads one configuration file and watches it by polling.
///
/// The format defaults to the file extension (`app.toml` decodes as
/// `toml`); extension-less paths fall back to `json`. Watching polls the
/// file on an interval (ten seconds by default) and pushes the payload
/// only when its checksum changed since the last accepted push, so
/// rewrites with identical content stay silent.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    format: String,
    poll_interval: Duration,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| "json".to_string());
        FileSource {
            path,
            format,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the format derived from the extension.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into().trim().to_ascii_lowercase();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl Source for FileSource {
    fn id(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn read(&self) -> Result<DataSet> {
        let data = tokio::fs::read(&self.path)
            .await
            .map_err(|e| SourceError::Read {
                id: self.id(),
                source: e.into(),
            })?;
        Ok(DataSet::new(self.id(), self.format.clone(), data))
    }

    async fn watch(
        &self,
        push: WatchPush,
        exit: CancellationToken,
    ) -> Result<Option<JoinHandle<()>>> {
        // Baseline against the current content so the first tick only
        // pushes a real change, not what the caller just loaded.
        let mut last = match tokio::fs::read(&self.path).await {
            Ok(data) => Some(checksum(&data)),
            Err(_) => None,
        };

        let id = self.id();
        let path = self.path.clone();
        let format = self.format.clone();
        let poll_interval = self.poll_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = exit.cancelled() => {
                        debug!(source = %id, "file watch stopped");
                        return;
                    }
                    _ = ticker.tick() => {}
                }
                match tokio::fs::read(&path).await {
                    Ok(data) => {
                        let digest = checksum(&data);
                        if last != Some(digest) {
                            trace!(source = %id, "file changed, pushing payload");
                            // A rejected payload leaves the baseline alone,
                            // so the next tick retries it.
                            if push(Ok(DataSet::new(id.clone(), format.clone(), data))) {
                                last = Some(digest);
                            }
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        trace!(source = %id, "file missing, treating as no change");
                    }
                    Err(e) => {
                        push(Err(SourceError::Watch {
                            id: id.clone(),
                            source: e.into(),
                        }
                        .into()));
                    }
                }
            }
        });
        Ok(Some(handle))
    }
}
