//! The merge pipeline: payloads in, committed values out.
//!
//! Every payload takes the same road regardless of where it came from:
//! decode by format, flatten into dotted keys, then write key by key.
//! What differs per entry point is the write mode. Static loads are
//! first-wins unless forced and always yield to watch-locked slots; watch
//! pushes overwrite and take the lock for their keys.

use std::sync::atomic::Ordering;

use tracing::debug;
use tracing::trace;

use crate::conf::config::Config;
use crate::decoder::flatten;
use crate::errors::Result;
use crate::errors::SourceError;
use crate::group::split_key;
use crate::group::SetMode;
use crate::source::DataSet;
use crate::source::Source;

impl Config {
    /// Merge one payload.
    ///
    /// With `force` false this is first-wins: options already set keep
    /// their value. With `force` true the payload overwrites, except for
    /// slots a watcher holds locked. Frozen options and unknown option
    /// names are reported to the error handler and skipped; keys whose
    /// group was never created are skipped silently. Decode failures and
    /// invalid values abort the merge and surface to the caller. Leftover
    /// arguments riding on the payload are stored under the same
    /// first-wins rule.
    pub fn load_data_set(&self, ds: &DataSet, force: bool) -> Result<()> {
        self.apply_data_set(ds, SetMode::merge(force))
    }

    pub(crate) fn apply_data_set(&self, ds: &DataSet, mode: SetMode) -> Result<()> {
        if ds.is_empty() {
            trace!(source = %ds.source(), "empty payload, nothing to merge");
            return Ok(());
        }
        let decoder = self
            .decoder_for(ds.format())
            .ok_or_else(|| SourceError::NoDecoder {
                id: ds.source().to_string(),
                format: ds.format().to_string(),
            })?;
        let raw = decoder(ds.data()).map_err(|source| SourceError::Decode {
            id: ds.source().to_string(),
            format: ds.format().to_string(),
            data: ds.data().to_vec(),
            source,
        })?;
        if raw.is_null() {
            trace!(source = %ds.source(), "payload decoded to nothing");
            return Ok(());
        }
        if !raw.is_object() {
            return Err(SourceError::Decode {
                id: ds.source().to_string(),
                format: ds.format().to_string(),
                data: ds.data().to_vec(),
                source: "top-level value is not a map".into(),
            }
            .into());
        }

        let flat = flatten(&raw);
        let registry = &self.inner.registry;
        let mut committed = 0usize;
        for (key, value) in &flat {
            let (group, name) = split_key(key);
            if !registry.has_group(group) {
                trace!(key = %key, "no matching group, skipping");
                continue;
            }
            match registry.set_raw(group, name, value, mode) {
                Ok(true) => committed += 1,
                Ok(false) => trace!(key = %key, "skipped by merge policy"),
                Err(err) if err.is_no_opt() || err.is_frozen() => registry.report(&err),
                Err(err) => return Err(err),
            }
        }
        if !ds.args().is_empty() {
            self.set_args(ds.args().to_vec(), !mode.only_if_unset);
        }
        debug!(
            source = %ds.source(),
            keys = flat.len(),
            committed,
            "merged payload"
        );
        Ok(())
    }

    /// Watch-push entry point: apply with the watch mode and route any
    /// failure to the error handler. Returns whether the payload merged.
    ///
    /// Pushes arriving after close are dropped, so the unlock performed
    /// by [`Config::close`] is final.
    pub(crate) fn apply_push(&self, ds: &DataSet) -> bool {
        if self.inner.closed.load(Ordering::SeqCst) {
            trace!(source = %ds.source(), "configuration closed, dropping push");
            return false;
        }
        let merged = match self.apply_data_set(ds, SetMode::watch()) {
            Ok(()) => true,
            Err(err) => {
                self.inner.registry.report(&err);
                false
            }
        };
        // A close racing this merge has already run its unlock; locks
        // taken by this push must not survive it.
        if self.inner.closed.load(Ordering::SeqCst) {
            self.inner.registry.unlock_all();
        }
        merged
    }

    /// Read a source once and merge its payload.
    pub async fn load_source_without_watch<S: Source>(&self, source: &S, force: bool) -> Result<()> {
        let ds = source.read().await?;
        self.load_data_set(&ds, force)
    }

    /// Read a source, merge its payload, then keep watching it for
    /// changes. Watched updates overwrite their keys and lock them
    /// against later static loads until the configuration closes.
    pub async fn load_source<S: Source>(&self, source: S, force: bool) -> Result<()> {
        self.load_source_without_watch(&source, force).await?;
        self.start_watch(&source).await
    }

    /// Start a source's watcher without an initial load.
    pub async fn start_watch<S: Source>(&self, source: &S) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            trace!(source = %source.id(), "configuration closed, not watching");
            return Ok(());
        }
        let push = self.make_push();
        if let Some(handle) = source.watch(push, self.inner.exit.clone()).await? {
            self.inner.watchers.lock().push(handle);
            debug!(source = %source.id(), "watching source");
        }
        Ok(())
    }
}
