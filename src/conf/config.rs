//! The configuration engine handle.
//!
//! [`Config`] ties the pieces together: the option registry, the decoder
//! table, stored command-line arguments and the watch lifecycle. Handles
//! are cheap clones of one shared engine; dropping the last one cancels
//! every watcher it started.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::decoder::decode_json;
use crate::decoder::decode_toml;
use crate::decoder::decode_yaml;
use crate::decoder::Decoder;
use crate::errors::BoxError;
use crate::errors::ErrorHandler;
use crate::errors::Result;
use crate::group::split_key;
use crate::group::OptGroup;
use crate::group::Registry;
use crate::group::SetMode;
use crate::opt::RawValue;
use crate::opt::Value;
use crate::source::DataSet;
use crate::source::WatchPush;

/// A runtime option registry with live reconfiguration.
///
/// ```
/// use reconf::Config;
/// use reconf::Opt;
///
/// let config = Config::new();
/// let server = config.group("server")?;
/// server.register(Opt::int("port").with_default(8080))?;
///
/// assert_eq!(server.get_int("port")?, 8080);
/// server.set("port", 9090)?;
/// assert_eq!(server.get_int("port")?, 9090);
/// # Ok::<(), reconf::Error>(())
/// ```
#[derive(Clone)]
pub struct Config {
    pub(crate) inner: Arc<ConfigInner>,
}

pub(crate) struct ConfigInner {
    pub(crate) registry: Arc<Registry>,
    pub(crate) decoders: DashMap<String, Decoder>,
    pub(crate) decoder_aliases: DashMap<String, String>,
    pub(crate) args: RwLock<Option<Vec<String>>>,
    pub(crate) exit: CancellationToken,
    pub(crate) watchers: Mutex<Vec<JoinHandle<()>>>,
    pub(crate) closed: AtomicBool,
}

impl Config {
    /// Fresh engine with the JSON, TOML and YAML decoders installed and
    /// `yml` aliased to `yaml`.
    pub fn new() -> Self {
        let config = Config {
            inner: Arc::new(ConfigInner {
                registry: Arc::new(Registry::new()),
                decoders: DashMap::new(),
                decoder_aliases: DashMap::new(),
                args: RwLock::new(None),
                exit: CancellationToken::new(),
                watchers: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        };
        config.register_decoder("json", decode_json);
        config.register_decoder("toml", decode_toml);
        config.register_decoder("yaml", decode_yaml);
        config.alias_decoder("yml", "yaml");
        config
    }

    /// Handle for the root group.
    pub fn root(&self) -> OptGroup {
        OptGroup::new(String::new(), self.inner.registry.clone())
    }

    /// Handle for a group, created on first use.
    pub fn group(&self, path: &str) -> Result<OptGroup> {
        self.root().group(path)
    }

    pub fn has_group(&self, path: &str) -> bool {
        self.inner.registry.has_group(path)
    }

    pub fn has_opt(&self, key: &str) -> bool {
        let (group, name) = split_key(key);
        self.inner.registry.has_opt(group, name)
    }

    /// Current value for a dotted key.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let (group, name) = split_key(key);
        self.inner.registry.get(group, name)
    }

    /// Direct write to a dotted key, overwriting merge state and watch
    /// locks.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<bool> {
        let (group, name) = split_key(key);
        self.inner
            .registry
            .set_typed(group, name, value.into(), SetMode::direct())
    }

    /// Install a decoder under a format name, replacing any existing one.
    pub fn register_decoder<F>(&self, format: &str, decoder: F)
    where
        F: Fn(&[u8]) -> std::result::Result<RawValue, BoxError> + Send + Sync + 'static,
    {
        let format = format.trim().to_ascii_lowercase();
        self.inner.decoders.insert(format, Arc::new(decoder) as Decoder);
    }

    /// Make `alias` resolve to `target` when looking decoders up.
    pub fn alias_decoder(&self, alias: &str, target: &str) {
        let alias = alias.trim().to_ascii_lowercase();
        let target = target.trim().to_ascii_lowercase();
        self.inner.decoder_aliases.insert(alias, target);
    }

    /// Decoder for a format name, chasing aliases a bounded number of
    /// hops so alias cycles cannot spin forever.
    pub fn decoder_for(&self, format: &str) -> Option<Decoder> {
        let mut name = format.trim().to_ascii_lowercase();
        for _ in 0..8 {
            if let Some(decoder) = self.inner.decoders.get(&name) {
                return Some(decoder.value().clone());
            }
            match self.inner.decoder_aliases.get(&name) {
                Some(target) => name = target.value().clone(),
                None => return None,
            }
        }
        None
    }

    /// Register an observer invoked after every committed value, with the
    /// group path, option name, previous value and new value. Errors are
    /// routed to the error handler.
    pub fn observe<F>(&self, observer: F)
    where
        F: Fn(&str, &str, Option<&Value>, &Value) -> std::result::Result<(), BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.inner.registry.add_observer(Arc::new(observer));
    }

    /// Replace the error sink for watch pushes and callback failures.
    pub fn set_error_handler(&self, handler: ErrorHandler) {
        self.inner.registry.set_error_handler(handler);
    }

    /// Freeze every registered option at once. Options registered later
    /// start thawed.
    pub fn freeze_all(&self) {
        self.inner.registry.set_all_frozen(true);
    }

    pub fn unfreeze_all(&self) {
        self.inner.registry.set_all_frozen(false);
    }

    /// Flat copy of every option holding a value, keyed by dotted path.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.inner.registry.snapshot()
    }

    /// Dotted paths of every group in the tree, sorted. Includes nodes
    /// that exist only as ancestors of deeper paths, and the root group
    /// as the empty string.
    pub fn group_paths(&self) -> Vec<String> {
        self.inner.registry.group_paths()
    }

    /// Visit every option holding a value, group by group: groups in
    /// path order, options by name within each. The visitor runs on a
    /// copy; it may call back into the configuration freely.
    pub fn visit(&self, f: impl FnMut(&str, &str, &Value)) {
        self.inner.registry.visit_values(f)
    }

    /// Store leftover command-line arguments. First store wins unless
    /// forced. Returns whether the arguments were stored.
    pub fn set_args(&self, args: Vec<String>, force: bool) -> bool {
        let mut slot = self.inner.args.write();
        if slot.is_none() || force {
            *slot = Some(args);
            true
        } else {
            false
        }
    }

    pub fn args(&self) -> Vec<String> {
        self.inner.args.read().clone().unwrap_or_default()
    }

    /// Token cancelled when the configuration closes; useful for tying
    /// other shutdown work to the engine's lifecycle.
    pub fn exit_signal(&self) -> CancellationToken {
        self.inner.exit.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Stop watching: cancel every watcher and release all watch locks.
    /// Values stay readable and writable. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.exit.cancel();
        self.inner.registry.unlock_all();
        debug!("configuration closed");
    }

    /// Close, then wait for every watcher task to finish.
    pub async fn shutdown(&self) {
        self.close();
        let handles: Vec<JoinHandle<()>> = {
            let mut watchers = self.inner.watchers.lock();
            watchers.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "watcher task ended abnormally");
            }
        }
    }

    /// Build the push half of the source watch contract.
    ///
    /// The closure holds the engine weakly: once every handle is dropped,
    /// pushes report rejection instead of keeping the engine alive.
    pub(crate) fn make_push(&self) -> WatchPush {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move |result: Result<DataSet>| -> bool {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            let config = Config { inner };
            match result {
                Ok(ds) => config.apply_push(&ds),
                Err(err) => {
                    config.inner.registry.report(&err);
                    false
                }
            }
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("registry", &self.inner.registry)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Drop for ConfigInner {
    fn drop(&mut self) {
        self.exit.cancel();
    }
}
