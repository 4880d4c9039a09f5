//! Group handles and the shared option registry.
//!
//! All option state lives in a single [`Registry`] guarded by one
//! `parking_lot::RwLock` over a sorted map of dotted group paths, so
//! enumeration is deterministic and cross-group writes serialize through
//! one place. [`OptGroup`] is a cheap cloneable view into one path of that
//! registry; creating one never copies option state.
//!
//! User code (parsers, validators, hooks, observers) never runs under the
//! registry lock: writes resolve the declaration under a read lock, parse
//! and validate outside any lock, commit under a short write lock, and fire
//! callbacks after the lock is released.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::RwLock;
use tracing::debug;
use tracing::trace;

use crate::errors::BoxError;
use crate::errors::Error;
use crate::errors::ErrorHandler;
use crate::errors::OptError;
use crate::errors::Result;
use crate::group::slot::GroupNode;
use crate::group::slot::OptSlot;
use crate::opt::check_segment;
use crate::opt::Opt;
use crate::opt::RawValue;
use crate::opt::Value;
use crate::opt::ValueKind;

/// Registry-wide observer, invoked after every committed value.
///
/// Arguments are the group path, option name, previous value and committed
/// value. Errors are routed to the error handler, never back to the writer.
pub(crate) type GlobalObserver = Arc<
    dyn Fn(&str, &str, Option<&Value>, &Value) -> std::result::Result<(), BoxError> + Send + Sync,
>;

/// How a write interacts with slot state. Direct sets overwrite
/// unconditionally; merge loads skip set slots unless forced and always
/// yield to watch-locked slots; watch pushes take the lock for themselves.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SetMode {
    pub(crate) only_if_unset: bool,
    pub(crate) respect_lock: bool,
    pub(crate) lock: bool,
}

impl SetMode {
    pub(crate) fn direct() -> Self {
        SetMode {
            only_if_unset: false,
            respect_lock: false,
            lock: false,
        }
    }

    pub(crate) fn merge(force: bool) -> Self {
        SetMode {
            only_if_unset: !force,
            respect_lock: true,
            lock: false,
        }
    }

    pub(crate) fn watch() -> Self {
        SetMode {
            only_if_unset: false,
            respect_lock: false,
            lock: true,
        }
    }
}

pub(crate) struct Registry {
    groups: RwLock<BTreeMap<String, GroupNode>>,
    observers: RwLock<Vec<GlobalObserver>>,
    error_handler: ArcSwap<ErrorHandler>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        let mut groups = BTreeMap::new();
        groups.insert(String::new(), GroupNode::new(false));
        Registry {
            groups: RwLock::new(groups),
            observers: RwLock::new(Vec::new()),
            error_handler: ArcSwap::from_pointee(ErrorHandler::default()),
        }
    }

    pub(crate) fn set_error_handler(&self, handler: ErrorHandler) {
        self.error_handler.store(Arc::new(handler));
    }

    /// Route an error to the installed handler. Only call with no registry
    /// lock held.
    pub(crate) fn report(&self, err: &Error) {
        self.error_handler.load().handle(err);
    }

    pub(crate) fn add_observer(&self, observer: GlobalObserver) {
        self.observers.write().push(observer);
    }

    /// Create the group node (and any missing ancestors) for `path`.
    pub(crate) fn ensure_group(&self, path: &str) -> Result<String> {
        let path = normalize_path(path)?;
        let mut groups = self.groups.write();
        ensure_node(&mut groups, &path, false);
        Ok(path)
    }

    pub(crate) fn register(&self, group: &str, opt: Opt, force: bool) -> Result<()> {
        opt.check_name()?;
        // Defaults run through the same parse/validate path as any write,
        // outside the lock.
        let default = opt.normalized_default()?;
        let group = normalize_path(group)?;

        let mut groups = self.groups.write();
        let node = ensure_node(&mut groups, &group, false);
        if force {
            // Replacing drops the previous slot outright, committed value
            // included; the new slot starts unset at its own default.
            for name in
                std::iter::once(opt.name()).chain(opt.aliases().iter().map(String::as_str))
            {
                if let Some(canonical) = node.canonical(name).map(str::to_string) {
                    node.slots.remove(&canonical);
                    node.aliases.retain(|_, target| *target != canonical);
                }
            }
        }
        if node.slots.contains_key(opt.name()) || node.aliases.contains_key(opt.name()) {
            return Err(OptError::Duplicate {
                group,
                name: opt.name().to_string(),
            }
            .into());
        }
        for (i, alias) in opt.aliases().iter().enumerate() {
            if node.slots.contains_key(alias)
                || node.aliases.contains_key(alias)
                || alias == opt.name()
                || opt.aliases()[..i].contains(alias)
            {
                return Err(OptError::Duplicate {
                    group,
                    name: alias.clone(),
                }
                .into());
            }
        }
        for alias in opt.aliases() {
            node.aliases.insert(alias.clone(), opt.name().to_string());
        }
        let name = opt.name().to_string();
        node.slots.insert(name.clone(), OptSlot::new(opt, default));
        drop(groups);

        debug!(group = %group, opt = %name, "registered option");
        Ok(())
    }

    pub(crate) fn unregister(&self, group: &str, name: &str) -> Result<bool> {
        let group = normalize_path(group)?;
        let name = name.trim().to_ascii_lowercase();
        let mut groups = self.groups.write();
        let Some(node) = groups.get_mut(&group) else {
            return Ok(false);
        };
        let Some(canonical) = node.canonical(&name).map(str::to_string) else {
            return Ok(false);
        };
        node.slots.remove(&canonical);
        node.aliases.retain(|_, target| *target != canonical);
        Ok(true)
    }

    /// True for groups that were explicitly created or registered into,
    /// not for nodes that exist only as ancestors of deeper paths.
    pub(crate) fn has_group(&self, path: &str) -> bool {
        let Ok(path) = normalize_path(path) else {
            return false;
        };
        self.groups
            .read()
            .get(&path)
            .map_or(false, |node| !node.auxiliary)
    }

    pub(crate) fn has_opt(&self, group: &str, name: &str) -> bool {
        let Ok(group) = normalize_path(group) else {
            return false;
        };
        let name = name.trim().to_ascii_lowercase();
        self.groups
            .read()
            .get(&group)
            .and_then(|node| node.slot(&name))
            .is_some()
    }

    pub(crate) fn has_opt_and_is_not_set(&self, group: &str, name: &str) -> bool {
        let Ok(group) = normalize_path(group) else {
            return false;
        };
        let name = name.trim().to_ascii_lowercase();
        self.groups
            .read()
            .get(&group)
            .and_then(|node| node.slot(&name))
            .map_or(false, |slot| !slot.is_set)
    }

    pub(crate) fn get(&self, group: &str, name: &str) -> Result<Option<Value>> {
        let group = normalize_path(group)?;
        let name = name.trim().to_ascii_lowercase();
        let groups = self.groups.read();
        let slot = resolve_slot(&groups, &group, &name)?;
        Ok(slot.value.clone())
    }

    /// Value for a typed getter: checks the declared kind and falls back to
    /// the kind's zero value when nothing was committed.
    pub(crate) fn typed(&self, group: &str, name: &str, expected: ValueKind) -> Result<Value> {
        let group = normalize_path(group)?;
        let name = name.trim().to_ascii_lowercase();
        let groups = self.groups.read();
        let slot = resolve_slot(&groups, &group, &name)?;
        let actual = slot.opt.kind();
        if actual != expected {
            return Err(OptError::KindMismatch {
                group,
                name,
                expected,
                actual,
            }
            .into());
        }
        Ok(slot.current())
    }

    pub(crate) fn opts(&self, group: &str) -> Result<Vec<Opt>> {
        let group = normalize_path(group)?;
        let groups = self.groups.read();
        let Some(node) = groups.get(&group) else {
            return Ok(Vec::new());
        };
        Ok(node.slots.values().map(|slot| slot.opt.clone()).collect())
    }

    /// Paths of every group in the tree, ancestor-only nodes included,
    /// sorted. The root group is the empty path.
    pub(crate) fn group_paths(&self) -> Vec<String> {
        self.groups.read().keys().cloned().collect()
    }

    pub(crate) fn set_raw(
        &self,
        group: &str,
        name: &str,
        raw: &RawValue,
        mode: SetMode,
    ) -> Result<bool> {
        let (group, name, opt) = self.resolve_opt(group, name)?;
        let value = opt.parse_and_validate(raw)?;
        self.commit(&group, &name, value, mode)
    }

    pub(crate) fn set_typed(
        &self,
        group: &str,
        name: &str,
        value: Value,
        mode: SetMode,
    ) -> Result<bool> {
        let (group, name, opt) = self.resolve_opt(group, name)?;
        let value = if value.kind() == opt.kind() {
            opt.validate(&value)?;
            value
        } else {
            opt.parse_and_validate(&value.to_raw())?
        };
        self.commit(&group, &name, value, mode)
    }

    /// Freeze or thaw the named options in `group`. Names resolve through
    /// aliases; an unknown name fails with `NoOpt`, leaving earlier names
    /// in the list already switched.
    pub(crate) fn set_frozen<I, S>(&self, group: &str, names: I, frozen: bool) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let group = normalize_path(group)?;
        let mut groups = self.groups.write();
        for name in names {
            let name = name.as_ref().trim().to_ascii_lowercase();
            let slot = groups
                .get_mut(&group)
                .and_then(|node| node.slot_mut(&name))
                .ok_or_else(|| OptError::NoOpt {
                    group: group.clone(),
                    name: name.clone(),
                })?;
            slot.frozen = frozen;
        }
        Ok(())
    }

    /// Freeze or thaw every registered option at once.
    pub(crate) fn set_all_frozen(&self, frozen: bool) {
        let mut groups = self.groups.write();
        for node in groups.values_mut() {
            for slot in node.slots.values_mut() {
                slot.frozen = frozen;
            }
        }
    }

    /// Release every watch lock; part of shutdown.
    pub(crate) fn unlock_all(&self) {
        let mut groups = self.groups.write();
        for node in groups.values_mut() {
            for slot in node.slots.values_mut() {
                slot.locked = false;
            }
        }
    }

    /// Flat snapshot of every option holding a value, keyed by dotted path.
    pub(crate) fn snapshot(&self) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        let groups = self.groups.read();
        for (path, node) in groups.iter() {
            for (name, slot) in &node.slots {
                if let Some(value) = &slot.value {
                    out.insert(join_path(path, name), value.clone());
                }
            }
        }
        out
    }

    /// Visit every option holding a value, group by group in path order,
    /// options by name within each. State is copied out first; the
    /// visitor runs without any registry lock held.
    pub(crate) fn visit_values(&self, mut f: impl FnMut(&str, &str, &Value)) {
        let mut entries = Vec::new();
        {
            let groups = self.groups.read();
            for (path, node) in groups.iter() {
                for (name, slot) in &node.slots {
                    if let Some(value) = &slot.value {
                        entries.push((path.clone(), name.clone(), value.clone()));
                    }
                }
            }
        }
        for (group, name, value) in &entries {
            f(group, name, value);
        }
    }

    /// Fetch the declaration for a write. The clone is cheap: parser,
    /// validators and hooks are shared behind `Arc`.
    fn resolve_opt(&self, group: &str, name: &str) -> Result<(String, String, Opt)> {
        let group = normalize_path(group)?;
        let name = name.trim().to_ascii_lowercase();
        let groups = self.groups.read();
        let no_opt = || OptError::NoOpt {
            group: group.clone(),
            name: name.clone(),
        };
        let node = groups.get(&group).ok_or_else(no_opt)?;
        let canonical = node.canonical(&name).ok_or_else(no_opt)?.to_string();
        let slot = node.slots.get(&canonical).ok_or_else(no_opt)?;
        let opt = slot.opt.clone();
        drop(groups);
        Ok((group, canonical, opt))
    }

    /// Commit a parsed, validated value, then fire callbacks.
    ///
    /// Returns `Ok(false)` when the mode skipped the write (first-wins
    /// merge over a set slot, or a non-watch write over a locked slot).
    fn commit(&self, group: &str, name: &str, value: Value, mode: SetMode) -> Result<bool> {
        let old;
        let hook;
        {
            let mut groups = self.groups.write();
            let slot = groups
                .get_mut(group)
                .and_then(|node| node.slot_mut(name))
                .ok_or_else(|| OptError::NoOpt {
                    group: group.to_string(),
                    name: name.to_string(),
                })?;
            if slot.frozen {
                return Err(OptError::Frozen {
                    group: group.to_string(),
                    name: name.to_string(),
                }
                .into());
            }
            if mode.only_if_unset && slot.is_set {
                return Ok(false);
            }
            if mode.respect_lock && slot.locked {
                return Ok(false);
            }
            if mode.lock {
                slot.locked = true;
            }
            old = slot.value.take();
            slot.value = Some(value.clone());
            slot.is_set = true;
            hook = slot.opt.on_update.clone();
        }

        let path = join_path(group, name);
        trace!(option = %path, value = %value, "committed value");
        if let Some(hook) = hook {
            if let Err(source) = hook(old.as_ref(), &value) {
                self.report(&Error::Callback {
                    site: "update",
                    name: path.clone(),
                    source,
                });
            }
        }
        let observers = self.observers.read().clone();
        for observer in observers {
            if let Err(source) = observer(group, name, old.as_ref(), &value) {
                self.report(&Error::Callback {
                    site: "observer",
                    name: path.clone(),
                    source,
                });
            }
        }
        Ok(true)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("groups", &self.groups.read().len())
            .finish_non_exhaustive()
    }
}

/// A view into one group of the registry.
///
/// Clones share the registry; dropping a handle drops nothing but the
/// handle. The root group has the empty path.
#[derive(Clone)]
pub struct OptGroup {
    path: String,
    reg: Arc<Registry>,
}

impl OptGroup {
    pub(crate) fn new(path: String, reg: Arc<Registry>) -> Self {
        OptGroup { path, reg }
    }

    /// Dotted path of this group; empty for the root group.
    pub fn name(&self) -> &str {
        &self.path
    }

    /// Handle for a subgroup, created on first use. `rel` may itself be a
    /// dotted path.
    pub fn group(&self, rel: &str) -> Result<OptGroup> {
        let rel = normalize_path(rel)?;
        let path = self.reg.ensure_group(&join_path(&self.path, &rel))?;
        Ok(OptGroup::new(path, self.reg.clone()))
    }

    /// Register one option in this group.
    ///
    /// Fails with a duplicate error when the name or any alias collides,
    /// and with a value error when the declared default does not survive
    /// its own coercion and validation.
    pub fn register(&self, opt: Opt) -> Result<()> {
        self.reg.register(&self.path, opt, false)
    }

    /// Register an option, replacing any earlier declaration reachable
    /// under its name or aliases. The replaced slot's value is discarded;
    /// the new slot starts unset at its own default.
    pub fn register_force(&self, opt: Opt) -> Result<()> {
        self.reg.register(&self.path, opt, true)
    }

    pub fn register_all(&self, opts: impl IntoIterator<Item = Opt>) -> Result<()> {
        for opt in opts {
            self.register(opt)?;
        }
        Ok(())
    }

    /// Remove an option and its aliases. Returns whether it existed.
    pub fn unregister(&self, name: &str) -> Result<bool> {
        self.reg.unregister(&self.path, name)
    }

    pub fn has_opt(&self, name: &str) -> bool {
        self.reg.has_opt(&self.path, name)
    }

    /// True while the option exists and no explicit write has landed on it
    /// yet (a registered default alone does not count as set).
    pub fn has_opt_and_is_not_set(&self, name: &str) -> bool {
        self.reg.has_opt_and_is_not_set(&self.path, name)
    }

    /// Current value, or `None` when the option has neither a default nor
    /// a committed value.
    pub fn get(&self, name: &str) -> Result<Option<Value>> {
        self.reg.get(&self.path, name)
    }

    /// Write a typed value directly, overwriting regardless of merge state
    /// or watch locks. The value still passes validation, and coercion when
    /// the kind differs from the declaration.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<bool> {
        self.reg
            .set_typed(&self.path, name, value.into(), SetMode::direct())
    }

    /// Write a raw value directly, through the option's parser.
    pub fn set_raw(&self, name: &str, raw: &RawValue) -> Result<bool> {
        self.reg.set_raw(&self.path, name, raw, SetMode::direct())
    }

    /// Reject writes to the named options until [`unfreeze`](Self::unfreeze).
    /// Names resolve through aliases; an unknown name fails with a no-opt
    /// error.
    pub fn freeze<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.reg.set_frozen(&self.path, names, true)
    }

    pub fn unfreeze<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.reg.set_frozen(&self.path, names, false)
    }

    /// Declarations registered in this group, sorted by name.
    pub fn opts(&self) -> Vec<Opt> {
        self.reg.opts(&self.path).unwrap_or_default()
    }

    pub fn get_bool(&self, name: &str) -> Result<bool> {
        self.typed_get(name, ValueKind::Bool, Value::as_bool)
    }

    pub fn get_int(&self, name: &str) -> Result<i64> {
        self.typed_get(name, ValueKind::Int, Value::as_int)
    }

    pub fn get_uint(&self, name: &str) -> Result<u64> {
        self.typed_get(name, ValueKind::Uint, Value::as_uint)
    }

    pub fn get_float(&self, name: &str) -> Result<f64> {
        self.typed_get(name, ValueKind::Float, Value::as_float)
    }

    pub fn get_str(&self, name: &str) -> Result<String> {
        self.typed_get(name, ValueKind::Str, |v| v.as_str().map(str::to_string))
    }

    pub fn get_duration(&self, name: &str) -> Result<std::time::Duration> {
        self.typed_get(name, ValueKind::Duration, Value::as_duration)
    }

    pub fn get_time(&self, name: &str) -> Result<chrono::DateTime<chrono::Utc>> {
        self.typed_get(name, ValueKind::Time, Value::as_time)
    }

    pub fn get_bool_list(&self, name: &str) -> Result<Vec<bool>> {
        self.typed_get(name, ValueKind::BoolList, |v| {
            v.as_bool_list().map(|s| s.to_vec())
        })
    }

    pub fn get_int_list(&self, name: &str) -> Result<Vec<i64>> {
        self.typed_get(name, ValueKind::IntList, |v| {
            v.as_int_list().map(|s| s.to_vec())
        })
    }

    pub fn get_uint_list(&self, name: &str) -> Result<Vec<u64>> {
        self.typed_get(name, ValueKind::UintList, |v| {
            v.as_uint_list().map(|s| s.to_vec())
        })
    }

    pub fn get_float_list(&self, name: &str) -> Result<Vec<f64>> {
        self.typed_get(name, ValueKind::FloatList, |v| {
            v.as_float_list().map(|s| s.to_vec())
        })
    }

    pub fn get_str_list(&self, name: &str) -> Result<Vec<String>> {
        self.typed_get(name, ValueKind::StrList, |v| {
            v.as_str_list().map(|s| s.to_vec())
        })
    }

    pub fn get_duration_list(&self, name: &str) -> Result<Vec<std::time::Duration>> {
        self.typed_get(name, ValueKind::DurationList, |v| {
            v.as_duration_list().map(|s| s.to_vec())
        })
    }

    pub fn get_time_list(&self, name: &str) -> Result<Vec<chrono::DateTime<chrono::Utc>>> {
        self.typed_get(name, ValueKind::TimeList, |v| {
            v.as_time_list().map(|s| s.to_vec())
        })
    }

    fn typed_get<T>(
        &self,
        name: &str,
        kind: ValueKind,
        f: impl Fn(&Value) -> Option<T>,
    ) -> Result<T> {
        let value = self.reg.typed(&self.path, name, kind)?;
        f(&value).ok_or_else(|| {
            OptError::KindMismatch {
                group: self.path.clone(),
                name: name.to_string(),
                expected: kind,
                actual: value.kind(),
            }
            .into()
        })
    }

    pub(crate) fn registry(&self) -> &Arc<Registry> {
        &self.reg
    }
}

impl fmt::Debug for OptGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptGroup")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Lowercase and validate a dotted group path. The empty string names the
/// root group.
pub(crate) fn normalize_path(path: &str) -> std::result::Result<String, OptError> {
    let path = path.trim().to_ascii_lowercase();
    if path.is_empty() {
        return Ok(path);
    }
    for segment in path.split('.') {
        check_segment(segment)?;
    }
    Ok(path)
}

pub(crate) fn join_path(group: &str, name: &str) -> String {
    if group.is_empty() {
        name.to_string()
    } else if name.is_empty() {
        group.to_string()
    } else {
        format!("{group}.{name}")
    }
}

/// Split a dotted key into its group path and option name.
pub(crate) fn split_key(key: &str) -> (&str, &str) {
    match key.rsplit_once('.') {
        Some((group, name)) => (group, name),
        None => ("", key),
    }
}

/// Create `path` and any missing ancestors; ancestors created here stay
/// auxiliary, the target node becomes explicit unless `auxiliary` is set.
fn ensure_node<'a>(
    groups: &'a mut BTreeMap<String, GroupNode>,
    path: &str,
    auxiliary: bool,
) -> &'a mut GroupNode {
    if !path.is_empty() {
        let mut acc = String::new();
        for segment in path.split('.') {
            if !acc.is_empty() {
                acc.push('.');
            }
            acc.push_str(segment);
            if acc != path {
                groups
                    .entry(acc.clone())
                    .or_insert_with(|| GroupNode::new(true));
            }
        }
    }
    let node = groups
        .entry(path.to_string())
        .or_insert_with(|| GroupNode::new(auxiliary));
    if !auxiliary {
        node.auxiliary = false;
    }
    node
}

fn resolve_slot<'a>(
    groups: &'a BTreeMap<String, GroupNode>,
    group: &str,
    name: &str,
) -> std::result::Result<&'a OptSlot, OptError> {
    groups
        .get(group)
        .and_then(|node| node.slot(name))
        .ok_or_else(|| OptError::NoOpt {
            group: group.to_string(),
            name: name.to_string(),
        })
}
