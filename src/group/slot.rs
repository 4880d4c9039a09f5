//! Registry storage: one node per group, one slot per registered option.

use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::opt::Opt;
use crate::opt::Value;

/// Storage cell for one registered option.
///
/// `value` starts as the normalized default; `is_set` stays false until an
/// explicit write lands so first-wins merges can tell defaults apart from
/// committed values. `frozen` rejects writes until thawed. `locked` marks
/// the slot as owned by a watching source.
#[derive(Debug)]
pub(crate) struct OptSlot {
    pub(crate) opt: Opt,
    pub(crate) value: Option<Value>,
    pub(crate) is_set: bool,
    pub(crate) frozen: bool,
    pub(crate) locked: bool,
}

impl OptSlot {
    pub(crate) fn new(opt: Opt, default: Option<Value>) -> Self {
        OptSlot {
            opt,
            value: default,
            is_set: false,
            frozen: false,
            locked: false,
        }
    }

    /// Current value, falling back to the kind's zero value.
    pub(crate) fn current(&self) -> Value {
        self.value
            .clone()
            .unwrap_or_else(|| Value::zero(self.opt.kind()))
    }
}

/// One group in the registry tree.
///
/// Nodes created only as ancestors of a deeper path stay `auxiliary` until
/// something explicitly asks for them; merge-time group probing ignores
/// auxiliary nodes.
#[derive(Debug)]
pub(crate) struct GroupNode {
    pub(crate) slots: BTreeMap<String, OptSlot>,
    pub(crate) aliases: HashMap<String, String>,
    pub(crate) auxiliary: bool,
}

impl GroupNode {
    pub(crate) fn new(auxiliary: bool) -> Self {
        GroupNode {
            slots: BTreeMap::new(),
            aliases: HashMap::new(),
            auxiliary,
        }
    }

    /// Canonical option name behind `name`, resolving one alias hop.
    pub(crate) fn canonical<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if self.slots.contains_key(name) {
            Some(name)
        } else {
            self.aliases.get(name).map(String::as_str)
        }
    }

    pub(crate) fn slot(&self, name: &str) -> Option<&OptSlot> {
        self.canonical(name).and_then(|c| self.slots.get(c))
    }

    pub(crate) fn slot_mut(&mut self, name: &str) -> Option<&mut OptSlot> {
        let canonical = if self.slots.contains_key(name) {
            name
        } else {
            self.aliases.get(name)?.as_str()
        };
        self.slots.get_mut(canonical)
    }
}
