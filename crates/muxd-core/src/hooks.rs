//! Hook registry: named command lists with parent-chain fallback.
//!
//! Each scope (global, per-session) owns one registry mapping hook names to
//! command lists. A per-session registry chains to the global one: lookups
//! fall back along the chain until found or exhausted. Names are unique per
//! registry; setting an existing name replaces its list.

use crate::command::CommandList;
use crate::queue::CmdQueue;
use crate::runtime::Runtime;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Shared handle to a hook registry.
pub type HookScope = Rc<RefCell<HookRegistry>>;

/// Name → command-list mapping with optional parent fallback.
#[derive(Debug, Default, PartialEq)]
pub struct HookRegistry {
    entries: BTreeMap<String, CommandList>,
    parent: Option<HookScope>,
}

impl HookRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry chained to `parent`; lookups missing here continue there.
    #[must_use]
    pub fn with_parent(parent: HookScope) -> Self {
        Self {
            entries: BTreeMap::new(),
            parent: Some(parent),
        }
    }

    /// Install `list` under `name`, replacing any existing entry.
    pub fn set(&mut self, name: impl Into<String>, list: CommandList) {
        let name = name.into();
        tracing::debug!(hook = %name, commands = list.len(), "set hook");
        self.entries.insert(name, list);
    }

    /// Remove `name` from this registry. No-op if absent; never touches the
    /// parent chain.
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// Find `name` here, falling back along the parent chain.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<CommandList> {
        if let Some(list) = self.entries.get(name) {
            return Some(list.clone());
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.borrow().find(name))
    }

    /// Entries of this registry only, in name order.
    pub fn iter_local(&self) -> impl Iterator<Item = (&str, &CommandList)> {
        self.entries.iter().map(|(n, l)| (n.as_str(), l))
    }

    /// Seed this registry with the local entries of `other`.
    pub fn copy_from(&mut self, other: &HookRegistry) {
        for (name, list) in &other.entries {
            self.entries.insert(name.clone(), list.clone());
        }
    }

    /// If `name` is hooked anywhere along the chain, enqueue its list on
    /// `cmdq` (starting a walk if the queue is idle). Returns whether a hook
    /// was found.
    pub fn run(&self, name: &str, rt: &Runtime, cmdq: &CmdQueue) -> bool {
        match self.find(name) {
            Some(list) => {
                cmdq.run(rt, list);
                true
            }
            None => false,
        }
    }
}
