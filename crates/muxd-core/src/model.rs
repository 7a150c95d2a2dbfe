//! Minimal session/window/pane/client model.
//!
//! The engine only needs narrow collaborators here: enough structure for the
//! context resolver to find targets (`name`, `$session`, `@window`, `%pane`,
//! `sess:win.pane`) and for notifications to carry strong handles. Lifecycle
//! management beyond that lives outside this crate.

use crate::hooks::{HookRegistry, HookScope};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

pub type PaneHandle = Rc<RefCell<Pane>>;
pub type WindowHandle = Rc<RefCell<Window>>;
pub type SessionHandle = Rc<RefCell<Session>>;
pub type ClientHandle = Rc<RefCell<Client>>;

/// A single pane. Identified by a process-unique `%n` id.
#[derive(Debug, PartialEq)]
pub struct Pane {
    pub id: u32,
}

impl Pane {
    #[must_use]
    pub fn id_str(&self) -> String {
        format!("%{}", self.id)
    }
}

/// A window: a named group of panes with one active pane.
#[derive(Debug, PartialEq)]
pub struct Window {
    pub id: u32,
    pub name: String,
    pub panes: Vec<PaneHandle>,
    pub active: usize,
}

impl Window {
    #[must_use]
    pub fn id_str(&self) -> String {
        format!("@{}", self.id)
    }

    #[must_use]
    pub fn active_pane(&self) -> Option<PaneHandle> {
        self.panes.get(self.active).cloned()
    }

    #[must_use]
    pub fn pane_by_id(&self, id: u32) -> Option<PaneHandle> {
        self.panes.iter().find(|p| p.borrow().id == id).cloned()
    }

    #[must_use]
    pub fn pane_at(&self, index: usize) -> Option<PaneHandle> {
        self.panes.get(index).cloned()
    }
}

/// A window's link into a session: the session-local index plus the window.
#[derive(Clone, Debug, PartialEq)]
pub struct Winlink {
    pub index: i32,
    pub window: WindowHandle,
}

/// A session: an ordered set of winlinks with a current window and a hook
/// registry chained to the global scope.
#[derive(Debug, PartialEq)]
pub struct Session {
    pub id: u32,
    pub name: String,
    pub windows: BTreeMap<i32, WindowHandle>,
    pub current: Option<i32>,
    /// Number of attached clients.
    pub attached: u32,
    pub hooks: HookScope,
}

impl Session {
    #[must_use]
    pub fn new(id: u32, name: impl Into<String>, global_hooks: &HookScope) -> Self {
        Self {
            id,
            name: name.into(),
            windows: BTreeMap::new(),
            current: None,
            attached: 0,
            hooks: Rc::new(RefCell::new(HookRegistry::with_parent(Rc::clone(
                global_hooks,
            )))),
        }
    }

    #[must_use]
    pub fn id_str(&self) -> String {
        format!("${}", self.id)
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached > 0
    }

    #[must_use]
    pub fn winlink(&self, index: i32) -> Option<Winlink> {
        self.windows.get(&index).map(|w| Winlink {
            index,
            window: Rc::clone(w),
        })
    }

    #[must_use]
    pub fn current_winlink(&self) -> Option<Winlink> {
        self.current.and_then(|index| self.winlink(index))
    }

    /// Winlink holding exactly this window, if linked here.
    #[must_use]
    pub fn winlink_for_window(&self, window: &WindowHandle) -> Option<Winlink> {
        self.windows
            .iter()
            .find(|(_, w)| Rc::ptr_eq(w, window))
            .map(|(index, w)| Winlink {
                index: *index,
                window: Rc::clone(w),
            })
    }

    #[must_use]
    pub fn winlink_by_window_id(&self, id: u32) -> Option<Winlink> {
        self.windows
            .iter()
            .find(|(_, w)| w.borrow().id == id)
            .map(|(index, w)| Winlink {
                index: *index,
                window: Rc::clone(w),
            })
    }

    #[must_use]
    pub fn winlink_by_name(&self, name: &str) -> Option<Winlink> {
        self.windows
            .iter()
            .find(|(_, w)| w.borrow().name == name)
            .map(|(index, w)| Winlink {
                index: *index,
                window: Rc::clone(w),
            })
    }

    /// Lowest free window index.
    #[must_use]
    pub fn next_index(&self) -> i32 {
        let mut index = 0;
        while self.windows.contains_key(&index) {
            index += 1;
        }
        index
    }
}

/// A consumer of the engine: interactive, control-mode or headless batch.
#[derive(Debug)]
pub struct Client {
    pub name: String,
    pub session: Option<SessionHandle>,
    /// Control-mode clients receive machine-readable guard markers.
    pub control: bool,
    /// Set when a drained queue was marked exit-on-empty.
    pub exit: bool,
    /// Nonzero once a command on this client's queue has errored.
    pub retcode: i32,
}

impl Client {
    #[must_use]
    pub fn new(name: impl Into<String>, session: Option<SessionHandle>, control: bool) -> Self {
        Self {
            name: name.into(),
            session,
            control,
            exit: false,
            retcode: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global() -> HookScope {
        Rc::new(RefCell::new(HookRegistry::new()))
    }

    fn window(id: u32, name: &str, panes: u32) -> WindowHandle {
        let panes = (0..panes)
            .map(|i| Rc::new(RefCell::new(Pane { id: id * 10 + i })))
            .collect();
        Rc::new(RefCell::new(Window {
            id,
            name: name.to_string(),
            panes,
            active: 0,
        }))
    }

    #[test]
    fn next_index_fills_gaps() {
        let mut s = Session::new(0, "main", &global());
        s.windows.insert(0, window(1, "a", 1));
        s.windows.insert(2, window(2, "b", 1));
        assert_eq!(s.next_index(), 1);
    }

    #[test]
    fn winlink_lookup_by_id_and_name() {
        let mut s = Session::new(0, "main", &global());
        let w = window(7, "logs", 2);
        s.windows.insert(3, Rc::clone(&w));

        assert_eq!(s.winlink_by_window_id(7).unwrap().index, 3);
        assert_eq!(s.winlink_by_name("logs").unwrap().index, 3);
        assert!(s.winlink_by_name("nope").is_none());
        assert!(Rc::ptr_eq(&s.winlink_for_window(&w).unwrap().window, &w));
    }

    #[test]
    fn session_hooks_chain_to_global() {
        let g = global();
        g.borrow_mut()
            .set("after-x", crate::command::CommandList::new(Vec::new()));
        let s = Session::new(0, "main", &g);
        assert!(s.hooks.borrow().find("after-x").is_some());
    }
}
