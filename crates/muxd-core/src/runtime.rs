//! Runtime: the shared world the engine operates on.
//!
//! Owns the sessions, clients, global hook scope, notification bus and the
//! command dispatch table. Structural mutations (session/window lifecycle,
//! attachment, renames) go through here so the matching notification is
//! published at every site; the target grammar lookups
//! (`name`, `$id`, `@id`, `%id`, `sess:win.pane`) also live here, close to
//! the collections they search.

use crate::dispatch::CommandTable;
use crate::error::{Error, Result};
use crate::hooks::{HookRegistry, HookScope};
use crate::model::{ClientHandle, Pane, PaneHandle, Session, SessionHandle, Window, WindowHandle, Winlink};
use crate::notify::{NotificationBus, NotifyKind};
use crate::queue::CmdQueue;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

pub struct Runtime {
    sessions: RefCell<Vec<SessionHandle>>,
    clients: RefCell<Vec<ClientHandle>>,
    global_hooks: HookScope,
    bus: NotificationBus,
    current_session: RefCell<Option<SessionHandle>>,
    table: Rc<CommandTable>,
    next_session_id: Cell<u32>,
    next_window_id: Cell<u32>,
    next_pane_id: Cell<u32>,
    /// Queues suspended on a named wait channel.
    wait_channels: RefCell<BTreeMap<String, Vec<CmdQueue>>>,
}

impl Runtime {
    #[must_use]
    pub fn new(table: Rc<CommandTable>) -> Self {
        Self {
            sessions: RefCell::new(Vec::new()),
            clients: RefCell::new(Vec::new()),
            global_hooks: Rc::new(RefCell::new(HookRegistry::new())),
            bus: NotificationBus::new(),
            current_session: RefCell::new(None),
            table,
            next_session_id: Cell::new(0),
            next_window_id: Cell::new(0),
            next_pane_id: Cell::new(0),
            wait_channels: RefCell::new(BTreeMap::new()),
        }
    }

    // -- accessors ----------------------------------------------------------

    #[must_use]
    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    #[must_use]
    pub fn global_hooks(&self) -> HookScope {
        Rc::clone(&self.global_hooks)
    }

    #[must_use]
    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    #[must_use]
    pub fn current_session(&self) -> Option<SessionHandle> {
        self.current_session.borrow().clone()
    }

    pub fn set_current_session(&self, session: Option<SessionHandle>) {
        *self.current_session.borrow_mut() = session;
    }

    #[must_use]
    pub fn sessions(&self) -> Vec<SessionHandle> {
        self.sessions.borrow().clone()
    }

    #[must_use]
    pub fn clients(&self) -> Vec<ClientHandle> {
        self.clients.borrow().clone()
    }

    // -- lifecycle ----------------------------------------------------------

    /// Create a session. Becomes the current session if there is none.
    pub fn new_session(&self, name: &str) -> SessionHandle {
        let id = self.next_session_id.get();
        self.next_session_id.set(id + 1);
        let session = Rc::new(RefCell::new(Session::new(id, name, &self.global_hooks)));
        self.sessions.borrow_mut().push(Rc::clone(&session));
        {
            let mut current = self.current_session.borrow_mut();
            if current.is_none() {
                *current = Some(Rc::clone(&session));
            }
        }
        tracing::info!(session = name, id, "new session");
        self.bus.publish(
            self,
            NotifyKind::SessionCreated,
            None,
            Some(Rc::clone(&session)),
            None,
        );
        session
    }

    /// Create a window with `panes` fresh panes and link it into `session` at
    /// the lowest free index.
    pub fn new_window(&self, session: &SessionHandle, name: &str, panes: usize) -> Winlink {
        let id = self.next_window_id.get();
        self.next_window_id.set(id + 1);
        let panes: Vec<PaneHandle> = (0..panes)
            .map(|_| {
                let pid = self.next_pane_id.get();
                self.next_pane_id.set(pid + 1);
                Rc::new(RefCell::new(Pane { id: pid }))
            })
            .collect();
        let window = Rc::new(RefCell::new(Window {
            id,
            name: name.to_string(),
            panes,
            active: 0,
        }));
        let index = {
            let mut s = session.borrow_mut();
            let index = s.next_index();
            s.windows.insert(index, Rc::clone(&window));
            if s.current.is_none() {
                s.current = Some(index);
            }
            index
        };
        tracing::info!(window = name, id, index, "new window");
        self.bus.publish(
            self,
            NotifyKind::WindowLinked,
            None,
            Some(Rc::clone(session)),
            Some(Rc::clone(&window)),
        );
        Winlink { index, window }
    }

    /// Link a new window at an explicit index; fails if the slot is taken.
    pub fn new_window_at(
        &self,
        session: &SessionHandle,
        name: &str,
        panes: usize,
        index: i32,
    ) -> Result<Winlink> {
        if session.borrow().windows.contains_key(&index) {
            return Err(Error::BadIndex(index.to_string()));
        }
        let winlink = self.new_window(session, name, panes);
        if winlink.index != index {
            let mut s = session.borrow_mut();
            let window = s
                .windows
                .remove(&winlink.index)
                .unwrap_or_else(|| Rc::clone(&winlink.window));
            s.windows.insert(index, window);
            if s.current == Some(winlink.index) {
                s.current = Some(index);
            }
        }
        Ok(Winlink {
            index,
            window: winlink.window,
        })
    }

    pub fn new_client(&self, name: &str, control: bool) -> ClientHandle {
        let client = Rc::new(RefCell::new(crate::model::Client::new(name, None, control)));
        self.clients.borrow_mut().push(Rc::clone(&client));
        client
    }

    /// Attach `client` to `session`, which also becomes current.
    pub fn attach_client(&self, client: &ClientHandle, session: &SessionHandle) {
        {
            let mut c = client.borrow_mut();
            if let Some(old) = c.session.take() {
                let mut o = old.borrow_mut();
                o.attached = o.attached.saturating_sub(1);
            }
            c.session = Some(Rc::clone(session));
        }
        session.borrow_mut().attached += 1;
        *self.current_session.borrow_mut() = Some(Rc::clone(session));
        self.bus.publish(
            self,
            NotifyKind::AttachedSessionChanged,
            Some(Rc::clone(client)),
            Some(Rc::clone(session)),
            None,
        );
    }

    pub fn rename_session(&self, session: &SessionHandle, name: &str) {
        session.borrow_mut().name = name.to_string();
        self.bus.publish(
            self,
            NotifyKind::SessionRenamed,
            None,
            Some(Rc::clone(session)),
            None,
        );
    }

    pub fn rename_window(&self, session: &SessionHandle, window: &WindowHandle, name: &str) {
        window.borrow_mut().name = name.to_string();
        self.bus.publish(
            self,
            NotifyKind::WindowRenamed,
            None,
            Some(Rc::clone(session)),
            Some(Rc::clone(window)),
        );
    }

    /// Unlink the window at `index` from `session`; a session left with no
    /// windows is destroyed.
    pub fn kill_window(&self, session: &SessionHandle, index: i32) -> Result<()> {
        let window = {
            let mut s = session.borrow_mut();
            let window = s
                .windows
                .remove(&index)
                .ok_or_else(|| Error::NoSuchWindow(index.to_string()))?;
            if s.current == Some(index) {
                s.current = s.windows.keys().next().copied();
            }
            window
        };
        self.bus.publish(
            self,
            NotifyKind::WindowUnlinked,
            None,
            Some(Rc::clone(session)),
            Some(window),
        );
        let empty = session.borrow().windows.is_empty();
        if empty {
            self.destroy_session(session);
        }
        Ok(())
    }

    fn destroy_session(&self, session: &SessionHandle) {
        self.sessions
            .borrow_mut()
            .retain(|s| !Rc::ptr_eq(s, session));
        for client in self.clients.borrow().iter() {
            let mut c = client.borrow_mut();
            if c.session.as_ref().is_some_and(|s| Rc::ptr_eq(s, session)) {
                c.session = None;
            }
        }
        {
            let mut current = self.current_session.borrow_mut();
            if current.as_ref().is_some_and(|s| Rc::ptr_eq(s, session)) {
                *current = self.sessions.borrow().first().cloned();
            }
        }
        tracing::info!(session = %session.borrow().name, "session closed");
        self.bus.publish(
            self,
            NotifyKind::SessionClosed,
            None,
            Some(Rc::clone(session)),
            None,
        );
    }

    // -- wait channels -------------------------------------------------------

    /// Park a suspended queue on `channel` until it is signalled.
    pub fn push_waiter(&self, channel: &str, cmdq: CmdQueue) {
        tracing::debug!(channel, "queue waiting");
        self.wait_channels
            .borrow_mut()
            .entry(channel.to_string())
            .or_default()
            .push(cmdq);
    }

    /// Take every queue parked on `channel`.
    #[must_use]
    pub fn take_waiters(&self, channel: &str) -> Vec<CmdQueue> {
        self.wait_channels
            .borrow_mut()
            .remove(channel)
            .unwrap_or_default()
    }

    // -- client lookup -------------------------------------------------------

    /// The client to use when a command names none: the queue's own client,
    /// else a client attached to the current session, else any client.
    #[must_use]
    pub fn default_client(&self, cmdq: &CmdQueue) -> Option<ClientHandle> {
        if let Some(client) = cmdq.client() {
            return Some(client);
        }
        let current = self.current_session.borrow().clone();
        if let Some(current) = current {
            let found = self.clients.borrow().iter().find_map(|c| {
                let attached = c
                    .borrow()
                    .session
                    .as_ref()
                    .is_some_and(|s| Rc::ptr_eq(s, &current));
                if attached { Some(Rc::clone(c)) } else { None }
            });
            if found.is_some() {
                return found;
            }
        }
        self.clients.borrow().first().cloned()
    }

    pub fn client_by_name(&self, name: &str) -> Result<ClientHandle> {
        self.clients
            .borrow()
            .iter()
            .find(|c| c.borrow().name == name)
            .cloned()
            .ok_or_else(|| Error::NoSuchClient(name.to_string()))
    }

    // -- target lookup -------------------------------------------------------

    /// Resolve a session spec: `None` falls back to the queue client's
    /// session and then the current session; `$id` and exact names match
    /// directly. Anything after a `:` is ignored.
    pub fn lookup_session(
        &self,
        raw: Option<&str>,
        cmdq: &CmdQueue,
        prefer_unattached: bool,
    ) -> Result<SessionHandle> {
        let Some(raw) = raw else {
            return self.implied_session(cmdq, prefer_unattached);
        };
        let name = raw.split(':').next().unwrap_or(raw);
        if name.is_empty() {
            return self.implied_session(cmdq, prefer_unattached);
        }
        if let Some(id) = name.strip_prefix('$') {
            let id: u32 = id
                .parse()
                .map_err(|_| Error::NoSuchSession(raw.to_string()))?;
            return self
                .sessions
                .borrow()
                .iter()
                .find(|s| s.borrow().id == id)
                .cloned()
                .ok_or_else(|| Error::NoSuchSession(raw.to_string()));
        }
        self.sessions
            .borrow()
            .iter()
            .find(|s| s.borrow().name == name)
            .cloned()
            .ok_or_else(|| Error::NoSuchSession(raw.to_string()))
    }

    fn implied_session(&self, cmdq: &CmdQueue, prefer_unattached: bool) -> Result<SessionHandle> {
        if let Some(client) = self.default_client(cmdq) {
            if let Some(session) = client.borrow().session.clone() {
                return Ok(session);
            }
        }
        if prefer_unattached {
            let unattached = self
                .sessions
                .borrow()
                .iter()
                .find(|s| !s.borrow().is_attached())
                .cloned();
            if let Some(session) = unattached {
                return Ok(session);
            }
        }
        self.current_session
            .borrow()
            .clone()
            .ok_or(Error::NoCurrentSession)
    }

    /// Resolve a window spec `[session:]window` where the window part is an
    /// `@id`, a session-local index, a window name, or empty for the current
    /// window. A bare spec that matches nothing in the implied session is
    /// retried as a session name.
    pub fn lookup_window(
        &self,
        raw: Option<&str>,
        cmdq: &CmdQueue,
    ) -> Result<(SessionHandle, Winlink)> {
        let Some(raw) = raw else {
            let session = self.lookup_session(None, cmdq, false)?;
            let winlink = session
                .borrow()
                .current_winlink()
                .ok_or_else(|| Error::NoSuchWindow(String::new()))?;
            return Ok((session, winlink));
        };

        if raw.starts_with('@') {
            return self
                .window_by_id_str(raw)
                .ok_or_else(|| Error::NoSuchWindow(raw.to_string()));
        }

        if let Some((sess_part, win_part)) = raw.split_once(':') {
            let spec = if sess_part.is_empty() {
                None
            } else {
                Some(sess_part)
            };
            let session = self.lookup_session(spec, cmdq, false)?;
            let winlink = Self::window_in_session(&session, win_part)
                .ok_or_else(|| Error::NoSuchWindow(raw.to_string()))?;
            return Ok((session, winlink));
        }

        let session = self.lookup_session(None, cmdq, false)?;
        if let Some(winlink) = Self::window_in_session(&session, raw) {
            return Ok((session, winlink));
        }
        // a bare word that is no window here may be a session name
        let session = self.lookup_session(Some(raw), cmdq, false)?;
        let winlink = session
            .borrow()
            .current_winlink()
            .ok_or_else(|| Error::NoSuchWindow(raw.to_string()))?;
        Ok((session, winlink))
    }

    fn window_in_session(session: &SessionHandle, spec: &str) -> Option<Winlink> {
        let s = session.borrow();
        if spec.is_empty() {
            return s.current_winlink();
        }
        if let Some(id) = spec.strip_prefix('@') {
            return id.parse().ok().and_then(|id| s.winlink_by_window_id(id));
        }
        if let Ok(index) = spec.parse::<i32>() {
            return s.winlink(index);
        }
        s.winlink_by_name(spec)
    }

    /// Resolve a pane spec: `%id` searches globally; otherwise the part after
    /// the last `.` selects a pane (index, `%id`, or empty for active) inside
    /// the window named by the rest.
    pub fn lookup_pane(
        &self,
        raw: Option<&str>,
        cmdq: &CmdQueue,
    ) -> Result<(SessionHandle, Winlink, PaneHandle)> {
        let Some(raw) = raw else {
            let (session, winlink) = self.lookup_window(None, cmdq)?;
            let pane = winlink
                .window
                .borrow()
                .active_pane()
                .ok_or_else(|| Error::NoSuchPane(String::new()))?;
            return Ok((session, winlink, pane));
        };

        if let Some(id) = raw.strip_prefix('%') {
            let id: u32 = id.parse().map_err(|_| Error::NoSuchPane(raw.to_string()))?;
            return self
                .pane_by_id(id)
                .ok_or_else(|| Error::NoSuchPane(raw.to_string()));
        }

        let (win_part, pane_part) = match raw.rsplit_once('.') {
            Some((w, p)) => (if w.is_empty() { None } else { Some(w) }, Some(p)),
            None => (Some(raw), None),
        };
        let (session, winlink) = self.lookup_window(win_part, cmdq)?;
        let pane = {
            let w = winlink.window.borrow();
            match pane_part {
                None | Some("") => w.active_pane(),
                Some(p) => {
                    if let Some(id) = p.strip_prefix('%') {
                        id.parse().ok().and_then(|id| w.pane_by_id(id))
                    } else {
                        p.parse::<usize>().ok().and_then(|i| w.pane_at(i))
                    }
                }
            }
        }
        .ok_or_else(|| Error::NoSuchPane(raw.to_string()))?;
        Ok((session, winlink, pane))
    }

    /// Resolve a `[session:]index` spec for commands that create windows: the
    /// index may not exist yet. An empty index means the lowest free one.
    pub fn lookup_index(&self, raw: Option<&str>, cmdq: &CmdQueue) -> Result<(SessionHandle, i32)> {
        let (sess_spec, idx_part) = match raw {
            None => (None, None),
            Some(raw) => match raw.split_once(':') {
                Some((s, i)) => (
                    if s.is_empty() { None } else { Some(s) },
                    if i.is_empty() { None } else { Some(i) },
                ),
                None => (None, Some(raw)),
            },
        };
        let session = self.lookup_session(sess_spec, cmdq, false)?;
        let index = match idx_part {
            None => session.borrow().next_index(),
            Some(i) => i
                .parse::<i32>()
                .map_err(|_| Error::BadIndex(i.to_string()))?,
        };
        Ok((session, index))
    }

    /// Find a window by `@id` across all sessions.
    #[must_use]
    pub fn window_by_id_str(&self, spec: &str) -> Option<(SessionHandle, Winlink)> {
        let id: u32 = spec.strip_prefix('@')?.parse().ok()?;
        for session in self.sessions.borrow().iter() {
            if let Some(winlink) = session.borrow().winlink_by_window_id(id) {
                return Some((Rc::clone(session), winlink));
            }
        }
        None
    }

    /// Find a pane by id across all sessions.
    #[must_use]
    pub fn pane_by_id(&self, id: u32) -> Option<(SessionHandle, Winlink, PaneHandle)> {
        for session in self.sessions.borrow().iter() {
            let found = {
                let s = session.borrow();
                s.windows.iter().find_map(|(index, window)| {
                    window.borrow().pane_by_id(id).map(|pane| {
                        (
                            Winlink {
                                index: *index,
                                window: Rc::clone(window),
                            },
                            pane,
                        )
                    })
                })
            };
            if let Some((winlink, pane)) = found {
                return Some((Rc::clone(session), winlink, pane));
            }
        }
        None
    }
}
