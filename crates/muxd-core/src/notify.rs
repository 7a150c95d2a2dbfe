//! Deferred notification bus.
//!
//! Mutation sites publish typed events; the bus queues them FIFO and, when
//! not suppressed, drains: each event is forwarded to registered control
//! observers and then dispatched to its `notify-*` hook (session scope when
//! the event carries one, global otherwise) on a fresh headless queue.
//!
//! Suppression is depth-counted, not boolean. Every queue walk disables the
//! bus on entry and enables it on exit, so notifications raised mid-command
//! are deferred until the outermost walk completes; only when the counter
//! returns to zero does a drain actually run.

use crate::model::{ClientHandle, PaneHandle, SessionHandle, WindowHandle};
use crate::queue::CmdQueue;
use crate::runtime::Runtime;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// Domain events carried by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotifyKind {
    WindowLayoutChanged,
    WindowUnlinked,
    WindowLinked,
    WindowRenamed,
    AttachedSessionChanged,
    SessionRenamed,
    SessionCreated,
    SessionClosed,
}

impl NotifyKind {
    /// Name of the hook dispatched for this event.
    #[must_use]
    pub fn hook_name(self) -> &'static str {
        match self {
            Self::WindowLayoutChanged => "notify-window-layout-changed",
            Self::WindowUnlinked => "notify-window-unlinked",
            Self::WindowLinked => "notify-window-linked",
            Self::WindowRenamed => "notify-window-renamed",
            Self::AttachedSessionChanged => "notify-attached-session-changed",
            Self::SessionRenamed => "notify-session-renamed",
            Self::SessionCreated => "notify-session-created",
            Self::SessionClosed => "notify-session-closed",
        }
    }
}

/// One queued event. Handles are strong references for the event's lifetime.
#[derive(Clone)]
pub struct NotificationEvent {
    pub kind: NotifyKind,
    pub client: Option<ClientHandle>,
    pub session: Option<SessionHandle>,
    pub window: Option<WindowHandle>,
}

/// Receiver of protocol notifications (a control-mode consumer).
pub trait ControlObserver {
    fn notification(&self, event: &NotificationEvent);

    /// Unqueued pane-input passthrough; default ignores it.
    fn input(&self, pane: &PaneHandle, data: &[u8]) {
        let _ = (pane, data);
    }
}

/// Deferred event queue with depth-counted suppression.
#[derive(Default)]
pub struct NotificationBus {
    queue: RefCell<VecDeque<NotificationEvent>>,
    disabled: Cell<u32>,
    observers: RefCell<Vec<Rc<dyn ControlObserver>>>,
}

impl NotificationBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&self, observer: Rc<dyn ControlObserver>) {
        self.observers.borrow_mut().push(observer);
    }

    /// Increase the suppression depth.
    pub fn disable(&self) {
        self.disabled.set(self.disabled.get() + 1);
        tracing::trace!(depth = self.disabled.get(), "notify disabled");
    }

    /// Decrease the suppression depth; drains when it reaches zero.
    pub fn enable(&self, rt: &Runtime) {
        if self.disabled.get() == 0 {
            return;
        }
        self.disabled.set(self.disabled.get() - 1);
        tracing::trace!(depth = self.disabled.get(), "notify enabled");
        if self.disabled.get() == 0 {
            self.drain(rt);
        }
    }

    /// Queue an event and drain unless suppressed.
    pub fn publish(
        &self,
        rt: &Runtime,
        kind: NotifyKind,
        client: Option<ClientHandle>,
        session: Option<SessionHandle>,
        window: Option<WindowHandle>,
    ) {
        self.queue.borrow_mut().push_back(NotificationEvent {
            kind,
            client,
            session,
            window,
        });
        self.drain(rt);
    }

    /// Number of queued, undelivered events.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Deliver queued events in FIFO order: observers first, then the
    /// matching hook. No-op while suppressed.
    pub fn drain(&self, rt: &Runtime) {
        if self.disabled.get() > 0 {
            return;
        }
        loop {
            if self.disabled.get() > 0 {
                // a hook re-suspended delivery; its walk drains the rest
                return;
            }
            let Some(event) = self.queue.borrow_mut().pop_front() else {
                return;
            };
            tracing::debug!(kind = ?event.kind, "delivering notification");

            let observers: Vec<_> = self.observers.borrow().clone();
            for observer in observers {
                observer.notification(&event);
            }

            let scope = event
                .session
                .as_ref()
                .map_or_else(|| rt.global_hooks(), |s| Rc::clone(&s.borrow().hooks));
            let hook = scope.borrow().find(event.kind.hook_name());
            if let Some(list) = hook {
                let cmdq = CmdQueue::new(None);
                cmdq.run(rt, list);
            }
        }
    }

    /// Forward pane input to observers immediately. Not queued; does nothing
    /// while suppressed.
    pub fn notify_input(&self, pane: &PaneHandle, data: &[u8]) {
        if self.disabled.get() > 0 {
            return;
        }
        let observers: Vec<_> = self.observers.borrow().clone();
        for observer in observers {
            observer.input(pane, data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, CommandList, CommandOutcome, TargetClaims};
    use crate::dispatch::{Args, CommandDef, CommandTable};
    use crate::model::Pane;
    use crate::state::ExecState;

    struct Recorder {
        kinds: RefCell<Vec<NotifyKind>>,
        input: RefCell<Vec<u8>>,
    }

    impl Recorder {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                kinds: RefCell::new(Vec::new()),
                input: RefCell::new(Vec::new()),
            })
        }
    }

    impl ControlObserver for Recorder {
        fn notification(&self, event: &NotificationEvent) {
            self.kinds.borrow_mut().push(event.kind);
        }

        fn input(&self, _pane: &PaneHandle, data: &[u8]) {
            self.input.borrow_mut().extend_from_slice(data);
        }
    }

    fn rt() -> Runtime {
        Runtime::new(Rc::new(CommandTable::new()))
    }

    fn marker_cmd(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> Command {
        let log = Rc::clone(log);
        Command {
            def: Rc::new(CommandDef {
                name,
                alias: None,
                value_flags: &[],
                bool_flags: &[],
                min_args: 0,
                max_args: None,
                usage: "",
                claims: TargetClaims::empty(),
                control: false,
                exec: Rc::new(
                    move |_: &Runtime,
                          _: &CmdQueue,
                          _: &Command,
                          _: &mut ExecState|
                          -> CommandOutcome {
                        log.borrow_mut().push(name);
                        CommandOutcome::Normal
                    },
                ),
            }),
            args: Args::default(),
        }
    }

    #[test]
    fn suppressed_events_queue_and_drain_fifo() {
        let rt = rt();
        let recorder = Recorder::new();
        rt.bus().add_observer(Rc::clone(&recorder) as Rc<dyn ControlObserver>);

        rt.bus().disable();
        rt.bus()
            .publish(&rt, NotifyKind::SessionCreated, None, None, None);
        rt.bus()
            .publish(&rt, NotifyKind::WindowLinked, None, None, None);
        assert!(recorder.kinds.borrow().is_empty());
        assert_eq!(rt.bus().pending(), 2);

        rt.bus().enable(&rt);
        assert_eq!(
            *recorder.kinds.borrow(),
            [NotifyKind::SessionCreated, NotifyKind::WindowLinked]
        );
        assert_eq!(rt.bus().pending(), 0);
    }

    #[test]
    fn nested_suppression_defers_until_outermost_enable() {
        let rt = rt();
        let recorder = Recorder::new();
        rt.bus().add_observer(Rc::clone(&recorder) as Rc<dyn ControlObserver>);

        rt.bus().disable();
        rt.bus().disable();
        rt.bus()
            .publish(&rt, NotifyKind::SessionRenamed, None, None, None);
        rt.bus().enable(&rt);
        assert!(recorder.kinds.borrow().is_empty());
        rt.bus().enable(&rt);
        assert_eq!(*recorder.kinds.borrow(), [NotifyKind::SessionRenamed]);
    }

    #[test]
    fn enable_below_zero_is_clamped() {
        let rt = rt();
        rt.bus().enable(&rt);
        rt.bus().disable();
        rt.bus().enable(&rt);
        // balanced again; publishing delivers immediately
        let recorder = Recorder::new();
        rt.bus().add_observer(Rc::clone(&recorder) as Rc<dyn ControlObserver>);
        rt.bus()
            .publish(&rt, NotifyKind::SessionClosed, None, None, None);
        assert_eq!(*recorder.kinds.borrow(), [NotifyKind::SessionClosed]);
    }

    #[test]
    fn drain_runs_hooks_even_with_no_observers() {
        let rt = rt();
        let log = Rc::new(RefCell::new(Vec::new()));
        rt.global_hooks().borrow_mut().set(
            "notify-window-linked",
            CommandList::new(vec![marker_cmd(&log, "hooked")]),
        );

        rt.bus()
            .publish(&rt, NotifyKind::WindowLinked, None, None, None);
        assert_eq!(*log.borrow(), ["hooked"]);
    }

    #[test]
    fn session_scoped_event_uses_session_hooks() {
        let rt = rt();
        let session = rt.new_session("main");
        let log = Rc::new(RefCell::new(Vec::new()));
        session.borrow().hooks.borrow_mut().set(
            "notify-session-renamed",
            CommandList::new(vec![marker_cmd(&log, "session-hook")]),
        );
        // a different hook in the global scope must not fire
        rt.global_hooks().borrow_mut().set(
            "notify-session-closed",
            CommandList::new(vec![marker_cmd(&log, "global-hook")]),
        );

        rt.rename_session(&session, "renamed");
        assert_eq!(*log.borrow(), ["session-hook"]);
    }

    #[test]
    fn input_passthrough_skips_the_queue() {
        let rt = rt();
        let recorder = Recorder::new();
        rt.bus().add_observer(Rc::clone(&recorder) as Rc<dyn ControlObserver>);
        let pane: PaneHandle = Rc::new(RefCell::new(Pane { id: 0 }));

        rt.bus().notify_input(&pane, b"live");
        assert_eq!(*recorder.input.borrow(), b"live");

        rt.bus().disable();
        rt.bus().notify_input(&pane, b"dropped");
        assert_eq!(*recorder.input.borrow(), b"live");
        assert_eq!(rt.bus().pending(), 0);
    }
}
