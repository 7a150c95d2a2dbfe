//! The command queue engine.
//!
//! Each consumer (a client, or a headless context) owns one [`CmdQueue`]: an
//! ordered list of command-list entries plus a cursor. A walk executes
//! commands one at a time: resolve the execution context, run the
//! `before-<name>` hook, emit a begin guard, execute, then run the
//! `after-<name>` hook and emit the end guard unless the command errored.
//!
//! ```text
//!            ┌────────────── entry ──────────────┐
//! entries:   │ cmd0   cmd1   cmd2 │ entry │ entry │ ...
//!                      ▲
//!            cursor ───┘ Idle | Active{n} | Waiting{n}
//! ```
//!
//! The cursor lives on the queue, not on the call stack: hook command lists
//! walk their own nested queues, so a recursive walk never disturbs the
//! outer frame's position. A command returning `Wait` suspends the whole
//! queue; the resuming collaborator calls [`CmdQueue::advance_and_continue`],
//! which moves the cursor past the waited command before walking again, so a
//! bare re-walk can never re-execute it.

use crate::command::{Command, CommandList, CommandOutcome};
use crate::hooks::HookScope;
use crate::model::ClientHandle;
use crate::report::{GuardKind, GuardMarker, GuardObserver, NullReporter, Reporter};
use crate::resolve;
use crate::runtime::Runtime;
use crate::state::ExecState;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// One enqueued command list.
struct QueueEntry {
    list: CommandList,
}

/// Walk position. Either idle, or pointing at a command of the front entry.
/// `Waiting` marks a command that has executed and suspended; it is never
/// executed again from that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Idle,
    Active { command: usize },
    Waiting { command: usize },
}

struct CmdQueueInner {
    client: Option<ClientHandle>,
    entries: VecDeque<QueueEntry>,
    cursor: Cursor,
    /// Guard sequence number, monotonically increasing per queue.
    number: u64,
    /// Wall-clock seconds at the last command start.
    time: i64,
    client_exit: bool,
    /// The outer queue's current command, for nested hook queues.
    base_cmd: Option<Command>,
    reporter: Rc<dyn Reporter>,
    guards: Option<Rc<dyn GuardObserver>>,
    on_empty: Option<Rc<dyn Fn(&CmdQueue)>>,
}

/// Shared handle to a per-consumer command queue.
#[derive(Clone)]
pub struct CmdQueue {
    inner: Rc<RefCell<CmdQueueInner>>,
}

enum Step {
    Run(Command),
    Exhausted,
    Drained,
}

impl CmdQueue {
    /// A queue for `client`, or a headless queue when `None`.
    #[must_use]
    pub fn new(client: Option<ClientHandle>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(CmdQueueInner {
                client,
                entries: VecDeque::new(),
                cursor: Cursor::Idle,
                number: 0,
                time: 0,
                client_exit: false,
                base_cmd: None,
                reporter: Rc::new(NullReporter),
                guards: None,
                on_empty: None,
            })),
        }
    }

    /// A nested queue for running a hook list: same consumer and reporter,
    /// with `base` as the resolution fallback command.
    pub(crate) fn nested(&self, base: &Command) -> Self {
        let inner = self.inner.borrow();
        Self {
            inner: Rc::new(RefCell::new(CmdQueueInner {
                client: inner.client.clone(),
                entries: VecDeque::new(),
                cursor: Cursor::Idle,
                number: 0,
                time: 0,
                client_exit: false,
                base_cmd: Some(base.clone()),
                reporter: Rc::clone(&inner.reporter),
                guards: None,
                on_empty: None,
            })),
        }
    }

    // -- configuration ------------------------------------------------------

    pub fn set_reporter(&self, reporter: Rc<dyn Reporter>) {
        self.inner.borrow_mut().reporter = reporter;
    }

    pub fn set_guard_observer(&self, observer: Rc<dyn GuardObserver>) {
        self.inner.borrow_mut().guards = Some(observer);
    }

    /// Callback invoked whenever a walk ends with the queue empty. The
    /// callback may drop its handles to this queue; the engine does not
    /// touch the queue afterwards.
    pub fn set_on_empty(&self, callback: impl Fn(&CmdQueue) + 'static) {
        self.inner.borrow_mut().on_empty = Some(Rc::new(callback));
    }

    /// Mark the consumer to exit once the queue drains empty.
    pub fn set_client_exit(&self, exit: bool) {
        self.inner.borrow_mut().client_exit = exit;
    }

    // -- accessors ----------------------------------------------------------

    #[must_use]
    pub fn client(&self) -> Option<ClientHandle> {
        self.inner.borrow().client.clone()
    }

    /// The resolution fallback command for this queue (set on nested hook
    /// queues).
    #[must_use]
    pub fn base_cmd(&self) -> Option<Command> {
        self.inner.borrow().base_cmd.clone()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.inner.borrow().cursor == Cursor::Idle
    }

    #[must_use]
    pub fn is_waiting(&self) -> bool {
        matches!(self.inner.borrow().cursor, Cursor::Waiting { .. })
    }

    #[must_use]
    pub fn pending_entries(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    // -- reporting ----------------------------------------------------------

    /// Report a command error and record a nonzero exit status on the
    /// consumer.
    pub fn error(&self, message: &str) {
        let (reporter, client) = {
            let inner = self.inner.borrow();
            (Rc::clone(&inner.reporter), inner.client.clone())
        };
        tracing::debug!(message, "command error");
        reporter.error(client.as_ref(), message);
        if let Some(client) = client {
            client.borrow_mut().retcode = 1;
        }
    }

    pub fn info(&self, message: &str) {
        let (reporter, client) = {
            let inner = self.inner.borrow();
            (Rc::clone(&inner.reporter), inner.client.clone())
        };
        reporter.info(client.as_ref(), message);
    }

    pub fn print(&self, message: &str) {
        let (reporter, client) = {
            let inner = self.inner.borrow();
            (Rc::clone(&inner.reporter), inner.client.clone())
        };
        reporter.print(client.as_ref(), message);
    }

    // -- queue operations ----------------------------------------------------

    /// Append a command list at the tail. Does not start a walk.
    pub fn append(&self, list: CommandList) {
        self.inner.borrow_mut().entries.push_back(QueueEntry { list });
    }

    /// Append a command list and start walking if the queue is idle. A
    /// suspended queue only accumulates; the waiting command stays the
    /// resume point.
    pub fn run(&self, rt: &Runtime, list: CommandList) {
        self.append(list);
        let idle = self.inner.borrow().cursor == Cursor::Idle;
        if idle {
            self.continue_drain(rt);
        }
    }

    /// Discard all entries and reset the cursor. Never invokes the on-empty
    /// callback; already-running commands are not preempted.
    pub fn flush(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.entries.clear();
        inner.cursor = Cursor::Idle;
    }

    /// Walk the queue until it drains, suspends or stops. Returns true iff
    /// the queue ended empty during this call.
    ///
    /// Notification delivery is suppressed for the duration of the walk (the
    /// suppression is depth-counted, so nested hook walks stack); events
    /// published by commands are delivered when the outermost walk exits.
    pub fn continue_drain(&self, rt: &Runtime) -> bool {
        rt.bus().disable();
        let empty = self.walk(rt);
        rt.bus().enable(rt);
        empty
    }

    /// Resume a suspended queue: advance the cursor past the waited command,
    /// then walk. Calling this on a queue that is not suspended just walks.
    pub fn advance_and_continue(&self, rt: &Runtime) -> bool {
        {
            let mut inner = self.inner.borrow_mut();
            if let Cursor::Waiting { command } = inner.cursor {
                let next = command + 1;
                let exhausted = inner
                    .entries
                    .front()
                    .is_none_or(|entry| next >= entry.list.len());
                if exhausted {
                    inner.entries.pop_front();
                    inner.cursor = if inner.entries.is_empty() {
                        Cursor::Idle
                    } else {
                        Cursor::Active { command: 0 }
                    };
                } else {
                    inner.cursor = Cursor::Active { command: next };
                }
            }
        }
        self.continue_drain(rt)
    }

    // -- walk internals ------------------------------------------------------

    fn walk(&self, rt: &Runtime) -> bool {
        let mut index = {
            let mut inner = self.inner.borrow_mut();
            match inner.cursor {
                Cursor::Waiting { .. } => {
                    // suspended; only advance_and_continue may move forward
                    tracing::debug!("queue suspended, not re-executing");
                    return false;
                }
                Cursor::Active { command } => command,
                Cursor::Idle => {
                    if inner.entries.is_empty() {
                        drop(inner);
                        return self.finish_empty();
                    }
                    inner.cursor = Cursor::Active { command: 0 };
                    0
                }
            }
        };

        loop {
            // The current entry is always the queue head; completed entries
            // are removed as the walk passes them.
            let step = {
                let inner = self.inner.borrow();
                match inner.entries.front() {
                    None => Step::Drained,
                    Some(entry) => match entry.list.commands().get(index) {
                        Some(cmd) => Step::Run(cmd.clone()),
                        None => Step::Exhausted,
                    },
                }
            };

            match step {
                Step::Drained => {
                    // a command flushed its own queue mid-walk
                    self.inner.borrow_mut().cursor = Cursor::Idle;
                    return self.finish_empty();
                }
                Step::Exhausted => {
                    if self.drop_front_entry() {
                        return self.finish_empty();
                    }
                    index = 0;
                }
                Step::Run(cmd) => match self.execute_one(rt, &cmd) {
                    CommandOutcome::Wait => {
                        self.inner.borrow_mut().cursor = Cursor::Waiting { command: index };
                        return false;
                    }
                    CommandOutcome::Stop => {
                        self.flush();
                        return self.finish_empty();
                    }
                    CommandOutcome::Error => {
                        // remaining commands of this entry are dropped;
                        // later entries still run
                        if self.drop_front_entry() {
                            return self.finish_empty();
                        }
                        index = 0;
                    }
                    CommandOutcome::Normal => {
                        index += 1;
                        let mut inner = self.inner.borrow_mut();
                        if matches!(inner.cursor, Cursor::Active { .. }) {
                            inner.cursor = Cursor::Active { command: index };
                        }
                    }
                },
            }
        }
    }

    /// Remove the front entry, releasing its list reference. Returns true
    /// when the queue is now empty (cursor reset to idle).
    fn drop_front_entry(&self) -> bool {
        let mut inner = self.inner.borrow_mut();
        inner.entries.pop_front();
        if inner.entries.is_empty() {
            inner.cursor = Cursor::Idle;
            true
        } else {
            inner.cursor = Cursor::Active { command: 0 };
            false
        }
    }

    /// Run one command: resolve, hooks, guards, execute.
    fn execute_one(&self, rt: &Runtime, cmd: &Command) -> CommandOutcome {
        let mut state = ExecState::default();
        if let Err(err) = resolve::prepare_state(rt, self, cmd, &mut state) {
            // a failed resolution behaves like a failed command: reported
            // once, with no hooks and no guard markers
            self.error(&err.to_string());
            return CommandOutcome::Error;
        }

        let scope: HookScope = state
            .target
            .session
            .as_ref()
            .map_or_else(|| rt.global_hooks(), |s| Rc::clone(&s.borrow().hooks));

        tracing::debug!(command = %cmd, "running command");
        {
            let mut inner = self.inner.borrow_mut();
            inner.number += 1;
            inner.time = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX));
        }

        // A before hook cannot be validated against the command it wraps;
        // it runs once resolution has succeeded, whatever the command then
        // returns. Hook-list errors are absorbed by the nested walk.
        self.run_hook(rt, &scope, "before", cmd);

        let begun = self.emit_guard(GuardKind::Begin, cmd);
        let exec = Rc::clone(&cmd.def.exec);
        let outcome = exec.execute(rt, self, cmd, &mut state);

        if outcome == CommandOutcome::Error {
            // an erroring command suppresses its after hook
            if begun {
                self.emit_guard(GuardKind::Error, cmd);
            }
        } else {
            self.run_hook(rt, &scope, "after", cmd);
            if begun {
                self.emit_guard(GuardKind::End, cmd);
            }
        }
        outcome
    }

    fn run_hook(&self, rt: &Runtime, scope: &HookScope, prefix: &str, cmd: &Command) {
        let name = format!("{prefix}-{}", cmd.name());
        let Some(list) = scope.borrow().find(&name) else {
            return;
        };
        tracing::debug!(hook = %name, "running hook");
        let nested = self.nested(cmd);
        nested.run(rt, list);
    }

    fn emit_guard(&self, kind: GuardKind, cmd: &Command) -> bool {
        let (observer, time, number) = {
            let inner = self.inner.borrow();
            match &inner.guards {
                None => return false,
                Some(observer) => (Rc::clone(observer), inner.time, inner.number),
            }
        };
        let marker = GuardMarker {
            kind,
            name: cmd.name().to_string(),
            time,
            number,
            flags: u32::from(cmd.def.control),
        };
        observer.guard(&marker);
        true
    }

    fn finish_empty(&self) -> bool {
        let (client_exit, client, on_empty) = {
            let inner = self.inner.borrow();
            (
                inner.client_exit,
                inner.client.clone(),
                inner.on_empty.clone(),
            )
        };
        if client_exit {
            if let Some(client) = &client {
                client.borrow_mut().exit = true;
            }
        }
        if let Some(callback) = on_empty {
            // the callback may drop the queue; nothing after this touches it
            callback(self);
        }
        true
    }
}
