//! Transient execution state resolved before each command runs.

use crate::model::{ClientHandle, PaneHandle, SessionHandle, Winlink};

/// Resolved context for one target flag (`-t` or `-s`).
#[derive(Clone, Debug, Default)]
pub struct TargetState {
    pub session: Option<SessionHandle>,
    pub winlink: Option<Winlink>,
    pub pane: Option<PaneHandle>,
    /// Window index for commands operating on not-yet-existing slots.
    pub index: Option<i32>,
}

impl TargetState {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.session.is_none()
            && self.winlink.is_none()
            && self.pane.is_none()
            && self.index.is_none()
    }
}

/// Per-command execution state, rebuilt by the resolver before every
/// execution. Resolution either fully succeeds or the command is aborted;
/// a failed resolution never leaves a partially filled state behind.
#[derive(Clone, Debug, Default)]
pub struct ExecState {
    pub client: Option<ClientHandle>,
    /// `-t` context.
    pub target: TargetState,
    /// `-s` context, for commands needing two targets.
    pub source: TargetState,
}

impl ExecState {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
