//! Commands, command lists and execution outcomes.
//!
//! A [`Command`] is one parsed operation: a dispatch-table entry plus its
//! arguments. A [`CommandList`] is an ordered, immutable, shared sequence of
//! commands; queue entries and hooks hold strong references to the same list
//! and it is freed when the last reference drops.

use crate::dispatch::{Args, CommandDef};
use crate::queue::CmdQueue;
use crate::runtime::Runtime;
use crate::state::ExecState;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

// =============================================================================
// Outcomes
// =============================================================================

/// Result of executing a single command.
///
/// ```text
/// Normal ──► advance to the next command
/// Error  ──► drop the rest of the current entry, keep later entries
/// Wait   ──► suspend the queue until an external resume
/// Stop   ──► flush the whole queue
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    Normal,
    Error,
    Wait,
    Stop,
}

// =============================================================================
// Target claims
// =============================================================================

bitflags! {
    /// What a command wants resolved before it executes.
    ///
    /// The `*_T` bits describe the `-t` target shape, the `*_S` bits the `-s`
    /// source shape. `SESSION_T | PANE_T` and `SESSION_T | INDEX_T` are the
    /// two supported compound shapes; any other multi-bit shape is a static
    /// defect and panics during resolution.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TargetClaims: u32 {
        /// Wants a client, named by `-c`.
        const CLIENT_C = 1 << 0;
        /// Wants a client, named by `-t`.
        const CLIENT_T = 1 << 1;

        const SESSION_T = 1 << 2;
        const WINDOW_T = 1 << 3;
        const PANE_T = 1 << 4;
        const INDEX_T = 1 << 5;

        const SESSION_S = 1 << 6;
        const WINDOW_S = 1 << 7;
        const PANE_S = 1 << 8;
        const INDEX_S = 1 << 9;

        /// Missing context yields an empty state instead of an error.
        const CAN_FAIL = 1 << 10;
        /// Prefer an unattached session when resolving without a target.
        const PREFER_UNATTACHED = 1 << 11;

        /// All `-t` shape bits.
        const ALL_T = Self::SESSION_T.bits()
            | Self::WINDOW_T.bits()
            | Self::PANE_T.bits()
            | Self::INDEX_T.bits();
        /// All `-s` shape bits.
        const ALL_S = Self::SESSION_S.bits()
            | Self::WINDOW_S.bits()
            | Self::PANE_S.bits()
            | Self::INDEX_S.bits();
    }
}

/// The resolved shape of a target or source claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetShape {
    None,
    Session,
    Window,
    Pane,
    /// Pane if the raw target carries a `:`/`.` separator, else session with
    /// best-effort window/pane fill.
    SessionPane,
    /// Session if it exists, else session plus a window index.
    SessionIndex,
    Index,
}

impl TargetClaims {
    /// Shape of the `-t` claim.
    ///
    /// # Panics
    ///
    /// Panics on a combination outside the supported shapes; that is a
    /// static defect in a command definition, not a runtime condition.
    #[must_use]
    pub fn target_shape(self) -> TargetShape {
        let t = self & Self::ALL_T;
        if t.is_empty() {
            TargetShape::None
        } else if t == Self::SESSION_T | Self::PANE_T {
            TargetShape::SessionPane
        } else if t == Self::SESSION_T | Self::INDEX_T {
            TargetShape::SessionIndex
        } else if t == Self::SESSION_T {
            TargetShape::Session
        } else if t == Self::WINDOW_T {
            TargetShape::Window
        } else if t == Self::PANE_T {
            TargetShape::Pane
        } else if t == Self::INDEX_T {
            TargetShape::Index
        } else {
            panic!("impossible -t claims: {t:?}");
        }
    }

    /// Shape of the `-s` claim. Same contract as [`Self::target_shape`].
    #[must_use]
    pub fn source_shape(self) -> TargetShape {
        let s = self & Self::ALL_S;
        if s.is_empty() {
            TargetShape::None
        } else if s == Self::SESSION_S | Self::PANE_S {
            TargetShape::SessionPane
        } else if s == Self::SESSION_S | Self::INDEX_S {
            TargetShape::SessionIndex
        } else if s == Self::SESSION_S {
            TargetShape::Session
        } else if s == Self::WINDOW_S {
            TargetShape::Window
        } else if s == Self::PANE_S {
            TargetShape::Pane
        } else if s == Self::INDEX_S {
            TargetShape::Index
        } else {
            panic!("impossible -s claims: {s:?}");
        }
    }
}

// =============================================================================
// Execution behavior
// =============================================================================

/// Executable behavior of a command, supplied by the dispatch table.
pub trait CommandExec {
    fn execute(
        &self,
        rt: &Runtime,
        cmdq: &CmdQueue,
        cmd: &Command,
        state: &mut ExecState,
    ) -> CommandOutcome;
}

impl<F> CommandExec for F
where
    F: Fn(&Runtime, &CmdQueue, &Command, &mut ExecState) -> CommandOutcome,
{
    fn execute(
        &self,
        rt: &Runtime,
        cmdq: &CmdQueue,
        cmd: &Command,
        state: &mut ExecState,
    ) -> CommandOutcome {
        self(rt, cmdq, cmd, state)
    }
}

// =============================================================================
// Command and command list
// =============================================================================

/// One parsed command: a table entry plus arguments.
#[derive(Clone, PartialEq)]
pub struct Command {
    pub def: Rc<CommandDef>,
    pub args: Args,
}

impl Command {
    #[must_use]
    pub fn name(&self) -> &str {
        self.def.name
    }

    #[must_use]
    pub fn claims(&self) -> TargetClaims {
        self.def.claims
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.def.name)?;
        for (flag, value) in self.args.flag_entries() {
            match value {
                Some(v) => write!(f, " -{flag} {v}")?,
                None => write!(f, " -{flag}")?,
            }
        }
        for value in self.args.values() {
            write!(f, " {value}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command({self})")
    }
}

/// An ordered, immutable, reference-counted sequence of commands.
///
/// Cloning is cheap and shares the underlying sequence; the command order
/// never changes after parsing.
#[derive(Clone, PartialEq)]
pub struct CommandList {
    commands: Rc<Vec<Command>>,
}

impl CommandList {
    #[must_use]
    pub fn new(commands: Vec<Command>) -> Self {
        Self {
            commands: Rc::new(commands),
        }
    }

    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of live references to the shared sequence. Used by tests to
    /// check the "last reference frees it" invariant.
    #[must_use]
    pub fn refs(&self) -> usize {
        Rc::strong_count(&self.commands)
    }
}

impl fmt::Display for CommandList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, cmd) in self.commands.iter().enumerate() {
            if i > 0 {
                write!(f, " ; ")?;
            }
            write!(f, "{cmd}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CommandList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandList({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- TargetClaims shapes ----------------------------------------------

    #[test]
    fn empty_claims_have_no_shape() {
        assert_eq!(TargetClaims::empty().target_shape(), TargetShape::None);
        assert_eq!(TargetClaims::empty().source_shape(), TargetShape::None);
    }

    #[test]
    fn compound_shapes() {
        let c = TargetClaims::SESSION_T | TargetClaims::PANE_T;
        assert_eq!(c.target_shape(), TargetShape::SessionPane);
        let c = TargetClaims::SESSION_T | TargetClaims::INDEX_T;
        assert_eq!(c.target_shape(), TargetShape::SessionIndex);
    }

    #[test]
    fn modifiers_do_not_change_shape() {
        let c = TargetClaims::WINDOW_T | TargetClaims::CAN_FAIL | TargetClaims::PREFER_UNATTACHED;
        assert_eq!(c.target_shape(), TargetShape::Window);
    }

    #[test]
    #[should_panic(expected = "impossible -t claims")]
    fn impossible_combination_panics() {
        let _ = (TargetClaims::WINDOW_T | TargetClaims::PANE_T).target_shape();
    }

    #[test]
    fn source_shape_is_independent_of_target() {
        let c = TargetClaims::WINDOW_T | TargetClaims::PANE_S;
        assert_eq!(c.target_shape(), TargetShape::Window);
        assert_eq!(c.source_shape(), TargetShape::Pane);
    }
}
