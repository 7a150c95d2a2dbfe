//! Reporting and guard-marker collaborator interfaces.
//!
//! The engine surfaces errors, info and output through a [`Reporter`]; how a
//! message reaches the user (status line, stderr, capture buffer) is the
//! collaborator's concern. Control-mode consumers additionally receive
//! begin/end/error [`GuardMarker`]s around each command via a
//! [`GuardObserver`]; absence of an observer is a no-op, not an error.

use crate::model::ClientHandle;
use serde::Serialize;
use std::cell::RefCell;

// =============================================================================
// Reporting
// =============================================================================

/// Destination for command error/info/output text.
pub trait Reporter {
    fn error(&self, client: Option<&ClientHandle>, message: &str);
    fn info(&self, client: Option<&ClientHandle>, message: &str);
    fn print(&self, client: Option<&ClientHandle>, message: &str);
}

/// Discards everything. Default for queues with no reporting configured.
#[derive(Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn error(&self, _client: Option<&ClientHandle>, _message: &str) {}
    fn info(&self, _client: Option<&ClientHandle>, _message: &str) {}
    fn print(&self, _client: Option<&ClientHandle>, _message: &str) {}
}

/// Batch-mode reporting: output to stdout, errors to stderr.
#[derive(Default)]
pub struct StdioReporter;

impl Reporter for StdioReporter {
    fn error(&self, _client: Option<&ClientHandle>, message: &str) {
        eprintln!("{message}");
    }

    fn info(&self, _client: Option<&ClientHandle>, message: &str) {
        println!("{message}");
    }

    fn print(&self, _client: Option<&ClientHandle>, message: &str) {
        println!("{message}");
    }
}

/// Captures reports in memory. Test collaborator.
#[derive(Default)]
pub struct MemoryReporter {
    errors: RefCell<Vec<String>>,
    infos: RefCell<Vec<String>>,
    prints: RefCell<Vec<String>>,
}

impl MemoryReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.errors.borrow().clone()
    }

    #[must_use]
    pub fn infos(&self) -> Vec<String> {
        self.infos.borrow().clone()
    }

    #[must_use]
    pub fn prints(&self) -> Vec<String> {
        self.prints.borrow().clone()
    }
}

impl Reporter for MemoryReporter {
    fn error(&self, _client: Option<&ClientHandle>, message: &str) {
        self.errors.borrow_mut().push(message.to_string());
    }

    fn info(&self, _client: Option<&ClientHandle>, message: &str) {
        self.infos.borrow_mut().push(message.to_string());
    }

    fn print(&self, _client: Option<&ClientHandle>, message: &str) {
        self.prints.borrow_mut().push(message.to_string());
    }
}

// =============================================================================
// Guard markers
// =============================================================================

/// Phase of a guarded command execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardKind {
    Begin,
    End,
    Error,
}

/// Machine-readable progress marker emitted around a command's execution.
#[derive(Debug, Clone, Serialize)]
pub struct GuardMarker {
    pub kind: GuardKind,
    /// Name of the command being guarded.
    pub name: String,
    /// Wall-clock seconds since the epoch when the command began.
    pub time: i64,
    /// Per-queue sequence number, monotonically increasing.
    pub number: u64,
    /// Command flags (1 when the command is marked control).
    pub flags: u32,
}

/// Receiver for guard markers.
pub trait GuardObserver {
    fn guard(&self, marker: &GuardMarker);
}

/// Collects guard markers in memory. Test collaborator.
#[derive(Default)]
pub struct MemoryGuards {
    markers: RefCell<Vec<GuardMarker>>,
}

impl MemoryGuards {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn markers(&self) -> Vec<GuardMarker> {
        self.markers.borrow().clone()
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<GuardKind> {
        self.markers.borrow().iter().map(|m| m.kind).collect()
    }
}

impl GuardObserver for MemoryGuards {
    fn guard(&self, marker: &GuardMarker) {
        self.markers.borrow_mut().push(marker.clone());
    }
}
