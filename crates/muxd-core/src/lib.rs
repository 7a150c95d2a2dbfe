//! muxd-core: Core library for muxd
//!
//! This crate provides the command engine for `muxd`, a terminal-multiplexer
//! control core: an ordered, re-entrant command queue with before/after
//! hooks, deferred notifications and target resolution.
//!
//! # Architecture
//!
//! ```text
//! script/control input → Dispatch (parse) → CmdQueue per consumer
//!                                               ↓
//!                    Resolver ← claims    execute command
//!                                               ↓
//!                  HookRegistry (before/after)  │  guard markers
//!                                               ↓
//!                  Runtime mutations → NotificationBus → notify-* hooks
//! ```
//!
//! # Modules
//!
//! - `command`: Commands, command lists, outcomes and target claims
//! - `dispatch`: Command table, name lookup and script parsing
//! - `queue`: The per-consumer command queue and its walk loop
//! - `hooks`: Named hook registries with parent-chain fallback
//! - `notify`: Deferred notification bus with depth-counted suppression
//! - `resolve`: Execution-context resolution from target claims
//! - `runtime`: Sessions, windows, panes, clients and target lookups
//! - `builtin`: The standard command set
//! - `model`: Session/window/pane/client data model
//! - `state`: Per-command execution state
//! - `report`: Reporter and guard-marker collaborator interfaces
//! - `logging`: Tracing subscriber setup
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod builtin;
pub mod command;
pub mod dispatch;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod model;
pub mod notify;
pub mod queue;
pub mod report;
pub mod resolve;
pub mod runtime;
pub mod state;

pub use builtin::command_table;
pub use command::{Command, CommandList, CommandOutcome, TargetClaims};
pub use error::{Error, Result};
pub use queue::CmdQueue;
pub use runtime::Runtime;
