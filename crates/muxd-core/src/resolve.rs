//! Execution-context resolution.
//!
//! Before a command runs, its [`TargetClaims`] are turned into a concrete
//! [`ExecState`]: a client, a `-t` context and a `-s` context. Resolution is
//! all-or-nothing; on failure the state is left empty and the command never
//! executes.
//!
//! A command without its own target flag inherits the flag of the queue's
//! base command, so hook commands act on whatever the hooked command was
//! aimed at. With no flag anywhere, resolution falls back to the implied
//! context (queue client's session, then current session).

use crate::command::{Command, TargetClaims, TargetShape};
use crate::error::{Error, Result};
use crate::model::{PaneHandle, SessionHandle, Winlink};
use crate::queue::CmdQueue;
use crate::runtime::Runtime;
use crate::state::{ExecState, TargetState};

pub fn prepare_state(
    rt: &Runtime,
    cmdq: &CmdQueue,
    cmd: &Command,
    state: &mut ExecState,
) -> Result<()> {
    state.clear();
    let result = resolve_into(rt, cmdq, cmd, state);
    if result.is_err() {
        state.clear();
    }
    result
}

fn resolve_into(
    rt: &Runtime,
    cmdq: &CmdQueue,
    cmd: &Command,
    state: &mut ExecState,
) -> Result<()> {
    let claims = cmd.claims();

    resolve_client(rt, cmdq, cmd, claims, state)?;
    resolve_target(
        rt,
        cmdq,
        cmd,
        claims,
        claims.target_shape(),
        't',
        &mut state.target,
    )?;
    resolve_target(
        rt,
        cmdq,
        cmd,
        claims,
        claims.source_shape(),
        's',
        &mut state.source,
    )?;
    Ok(())
}

fn resolve_client(
    rt: &Runtime,
    cmdq: &CmdQueue,
    cmd: &Command,
    claims: TargetClaims,
    state: &mut ExecState,
) -> Result<()> {
    let wants_c = claims.contains(TargetClaims::CLIENT_C);
    let wants_t = claims.contains(TargetClaims::CLIENT_T);
    assert!(
        !(wants_c && wants_t),
        "command {} claims a client by both -c and -t",
        cmd.name()
    );

    if !wants_c && !wants_t {
        // no claim: fill quietly when one is around, never an error
        state.client = rt.default_client(cmdq);
        return Ok(());
    }

    let flag = if wants_t { 't' } else { 'c' };
    state.client = Some(match cmd.args.get(flag) {
        Some(name) => rt.client_by_name(name)?,
        None => rt.default_client(cmdq).ok_or(Error::NoCurrentClient)?,
    });
    Ok(())
}

fn resolve_target(
    rt: &Runtime,
    cmdq: &CmdQueue,
    cmd: &Command,
    claims: TargetClaims,
    shape: TargetShape,
    flag: char,
    out: &mut TargetState,
) -> Result<()> {
    if shape == TargetShape::None {
        return Ok(());
    }

    // the command's own flag, else the queue's base command's
    let raw: Option<String> = match cmd.args.get(flag) {
        Some(value) => Some(value.to_string()),
        None => cmdq
            .base_cmd()
            .as_ref()
            .and_then(|base| base.args.get(flag).map(str::to_string)),
    };
    let raw = raw.as_deref();

    let result = lookup_shape(rt, cmdq, claims, shape, raw, out);
    if result.is_err() && claims.contains(TargetClaims::CAN_FAIL) {
        *out = TargetState::default();
        return Ok(());
    }
    result
}

fn lookup_shape(
    rt: &Runtime,
    cmdq: &CmdQueue,
    claims: TargetClaims,
    shape: TargetShape,
    raw: Option<&str>,
    out: &mut TargetState,
) -> Result<()> {
    let prefer = claims.contains(TargetClaims::PREFER_UNATTACHED);
    match shape {
        TargetShape::None => {}
        TargetShape::Session => {
            fill_session(out, rt.lookup_session(raw, cmdq, prefer)?);
        }
        TargetShape::Window => {
            let (session, winlink) = rt.lookup_window(raw, cmdq)?;
            fill_window(out, session, winlink);
        }
        TargetShape::Pane => {
            let (session, winlink, pane) = rt.lookup_pane(raw, cmdq)?;
            fill_pane(out, session, winlink, pane);
        }
        TargetShape::SessionPane => {
            // a separator or id prefix means a concrete window/pane spec;
            // anything else is a session, filled out best-effort
            let concrete = raw.is_some_and(|r| {
                r.contains(':') || r.contains('.') || r.starts_with('%') || r.starts_with('@')
            });
            if concrete {
                let (session, winlink, pane) = rt.lookup_pane(raw, cmdq)?;
                fill_pane(out, session, winlink, pane);
            } else {
                fill_session(out, rt.lookup_session(raw, cmdq, prefer)?);
            }
        }
        TargetShape::SessionIndex => match raw {
            Some(r) if r.contains(':') => {
                let (session, index) = rt.lookup_index(raw, cmdq)?;
                out.session = Some(session);
                out.index = Some(index);
            }
            Some(_) => {
                // a bare word is a session if one exists, else an index
                if let Ok(session) = rt.lookup_session(raw, cmdq, prefer) {
                    fill_session(out, session);
                } else {
                    let (session, index) = rt.lookup_index(raw, cmdq)?;
                    out.session = Some(session);
                    out.index = Some(index);
                }
            }
            None => {
                fill_session(out, rt.lookup_session(None, cmdq, prefer)?);
            }
        },
        TargetShape::Index => {
            let (session, index) = rt.lookup_index(raw, cmdq)?;
            out.session = Some(session);
            out.index = Some(index);
        }
    }
    Ok(())
}

fn fill_session(out: &mut TargetState, session: SessionHandle) {
    let winlink = session.borrow().current_winlink();
    if let Some(winlink) = winlink {
        out.pane = winlink.window.borrow().active_pane();
        out.winlink = Some(winlink);
    }
    out.session = Some(session);
}

fn fill_window(out: &mut TargetState, session: SessionHandle, winlink: Winlink) {
    out.pane = winlink.window.borrow().active_pane();
    out.winlink = Some(winlink);
    out.session = Some(session);
}

fn fill_pane(out: &mut TargetState, session: SessionHandle, winlink: Winlink, pane: PaneHandle) {
    out.session = Some(session);
    out.winlink = Some(winlink);
    out.pane = Some(pane);
}
