//! Builtin command table.
//!
//! A small command set covering the structural operations the engine exists
//! to order: session/window lifecycle, hook management, message display and
//! wait channels. Each entry declares its target claims; the resolver fills
//! the execution state before the body runs, so bodies only deal with
//! already-resolved handles.

use crate::command::{Command, CommandOutcome, TargetClaims};
use crate::dispatch::{CommandDef, CommandTable};
use crate::hooks::HookScope;
use crate::queue::CmdQueue;
use crate::runtime::Runtime;
use crate::state::ExecState;
use std::rc::Rc;

/// The standard dispatch table.
#[must_use]
pub fn command_table() -> Rc<CommandTable> {
    let mut table = CommandTable::new();

    table.define(CommandDef {
        name: "new-session",
        alias: Some("new"),
        value_flags: &['s'],
        bool_flags: &['d'],
        min_args: 0,
        max_args: Some(0),
        usage: "[-d] [-s session-name]",
        claims: TargetClaims::empty(),
        control: false,
        exec: Rc::new(exec_new_session),
    });
    table.define(CommandDef {
        name: "new-window",
        alias: Some("neww"),
        value_flags: &['t', 'n'],
        bool_flags: &[],
        min_args: 0,
        max_args: Some(0),
        usage: "[-n window-name] [-t [session:]index]",
        claims: TargetClaims::SESSION_T | TargetClaims::INDEX_T,
        control: false,
        exec: Rc::new(exec_new_window),
    });
    table.define(CommandDef {
        name: "kill-window",
        alias: Some("killw"),
        value_flags: &['t'],
        bool_flags: &['a'],
        min_args: 0,
        max_args: Some(0),
        usage: "[-a] [-t target-window]",
        claims: TargetClaims::WINDOW_T,
        control: false,
        exec: Rc::new(exec_kill_window),
    });
    table.define(CommandDef {
        name: "rename-session",
        alias: Some("rename"),
        value_flags: &['t'],
        bool_flags: &[],
        min_args: 1,
        max_args: Some(1),
        usage: "[-t target-session] new-name",
        claims: TargetClaims::SESSION_T,
        control: false,
        exec: Rc::new(exec_rename_session),
    });
    table.define(CommandDef {
        name: "rename-window",
        alias: Some("renamew"),
        value_flags: &['t'],
        bool_flags: &[],
        min_args: 1,
        max_args: Some(1),
        usage: "[-t target-window] new-name",
        claims: TargetClaims::WINDOW_T,
        control: false,
        exec: Rc::new(exec_rename_window),
    });
    table.define(CommandDef {
        name: "attach-session",
        alias: Some("attach"),
        value_flags: &['t'],
        bool_flags: &[],
        min_args: 0,
        max_args: Some(0),
        usage: "[-t target-session]",
        claims: TargetClaims::SESSION_T | TargetClaims::PREFER_UNATTACHED,
        control: false,
        exec: Rc::new(exec_attach_session),
    });
    table.define(CommandDef {
        name: "list-sessions",
        alias: Some("ls"),
        value_flags: &[],
        bool_flags: &[],
        min_args: 0,
        max_args: Some(0),
        usage: "",
        claims: TargetClaims::empty(),
        control: false,
        exec: Rc::new(exec_list_sessions),
    });
    table.define(CommandDef {
        name: "display-message",
        alias: Some("display"),
        value_flags: &['c', 't'],
        bool_flags: &['p'],
        min_args: 0,
        max_args: Some(1),
        usage: "[-p] [-c target-client] [-t target-pane] [message]",
        claims: TargetClaims::SESSION_T
            | TargetClaims::PANE_T
            | TargetClaims::CLIENT_C
            | TargetClaims::CAN_FAIL,
        control: false,
        exec: Rc::new(exec_display_message),
    });
    table.define(CommandDef {
        name: "set-hook",
        alias: None,
        value_flags: &['t'],
        bool_flags: &['g', 'u'],
        min_args: 1,
        max_args: Some(2),
        usage: "[-gu] [-t target-session] hook-name [command]",
        claims: TargetClaims::SESSION_T | TargetClaims::CAN_FAIL,
        control: false,
        exec: Rc::new(exec_set_hook),
    });
    table.define(CommandDef {
        name: "show-hooks",
        alias: None,
        value_flags: &['t'],
        bool_flags: &['g'],
        min_args: 0,
        max_args: Some(0),
        usage: "[-g] [-t target-session]",
        claims: TargetClaims::SESSION_T | TargetClaims::CAN_FAIL,
        control: false,
        exec: Rc::new(exec_show_hooks),
    });
    table.define(CommandDef {
        name: "wait-for",
        alias: Some("wait"),
        value_flags: &[],
        bool_flags: &['S'],
        min_args: 1,
        max_args: Some(1),
        usage: "[-S] channel",
        claims: TargetClaims::empty(),
        control: false,
        exec: Rc::new(exec_wait_for),
    });

    Rc::new(table)
}

// =============================================================================
// Command bodies
// =============================================================================

fn exec_new_session(
    rt: &Runtime,
    cmdq: &CmdQueue,
    cmd: &Command,
    _state: &mut ExecState,
) -> CommandOutcome {
    let name = cmd.args.get('s').map_or_else(
        || format!("s{}", rt.sessions().len()),
        str::to_string,
    );
    if rt
        .sessions()
        .iter()
        .any(|s| s.borrow().name == name)
    {
        cmdq.error(&format!("duplicate session: {name}"));
        return CommandOutcome::Error;
    }
    let session = rt.new_session(&name);
    rt.new_window(&session, &name, 1);
    if !cmd.args.has('d') {
        if let Some(client) = cmdq.client() {
            rt.attach_client(&client, &session);
        }
    }
    CommandOutcome::Normal
}

fn exec_new_window(
    rt: &Runtime,
    cmdq: &CmdQueue,
    cmd: &Command,
    state: &mut ExecState,
) -> CommandOutcome {
    let Some(session) = state.target.session.clone() else {
        cmdq.error("no current session");
        return CommandOutcome::Error;
    };
    let name = cmd.args.get('n').unwrap_or("window").to_string();
    let result = match state.target.index {
        Some(index) => rt.new_window_at(&session, &name, 1, index),
        None => Ok(rt.new_window(&session, &name, 1)),
    };
    match result {
        Ok(_) => CommandOutcome::Normal,
        Err(err) => {
            cmdq.error(&err.to_string());
            CommandOutcome::Error
        }
    }
}

fn exec_kill_window(
    rt: &Runtime,
    cmdq: &CmdQueue,
    cmd: &Command,
    state: &mut ExecState,
) -> CommandOutcome {
    let (Some(session), Some(winlink)) =
        (state.target.session.clone(), state.target.winlink.clone())
    else {
        cmdq.error("no current window");
        return CommandOutcome::Error;
    };
    let result = if cmd.args.has('a') {
        // kill every other window in the session
        let others: Vec<i32> = session
            .borrow()
            .windows
            .keys()
            .copied()
            .filter(|i| *i != winlink.index)
            .collect();
        others.into_iter().try_for_each(|i| rt.kill_window(&session, i))
    } else {
        rt.kill_window(&session, winlink.index)
    };
    match result {
        Ok(()) => CommandOutcome::Normal,
        Err(err) => {
            cmdq.error(&err.to_string());
            CommandOutcome::Error
        }
    }
}

fn exec_rename_session(
    rt: &Runtime,
    cmdq: &CmdQueue,
    cmd: &Command,
    state: &mut ExecState,
) -> CommandOutcome {
    let Some(session) = state.target.session.clone() else {
        cmdq.error("no current session");
        return CommandOutcome::Error;
    };
    let name = &cmd.args.values()[0];
    if session.borrow().name == *name {
        return CommandOutcome::Normal;
    }
    if rt.sessions().iter().any(|s| s.borrow().name == *name) {
        cmdq.error(&format!("duplicate session: {name}"));
        return CommandOutcome::Error;
    }
    rt.rename_session(&session, name);
    CommandOutcome::Normal
}

fn exec_rename_window(
    rt: &Runtime,
    cmdq: &CmdQueue,
    cmd: &Command,
    state: &mut ExecState,
) -> CommandOutcome {
    let (Some(session), Some(winlink)) =
        (state.target.session.clone(), state.target.winlink.clone())
    else {
        cmdq.error("no current window");
        return CommandOutcome::Error;
    };
    rt.rename_window(&session, &winlink.window, &cmd.args.values()[0]);
    CommandOutcome::Normal
}

fn exec_attach_session(
    rt: &Runtime,
    cmdq: &CmdQueue,
    _cmd: &Command,
    state: &mut ExecState,
) -> CommandOutcome {
    let Some(session) = state.target.session.clone() else {
        cmdq.error("no current session");
        return CommandOutcome::Error;
    };
    let Some(client) = state.client.clone() else {
        cmdq.error("no current client");
        return CommandOutcome::Error;
    };
    rt.attach_client(&client, &session);
    CommandOutcome::Normal
}

fn exec_list_sessions(
    rt: &Runtime,
    cmdq: &CmdQueue,
    _cmd: &Command,
    _state: &mut ExecState,
) -> CommandOutcome {
    for session in rt.sessions() {
        let s = session.borrow();
        let attached = if s.is_attached() { " (attached)" } else { "" };
        cmdq.print(&format!(
            "{}: {} windows{attached}",
            s.name,
            s.windows.len()
        ));
    }
    CommandOutcome::Normal
}

fn exec_display_message(
    _rt: &Runtime,
    cmdq: &CmdQueue,
    cmd: &Command,
    state: &mut ExecState,
) -> CommandOutcome {
    let text = match cmd.args.first() {
        Some(text) => text.to_string(),
        None => {
            let (Some(session), Some(winlink), Some(pane)) = (
                state.target.session.as_ref(),
                state.target.winlink.as_ref(),
                state.target.pane.as_ref(),
            ) else {
                cmdq.error("no target pane");
                return CommandOutcome::Error;
            };
            format!(
                "[{}] {}:{}, current pane {}",
                session.borrow().name,
                winlink.index,
                winlink.window.borrow().name,
                pane.borrow().id_str()
            )
        }
    };
    if cmd.args.has('p') {
        cmdq.print(&text);
    } else {
        cmdq.info(&text);
    }
    CommandOutcome::Normal
}

/// Choose the registry a hook operation applies to: global with `-g`,
/// otherwise the target session's.
fn hook_scope(rt: &Runtime, cmd: &Command, state: &ExecState) -> Option<HookScope> {
    if cmd.args.has('g') {
        return Some(rt.global_hooks());
    }
    state
        .target
        .session
        .as_ref()
        .map(|s| Rc::clone(&s.borrow().hooks))
}

fn exec_set_hook(
    rt: &Runtime,
    cmdq: &CmdQueue,
    cmd: &Command,
    state: &mut ExecState,
) -> CommandOutcome {
    let Some(scope) = hook_scope(rt, cmd, state) else {
        cmdq.error("no current session");
        return CommandOutcome::Error;
    };
    let name = cmd.args.values()[0].clone();

    if cmd.args.has('u') {
        scope.borrow_mut().remove(&name);
        return CommandOutcome::Normal;
    }
    let Some(text) = cmd.args.values().get(1) else {
        cmdq.error(&format!("no command given for hook: {name}"));
        return CommandOutcome::Error;
    };
    // a parse failure installs nothing
    match rt.table().parse_script(text) {
        Ok(list) => {
            scope.borrow_mut().set(name, list);
            CommandOutcome::Normal
        }
        Err(err) => {
            cmdq.error(&err.to_string());
            CommandOutcome::Error
        }
    }
}

fn exec_show_hooks(
    rt: &Runtime,
    cmdq: &CmdQueue,
    cmd: &Command,
    state: &mut ExecState,
) -> CommandOutcome {
    let Some(scope) = hook_scope(rt, cmd, state) else {
        cmdq.error("no current session");
        return CommandOutcome::Error;
    };
    for (name, list) in scope.borrow().iter_local() {
        cmdq.print(&format!("{name} -> {list}"));
    }
    CommandOutcome::Normal
}

fn exec_wait_for(
    rt: &Runtime,
    cmdq: &CmdQueue,
    cmd: &Command,
    _state: &mut ExecState,
) -> CommandOutcome {
    let channel = &cmd.args.values()[0];
    if cmd.args.has('S') {
        for waiter in rt.take_waiters(channel) {
            waiter.advance_and_continue(rt);
        }
        return CommandOutcome::Normal;
    }
    rt.push_waiter(channel, cmdq.clone());
    CommandOutcome::Wait
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{MemoryReporter, Reporter};

    fn setup() -> (Runtime, CmdQueue, Rc<MemoryReporter>) {
        let rt = Runtime::new(command_table());
        let cmdq = CmdQueue::new(None);
        let reporter = Rc::new(MemoryReporter::new());
        cmdq.set_reporter(Rc::clone(&reporter) as Rc<dyn Reporter>);
        (rt, cmdq, reporter)
    }

    fn run(rt: &Runtime, cmdq: &CmdQueue, script: &str) {
        let list = rt.table().parse_script(script).unwrap();
        cmdq.run(rt, list);
    }

    #[test]
    fn new_session_and_window_lifecycle() {
        let (rt, cmdq, reporter) = setup();
        run(&rt, &cmdq, "new-session -d -s main");
        run(&rt, &cmdq, "new-window -n logs");
        assert_eq!(rt.sessions().len(), 1);
        assert_eq!(rt.sessions()[0].borrow().windows.len(), 2);

        run(&rt, &cmdq, "new-session -d -s main");
        assert_eq!(reporter.errors(), ["duplicate session: main"]);
    }

    #[test]
    fn new_window_at_an_occupied_index_fails() {
        let (rt, cmdq, reporter) = setup();
        run(&rt, &cmdq, "new-session -d -s main");
        run(&rt, &cmdq, "new-window -t main:0 -n clash");
        assert_eq!(reporter.errors(), ["index not valid: 0"]);

        run(&rt, &cmdq, "new-window -t main:5 -n ok");
        assert!(rt.sessions()[0].borrow().winlink(5).is_some());
    }

    #[test]
    fn kill_window_all_but_target() {
        let (rt, cmdq, _) = setup();
        run(&rt, &cmdq, "new-session -d -s main");
        run(&rt, &cmdq, "new-window -n a ; new-window -n b");
        run(&rt, &cmdq, "kill-window -a -t main:1");

        let s = rt.sessions()[0].clone();
        assert_eq!(s.borrow().windows.len(), 1);
        assert_eq!(s.borrow().winlink(1).unwrap().window.borrow().name, "a");
    }

    #[test]
    fn rename_session_rejects_duplicates() {
        let (rt, cmdq, reporter) = setup();
        run(&rt, &cmdq, "new-session -d -s main ; new-session -d -s other");
        run(&rt, &cmdq, "rename-session -t other main");
        assert_eq!(reporter.errors(), ["duplicate session: main"]);

        run(&rt, &cmdq, "rename-session -t other fresh");
        assert!(rt.sessions().iter().any(|s| s.borrow().name == "fresh"));
    }

    #[test]
    fn display_message_prints_or_reports() {
        let (rt, cmdq, reporter) = setup();
        run(&rt, &cmdq, "new-session -d -s main");
        run(&rt, &cmdq, "display-message -p hello");
        assert_eq!(reporter.prints(), ["hello"]);

        run(&rt, &cmdq, "display-message -p");
        assert_eq!(
            reporter.prints(),
            ["hello", "[main] 0:main, current pane %0"]
        );
    }

    #[test]
    fn set_hook_parse_failure_installs_nothing() {
        let (rt, cmdq, reporter) = setup();
        run(&rt, &cmdq, "new-session -d -s main");
        run(&rt, &cmdq, "set-hook -g after-new-window 'bogus-cmd x'");
        assert!(!reporter.errors().is_empty());
        assert!(rt.global_hooks().borrow().find("after-new-window").is_none());
    }

    #[test]
    fn set_and_show_and_unset_hooks() {
        let (rt, cmdq, reporter) = setup();
        run(&rt, &cmdq, "new-session -d -s main");
        run(
            &rt,
            &cmdq,
            "set-hook -t main after-new-window 'display-message -p linked'",
        );
        run(&rt, &cmdq, "show-hooks -t main");
        assert_eq!(
            reporter.prints(),
            ["after-new-window -> display-message -p linked"]
        );

        // the hook fires on the matching command
        run(&rt, &cmdq, "new-window -n logs");
        assert_eq!(reporter.prints()[1], "linked");

        run(&rt, &cmdq, "set-hook -u -t main after-new-window");
        run(&rt, &cmdq, "new-window -n more");
        assert_eq!(reporter.prints().len(), 2);
    }

    #[test]
    fn wait_for_suspends_until_signalled() {
        let (rt, cmdq, reporter) = setup();
        run(&rt, &cmdq, "new-session -d -s main");
        run(&rt, &cmdq, "wait-for ready ; display-message -p done");
        assert!(cmdq.is_waiting());
        assert!(reporter.prints().is_empty());

        let signaller = CmdQueue::new(None);
        run(&rt, &signaller, "wait-for -S ready");
        assert!(cmdq.is_idle());
        assert_eq!(reporter.prints(), ["done"]);
    }
}
