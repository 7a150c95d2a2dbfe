//! End-to-end engine behavior through the builtin command set.

use muxd_core::notify::{ControlObserver, NotificationEvent, NotifyKind};
use muxd_core::report::{GuardKind, GuardObserver, MemoryGuards, MemoryReporter, Reporter};
use muxd_core::{CmdQueue, Runtime, command_table};
use std::cell::RefCell;
use std::rc::Rc;

fn engine() -> (Runtime, CmdQueue, Rc<MemoryReporter>) {
    let rt = Runtime::new(command_table());
    let client = rt.new_client("c0", false);
    let cmdq = CmdQueue::new(Some(client));
    let reporter = Rc::new(MemoryReporter::new());
    cmdq.set_reporter(Rc::clone(&reporter) as Rc<dyn Reporter>);
    (rt, cmdq, reporter)
}

fn run(rt: &Runtime, cmdq: &CmdQueue, script: &str) {
    let list = rt.table().parse_script(script).expect("script parses");
    cmdq.run(rt, list);
}

#[test]
fn script_runs_in_order_and_builds_state() {
    let (rt, cmdq, reporter) = engine();
    run(
        &rt,
        &cmdq,
        "new-session -d -s main ; new-window -n logs ; display-message -p hi",
    );
    assert!(cmdq.is_idle());
    assert_eq!(reporter.prints(), ["hi"]);
    let sessions = rt.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].borrow().windows.len(), 2);
}

#[test]
fn hooks_wrap_commands_and_inherit_the_target() {
    let (rt, cmdq, reporter) = engine();
    run(&rt, &cmdq, "new-session -d -s main ; new-window -n logs");
    run(
        &rt,
        &cmdq,
        "set-hook -t main before-rename-window 'display-message -p pre' ; \
         set-hook -t main after-rename-window 'display-message -p post'",
    );
    run(&rt, &cmdq, "rename-window -t main:1 journal");

    assert_eq!(reporter.prints(), ["pre", "post"]);
    let renamed = rt.sessions()[0]
        .borrow()
        .winlink(1)
        .unwrap()
        .window
        .borrow()
        .name
        .clone();
    assert_eq!(renamed, "journal");
}

#[test]
fn session_hook_shadows_the_global_one() {
    let (rt, cmdq, reporter) = engine();
    run(&rt, &cmdq, "new-session -d -s main");
    run(
        &rt,
        &cmdq,
        "set-hook -g after-new-window 'display-message -p global' ; \
         set-hook -t main after-new-window 'display-message -p session'",
    );
    run(&rt, &cmdq, "new-window -n a");
    assert_eq!(reporter.prints(), ["session"]);

    run(&rt, &cmdq, "set-hook -u -t main after-new-window");
    run(&rt, &cmdq, "new-window -n b");
    assert_eq!(reporter.prints(), ["session", "global"]);
}

#[test]
fn failed_command_suppresses_after_hook_and_sets_retcode() {
    let (rt, cmdq, reporter) = engine();
    run(&rt, &cmdq, "new-session -d -s main");
    run(
        &rt,
        &cmdq,
        "set-hook -g after-kill-window 'display-message -p killed'",
    );
    run(
        &rt,
        &cmdq,
        "kill-window -t main:99 ; display-message -p skipped",
    );
    run(&rt, &cmdq, "display-message -p ran");

    assert_eq!(reporter.errors(), ["window not found: main:99"]);
    // the rest of the failing entry is dropped; the next entry still runs
    assert_eq!(reporter.prints(), ["ran"]);
    assert_eq!(cmdq.client().unwrap().borrow().retcode, 1);
}

#[test]
fn notifications_deliver_after_the_walk_completes() {
    let (rt, cmdq, reporter) = engine();
    run(&rt, &cmdq, "new-session -d -s main");
    // the notify hook runs headless, so observe it through a mutation
    run(
        &rt,
        &cmdq,
        "set-hook -g notify-window-linked 'rename-session -t main tagged'",
    );
    let observed = Rc::new(RefCell::new(Vec::new()));
    struct Recorder(Rc<RefCell<Vec<NotifyKind>>>);
    impl ControlObserver for Recorder {
        fn notification(&self, event: &NotificationEvent) {
            self.0.borrow_mut().push(event.kind);
        }
    }
    rt.bus()
        .add_observer(Rc::new(Recorder(Rc::clone(&observed))) as Rc<dyn ControlObserver>);

    run(&rt, &cmdq, "new-window -n a ; display-message -p direct");

    // the command after new-window ran before the notification was handled
    assert_eq!(reporter.prints(), ["direct"]);
    assert_eq!(rt.sessions()[0].borrow().name, "tagged");
    assert_eq!(
        *observed.borrow(),
        [NotifyKind::WindowLinked, NotifyKind::SessionRenamed]
    );
}

#[test]
fn wait_for_coordinates_two_queues() {
    let (rt, waiter, reporter) = engine();
    run(
        &rt,
        &waiter,
        "new-session -d -s main ; wait-for go ; display-message -p resumed",
    );
    assert!(waiter.is_waiting());
    assert!(reporter.prints().is_empty());

    let signaller = CmdQueue::new(None);
    signaller.set_reporter(Rc::clone(&reporter) as Rc<dyn Reporter>);
    run(
        &rt,
        &signaller,
        "display-message -p before ; wait-for -S go",
    );

    assert!(waiter.is_idle());
    assert!(signaller.is_idle());
    assert_eq!(reporter.prints(), ["before", "resumed"]);
}

#[test]
fn guard_markers_bracket_each_command() {
    let (rt, cmdq, _reporter) = engine();
    let guards = Rc::new(MemoryGuards::new());
    cmdq.set_guard_observer(Rc::clone(&guards) as Rc<dyn GuardObserver>);

    run(
        &rt,
        &cmdq,
        "new-session -d -s main ; new-window -t main:0 -n clash",
    );

    assert_eq!(
        guards.kinds(),
        [
            GuardKind::Begin,
            GuardKind::End,
            GuardKind::Begin,
            GuardKind::Error
        ]
    );
    let markers = guards.markers();
    assert_eq!(markers[0].name, "new-session");
    assert_eq!(markers[2].name, "new-window");
    assert!(markers[2].number > markers[0].number);
    // hook queues never inherit the guard observer
    run(
        &rt,
        &cmdq,
        "set-hook -g after-list-sessions 'display-message -p x' ; list-sessions",
    );
    let names: Vec<String> = guards.markers().into_iter().map(|m| m.name).collect();
    assert!(!names.contains(&"display-message".to_string()));
}

#[test]
fn kill_last_window_closes_the_session() {
    let (rt, cmdq, _reporter) = engine();
    let observed = Rc::new(RefCell::new(Vec::new()));
    struct Recorder(Rc<RefCell<Vec<NotifyKind>>>);
    impl ControlObserver for Recorder {
        fn notification(&self, event: &NotificationEvent) {
            self.0.borrow_mut().push(event.kind);
        }
    }
    rt.bus()
        .add_observer(Rc::new(Recorder(Rc::clone(&observed))) as Rc<dyn ControlObserver>);

    run(&rt, &cmdq, "new-session -d -s main ; kill-window -t main:0");
    assert!(rt.sessions().is_empty());
    assert_eq!(
        *observed.borrow(),
        [
            NotifyKind::SessionCreated,
            NotifyKind::WindowLinked,
            NotifyKind::WindowUnlinked,
            NotifyKind::SessionClosed
        ]
    );
}

#[test]
fn attach_follows_session_and_updates_current() {
    let (rt, cmdq, reporter) = engine();
    run(
        &rt,
        &cmdq,
        "new-session -d -s main ; new-session -d -s other ; attach-session -t other",
    );
    assert_eq!(rt.current_session().unwrap().borrow().name, "other");

    // the implied session for later commands is now the attached one
    run(&rt, &cmdq, "display-message -p");
    assert_eq!(reporter.prints(), ["[other] 0:other, current pane %1"]);
}
