// tests/session.rs

//! End-to-end tests of the execution session against a scripted `sh` read-eval-print loop.

#![cfg(unix)]

use irepl::{
    CancellationToken,
    core::{
        dispatcher::EventSink,
        driver::DriverError,
        session::{ExecutionSession, RESTART_FAILED, SessionError, SessionState},
    },
    models::{
        DisplayPayload, ExecutionOutcome, ExecutionRequest, ExecutionStatus, KernelConfig,
        OutboundEvent, PromptChange, StreamName,
    },
    system::process::ProcessError,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const LOOP: &str = r##"P="# "; while printf "%s" "$P"; IFS= read -r line; do eval "$line"; done"##;

fn loop_config(prelude: &str) -> KernelConfig {
    KernelConfig::for_command(format!("sh -c '{prelude}{LOOP}'"))
}

fn token() -> CancellationToken {
    Arc::new(AtomicBool::new(false))
}

fn stdout(text: &str) -> OutboundEvent {
    OutboundEvent::Stream {
        name: StreamName::Stdout,
        text: text.to_string(),
    }
}

fn run(session: &mut ExecutionSession, code: &str, count: u32) -> (ExecutionOutcome, Vec<OutboundEvent>) {
    let mut sink: Vec<OutboundEvent> = Vec::new();
    let outcome = session.submit(&ExecutionRequest::new(code, count), &mut sink, &token());
    (outcome, sink)
}

fn display_line(value: &str, id: &str) -> String {
    format!(
        r#"printf "%s\n" '{{"data": {{"text/plain": "{value}"}}, "transient": {{"display_id": "{id}"}}}}' | sed "s/^/irepl: display data: /""#
    )
}

/// Sets the cancellation token as soon as the first event arrives.
struct InterruptingSink {
    events: Vec<OutboundEvent>,
    token: CancellationToken,
}

impl EventSink for InterruptingSink {
    fn send(&mut self, event: OutboundEvent) {
        self.token.store(true, Ordering::SeqCst);
        self.events.push(event);
    }
}

#[test]
fn test_output_is_streamed_and_outcome_is_ok() {
    let mut session = ExecutionSession::start(loop_config("")).unwrap();
    let (outcome, events) = run(&mut session, "echo hello", 1);
    assert_eq!(outcome, ExecutionOutcome::ok(1));
    assert_eq!(events, vec![stdout("hello\n")]);
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_lines_and_carriage_returns_keep_their_order() {
    let mut session = ExecutionSession::start(loop_config("")).unwrap();
    let (_, events) = run(&mut session, r"printf 'line one\nline two\rprogress\n'", 1);
    assert_eq!(
        events,
        vec![stdout("line one\n"), stdout("line two\r"), stdout("progress\n")]
    );
}

#[test]
fn test_stderr_is_merged_into_the_output_stream() {
    let mut session = ExecutionSession::start(loop_config("")).unwrap();
    let (outcome, events) = run(&mut session, "echo oops >&2", 1);
    assert!(outcome.is_ok());
    assert_eq!(events, vec![stdout("oops\n")]);
}

#[test]
fn test_partial_line_and_multi_line_code() {
    let mut session = ExecutionSession::start(loop_config("")).unwrap();
    let (_, events) = run(&mut session, "printf 'no newline'", 1);
    assert_eq!(events, vec![stdout("no newline")]);

    let (outcome, events) = run(&mut session, "echo a\necho b\n\n", 2);
    assert!(outcome.is_ok());
    assert_eq!(events, vec![stdout("a\n"), stdout("b\n")]);
}

#[test]
fn test_blank_and_silent_requests_emit_nothing() {
    let mut session = ExecutionSession::start(loop_config("")).unwrap();
    let (outcome, events) = run(&mut session, " \n ", 5);
    assert_eq!(outcome, ExecutionOutcome::ok(5));
    assert!(events.is_empty());

    let mut sink: Vec<OutboundEvent> = Vec::new();
    let request = ExecutionRequest::new("echo hidden", 6).silent(true);
    let outcome = session.submit(&request, &mut sink, &token());
    assert_eq!(outcome, ExecutionOutcome::ok(6));
    assert!(sink.is_empty());

    // The silent output was consumed and does not leak into the next execution.
    let (_, events) = run(&mut session, "echo shown", 7);
    assert_eq!(events, vec![stdout("shown\n")]);
}

#[test]
fn test_interrupt_aborts_and_session_keeps_working() {
    let mut session = ExecutionSession::start(loop_config(r#"trap "echo interrupted" INT; "#)).unwrap();
    let cancel = token();
    let mut sink = InterruptingSink {
        events: Vec::new(),
        token: Arc::clone(&cancel),
    };

    let outcome = session.submit(
        &ExecutionRequest::new("echo started; sleep 5", 1),
        &mut sink,
        &cancel,
    );
    assert_eq!(outcome, ExecutionOutcome::abort(1));
    assert_eq!(sink.events, vec![stdout("started\n"), stdout("interrupted\n")]);
    assert!(!cancel.load(Ordering::SeqCst));
    assert_eq!(session.state(), SessionState::Idle);

    let (outcome, events) = run(&mut session, "echo after", 2);
    assert!(outcome.is_ok());
    assert_eq!(events, vec![stdout("after\n")]);
}

#[test]
fn test_unanswered_interrupt_respawns_and_aborts() {
    let mut config = loop_config(r#"trap "" INT; "#);
    config.session.command_timeout_secs = 1;
    let mut session = ExecutionSession::start(config).unwrap();
    let first_pid = session.pid().unwrap();
    let cancel = token();
    let mut sink = InterruptingSink {
        events: Vec::new(),
        token: Arc::clone(&cancel),
    };

    let outcome = session.submit(
        &ExecutionRequest::new("echo started; sleep 30", 1),
        &mut sink,
        &cancel,
    );
    assert_eq!(outcome, ExecutionOutcome::abort(1));
    assert_eq!(
        sink.events,
        vec![stdout("started\n"), stdout("Restarting interpreter\n")]
    );
    assert_ne!(session.pid(), Some(first_pid));

    let (outcome, events) = run(&mut session, "echo after", 2);
    assert!(outcome.is_ok());
    assert_eq!(events, vec![stdout("after\n")]);
}

#[test]
fn test_failed_respawn_after_interrupt_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("started");
    let prelude = format!(
        r#"if [ -e {m} ]; then exit 1; fi; touch {m}; trap "" INT; "#,
        m = marker.display()
    );
    let mut config = loop_config(&prelude);
    config.session.command_timeout_secs = 1;
    let mut session = ExecutionSession::start(config).unwrap();
    let cancel = token();
    let mut sink = InterruptingSink {
        events: Vec::new(),
        token: Arc::clone(&cancel),
    };

    let outcome = session.submit(
        &ExecutionRequest::new("echo started; sleep 30", 1),
        &mut sink,
        &cancel,
    );
    assert!(matches!(
        outcome.status,
        ExecutionStatus::Error { ref ename, .. } if ename == RESTART_FAILED
    ));
    assert!(matches!(
        sink.events.last(),
        Some(OutboundEvent::Stream { name: StreamName::Stderr, .. })
    ));
    assert!(!session.is_running());
    assert!(!cancel.load(Ordering::SeqCst));
}

#[test]
fn test_stderr_stays_with_its_own_execution() {
    let mut session = ExecutionSession::start(loop_config("")).unwrap();
    for i in 0..50 {
        let (_, first) = run(&mut session, &format!("echo err{i} >&2"), 1);
        let (_, second) = run(&mut session, &format!("echo out{i}"), 2);
        assert_eq!(first, vec![stdout(&format!("err{i}\n"))]);
        assert_eq!(second, vec![stdout(&format!("out{i}\n"))]);
    }
}

#[test]
fn test_exit_respawns_and_forgets_display_ids() {
    let mut session = ExecutionSession::start(loop_config("")).unwrap();
    let first_pid = session.pid().unwrap();

    let (_, events) = run(&mut session, &display_line("1", "progress"), 1);
    assert!(matches!(events.as_slice(), [OutboundEvent::DisplayData(_)]));
    assert!(session.dispatcher().is_known("progress"));

    let (outcome, events) = run(&mut session, "echo bye; exit", 2);
    assert_eq!(outcome, ExecutionOutcome::ok(2));
    assert_eq!(events, vec![stdout("bye\n"), stdout("Restarting interpreter\n")]);
    assert_ne!(session.pid(), Some(first_pid));
    assert!(session.dispatcher().known_display_ids().is_empty());

    let (outcome, events) = run(&mut session, &display_line("2", "progress"), 3);
    assert!(outcome.is_ok());
    assert_eq!(
        events,
        vec![OutboundEvent::DisplayData(
            DisplayPayload::new("text/plain", "2").with_display_id("progress")
        )]
    );
}

#[test]
fn test_repeated_display_id_becomes_an_update() {
    let mut session = ExecutionSession::start(loop_config("")).unwrap();
    let (_, first) = run(&mut session, &display_line("10%", "bar"), 1);
    let (_, second) = run(&mut session, &display_line("90%", "bar"), 2);

    assert_eq!(
        first,
        vec![OutboundEvent::DisplayData(
            DisplayPayload::new("text/plain", "10%").with_display_id("bar")
        )]
    );
    assert_eq!(
        second,
        vec![OutboundEvent::UpdateDisplayData(
            DisplayPayload::new("text/plain", "90%").with_display_id("bar")
        )]
    );
}

#[test]
fn test_custom_restart_notice() {
    let mut config = loop_config("");
    config.session.restart_notice = Some("Shell restarted".to_string());
    let mut session = ExecutionSession::start(config).unwrap();
    let (_, events) = run(&mut session, "exit", 1);
    assert_eq!(events, vec![stdout("Shell restarted\n")]);
}

#[test]
fn test_init_commands_run_after_every_spawn() {
    let mut config = loop_config("");
    config.session.init_commands = vec!["GREETING=hello".to_string()];
    let mut session = ExecutionSession::start(config).unwrap();

    let (_, events) = run(&mut session, "echo $GREETING", 1);
    assert_eq!(events, vec![stdout("hello\n")]);

    run(&mut session, "exit", 2);
    let (_, events) = run(&mut session, "echo $GREETING", 3);
    assert_eq!(events, vec![stdout("hello\n")]);
}

#[test]
fn test_prompt_change_protects_prompt_like_output() {
    let mut config = loop_config("");
    config.prompt.change = Some(PromptChange {
        command: "P='{prompt}'".to_string(),
        primary: "irepl> ".to_string(),
        continuation: None,
    });
    let mut session = ExecutionSession::start(config).unwrap();
    let (outcome, events) = run(&mut session, "echo '# not a prompt'", 1);
    assert!(outcome.is_ok());
    assert_eq!(events, vec![stdout("# not a prompt\n")]);
}

#[test]
fn test_kernel_info_reads_version_from_banner() {
    let session = ExecutionSession::start(loop_config(r#"echo "Fake REPL version 2.1"; "#)).unwrap();
    assert_eq!(session.banner(), "Fake REPL version 2.1\n");
    let info = session.kernel_info();
    assert_eq!(info.banner, "Fake REPL version 2.1");
    assert_eq!(info.language_version.as_deref(), Some("2.1"));
    assert_eq!(info.implementation, "irepl");
}

#[test]
fn test_exit_code_command_reports_errors() {
    let mut config = loop_config("");
    config.session.init_commands = vec!["STATUS=0".to_string()];
    config.session.exit_code_command = Some(r#"echo "$STATUS""#.to_string());
    let mut session = ExecutionSession::start(config).unwrap();

    let (outcome, events) = run(&mut session, "STATUS=3; echo hi", 1);
    assert_eq!(outcome, ExecutionOutcome::error(1, "", "3"));
    assert_eq!(
        events,
        vec![
            stdout("hi\n"),
            OutboundEvent::Error {
                ename: String::new(),
                evalue: "3".to_string(),
                traceback: Vec::new(),
            }
        ]
    );

    let (outcome, _) = run(&mut session, "STATUS=0", 2);
    assert_eq!(outcome, ExecutionOutcome::ok(2));
}

#[test]
fn test_failed_respawn_is_reported_and_retried() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("started");
    // Only the first interpreter comes up; every later one exits immediately.
    let prelude = format!("if [ -e {m} ]; then exit 1; fi; touch {m}; ", m = marker.display());
    let mut session = ExecutionSession::start(loop_config(&prelude)).unwrap();

    let (outcome, events) = run(&mut session, "exit", 1);
    assert!(matches!(
        outcome.status,
        ExecutionStatus::Error { ref ename, .. } if ename == RESTART_FAILED
    ));
    assert_eq!(events.first(), Some(&stdout("Restarting interpreter\n")));
    assert!(matches!(
        events.last(),
        Some(OutboundEvent::Stream { name: StreamName::Stderr, .. })
    ));
    assert!(!session.is_running());

    let (outcome, _) = run(&mut session, "echo again", 2);
    assert!(!outcome.is_ok());
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_missing_interpreter_fails_to_start() {
    let err = ExecutionSession::start(KernelConfig::for_command("/nonexistent/irepl-interpreter"))
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Driver(DriverError::Process(ProcessError::Spawn { .. }))
    ));
}

#[test]
fn test_silent_interpreter_times_out_at_startup() {
    let mut config = KernelConfig::for_command("sh -c 'sleep 5'");
    config.session.startup_timeout_secs = 1;
    let err = ExecutionSession::start(config).unwrap_err();
    assert!(matches!(err, SessionError::Driver(DriverError::Timeout { .. })));
}
