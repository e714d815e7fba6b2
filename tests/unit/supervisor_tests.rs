use super::*;
use std::path::PathBuf;

fn bash(script: &str, payload: &str) -> InvocationDescriptor {
    InvocationDescriptor {
        executable: "bash".to_string(),
        argv: vec!["-c".to_string(), script.to_string()],
        payload: payload.to_string(),
    }
}

fn cwd() -> PathBuf {
    std::env::temp_dir()
}

fn wait_for_outcome(
    supervisor: &mut Supervisor,
    sink: &mut RunTranscript,
    limit: Duration,
) -> Option<RunOutcome> {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if let Some(outcome) = supervisor.poll(sink) {
            return Some(outcome);
        }
        thread::sleep(Duration::from_millis(10));
    }
    None
}

fn wait_for_log(supervisor: &mut Supervisor, sink: &mut RunTranscript, needle: &str) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        assert!(supervisor.poll(sink).is_none(), "run ended early: {sink:?}");
        if sink.execution_log.contains(needle) {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("never saw {needle:?} in {:?}", sink.execution_log);
}

fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

fn wait_until_gone(pid: u32, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if !process_alive(pid) {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn payload_travels_over_stdin_and_completes() {
    let mut supervisor = Supervisor::new();
    let mut sink = RunTranscript::default();
    let prompt = r#"He said "hi" and 'bye' $(whoami) `id`"#;

    let outcome = supervisor
        .run(&bash("cat", prompt), ToolKind::Claude, &cwd(), &mut sink)
        .expect("run should start");

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(supervisor.state(), &RunState::Completed);
    assert_eq!(sink.result, prompt);
    assert!(sink.execution_log.starts_with(prompt));
    assert!(sink.execution_log.ends_with("\n\nCommand completed successfully."));
    assert_eq!(sink.states, vec![RunState::Running, RunState::Completed]);
    assert!(!supervisor.is_running());
}

#[test]
fn empty_payload_closes_stdin_immediately() {
    let mut supervisor = Supervisor::new();
    let mut sink = RunTranscript::default();

    supervisor
        .start(&bash("cat; echo done", ""), ToolKind::Claude, &cwd(), &mut sink)
        .expect("start");
    let outcome = wait_for_outcome(&mut supervisor, &mut sink, Duration::from_secs(3));

    assert_eq!(outcome, Some(RunOutcome::Completed));
    assert_eq!(sink.result, "done\n");
}

#[test]
fn nonzero_exit_is_runtime_failure_with_code() {
    let mut supervisor = Supervisor::new();
    let mut sink = RunTranscript::default();

    let outcome = supervisor
        .run(&bash("echo partial; exit 2", "x"), ToolKind::Claude, &cwd(), &mut sink)
        .expect("run should start");

    assert_eq!(outcome, RunOutcome::Failed(FailureKind::Runtime { code: 2 }));
    assert_eq!(
        FailureKind::Runtime { code: 2 }.to_string(),
        "exit code 2"
    );
    assert!(sink.execution_log.contains("partial\n"));
    assert!(sink.execution_log.contains("Command failed with exit code 2"));
    assert_eq!(sink.result, "partial\n");
}

#[test]
fn stderr_goes_to_execution_log_only_with_prefix() {
    let mut supervisor = Supervisor::new();
    let mut sink = RunTranscript::default();

    let outcome = supervisor
        .run(&bash("echo oops 1>&2", ""), ToolKind::Claude, &cwd(), &mut sink)
        .expect("run should start");

    assert!(outcome.is_success());
    assert!(sink.execution_log.contains("\nError: oops\n"));
    assert_eq!(sink.result, "");
}

#[test]
fn spawn_failure_is_reported_before_any_output() {
    let mut supervisor = Supervisor::new();
    let mut sink = RunTranscript::default();
    let descriptor = InvocationDescriptor {
        executable: "__vault_assist_no_such_program__".to_string(),
        argv: Vec::new(),
        payload: "hello".to_string(),
    };

    let err = supervisor
        .start(&descriptor, ToolKind::Claude, &cwd(), &mut sink)
        .expect_err("spawn should fail");

    assert!(matches!(err, RunError::Spawn { ref program, .. } if program == &descriptor.executable));
    assert!(matches!(supervisor.state(), RunState::Failed(FailureKind::Spawn(_))));
    assert!(sink.execution_log.is_empty());
    assert!(sink.result.is_empty());
    assert!(supervisor.poll(&mut sink).is_none());
    assert!(!supervisor.is_running());
}

#[test]
fn blocking_run_maps_spawn_failure_to_outcome() {
    let mut supervisor = Supervisor::new();
    let mut sink = RunTranscript::default();
    let descriptor = InvocationDescriptor {
        executable: "__vault_assist_no_such_program__".to_string(),
        argv: Vec::new(),
        payload: String::new(),
    };

    let outcome = supervisor
        .run(&descriptor, ToolKind::Gemini, &cwd(), &mut sink)
        .expect("spawn failure is an outcome");
    assert!(matches!(outcome, RunOutcome::Failed(FailureKind::Spawn(_))));
}

#[test]
fn timeout_terminates_process_and_is_classified_as_timeout() {
    let mut supervisor = Supervisor::with_limits(SupervisorLimits {
        timeout: Some(Duration::from_millis(200)),
        kill_grace: Duration::from_millis(500),
    });
    let mut sink = RunTranscript::default();
    supervisor
        .start(&bash("sleep 5", ""), ToolKind::Gemini, &cwd(), &mut sink)
        .expect("start");
    let pid = supervisor.active_pid().expect("pid while running");
    let started = Instant::now();

    let outcome = wait_for_outcome(&mut supervisor, &mut sink, Duration::from_secs(3));

    assert_eq!(
        outcome,
        Some(RunOutcome::Failed(FailureKind::Timeout {
            budget: Duration::from_millis(200)
        }))
    );
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(sink.execution_log.contains("Command timed out after 200 ms"));
    assert!(!sink.execution_log.contains("exit code"));
    assert!(!supervisor.is_running());
    assert!(wait_until_gone(pid, Duration::from_secs(2)));
    assert!(wait_for_outcome(&mut supervisor, &mut sink, Duration::from_millis(200)).is_none());
}

#[test]
fn timeout_budget_defaults_to_tool_budget() {
    assert_eq!(
        FailureKind::Timeout {
            budget: ToolKind::Claude.timeout()
        }
        .to_string(),
        "timed out after 180 seconds"
    );
    assert_eq!(format_budget(&ToolKind::Gemini.timeout()), "60 seconds");
}

#[test]
fn cancel_resets_state_before_process_exits_and_ignores_late_output() {
    let mut supervisor = Supervisor::new();
    let mut sink = RunTranscript::default();
    let script = "trap 'echo late-term; exit 0' TERM; echo ready; while :; do sleep 0.05; done";
    supervisor
        .start(&bash(script, ""), ToolKind::Claude, &cwd(), &mut sink)
        .expect("start");
    wait_for_log(&mut supervisor, &mut sink, "ready");

    let outcome = supervisor.cancel(&mut sink);

    assert_eq!(outcome, Some(RunOutcome::Failed(FailureKind::Cancelled)));
    assert_eq!(supervisor.state(), &RunState::Failed(FailureKind::Cancelled));
    assert!(!supervisor.is_running());
    assert_eq!(
        sink.states,
        vec![
            RunState::Running,
            RunState::Cancelling,
            RunState::Failed(FailureKind::Cancelled)
        ]
    );
    let snapshot = sink.clone();

    assert!(wait_for_outcome(&mut supervisor, &mut sink, Duration::from_millis(500)).is_none());
    assert_eq!(sink, snapshot);
    assert!(!sink.execution_log.contains("late-term"));
    assert!(supervisor.cancel(&mut sink).is_none());
}

#[test]
fn cancel_escalates_to_kill_when_term_is_ignored() {
    let mut supervisor = Supervisor::with_limits(SupervisorLimits {
        timeout: None,
        kill_grace: Duration::from_millis(200),
    });
    let mut sink = RunTranscript::default();
    let script = "trap '' TERM; echo ready; while :; do sleep 0.05; done";
    supervisor
        .start(&bash(script, ""), ToolKind::Claude, &cwd(), &mut sink)
        .expect("start");
    let pid = supervisor.active_pid().expect("pid");
    wait_for_log(&mut supervisor, &mut sink, "ready");

    supervisor.cancel(&mut sink);
    thread::sleep(Duration::from_millis(100));
    assert!(process_alive(pid), "SIGTERM should have been ignored");
    assert!(wait_until_gone(pid, Duration::from_secs(2)));
}

#[test]
fn second_start_while_running_is_rejected() {
    let mut supervisor = Supervisor::new();
    let mut sink = RunTranscript::default();
    supervisor
        .start(&bash("sleep 5", ""), ToolKind::Claude, &cwd(), &mut sink)
        .expect("start");

    let err = supervisor
        .start(&bash("echo no", ""), ToolKind::Claude, &cwd(), &mut sink)
        .expect_err("busy");
    assert!(matches!(err, RunError::Busy));
    assert_eq!(supervisor.state(), &RunState::Running);

    supervisor.cancel(&mut sink);
}

#[test]
fn new_run_after_cancel_is_not_polluted_by_previous_run() {
    let mut supervisor = Supervisor::new();
    let mut first = RunTranscript::default();
    let script = "trap 'echo late-term; exit 0' TERM; echo ready; while :; do sleep 0.05; done";
    supervisor
        .start(&bash(script, ""), ToolKind::Claude, &cwd(), &mut first)
        .expect("start first");
    wait_for_log(&mut supervisor, &mut first, "ready");
    supervisor.cancel(&mut first);

    let mut second = RunTranscript::default();
    supervisor
        .start(&bash("sleep 0.2; echo second", ""), ToolKind::Claude, &cwd(), &mut second)
        .expect("start second");
    let outcome = wait_for_outcome(&mut supervisor, &mut second, Duration::from_secs(3));

    assert_eq!(outcome, Some(RunOutcome::Completed));
    assert_eq!(second.result, "second\n");
    assert!(!second.execution_log.contains("late-term"));
    assert!(!second.execution_log.contains("ready"));
}

#[test]
fn gemini_banner_is_filtered_from_result_but_kept_in_log() {
    let mut supervisor = Supervisor::new();
    let mut sink = RunTranscript::default();

    supervisor
        .run(
            &bash("printf 'Loaded cached credentials.\\nHello\\n'", ""),
            ToolKind::Gemini,
            &cwd(),
            &mut sink,
        )
        .expect("run");

    assert_eq!(sink.result, "Hello\n");
    assert!(sink.execution_log.starts_with("Loaded cached credentials.\nHello\n"));
}

#[test]
fn claude_output_keeps_banner_like_lines() {
    let mut supervisor = Supervisor::new();
    let mut sink = RunTranscript::default();

    supervisor
        .run(
            &bash("printf 'Loaded cached credentials.\\nHello\\n'", ""),
            ToolKind::Claude,
            &cwd(),
            &mut sink,
        )
        .expect("run");

    assert_eq!(sink.result, "Loaded cached credentials.\nHello\n");
}

#[test]
fn all_output_is_flushed_before_completion() {
    let mut supervisor = Supervisor::new();
    let mut sink = RunTranscript::default();

    let outcome = supervisor
        .run(&bash("seq 1 20000", ""), ToolKind::Claude, &cwd(), &mut sink)
        .expect("run");

    assert!(outcome.is_success());
    assert!(sink.result.ends_with("19999\n20000\n"));
    assert_eq!(sink.result.lines().count(), 20000);
}

#[test]
fn self_inflicted_sigterm_is_classified_as_cancelled() {
    let mut supervisor = Supervisor::new();
    let mut sink = RunTranscript::default();

    let outcome = supervisor
        .run(&bash("kill -TERM $$", ""), ToolKind::Claude, &cwd(), &mut sink)
        .expect("run");

    assert_eq!(outcome, RunOutcome::Failed(FailureKind::Cancelled));
    assert!(sink.execution_log.ends_with("Command was cancelled."));
}

#[test]
fn runs_in_requested_working_directory() {
    let mut supervisor = Supervisor::new();
    let mut sink = RunTranscript::default();
    let dir = cwd().canonicalize().expect("canonical temp dir");

    supervisor
        .run(&bash("pwd -P", ""), ToolKind::Claude, &dir, &mut sink)
        .expect("run");

    assert_eq!(sink.result.trim_end(), dir.display().to_string());
}

#[test]
fn dropping_supervisor_terminates_live_child() {
    let mut supervisor = Supervisor::new();
    let mut sink = RunTranscript::default();
    supervisor
        .start(&bash("sleep 5", ""), ToolKind::Claude, &cwd(), &mut sink)
        .expect("start");
    let pid = supervisor.active_pid().expect("pid");

    drop(supervisor);

    assert!(wait_until_gone(pid, Duration::from_secs(2)));
}

#[test]
fn shutdown_waits_until_stubborn_child_is_reaped() {
    let mut supervisor = Supervisor::with_limits(SupervisorLimits {
        timeout: None,
        kill_grace: Duration::from_millis(200),
    });
    let mut sink = RunTranscript::default();
    let script = "trap '' TERM; echo ready; while :; do sleep 0.05; done";
    supervisor
        .start(&bash(script, ""), ToolKind::Claude, &cwd(), &mut sink)
        .expect("start");
    let pid = supervisor.active_pid().expect("pid");
    wait_for_log(&mut supervisor, &mut sink, "ready");

    supervisor.shutdown(&mut sink);

    assert!(!process_alive(pid));
    assert_eq!(supervisor.state(), &RunState::Failed(FailureKind::Cancelled));
}

#[test]
fn shutdown_without_live_run_returns_at_once() {
    let mut supervisor = Supervisor::new();
    let mut sink = RunTranscript::default();
    let started = Instant::now();
    supervisor.shutdown(&mut sink);
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(sink.states.is_empty());
}

#[test]
fn run_state_labels_distinguish_cancelled_from_failed() {
    assert_eq!(RunState::Failed(FailureKind::Cancelled).label(), "cancelled");
    assert_eq!(
        RunState::Failed(FailureKind::Runtime { code: 1 }).label(),
        "failed"
    );
    assert!(RunState::Cancelling.is_active());
    assert!(!RunState::Completed.is_active());
}

#[test]
fn next_start_moves_terminal_state_back_to_idle() {
    let mut supervisor = Supervisor::new();
    let mut first = RunTranscript::default();
    supervisor
        .run(&bash("exit 0", ""), ToolKind::Claude, &cwd(), &mut first)
        .expect("first run");
    assert_eq!(supervisor.state(), &RunState::Completed);

    let mut second = RunTranscript::default();
    let outcome = supervisor
        .run(&bash("exit 0", ""), ToolKind::Claude, &cwd(), &mut second)
        .expect("second run");
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(
        second.states,
        vec![RunState::Idle, RunState::Running, RunState::Completed]
    );

    let mut third = RunTranscript::default();
    let missing = InvocationDescriptor {
        executable: "__vault_assist_missing_tool__".to_string(),
        argv: Vec::new(),
        payload: String::new(),
    };
    let err = supervisor
        .start(&missing, ToolKind::Claude, &cwd(), &mut third)
        .expect_err("spawn should fail");
    assert!(matches!(err, RunError::Spawn { .. }));
    assert_eq!(third.states.len(), 2);
    assert_eq!(third.states[0], RunState::Idle);
    assert!(matches!(
        third.states[1],
        RunState::Failed(FailureKind::Spawn(_))
    ));
}
