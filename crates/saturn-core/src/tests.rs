// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Agent-loop tests.  [`ScriptedClient`] makes every scenario
//! deterministic with no network access.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use saturn_config::Config;
use saturn_coord::{new_bus, AgentStatus, Coordination, InMemoryCoordination};
use saturn_model::{Role, ScriptedClient, StreamEvent};
use saturn_tools::{ApprovalMediator, ApprovalPolicy, Tool, ToolCall, ToolOutput, ToolRegistry};

use crate::{Agent, AgentError, AgentEvent};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Records every invocation so tests can assert on ordering and arguments.
struct RecordingTool {
    name: &'static str,
    calls: Arc<Mutex<Vec<Value>>>,
    order: Arc<Mutex<Vec<String>>>,
}

impl RecordingTool {
    fn new(name: &'static str) -> (Self, Arc<Mutex<Vec<Value>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                name,
                calls: Arc::clone(&calls),
                order: Arc::new(Mutex::new(Vec::new())),
            },
            calls,
        )
    }

    fn with_order(name: &'static str, order: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name,
            calls: Arc::new(Mutex::new(Vec::new())),
            order,
        }
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        "records its arguments"
    }
    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "additionalProperties": false })
    }
    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        self.calls.lock().unwrap().push(call.args.clone());
        self.order.lock().unwrap().push(self.name.to_string());
        ToolOutput::ok(&call.id, format!("{} ran", self.name))
    }
}

fn mediator_allowing(tools: &[&str]) -> Arc<ApprovalMediator> {
    let mut m = ApprovalMediator::auto_only(&Config::default().tools);
    for t in tools {
        m.allow(*t);
    }
    Arc::new(m)
}

fn agent_with(model: ScriptedClient, registry: ToolRegistry, auto: &[&str]) -> Agent {
    Agent::new(
        Arc::new(model),
        Arc::new(registry),
        Arc::new(Config::default()),
        mediator_allowing(auto),
    )
}

/// Drain events until TurnComplete / Aborted or channel close.
async fn collect_events(mut rx: mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        let done = matches!(ev, AgentEvent::TurnComplete | AgentEvent::Aborted { .. });
        events.push(ev);
        if done {
            break;
        }
    }
    events
}

// ── Basic text turn ───────────────────────────────────────────────────────────

#[tokio::test]
async fn text_only_turn_terminates_in_one_iteration() {
    let model = ScriptedClient::always_text("hello from saturn");
    let mut agent = agent_with(model, ToolRegistry::default(), &[]);
    let (tx, rx) = mpsc::channel(64);

    agent.submit("hi", tx).await.unwrap();
    let events = collect_events(rx).await;

    assert!(events
        .iter()
        .any(|e| matches!(e, AgentEvent::TextDelta(t) if t.contains("hello"))));
    assert!(events
        .iter()
        .any(|e| matches!(e, AgentEvent::TextComplete(t) if t == "hello from saturn")));
    assert!(matches!(events.last(), Some(AgentEvent::TurnComplete)));
    // Exactly one assistant message for the turn.
    let assistant_count = agent
        .session()
        .messages
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .count();
    assert_eq!(assistant_count, 1);
}

#[tokio::test]
async fn system_message_injected_on_first_turn_only() {
    let model = ScriptedClient::new(vec![
        vec![StreamEvent::TextDelta("one".into()), StreamEvent::Done],
        vec![StreamEvent::TextDelta("two".into()), StreamEvent::Done],
    ]);
    let mut agent = agent_with(model, ToolRegistry::default(), &[]);

    let (tx, rx) = mpsc::channel(64);
    agent.submit("first", tx).await.unwrap();
    let _ = collect_events(rx).await;
    let (tx2, rx2) = mpsc::channel(64);
    agent.submit("second", tx2).await.unwrap();
    let _ = collect_events(rx2).await;

    let system_count = agent
        .session()
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .count();
    assert_eq!(system_count, 1);
    assert_eq!(agent.session().messages[0].role, Role::System);
}

#[tokio::test]
async fn user_message_is_appended_verbatim() {
    let model = ScriptedClient::always_text("ok");
    let mut agent = agent_with(model, ToolRegistry::default(), &[]);
    let (tx, rx) = mpsc::channel(64);
    agent.submit("my question", tx).await.unwrap();
    let _ = collect_events(rx).await;

    let user = agent
        .session()
        .messages
        .iter()
        .find(|m| m.role == Role::User)
        .unwrap();
    assert_eq!(user.as_text(), Some("my question"));
}

// ── Tool round-trip ───────────────────────────────────────────────────────────

#[tokio::test]
async fn tool_call_round_trip_appends_result_and_finishes() {
    let model = ScriptedClient::tool_then_text("tc-1", "probe", "{}", "done");
    let (tool, calls) = RecordingTool::new("probe");
    let mut reg = ToolRegistry::new();
    reg.register(tool);
    let mut agent = agent_with(model, reg, &["probe"]);
    let (tx, rx) = mpsc::channel(64);

    agent.submit("go", tx).await.unwrap();
    let events = collect_events(rx).await;

    assert_eq!(calls.lock().unwrap().len(), 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, AgentEvent::ToolCallStarted(tc) if tc.name == "probe")));
    assert!(events.iter().any(|e| matches!(
        e,
        AgentEvent::ToolCallFinished { tool_name, is_error: false, .. } if tool_name == "probe"
    )));
    // Session carries the tool result with the matching id.
    let has_result = agent.session().messages.iter().any(|m| {
        matches!(&m.content, saturn_model::MessageContent::ToolResult { tool_call_id, .. }
            if tool_call_id == "tc-1")
    });
    assert!(has_result, "tool result must land in the session");
}

#[tokio::test]
async fn split_tool_call_fragments_assemble_by_index() {
    // The arguments arrive as two fragments that only parse once joined.
    let model = ScriptedClient::new(vec![
        vec![
            StreamEvent::ToolCall {
                index: 0,
                id: "t1".into(),
                name: "read_probe".into(),
                arguments: "{\"pa".into(),
            },
            StreamEvent::ToolCall {
                index: 0,
                id: String::new(),
                name: String::new(),
                arguments: "th\":\"a.txt\"}".into(),
            },
            StreamEvent::Done,
        ],
        vec![StreamEvent::TextDelta("done".into()), StreamEvent::Done],
    ]);
    let (tool, calls) = RecordingTool::new("read_probe");
    let mut reg = ToolRegistry::new();
    reg.register(tool);
    let mut agent = agent_with(model, reg, &["read_probe"]);
    let (tx, rx) = mpsc::channel(64);

    agent.submit("read it", tx).await.unwrap();
    let _ = collect_events(rx).await;

    let recorded = calls.lock().unwrap();
    assert_eq!(recorded.len(), 1, "exactly one execution");
    assert_eq!(recorded[0], json!({"path": "a.txt"}));
}

#[tokio::test]
async fn parallel_tool_calls_execute_in_index_order() {
    let model = ScriptedClient::new(vec![
        vec![
            // Emitted out of index order on purpose.
            StreamEvent::ToolCall {
                index: 1,
                id: "b".into(),
                name: "second".into(),
                arguments: "{}".into(),
            },
            StreamEvent::ToolCall {
                index: 0,
                id: "a".into(),
                name: "first".into(),
                arguments: "{}".into(),
            },
            StreamEvent::Done,
        ],
        vec![StreamEvent::TextDelta("done".into()), StreamEvent::Done],
    ]);
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut reg = ToolRegistry::new();
    reg.register(RecordingTool::with_order("first", Arc::clone(&order)));
    reg.register(RecordingTool::with_order("second", Arc::clone(&order)));
    let mut agent = agent_with(model, reg, &["first", "second"]);
    let (tx, rx) = mpsc::channel(64);

    agent.submit("go", tx).await.unwrap();
    let _ = collect_events(rx).await;

    assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
}

#[tokio::test]
async fn invalid_json_arguments_are_reported_not_raised() {
    let model = ScriptedClient::new(vec![
        vec![
            StreamEvent::ToolCall {
                index: 0,
                id: "t1".into(),
                name: "probe".into(),
                arguments: "{not json".into(),
            },
            StreamEvent::Done,
        ],
        vec![StreamEvent::TextDelta("recovered".into()), StreamEvent::Done],
    ]);
    let (tool, calls) = RecordingTool::new("probe");
    let mut reg = ToolRegistry::new();
    reg.register(tool);
    let mut agent = agent_with(model, reg, &["probe"]);
    let (tx, rx) = mpsc::channel(64);

    agent.submit("go", tx).await.unwrap();
    let events = collect_events(rx).await;

    assert!(calls.lock().unwrap().is_empty(), "tool must not run");
    assert!(events.iter().any(|e| matches!(
        e,
        AgentEvent::ToolCallFinished { is_error: true, output, .. }
            if output.contains("invalid arguments")
    )));
    assert!(matches!(events.last(), Some(AgentEvent::TurnComplete)));
}

#[tokio::test]
async fn unknown_tool_is_reported_to_the_model() {
    let model = ScriptedClient::tool_then_text("tc-1", "nonexistent", "{}", "done");
    // "nonexistent" is auto-approved so mediation is not what fails here.
    let mut agent = agent_with(model, ToolRegistry::default(), &["nonexistent"]);
    let (tx, rx) = mpsc::channel(64);

    agent.submit("go", tx).await.unwrap();
    let events = collect_events(rx).await;

    assert!(events.iter().any(|e| matches!(
        e,
        AgentEvent::ToolCallFinished { is_error: true, output, .. }
            if output.contains("unknown tool")
    )));
}

#[tokio::test]
async fn oversized_tool_output_is_truncated_in_the_session() {
    struct FloodTool;
    #[async_trait]
    impl Tool for FloodTool {
        fn name(&self) -> &str {
            "flood"
        }
        fn description(&self) -> &str {
            "emits far too many lines"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        fn default_policy(&self) -> ApprovalPolicy {
            ApprovalPolicy::Auto
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            let big: String = (0..3000).map(|i| format!("line {i}\n")).collect();
            ToolOutput::ok(&call.id, big)
        }
    }

    let model = ScriptedClient::tool_then_text("tc-1", "flood", "{}", "done");
    let mut reg = ToolRegistry::new();
    reg.register(FloodTool);
    let mut agent = agent_with(model, reg, &["flood"]);
    let (tx, rx) = mpsc::channel(64);

    agent.submit("flood me", tx).await.unwrap();
    let _ = collect_events(rx).await;

    let result = agent
        .session()
        .messages
        .iter()
        .find_map(|m| match &m.content {
            saturn_model::MessageContent::ToolResult { content, .. } => Some(content.clone()),
            _ => None,
        })
        .unwrap();
    assert!(
        result.contains("[OUTPUT TRUNCATED — 3000 lines"),
        "marker missing: {}",
        &result[result.len().saturating_sub(200)..]
    );
    assert!(result.lines().count() < 2100, "output not capped");
}

// ── Approval mediation ────────────────────────────────────────────────────────

#[tokio::test]
async fn denied_tool_yields_synthetic_error_result() {
    let model = ScriptedClient::tool_then_text("tc-1", "probe", "{}", "understood");
    let (tool, calls) = RecordingTool::new("probe");
    let mut reg = ToolRegistry::new();
    reg.register(tool);
    // No approval channel and "probe" is not in the auto set → denied.
    let mut agent = agent_with(model, reg, &[]);
    let (tx, rx) = mpsc::channel(64);

    agent.submit("go", tx).await.unwrap();
    let events = collect_events(rx).await;

    assert!(calls.lock().unwrap().is_empty(), "denied tool must not run");
    let denied = agent.session().messages.iter().any(|m| {
        matches!(&m.content, saturn_model::MessageContent::ToolResult { content, is_error, .. }
            if *is_error && content == "Tool execution was denied by user.")
    });
    assert!(denied, "denial must be reported as a tool result");
    assert!(matches!(events.last(), Some(AgentEvent::TurnComplete)));
}

// ── Doom loop ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn third_identical_call_aborts_with_doom_loop() {
    let model = ScriptedClient::repeated_tool("bash", r#"{"command":"ls"}"#, 4);
    let (tool, calls) = RecordingTool::new("bash");
    let mut reg = ToolRegistry::new();
    reg.register(tool);
    let mut agent = agent_with(model, reg, &["bash"]);
    let (tx, _rx) = mpsc::channel(64);

    let err = agent.submit("loop forever", tx).await.unwrap_err();
    let agent_err = err.downcast_ref::<AgentError>().unwrap();
    assert_eq!(*agent_err, AgentError::DoomLoop("bash".into()));
    assert_eq!(
        err.to_string(),
        "doom loop detected for tool bash",
        "user-visible message"
    );
    // The first two calls executed; the third was stopped.
    assert_eq!(calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn doom_hook_can_continue_anyway() {
    let model = ScriptedClient::repeated_tool("bash", r#"{"command":"ls"}"#, 3);
    let (tool, calls) = RecordingTool::new("bash");
    let mut reg = ToolRegistry::new();
    reg.register(tool);
    let escalations = Arc::new(AtomicUsize::new(0));
    let esc = Arc::clone(&escalations);
    let mut agent = agent_with(model, reg, &["bash"]).with_doom_hook(Arc::new(move |_tool| {
        esc.fetch_add(1, Ordering::SeqCst);
        true
    }));
    let (tx, rx) = mpsc::channel(64);

    agent.submit("go", tx).await.unwrap();
    let _ = collect_events(rx).await;

    assert!(escalations.load(Ordering::SeqCst) >= 1, "hook consulted");
    assert_eq!(calls.lock().unwrap().len(), 3, "all rounds executed");
}

#[tokio::test]
async fn guard_reset_suppresses_doom_loop() {
    let same_call = |id: &str| StreamEvent::ToolCall {
        index: 0,
        id: id.into(),
        name: "bash".into(),
        arguments: r#"{"command":"ls"}"#.into(),
    };
    // Turn 1 makes the same call twice; turn 2 would be the third identical
    // call and must only survive because the guard is cleared in between.
    let model = ScriptedClient::new(vec![
        vec![same_call("c0"), StreamEvent::Done],
        vec![same_call("c1"), StreamEvent::Done],
        vec![StreamEvent::TextDelta("pausing".into()), StreamEvent::Done],
        vec![same_call("c2"), StreamEvent::Done],
        vec![StreamEvent::TextDelta("done".into()), StreamEvent::Done],
    ]);
    let (tool, calls) = RecordingTool::new("bash");
    let mut reg = ToolRegistry::new();
    reg.register(tool);
    let mut agent = agent_with(model, reg, &["bash"]);

    let (tx, rx) = mpsc::channel(64);
    agent.submit("first turn", tx).await.unwrap();
    let _ = collect_events(rx).await;
    assert_eq!(calls.lock().unwrap().len(), 2);

    agent.reset_guard();

    let (tx2, rx2) = mpsc::channel(64);
    agent.submit("second turn", tx2).await.unwrap();
    let _ = collect_events(rx2).await;
    assert_eq!(calls.lock().unwrap().len(), 3, "cleared history suppresses the doom verdict");
}

// ── Coordination ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn status_is_published_working_then_idle() {
    let bus = new_bus();
    let coord: Arc<dyn Coordination> =
        Arc::new(InMemoryCoordination::new("agent-x", Arc::clone(&bus)));
    let observer = InMemoryCoordination::new("observer", Arc::clone(&bus));

    let model = ScriptedClient::always_text("done");
    let mut agent =
        agent_with(model, ToolRegistry::default(), &[]).with_coordinator(Arc::clone(&coord));
    let (tx, rx) = mpsc::channel(64);

    agent.submit("do the thing", tx).await.unwrap();
    let events = collect_events(rx).await;

    // Both transitions were announced…
    let statuses: Vec<AgentStatus> = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::StatusChanged(s) => Some(*s),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![AgentStatus::Working, AgentStatus::Idle]);

    // …and the final advertised state is idle, visible to peers.
    let peers = observer
        .discover_agents(std::time::Duration::from_millis(10))
        .await
        .unwrap();
    let record = peers.iter().find(|r| r.agent_id == "agent-x").unwrap();
    assert_eq!(record.status, AgentStatus::Idle);
}

// ── Cancellation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn pre_canceled_submit_aborts_without_model_output() {
    let model = ScriptedClient::always_text("should never stream");
    let mut agent = agent_with(model, ToolRegistry::default(), &[]);
    let (tx, rx) = mpsc::channel(64);
    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    cancel_tx.send(true).unwrap();

    agent
        .submit_with_cancel("hi", tx, cancel_rx)
        .await
        .unwrap();
    let events = collect_events(rx).await;
    assert!(matches!(events.last(), Some(AgentEvent::Aborted { .. })));
    // No assistant message was committed.
    assert!(!agent
        .session()
        .messages
        .iter()
        .any(|m| m.role == Role::Assistant));
}
