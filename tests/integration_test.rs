// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! End-to-end tests over the public crate APIs, using the scripted mock
//! client so no network or model endpoint is required.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use saturn_config::Config;
use saturn_coord::{new_bus, spawn_listener, Coordination, InMemoryCoordination};
use saturn_core::{Agent, AgentEvent};
use saturn_discovery::{filter_endpoints, select_best, EndpointDescriptor, EndpointFilter};
use saturn_model::{ScriptedClient, StreamEvent};
use saturn_tools::{
    ApprovalMediator, ApprovalRequest, EditFileTool, ReadFileTool, ReadLedger, ToolRegistry,
};

async fn drain(mut rx: mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
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

/// The full read → fuzzy-edit → reply flow: the model reads a file, edits
/// it through the nine-strategy engine (with approval), and reports back.
#[tokio::test]
async fn agent_reads_then_edits_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lib.rs");
    std::fs::write(&path, "fn greet() {\n    println!(\"hi\");\n}\n").unwrap();
    let path_str = path.to_str().unwrap().to_string();

    let model = ScriptedClient::new(vec![
        vec![
            StreamEvent::ToolCall {
                index: 0,
                id: "c1".into(),
                name: "read_file".into(),
                arguments: format!(r#"{{"path":"{path_str}"}}"#),
            },
            StreamEvent::Done,
        ],
        vec![
            StreamEvent::ToolCall {
                index: 0,
                id: "c2".into(),
                name: "edit_file".into(),
                arguments: format!(
                    r#"{{"path":"{path_str}","old_string":"    println!(\"hi\");","new_string":"    println!(\"hello\");"}}"#
                ),
            },
            StreamEvent::Done,
        ],
        vec![
            StreamEvent::TextDelta("updated the greeting".into()),
            StreamEvent::Done,
        ],
    ]);

    let ledger = Arc::new(ReadLedger::new());
    let mut registry = ToolRegistry::new();
    registry.register(ReadFileTool::new(Arc::clone(&ledger)));
    registry.register(EditFileTool::new(Arc::clone(&ledger)));

    // edit_file is not auto-approved: wire an approver that says yes.
    let (approval_tx, mut approval_rx) = mpsc::channel::<ApprovalRequest>(4);
    let mediator = Arc::new(ApprovalMediator::with_channel(
        &Config::default().tools,
        approval_tx,
        Duration::from_secs(5),
    ));
    tokio::spawn(async move {
        while let Some(req) = approval_rx.recv().await {
            assert_eq!(req.tool, "edit_file", "only edit_file needs approval");
            let _ = req.reply.send(true);
        }
    });

    let mut agent = Agent::new(
        Arc::new(model),
        Arc::new(registry),
        Arc::new(Config::default()),
        mediator,
    );
    let (tx, rx) = mpsc::channel(64);
    agent.submit("change the greeting to hello", tx).await.unwrap();
    let events = drain(rx).await;

    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "fn greet() {\n    println!(\"hello\");\n}\n"
    );
    assert!(events
        .iter()
        .any(|e| matches!(e, AgentEvent::TextComplete(t) if t.contains("updated"))));
}

/// Discovery output flows through filter and selection with the
/// lower-is-better priority rule.
#[test]
fn filtered_selection_prefers_low_priority_and_load() {
    let txt = |pairs: &[(&str, &str)]| -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    };
    let endpoints = vec![
        EndpointDescriptor::from_txt(
            "busy-box",
            "10.0.0.1",
            8080,
            &txt(&[
                ("priority", "10"),
                ("features", "streaming,tools"),
                ("max_concurrent", "4"),
                ("current_load", "4"),
            ]),
        ),
        EndpointDescriptor::from_txt(
            "idle-box",
            "10.0.0.2",
            8080,
            &txt(&[
                ("priority", "20"),
                ("features", "streaming,tools"),
                ("max_concurrent", "4"),
                ("current_load", "0"),
            ]),
        ),
        EndpointDescriptor::from_txt(
            "no-tools",
            "10.0.0.3",
            8080,
            &txt(&[("priority", "1"), ("features", "streaming")]),
        ),
    ];

    let filter = EndpointFilter {
        require_features: vec!["streaming".into(), "tools".into()],
        ..Default::default()
    };
    let candidates = filter_endpoints(&endpoints, &filter);
    assert_eq!(candidates.len(), 2, "no-tools must be filtered out");

    // busy-box: 0.6*0.9 + 0.4*0.0 = 0.54; idle-box: 0.6*0.8 + 0.4*1.0 = 0.88
    let best = select_best(&candidates).unwrap();
    assert_eq!(best.instance, "idle-box");
}

/// Two agents on the fabric: a broadcast arrives exactly once, and the
/// background listener delivers it.
#[tokio::test]
async fn coordination_broadcast_round_trip() {
    let bus = new_bus();
    let x = InMemoryCoordination::new("X", Arc::clone(&bus));
    let y: Arc<dyn Coordination> = Arc::new(InMemoryCoordination::new("Y", Arc::clone(&bus)));

    let (seen_tx, mut seen_rx) = mpsc::channel(4);
    let listener = spawn_listener(Arc::clone(&y), Duration::from_millis(10), move |msg| {
        let _ = seen_tx.try_send(msg);
    });

    x.broadcast("status", "compiling").await.unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(1), seen_rx.recv())
        .await
        .expect("listener should deliver within a tick")
        .unwrap();
    assert_eq!(msg.from, "X");
    assert_eq!(msg.to, "*");
    assert_eq!(msg.kind, "status");
    assert_eq!(msg.content, "compiling");

    // Nothing else arrives on subsequent ticks.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(seen_rx.try_recv().is_err(), "no duplicate delivery");
    listener.stop().await;
}
