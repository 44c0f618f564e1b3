// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Coordination exposed through the normal tool contract so the model can
//! publish status, message peers, and look around the fabric.  These are
//! part of the default auto-approve set.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use saturn_tools::{ApprovalPolicy, Tool, ToolCall, ToolOutput};

use crate::coordination::Coordination;
use crate::status::AgentStatus;

const DISCOVER_TIMEOUT: Duration = Duration::from_secs(2);

/// Update this agent's advertised status.
pub struct AgentStatusTool {
    coord: Arc<dyn Coordination>,
}

impl AgentStatusTool {
    pub fn new(coord: Arc<dyn Coordination>) -> Self {
        Self { coord }
    }
}

#[async_trait]
impl Tool for AgentStatusTool {
    fn name(&self) -> &str {
        "agent_status"
    }

    fn description(&self) -> &str {
        "Publish this agent's status on the coordination fabric.\n\
         status: idle | working | stopped; task and action are free text."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "enum": ["idle", "working", "stopped"],
                    "description": "New status"
                },
                "task": {
                    "type": "string",
                    "description": "Current task (optional)"
                },
                "action": {
                    "type": "string",
                    "description": "Last action taken (optional)"
                }
            },
            "required": ["status"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let status: AgentStatus = match call
            .args
            .get("status")
            .and_then(|v| v.as_str())
            .map(str::parse)
        {
            Some(Ok(s)) => s,
            _ => return ToolOutput::err(&call.id, "status must be idle, working, or stopped"),
        };
        let task = call.args.get("task").and_then(|v| v.as_str()).unwrap_or("");
        let action = call
            .args
            .get("action")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        match self.coord.update_status(status, task, action).await {
            Ok(()) => ToolOutput::ok(&call.id, format!("status set to {status}")),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

/// Send a directed or broadcast message to peers.
pub struct SendMessageTool {
    coord: Arc<dyn Coordination>,
}

impl SendMessageTool {
    pub fn new(coord: Arc<dyn Coordination>) -> Self {
        Self { coord }
    }
}

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        "send_message"
    }

    fn description(&self) -> &str {
        "Send a message to another agent on the coordination fabric.\n\
         to: the target agent id, or \"*\" to broadcast to everyone.\n\
         Delivery is best-effort; peers read it within a couple of seconds."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "to": {
                    "type": "string",
                    "description": "Target agent id, or \"*\" for broadcast"
                },
                "type": {
                    "type": "string",
                    "description": "Message type tag (default \"info\")"
                },
                "content": {
                    "type": "string",
                    "description": "Message body"
                }
            },
            "required": ["to", "content"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let to = match call.args.get("to").and_then(|v| v.as_str()) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => return ToolOutput::err(&call.id, "missing required parameter 'to'"),
        };
        let content = match call.args.get("content").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'content'"),
        };
        let kind = call
            .args
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("info");

        match self.coord.send_message(&to, kind, &content).await {
            Ok(()) => ToolOutput::ok(&call.id, format!("message queued for {to}")),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

/// Discover peer agents and their advertised status.
pub struct ListAgentsTool {
    coord: Arc<dyn Coordination>,
}

impl ListAgentsTool {
    pub fn new(coord: Arc<dyn Coordination>) -> Self {
        Self { coord }
    }
}

#[async_trait]
impl Tool for ListAgentsTool {
    fn name(&self) -> &str {
        "list_agents"
    }

    fn description(&self) -> &str {
        "List the other agents visible on the coordination fabric, with\n\
         their status, current task, and last action."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.coord.discover_agents(DISCOVER_TIMEOUT).await {
            Ok(peers) if peers.is_empty() => {
                ToolOutput::ok(&call.id, "no other agents on the network")
            }
            Ok(peers) => {
                let lines: Vec<String> = peers
                    .iter()
                    .map(|r| {
                        format!(
                            "{} — {} (task: {}, last: {})",
                            r.agent_id,
                            r.status,
                            if r.task.is_empty() { "-" } else { &r.task },
                            if r.action.is_empty() { "-" } else { &r.action },
                        )
                    })
                    .collect();
                ToolOutput::ok(&call.id, lines.join("\n"))
            }
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
