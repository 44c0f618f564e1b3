// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};
use crate::truncate::Truncator;

/// Built-in tool that runs a shell command.
pub struct BashTool {
    pub timeout_secs: u64,
    truncator: Truncator,
}

impl BashTool {
    pub fn new(timeout_secs: u64, truncator: Truncator) -> Self {
        Self {
            timeout_secs,
            truncator,
        }
    }
}

impl Default for BashTool {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            truncator: Truncator::default(),
        }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return stdout + stderr.\n\
         Prefer non-interactive commands; avoid anything that needs a TTY.\n\
         Oversized output is truncated and spooled to a side file whose path\n\
         appears in the truncation marker.\n\
         Do NOT use this for file operations: read_file / edit_file /\n\
         write_file / list_dir exist for those."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute (bash one-liner)"
                },
                "workdir": {
                    "type": "string",
                    "description": "Working directory (optional, defaults to cwd)"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Execution timeout in seconds (optional)"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let command = match call.args.get("command").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'command'"),
        };
        let workdir = call
            .args
            .get("workdir")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let timeout = call
            .args
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.timeout_secs);

        debug!(cmd = %command, "bash tool");

        let mut cmd = Command::new("bash");
        cmd.args(["-c", &command])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &workdir {
            cmd.current_dir(dir);
        }

        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("spawn failed: {e}")),
        };

        let result = tokio::time::timeout(
            Duration::from_secs(timeout),
            child.wait_with_output(),
        )
        .await;

        match result {
            Err(_) => ToolOutput::err(
                &call.id,
                format!("command timed out after {timeout} seconds"),
            ),
            Ok(Err(e)) => ToolOutput::err(&call.id, format!("command failed: {e}")),
            Ok(Ok(output)) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.is_empty() {
                    if !combined.is_empty() {
                        combined.push('\n');
                    }
                    combined.push_str(&stderr);
                }
                let capped = self.truncator.apply(&combined);
                if output.status.success() {
                    ToolOutput::ok(&call.id, capped)
                } else {
                    ToolOutput::err(
                        &call.id,
                        format!("exit status {}:\n{capped}", output.status),
                    )
                }
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
