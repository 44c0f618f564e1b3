// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::ReadLedger;
use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Default number of lines returned when the caller does not set a limit.
const DEFAULT_LINE_LIMIT: usize = 500;

pub struct ReadFileTool {
    ledger: Arc<ReadLedger>,
}

impl ReadFileTool {
    pub fn new(ledger: Arc<ReadLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file. Lines are formatted L{n}:content (1-indexed).\n\
         Default: 500 lines from the start; paginate with offset + limit.\n\
         A file must be read with this tool before edit_file will touch it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the file"
                },
                "offset": {
                    "type": "integer",
                    "description": "1-indexed line number to start from (default 1)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return (default 500)"
                }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'path'"),
        };
        let offset = call
            .args
            .get("offset")
            .and_then(|v| v.as_u64())
            .unwrap_or(1)
            .max(1) as usize;
        let limit = call
            .args
            .get("limit")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_LINE_LIMIT as u64) as usize;

        debug!(path = %path, offset, limit, "read_file tool");

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };
        self.ledger.record(Path::new(&path));

        let total = content.lines().count();
        let mut out = String::new();
        for (i, line) in content.lines().enumerate().skip(offset - 1).take(limit) {
            out.push_str(&format!("L{}:{}\n", i + 1, line));
        }
        if offset - 1 + limit < total {
            out.push_str(&format!(
                "... {} more lines; continue with offset={}\n",
                total - (offset - 1 + limit),
                offset + limit
            ));
        }
        if out.is_empty() {
            out = "(empty file)".to_string();
        }
        ToolOutput::ok(&call.id, out)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
