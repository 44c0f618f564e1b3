// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::builtin::ReadLedger;
use crate::policy::ApprovalPolicy;
use crate::replace::replace;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// String replacement in a file, backed by the fuzzy matching cascade.
pub struct EditFileTool {
    ledger: Arc<ReadLedger>,
}

impl EditFileTool {
    pub fn new(ledger: Arc<ReadLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace old_string with new_string in a file.\n\
         - The file must have been read with read_file first.\n\
         - Fails when old_string is absent, or matches more than once without\n\
           replace_all; add surrounding lines to old_string to pin the match.\n\
         - Minor indentation/whitespace drift between old_string and the file\n\
           is corrected automatically.\n\
         - An empty old_string creates the file with new_string as content.\n\
         - Use replace_all to rename across the whole file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the file"
                },
                "old_string": {
                    "type": "string",
                    "description": "The text to replace (empty to create the file)"
                },
                "new_string": {
                    "type": "string",
                    "description": "The replacement text (must differ from old_string)"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence (default false)",
                    "default": false
                }
            },
            "required": ["path", "old_string", "new_string"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'path'"),
        };
        let old_string = match call.args.get("old_string").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'old_string'"),
        };
        let new_string = match call.args.get("new_string").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'new_string'"),
        };
        let replace_all = call
            .args
            .get("replace_all")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        debug!(path = %path, replace_all, "edit_file tool");

        // Create mode: empty old_string writes the file outright.
        if old_string.is_empty() {
            if let Some(parent) = Path::new(&path).parent() {
                if !parent.as_os_str().is_empty() {
                    let _ = tokio::fs::create_dir_all(parent).await;
                }
            }
            return match tokio::fs::write(&path, &new_string).await {
                Ok(_) => {
                    self.ledger.record(Path::new(&path));
                    ToolOutput::ok(&call.id, "File created")
                }
                Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
            };
        }

        if !self.ledger.was_read(Path::new(&path)) {
            return ToolOutput::err(&call.id, "file must be read before editing");
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };

        let new_content = match replace(&content, &old_string, &new_string, replace_all) {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, e.to_string()),
        };

        match tokio::fs::write(&path, &new_content).await {
            Ok(_) => ToolOutput::ok(&call.id, "Edit applied successfully"),
            Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
