// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-call approval mediation.
//!
//! Tools in the auto set run without asking.  Every other call publishes an
//! [`ApprovalRequest`] keyed `<agent-id>-<call-id>` on an out-of-band
//! channel and blocks on the decision; timeout and cancellation both
//! resolve to deny.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use saturn_config::ToolsConfig;

/// Per-tool approval policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalPolicy {
    /// Always run without asking
    Auto,
    /// Ask before each invocation
    Ask,
}

/// Outcome of mediation for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied,
}

/// An approval request published to the external decider.
#[derive(Debug)]
pub struct ApprovalRequest {
    /// `<agent-id>-<call-id>`; correlates the decision with the call.
    pub key: String,
    pub tool: String,
    pub args: Value,
    /// Send `true` to allow, `false` to deny.  Dropping the sender denies.
    pub reply: oneshot::Sender<bool>,
}

/// Classifies each tool call as auto-approved or requiring an external
/// decision.
pub struct ApprovalMediator {
    auto: HashSet<String>,
    requests: Option<mpsc::Sender<ApprovalRequest>>,
    timeout: Duration,
}

impl ApprovalMediator {
    /// Mediator with no external decider: auto tools run, everything else
    /// is denied.
    pub fn auto_only(cfg: &ToolsConfig) -> Self {
        Self {
            auto: cfg.auto_approve.iter().cloned().collect(),
            requests: None,
            timeout: Duration::from_secs(0),
        }
    }

    /// Mediator wired to an external decider over a bounded channel.
    pub fn with_channel(
        cfg: &ToolsConfig,
        requests: mpsc::Sender<ApprovalRequest>,
        timeout: Duration,
    ) -> Self {
        Self {
            auto: cfg.auto_approve.iter().cloned().collect(),
            requests: Some(requests),
            timeout,
        }
    }

    /// Extend the auto set (e.g. for tests or per-session grants).
    pub fn allow(&mut self, tool: impl Into<String>) {
        self.auto.insert(tool.into());
    }

    pub fn is_auto(&self, tool: &str) -> bool {
        self.auto.contains(tool)
    }

    /// Decide one call.  `cancel` aborts the wait and denies.
    pub async fn decide(
        &self,
        agent_id: &str,
        call_id: &str,
        tool: &str,
        args: &Value,
        cancel: &mut watch::Receiver<bool>,
    ) -> Decision {
        if self.auto.contains(tool) {
            return Decision::Allowed;
        }

        let Some(requests) = &self.requests else {
            debug!(tool, "no approval channel wired; denying");
            return Decision::Denied;
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = ApprovalRequest {
            key: format!("{agent_id}-{call_id}"),
            tool: tool.to_string(),
            args: args.clone(),
            reply: reply_tx,
        };
        if requests.send(request).await.is_err() {
            return Decision::Denied;
        }

        let wait = async {
            match reply_rx.await {
                Ok(true) => Decision::Allowed,
                _ => Decision::Denied,
            }
        };

        tokio::select! {
            decision = wait => decision,
            _ = cancel.changed() => Decision::Denied,
            _ = tokio::time::sleep(self.timeout) => Decision::Denied,
        }
    }
}

/// A cancel receiver that never fires; handy for callers without a cancel
/// signal of their own.
pub fn never_cancel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    // Leak the sender so the channel stays open for the receiver's lifetime.
    std::mem::forget(tx);
    rx
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
