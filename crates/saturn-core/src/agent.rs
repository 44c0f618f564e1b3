// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use saturn_config::Config;
use saturn_coord::{AgentStatus, Coordination};
use saturn_model::{ChatClient, CompletionRequest, Message, StreamEvent};
use saturn_tools::{ApprovalMediator, Decision, ToolCall, ToolOutput, ToolRegistry, Truncator};

use crate::{events::AgentEvent, guard::DoomLoopGuard, session::Session, AgentError};

const DEFAULT_SYSTEM_PROMPT: &str = "You are saturn, a coding assistant working in the \
user's project directory. Use the available tools to read, edit, and run things; reply \
with text when the task is done. Other saturn agents may be active on this network — \
coordinate through the agent tools instead of duplicating their work.";

/// Synthetic tool result for calls the mediator rejected.
const DENIED_RESULT: &str = "Tool execution was denied by user.";

/// Hook consulted when the doom-loop guard trips.  Returning `true`
/// continues anyway; `false` (or no hook) aborts the turn.
pub type DoomLoopHook = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// The core agent.  Owns a session and drives the model ↔ tool loop.
pub struct Agent {
    agent_id: String,
    session: Session,
    tools: Arc<ToolRegistry>,
    model: Arc<dyn ChatClient>,
    config: Arc<Config>,
    mediator: Arc<ApprovalMediator>,
    guard: DoomLoopGuard,
    coordinator: Option<Arc<dyn Coordination>>,
    doom_hook: Option<DoomLoopHook>,
    /// Uniform cap applied to every tool result before it enters the
    /// conversation; overflow spools to a side file.
    truncator: Truncator,
    /// Task string advertised while this turn runs.
    current_task: String,
}

impl Agent {
    pub fn new(
        model: Arc<dyn ChatClient>,
        tools: Arc<ToolRegistry>,
        config: Arc<Config>,
        mediator: Arc<ApprovalMediator>,
    ) -> Self {
        let session = Session::new();
        Self {
            agent_id: session.id.clone(),
            guard: DoomLoopGuard::new(config.agent.doom_loop_threshold),
            truncator: Truncator::new(
                config.tools.truncate_lines,
                config.tools.truncate_bytes,
                "saturn",
            ),
            session,
            tools,
            model,
            config,
            mediator,
            coordinator: None,
            doom_hook: None,
            current_task: String::new(),
        }
    }

    /// Attach a coordinator; the agent id becomes the coordinator's so
    /// status and approval keys line up across the fabric.
    pub fn with_coordinator(mut self, coordinator: Arc<dyn Coordination>) -> Self {
        self.agent_id = coordinator.agent_id().to_string();
        self.coordinator = Some(coordinator);
        self
    }

    /// Install a continue-anyway hook for doom-loop escalation.
    pub fn with_doom_hook(mut self, hook: DoomLoopHook) -> Self {
        self.doom_hook = Some(hook);
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Clear the doom-loop history (e.g. between unrelated user turns).
    pub fn reset_guard(&mut self) {
        self.guard.reset();
    }

    /// Push a user message, run the loop until a stream ends without tool
    /// calls, and emit events through `tx`.
    pub async fn submit(
        &mut self,
        user_input: &str,
        tx: mpsc::Sender<AgentEvent>,
    ) -> anyhow::Result<()> {
        // Sender kept alive for the whole call so the receiver never sees
        // a spurious close-as-cancel.
        let (_keep_open, cancel) = watch::channel(false);
        self.submit_with_cancel(user_input, tx, cancel).await
    }

    /// Like [`submit`] but honoring a cancel signal.  Cancellation commits
    /// any streamed text, emits [`AgentEvent::Aborted`], and returns Ok.
    pub async fn submit_with_cancel(
        &mut self,
        user_input: &str,
        tx: mpsc::Sender<AgentEvent>,
        mut cancel: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        if self.session.messages.is_empty() {
            self.session.push(Message::system(self.system_prompt()));
        }
        self.session.push(Message::user(user_input));

        self.current_task = user_input.chars().take(60).collect();
        let task = self.current_task.clone();
        self.publish_status(AgentStatus::Working, &task, "thinking", &tx)
            .await;

        let result = self.run_loop(&tx, &mut cancel).await;

        match result {
            Ok(()) => {
                self.publish_status(AgentStatus::Idle, "", "done", &tx).await;
                let _ = tx.send(AgentEvent::TurnComplete).await;
                Ok(())
            }
            Err(e) if is_cancel(&e) => {
                self.publish_status(AgentStatus::Idle, "", "canceled", &tx)
                    .await;
                let _ = tx
                    .send(AgentEvent::Aborted {
                        partial_text: String::new(),
                    })
                    .await;
                Ok(())
            }
            Err(e) => {
                self.publish_status(AgentStatus::Idle, "", "failed", &tx).await;
                Err(e)
            }
        }
    }

    /// The main loop: model call → optional tool calls → repeat.
    async fn run_loop(
        &mut self,
        tx: &mpsc::Sender<AgentEvent>,
        cancel: &mut watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let mut rounds = 0u32;
        loop {
            if *cancel.borrow() {
                return Err(AgentError::Canceled.into());
            }
            rounds += 1;
            if rounds > self.config.agent.max_tool_rounds {
                anyhow::bail!(
                    "exceeded maximum tool rounds ({})",
                    self.config.agent.max_tool_rounds
                );
            }

            let (text, pending) = self.stream_one_turn(tx, cancel).await?;

            if !text.is_empty() {
                self.session.push(Message::assistant(&text));
                let _ = tx.send(AgentEvent::TextComplete(text)).await;
            }

            if pending.is_empty() {
                return Ok(());
            }

            // Assistant tool-call messages all precede their results so the
            // wire serialization can coalesce them into one message.
            for call in &pending {
                self.session.push(Message::tool_call(
                    &call.id,
                    &call.name,
                    &call.raw_args,
                ));
            }

            // Execute strictly in emitted order; results append in the same
            // order so the next request sees a prefix-closed conversation.
            let mut outputs = Vec::with_capacity(pending.len());
            for call in &pending {
                let output = self.run_one_call(call, tx, cancel).await?;
                self.guard.record(&call.name, &call.raw_args);
                outputs.push(output);
            }

            for output in outputs {
                let content = self.truncator.apply(&output.content);
                self.session.push(Message::tool_result(
                    &output.call_id,
                    content,
                    output.is_error,
                ));
            }
        }
    }

    /// Guard → approval → execution for a single call.
    async fn run_one_call(
        &self,
        call: &PendingCall,
        tx: &mpsc::Sender<AgentEvent>,
        cancel: &mut watch::Receiver<bool>,
    ) -> anyhow::Result<ToolOutput> {
        if self.guard.is_doom_loop(&call.name, &call.raw_args) {
            let continue_anyway = self
                .doom_hook
                .as_ref()
                .map(|hook| hook(&call.name))
                .unwrap_or(false);
            if !continue_anyway {
                return Err(AgentError::DoomLoop(call.name.clone()).into());
            }
            warn!(tool = %call.name, "doom loop escalation allowed continuation");
        }

        let args: serde_json::Value = if call.raw_args.is_empty() {
            serde_json::Value::Object(Default::default())
        } else {
            match serde_json::from_str(&call.raw_args) {
                Ok(v) => v,
                Err(e) => {
                    // Reported, not raised: the model gets to correct itself.
                    return Ok(ToolOutput::err(
                        &call.id,
                        format!("invalid arguments for {}: {e}", call.name),
                    ));
                }
            }
        };

        let tool_call = ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            args,
        };
        let _ = tx.send(AgentEvent::ToolCallStarted(tool_call.clone())).await;

        let decision = self
            .mediator
            .decide(&self.agent_id, &call.id, &call.name, &tool_call.args, cancel)
            .await;
        let output = match decision {
            Decision::Denied => ToolOutput::err(&call.id, DENIED_RESULT),
            Decision::Allowed => {
                self.publish_action(&format!("running {}", call.name)).await;
                tokio::select! {
                    output = self.tools.execute(&tool_call) => output,
                    _ = cancel.changed() => return Err(AgentError::Canceled.into()),
                }
            }
        };

        let _ = tx
            .send(AgentEvent::ToolCallFinished {
                call_id: output.call_id.clone(),
                tool_name: call.name.clone(),
                output: output.content.clone(),
                is_error: output.is_error,
            })
            .await;
        Ok(output)
    }

    /// Call the model once, streaming text deltas and accumulating tool
    /// call fragments by index.  Returns the full text and the assembled
    /// calls in index order.
    async fn stream_one_turn(
        &mut self,
        tx: &mpsc::Sender<AgentEvent>,
        cancel: &mut watch::Receiver<bool>,
    ) -> anyhow::Result<(String, Vec<PendingCall>)> {
        let tools: Vec<saturn_model::ToolSchema> = self
            .tools
            .schemas()
            .into_iter()
            .map(|s| saturn_model::ToolSchema {
                name: s.name,
                description: s.description,
                parameters: s.parameters,
            })
            .collect();

        let req = CompletionRequest {
            model: self.config.model.name.clone(),
            max_tokens: Some(self.config.model.max_tokens),
            messages: self.session.messages.clone(),
            tools,
            stream: true,
        };

        let mut stream = self
            .model
            .chat_stream(req)
            .await
            .context("model completion failed")?;

        let mut full_text = String::new();
        // Keyed by the parallel-tool-call index from the wire; fragments
        // for one call concatenate verbatim and parse only at stream end.
        let mut pending: HashMap<u32, PendingCall> = HashMap::new();

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.changed() => return Err(AgentError::Canceled.into()),
                ev = stream.next() => ev,
            };
            let Some(event) = event else { break };
            match event? {
                StreamEvent::TextDelta(delta) if !delta.is_empty() => {
                    full_text.push_str(&delta);
                    let _ = tx.send(AgentEvent::TextDelta(delta)).await;
                }
                StreamEvent::TextDelta(_) => {}
                StreamEvent::ToolCall {
                    index,
                    id,
                    name,
                    arguments,
                } => {
                    let slot = pending.entry(index).or_insert_with(|| PendingCall {
                        index,
                        id: String::new(),
                        name: String::new(),
                        raw_args: String::new(),
                    });
                    if !id.is_empty() {
                        slot.id = id;
                    }
                    if !name.is_empty() {
                        slot.name = name;
                    }
                    slot.raw_args.push_str(&arguments);
                }
                StreamEvent::Done => break,
            }
        }

        let mut calls: Vec<PendingCall> = pending.into_values().collect();
        calls.sort_by_key(|c| c.index);
        // A call with no name cannot be dispatched; keeping it would also
        // corrupt the history sent back on the next round.
        calls.retain(|c| {
            if c.name.is_empty() {
                warn!(call_id = %c.id, "dropping tool call with empty name");
                false
            } else {
                true
            }
        });
        for (i, call) in calls.iter_mut().enumerate() {
            if call.id.is_empty() {
                call.id = format!("call_synthetic_{i}");
            }
        }

        debug!(
            text_len = full_text.len(),
            tool_calls = calls.len(),
            "model turn complete"
        );
        Ok((full_text, calls))
    }

    fn system_prompt(&self) -> String {
        self.config
            .agent
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
    }

    async fn publish_status(
        &self,
        status: AgentStatus,
        task: &str,
        action: &str,
        tx: &mpsc::Sender<AgentEvent>,
    ) {
        if let Some(coord) = &self.coordinator {
            if let Err(e) = coord.update_status(status, task, action).await {
                warn!("status publish failed: {e}");
            }
            let _ = tx.send(AgentEvent::StatusChanged(status)).await;
        }
    }

    async fn publish_action(&self, action: &str) {
        if let Some(coord) = &self.coordinator {
            if let Err(e) = coord
                .update_status(AgentStatus::Working, &self.current_task, action)
                .await
            {
                warn!("action publish failed: {e}");
            }
        }
    }
}

fn is_cancel(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<AgentError>(), Some(AgentError::Canceled))
}

/// One tool call being assembled from stream fragments.
#[derive(Debug, Clone)]
struct PendingCall {
    index: u32,
    id: String,
    name: String,
    raw_args: String,
}
