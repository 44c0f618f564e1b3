// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use saturn_coord::AgentStatus;
use saturn_tools::ToolCall;

/// Events emitted by the agent during a single turn.  Consumers (the CLI
/// runner, embedders) subscribe to these to drive their output.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A text chunk streamed from the model
    TextDelta(String),
    /// The complete text response (after streaming finishes)
    TextComplete(String),
    /// The model has requested a tool call
    ToolCallStarted(ToolCall),
    /// A tool call finished
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
    },
    /// The agent's published status changed
    StatusChanged(AgentStatus),
    /// The agent finished processing the current user turn
    TurnComplete,
    /// The turn was canceled; any streamed text is carried along
    Aborted { partial_text: String },
    /// A recoverable error occurred
    Error(String),
}
