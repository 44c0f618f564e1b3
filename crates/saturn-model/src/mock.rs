// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::{
    error::ModelError,
    provider::{ChatClient, ResponseStream},
    CompletionRequest, Message, StreamEvent,
};

/// A pre-scripted chat client.  Each call pops the next response script
/// from the front of the queue, so tests can specify exact event sequences
/// — including split tool-call fragments — without network access.
pub struct ScriptedClient {
    scripts: Arc<Mutex<Vec<Vec<StreamEvent>>>>,
    /// The last request seen, for assertions on what was sent.
    pub last_request: Arc<Mutex<Option<CompletionRequest>>>,
}

impl ScriptedClient {
    /// The outer `Vec` is the ordered list of calls; the inner `Vec` is the
    /// event sequence emitted for that call.
    pub fn new(scripts: Vec<Vec<StreamEvent>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Convenience: always answer with a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![vec![
            StreamEvent::TextDelta(reply.into()),
            StreamEvent::Done,
        ]])
    }

    /// Convenience: one tool call, then a text reply after the result.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args_json: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            vec![
                StreamEvent::ToolCall {
                    index: 0,
                    id: tool_id.into(),
                    name: tool_name.into(),
                    arguments: args_json.into(),
                },
                StreamEvent::Done,
            ],
            vec![StreamEvent::TextDelta(final_text.into()), StreamEvent::Done],
        ])
    }

    /// Convenience: emit the same tool call for `rounds` consecutive turns,
    /// then a closing text reply.  Used to provoke the doom-loop guard.
    pub fn repeated_tool(
        tool_name: impl Into<String>,
        args_json: impl Into<String>,
        rounds: usize,
    ) -> Self {
        let name = tool_name.into();
        let args = args_json.into();
        let mut scripts: Vec<Vec<StreamEvent>> = (0..rounds)
            .map(|i| {
                vec![
                    StreamEvent::ToolCall {
                        index: 0,
                        id: format!("call_{i}"),
                        name: name.clone(),
                        arguments: args.clone(),
                    },
                    StreamEvent::Done,
                ]
            })
            .collect();
        scripts.push(vec![
            StreamEvent::TextDelta("done".into()),
            StreamEvent::Done,
        ]);
        Self::new(scripts)
    }

    fn next_script(&self) -> Vec<StreamEvent> {
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            vec![
                StreamEvent::TextDelta("[no more scripts]".into()),
                StreamEvent::Done,
            ]
        } else {
            scripts.remove(0)
        }
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted-mock"
    }

    async fn chat(&self, req: CompletionRequest) -> Result<Vec<Message>, ModelError> {
        *self.last_request.lock().unwrap() = Some(req);
        let mut text = String::new();
        let mut out = Vec::new();
        for ev in self.next_script() {
            match ev {
                StreamEvent::TextDelta(t) => text.push_str(&t),
                StreamEvent::ToolCall {
                    id,
                    name,
                    arguments,
                    ..
                } => out.push(Message::tool_call(id, name, arguments)),
                StreamEvent::Done => break,
            }
        }
        if !text.is_empty() {
            out.insert(0, Message::assistant(text));
        }
        Ok(out)
    }

    async fn chat_stream(&self, req: CompletionRequest) -> Result<ResponseStream, ModelError> {
        *self.last_request.lock().unwrap() = Some(req);
        let events: Vec<Result<StreamEvent, ModelError>> =
            self.next_script().into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(events)))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
