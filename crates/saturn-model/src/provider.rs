// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::{error::ModelError, CompletionRequest, Message, StreamEvent};

pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ModelError>> + Send>>;

/// The seam between the agent loop and whatever serves completions —
/// the endpoint pool in production, a scripted mock in tests.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Human-readable name for status display.
    fn name(&self) -> &str;

    /// Unary completion: the full assistant turn as internal messages
    /// (a text message and/or tool-call messages, in emitted order).
    async fn chat(&self, req: CompletionRequest) -> Result<Vec<Message>, ModelError>;

    /// Streaming completion.
    async fn chat_stream(&self, req: CompletionRequest) -> Result<ResponseStream, ModelError>;
}
