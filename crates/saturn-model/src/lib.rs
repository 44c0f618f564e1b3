// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Model access for saturn: the internal message model, the
//! OpenAI-compatible wire client, and the round-robin endpoint pool.
pub mod error;
pub mod mock;
pub mod openai;
pub mod pool;
pub mod provider;
pub mod types;

pub use error::ModelError;
pub use mock::ScriptedClient;
pub use openai::{chat_url, ModelInfo, OpenAiClient};
pub use pool::EndpointPool;
pub use provider::{ChatClient, ResponseStream};
pub use types::{
    CompletionRequest, FunctionCall, Message, MessageContent, Role, StreamEvent, ToolSchema,
};
