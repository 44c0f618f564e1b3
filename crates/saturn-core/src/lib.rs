// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The saturn agent loop: compose system prompt + conversation + tools,
//! consume the model stream, execute tools under mediation, and repeat
//! until a stream ends without tool calls.
mod agent;
mod events;
mod guard;
mod session;

#[cfg(test)]
mod tests;

use thiserror::Error;

pub use agent::{Agent, DoomLoopHook};
pub use events::AgentEvent;
pub use guard::DoomLoopGuard;
pub use session::Session;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("doom loop detected for tool {0}")]
    DoomLoop(String),

    #[error("turn canceled")]
    Canceled,
}
