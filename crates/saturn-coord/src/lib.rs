// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The coordination fabric: per-agent mDNS advertisement of status plus a
//! bounded ring of recent messages in TXT records, peer discovery, and
//! best-effort message delivery.
pub mod coordination;
pub mod coordinator;
pub mod error;
pub mod status;
pub mod tools;
pub mod txt;

pub use coordination::{
    new_bus, spawn_listener, CoordBus, Coordination, InMemoryCoordination, ListenerHandle,
};
pub use coordinator::{browse_agents, Coordinator};
pub use error::CoordError;
pub use status::{AgentMessage, AgentStatus, AgentStatusRecord, MessageRing, RING_CAP};
pub use tools::{AgentStatusTool, ListAgentsTool, SendMessageTool};
