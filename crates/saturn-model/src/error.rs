// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("undecodable stream chunk: {0}")]
    StreamDecode(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request canceled")]
    Canceled,

    #[error("all endpoints failed: {0}")]
    AllEndpointsFailed(String),

    #[error("no healthy endpoints available")]
    NoHealthyEndpoints,

    #[error("health gate failed: every discovered endpoint is unhealthy")]
    HealthGateFailed,
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        ModelError::Transport(e.to_string())
    }
}
