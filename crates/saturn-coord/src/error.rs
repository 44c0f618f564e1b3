// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum CoordError {
    #[error("failed to register agent service: {0}")]
    RegisterFailed(String),

    #[error("failed to browse agent services: {0}")]
    BrowseFailed(String),

    #[error("mdns daemon error: {0}")]
    Daemon(String),
}

impl From<mdns_sd::Error> for CoordError {
    fn from(e: mdns_sd::Error) -> Self {
        CoordError::Daemon(e.to_string())
    }
}
