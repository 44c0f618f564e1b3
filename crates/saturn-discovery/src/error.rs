// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum DiscoveryError {
    #[error("no saturn services found on network")]
    NoServicesFound,

    #[error("failed to resolve service instance: {0}")]
    ResolveFailed(String),

    #[error("mdns daemon error: {0}")]
    Daemon(String),

    #[error("browse error: {0}")]
    Browse(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for DiscoveryError {
    fn from(e: std::io::Error) -> Self {
        DiscoveryError::Io(e.to_string())
    }
}

impl From<mdns_sd::Error> for DiscoveryError {
    fn from(e: mdns_sd::Error) -> Self {
        DiscoveryError::Daemon(e.to_string())
    }
}
