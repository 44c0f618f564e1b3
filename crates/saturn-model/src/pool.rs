// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Round-robin endpoint pool with failover.
//!
//! The pool owns an immutable slice of discovered endpoints, an atomic
//! rotation cursor, and the long-lived connection-pooled HTTP client every
//! request goes through.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use saturn_discovery::{EndpointDescriptor, Health};

use crate::{
    error::ModelError,
    openai::OpenAiClient,
    provider::{ChatClient, ResponseStream},
    CompletionRequest, Message,
};

/// Idle connections kept per host.
const MAX_IDLE_PER_HOST: usize = 8;
/// Keep-alive window for pooled connections.
const KEEP_ALIVE: Duration = Duration::from_secs(90);

#[derive(Debug)]
pub struct EndpointPool {
    endpoints: Vec<EndpointDescriptor>,
    cursor: AtomicUsize,
    client: OpenAiClient,
}

impl EndpointPool {
    /// Build a pool over already health-gated endpoints.
    ///
    /// Fails with [`ModelError::NoHealthyEndpoints`] when the slice is empty.
    pub fn new(endpoints: Vec<EndpointDescriptor>) -> Result<Self, ModelError> {
        if endpoints.is_empty() {
            return Err(ModelError::NoHealthyEndpoints);
        }
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .pool_idle_timeout(KEEP_ALIVE)
            .tcp_keepalive(KEEP_ALIVE)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            endpoints,
            cursor: AtomicUsize::new(0),
            client: OpenAiClient::new(http),
        })
    }

    /// Probe every endpoint's health, drop the unhealthy ones, and build a
    /// pool over the survivors.  Remote endpoints skip the probe.
    pub async fn connect(endpoints: Vec<EndpointDescriptor>) -> Result<Self, ModelError> {
        if endpoints.is_empty() {
            return Err(ModelError::NoHealthyEndpoints);
        }
        let pool = Self::new(endpoints)?;
        let mut healthy = Vec::with_capacity(pool.endpoints.len());
        for mut ep in pool.endpoints.iter().cloned() {
            let health = pool.client.health_check(&ep).await;
            debug!(endpoint = %ep.instance, %health, "health probe");
            if health == Health::Unhealthy {
                continue;
            }
            ep.health = health;
            healthy.push(ep);
        }
        if healthy.is_empty() {
            return Err(ModelError::HealthGateFailed);
        }
        Ok(Self {
            endpoints: healthy,
            cursor: AtomicUsize::new(0),
            client: pool.client,
        })
    }

    pub fn endpoints(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn client(&self) -> &OpenAiClient {
        &self.client
    }

    /// Advance the cursor and return the rotation starting index.
    fn next_start(&self) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed) % self.endpoints.len()
    }
}

#[async_trait]
impl ChatClient for EndpointPool {
    fn name(&self) -> &str {
        "endpoint-pool"
    }

    /// Try endpoints in rotation until one answers; return the last error
    /// when the rotation is exhausted.
    async fn chat(&self, req: CompletionRequest) -> Result<Vec<Message>, ModelError> {
        let n = self.endpoints.len();
        let start = self.next_start();
        let mut last: Option<ModelError> = None;
        for i in 0..n {
            let ep = &self.endpoints[(start + i) % n];
            match self.client.chat(ep, &req).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    warn!(endpoint = %ep.instance, "chat failed, rotating: {e}");
                    last = Some(e);
                }
            }
        }
        Err(ModelError::AllEndpointsFailed(
            last.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    async fn chat_stream(&self, req: CompletionRequest) -> Result<ResponseStream, ModelError> {
        let n = self.endpoints.len();
        let start = self.next_start();
        let mut last: Option<ModelError> = None;
        for i in 0..n {
            let ep = &self.endpoints[(start + i) % n];
            // Failover covers connection/status errors; once a stream is
            // open, mid-stream failures surface to the consumer.
            match self.client.chat_stream(ep, &req).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    warn!(endpoint = %ep.instance, "stream open failed, rotating: {e}");
                    last = Some(e);
                }
            }
        }
        Err(ModelError::AllEndpointsFailed(
            last.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
