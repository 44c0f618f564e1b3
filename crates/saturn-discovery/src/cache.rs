// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::endpoint::EndpointDescriptor;

/// One cached service entry.  Invariant: `expires_at = cached_at + ttl`.
#[derive(Debug, Clone)]
pub struct CachedService {
    pub descriptor: EndpointDescriptor,
    pub cached_at: Instant,
    pub expires_at: Instant,
}

struct RefreshTask {
    stop: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

/// TTL map of endpoint descriptors keyed by instance name, with an optional
/// background refresher.
///
/// Reads take a shared lock and never observe a partially updated entry;
/// the refresher replaces the whole map under one exclusive lock.
pub struct ServiceCache {
    entries: Arc<RwLock<HashMap<String, CachedService>>>,
    ttl: Duration,
    refresh: Mutex<Option<RefreshTask>>,
}

impl ServiceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            refresh: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the descriptor if present and unexpired.
    pub fn get(&self, instance: &str) -> Option<EndpointDescriptor> {
        let now = Instant::now();
        let map = self.entries.read().unwrap();
        map.get(instance)
            .filter(|e| e.expires_at > now)
            .map(|e| e.descriptor.clone())
    }

    /// All unexpired descriptors, in unspecified order.
    pub fn get_all(&self) -> Vec<EndpointDescriptor> {
        let now = Instant::now();
        let map = self.entries.read().unwrap();
        map.values()
            .filter(|e| e.expires_at > now)
            .map(|e| e.descriptor.clone())
            .collect()
    }

    /// (Re)insert a descriptor with fresh cache stamps.
    pub fn set(&self, descriptor: EndpointDescriptor) {
        let now = Instant::now();
        let entry = CachedService {
            cached_at: now,
            expires_at: now + self.ttl,
            descriptor,
        };
        let mut map = self.entries.write().unwrap();
        map.insert(entry.descriptor.instance.clone(), entry);
    }

    /// (Re)insert many descriptors atomically under a single write lock.
    pub fn set_all(&self, descriptors: Vec<EndpointDescriptor>) {
        let now = Instant::now();
        let mut map = self.entries.write().unwrap();
        for d in descriptors {
            map.insert(
                d.instance.clone(),
                CachedService {
                    cached_at: now,
                    expires_at: now + self.ttl,
                    descriptor: d,
                },
            );
        }
    }

    pub fn remove(&self, instance: &str) -> bool {
        self.entries.write().unwrap().remove(instance).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }

    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let mut map = self.entries.write().unwrap();
        let before = map.len();
        map.retain(|_, e| e.expires_at > now);
        before - map.len()
    }

    /// Number of entries, expired ones included (prune first for a live count).
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }

    /// Launch the single background refresher.  Each tick, if any cached
    /// entry has crossed the 80%-of-TTL threshold, `refresh_fn` is called
    /// and the map replaced with its result.  A second call while a
    /// refresher is running is a no-op.
    ///
    /// Entries stay in the map past expiry until pruned or replaced, and the
    /// tick grid (ttl/4) only lands past the threshold near the expiry
    /// instant, so aged-out entries still trigger — the refresher is what
    /// replaces them.
    pub fn start_background_refresh<F, Fut>(&self, refresh_fn: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<EndpointDescriptor>>> + Send,
    {
        let mut slot = self.refresh.lock().unwrap();
        if let Some(task) = slot.as_ref() {
            if !task.handle.is_finished() {
                debug!("background refresh already running; ignoring second start");
                return;
            }
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let entries = Arc::clone(&self.entries);
        let ttl = self.ttl;
        let handle = tokio::spawn(async move {
            let threshold = ttl.mul_f64(0.8);
            let mut tick = tokio::time::interval(refresh_interval(ttl));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = tick.tick() => {}
                }
                let due = {
                    let now = Instant::now();
                    let map = entries.read().unwrap();
                    map.values()
                        .any(|e| now.duration_since(e.cached_at) >= threshold)
                };
                if !due {
                    continue;
                }
                match refresh_fn().await {
                    Ok(descriptors) => {
                        debug!(count = descriptors.len(), "cache refreshed");
                        let now = Instant::now();
                        let mut map = entries.write().unwrap();
                        map.clear();
                        for d in descriptors {
                            map.insert(
                                d.instance.clone(),
                                CachedService {
                                    cached_at: now,
                                    expires_at: now + ttl,
                                    descriptor: d,
                                },
                            );
                        }
                    }
                    Err(e) => warn!("cache refresh failed: {e}"),
                }
            }
        });

        *slot = Some(RefreshTask {
            stop: stop_tx,
            handle,
        });
    }

    /// Cancel the refresher and wait for it to exit.  No-op when none runs.
    pub async fn stop_background_refresh(&self) {
        let task = self.refresh.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.stop.send(true);
            let _ = task.handle.await;
        }
    }
}

/// Refresh tick interval: ttl/4, floored at 1 s.  Sub-10 s TTLs floor at
/// 10 ms instead so short-TTL tests stay fast.
fn refresh_interval(ttl: Duration) -> Duration {
    let quarter = ttl / 4;
    let floor = if ttl < Duration::from_secs(10) {
        Duration::from_millis(10)
    } else {
        Duration::from_secs(1)
    };
    quarter.max(floor)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
