// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Endpoint filtering and load-aware scoring.
//!
//! Priority is **lower-is-better** (0 = most preferred, 100 = least).

use crate::endpoint::{EndpointDescriptor, Health};

/// Predicate set applied before scoring.
#[derive(Debug, Clone, Default)]
pub struct EndpointFilter {
    /// Capability tags that must all be advertised.
    pub require_features: Vec<String>,
    /// Required API dialect (TXT `api`).  `None` accepts any.
    pub require_api: Option<String>,
    /// Minimum dotted-numeric protocol version.
    pub min_version: Option<String>,
    /// Instance names never considered.
    pub exclude_instances: Vec<String>,
}

impl EndpointFilter {
    pub fn matches(&self, ep: &EndpointDescriptor) -> bool {
        if self.exclude_instances.iter().any(|n| *n == ep.instance) {
            return false;
        }
        if let Some(api) = &self.require_api {
            if &ep.api != api {
                return false;
            }
        }
        if !self
            .require_features
            .iter()
            .all(|f| ep.features.iter().any(|have| have == f))
        {
            return false;
        }
        if let Some(min) = &self.min_version {
            match &ep.version {
                Some(v) if version_at_least(v, min) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Apply `filter`, preserving input order.
pub fn filter_endpoints(
    endpoints: &[EndpointDescriptor],
    filter: &EndpointFilter,
) -> Vec<EndpointDescriptor> {
    endpoints
        .iter()
        .filter(|ep| filter.matches(ep))
        .cloned()
        .collect()
}

/// Selection score in [0, 1]: 60% priority headroom, 40% spare capacity.
pub fn score(ep: &EndpointDescriptor) -> f64 {
    let priority = ep.priority.min(100) as f64;
    0.6 * ((100.0 - priority) / 100.0) + 0.4 * (1.0 - ep.load_fraction())
}

/// Highest-scoring healthy-or-unknown endpoint; unhealthy ones are never
/// selected.  Ties break by insertion order (the earlier endpoint wins).
pub fn select_best(endpoints: &[EndpointDescriptor]) -> Option<&EndpointDescriptor> {
    let mut best: Option<(&EndpointDescriptor, f64)> = None;
    for ep in endpoints {
        if ep.health == Health::Unhealthy {
            continue;
        }
        let s = score(ep);
        match best {
            // Strictly-greater keeps the first of equal-scoring endpoints.
            Some((_, bs)) if s <= bs => {}
            _ => best = Some((ep, s)),
        }
    }
    best.map(|(ep, _)| ep)
}

/// Compare dotted numeric versions segment-wise; missing segments are 0.
/// Non-numeric segments compare lexicographically as a last resort.
pub fn version_at_least(version: &str, min: &str) -> bool {
    let mut a = version.split('.');
    let mut b = min.split('.');
    loop {
        match (a.next(), b.next()) {
            (None, None) => return true,
            (va, vb) => {
                let va = va.unwrap_or("0");
                let vb = vb.unwrap_or("0");
                match (va.parse::<u64>(), vb.parse::<u64>()) {
                    (Ok(na), Ok(nb)) => {
                        if na != nb {
                            return na > nb;
                        }
                    }
                    _ => {
                        if va != vb {
                            return va > vb;
                        }
                    }
                }
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
