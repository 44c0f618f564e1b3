// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::VecDeque;

use sha2::{Digest, Sha256};

/// Detects the model calling the same tool with the same arguments over
/// and over.
///
/// Keeps a bounded FIFO of 16-hex-digit SHA-256 prefixes over
/// `name + ":" + arguments`.  A call is a doom loop when the last
/// `threshold − 1` recorded entries all equal the current call's key —
/// i.e. the current call would be the `threshold`-th identical one.
#[derive(Debug)]
pub struct DoomLoopGuard {
    recent: VecDeque<String>,
    threshold: usize,
}

impl DoomLoopGuard {
    pub fn new(threshold: usize) -> Self {
        Self {
            recent: VecDeque::new(),
            threshold: threshold.max(2),
        }
    }

    fn key(name: &str, arguments: &str) -> String {
        let digest = Sha256::digest(format!("{name}:{arguments}").as_bytes());
        hex::encode(&digest[..8])
    }

    /// Would this call complete a doom loop?  Does not record it.
    pub fn is_doom_loop(&self, name: &str, arguments: &str) -> bool {
        let needed = self.threshold - 1;
        if self.recent.len() < needed {
            return false;
        }
        let key = Self::key(name, arguments);
        self.recent.iter().rev().take(needed).all(|k| *k == key)
    }

    /// Record an executed call.
    pub fn record(&mut self, name: &str, arguments: &str) {
        if self.recent.len() == self.threshold * 2 {
            self.recent.pop_front();
        }
        self.recent.push_back(Self::key(name, arguments));
    }

    /// Clear the history, suppressing any pending doom verdict.
    pub fn reset(&mut self) {
        self.recent.clear();
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
