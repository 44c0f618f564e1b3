// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod bash;
pub mod edit_file;
pub mod list_dir;
pub mod read_file;
pub mod write_file;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Paths the agent has read (or written) this session.
///
/// `edit_file` refuses to touch a file that is not in the ledger, so edits
/// are always based on content the model has actually seen.
#[derive(Debug, Default)]
pub struct ReadLedger {
    paths: Mutex<HashSet<PathBuf>>,
}

impl ReadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, path: &Path) {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.paths.lock().unwrap().insert(canonical);
    }

    pub fn was_read(&self, path: &Path) -> bool {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.paths.lock().unwrap().contains(&canonical)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
