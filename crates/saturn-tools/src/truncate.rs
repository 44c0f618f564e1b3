// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Uniform cap on tool output.
//!
//! Output beyond the line or byte limit is cut at the limits, the full
//! content is spooled to a side file, and a marker naming the spool path is
//! appended so the model can ask for specific slices later.

use std::path::PathBuf;

use tracing::warn;

/// Default line cap.
pub const MAX_LINES: usize = 2000;
/// Default byte cap (50 KiB).
pub const MAX_BYTES: usize = 50 * 1024;

/// Truncation limits plus the spool directory prefix under the system
/// temp dir.
#[derive(Debug, Clone)]
pub struct Truncator {
    pub max_lines: usize,
    pub max_bytes: usize,
    /// Subdirectory of `std::env::temp_dir()` that receives spool files.
    pub prefix: String,
}

impl Default for Truncator {
    fn default() -> Self {
        Self {
            max_lines: MAX_LINES,
            max_bytes: MAX_BYTES,
            prefix: "saturn".into(),
        }
    }
}

impl Truncator {
    pub fn new(max_lines: usize, max_bytes: usize, prefix: impl Into<String>) -> Self {
        Self {
            max_lines,
            max_bytes,
            prefix: prefix.into(),
        }
    }

    /// Apply the cap.  Content within both limits passes through untouched;
    /// otherwise the head within the limits is kept, the full output is
    /// spooled, and the overflow marker is appended.
    pub fn apply(&self, content: &str) -> String {
        let total_lines = content.lines().count();
        let total_bytes = content.len();
        if total_lines <= self.max_lines && total_bytes <= self.max_bytes {
            return content.to_string();
        }

        let mut kept = String::with_capacity(self.max_bytes.min(total_bytes));
        for (i, line) in content.lines().enumerate() {
            if i >= self.max_lines {
                break;
            }
            // +1 for the newline that joins the next line.
            if kept.len() + line.len() + 1 > self.max_bytes {
                let remaining = self.max_bytes.saturating_sub(kept.len());
                kept.push_str(truncate_at_char_boundary(line, remaining));
                break;
            }
            if i > 0 {
                kept.push('\n');
            }
            kept.push_str(line);
        }

        let spool_note = match self.spool(content) {
            Ok(path) => format!("Full output: {}", path.display()),
            Err(e) => {
                warn!("failed to spool truncated output: {e}");
                "Full output unavailable".to_string()
            }
        };

        format!(
            "{kept}\n\n[OUTPUT TRUNCATED — {total_lines} lines, {total_bytes} bytes. {spool_note}]"
        )
    }

    /// Write the full content under `<tmp>/<prefix>/output-*`.
    fn spool(&self, content: &str) -> std::io::Result<PathBuf> {
        let dir = std::env::temp_dir().join(&self.prefix);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("output-{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, content)?;
        Ok(path)
    }
}

/// Cut `s` to at most `max` bytes without splitting a UTF-8 character.
fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
