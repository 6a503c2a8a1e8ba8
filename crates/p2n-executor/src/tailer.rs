// crates/p2n-executor/src/tailer.rs
// ============================================================================
// Module: Events File Tailer
// Description: Incremental reader for the notebook's events.jsonl file.
// Purpose: Forward notebook-raised events between cells without re-reads.
// Dependencies: serde_json, tokio
// ============================================================================

//! ## Overview
//! The notebook writes newline-delimited `{type, payload}` objects into
//! `events.jsonl`; the executor tails the file between cells, forwarding only
//! lines it has not seen. Partial trailing lines stay buffered until their
//! newline arrives. Malformed lines are counted and skipped, never fatal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Truncation sentinel appended to capped artifacts.
pub const TRUNCATION_SENTINEL: &str = "\n[truncated]\n";
/// Captured log cap in bytes.
pub const MAX_LOG_BYTES: usize = 2 * 1024 * 1024;
/// Event log cap in bytes.
pub const MAX_EVENT_LOG_BYTES: usize = 5 * 1024 * 1024;

// ============================================================================
// SECTION: Tailer
// ============================================================================

/// Incremental tailer over the run's events file.
///
/// # Invariants
/// - Each complete line is yielded exactly once.
/// - A missing file reads as empty; the notebook may not have created it yet.
pub struct EventsTailer {
    /// Path to the events file.
    path: PathBuf,
    /// Byte offset consumed so far.
    offset: u64,
    /// Carry-over for a partial trailing line.
    partial: Vec<u8>,
    /// Malformed lines skipped so far.
    malformed: u64,
}

impl EventsTailer {
    /// Creates a tailer over the given events file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            partial: Vec::new(),
            malformed: 0,
        }
    }

    /// Reads newly appended events since the last poll.
    ///
    /// # Errors
    ///
    /// Returns the I/O error message when the file exists but cannot be read.
    pub async fn poll(&mut self) -> Result<Vec<(String, Value)>, String> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.to_string()),
        };
        let start = usize::try_from(self.offset).unwrap_or(usize::MAX).min(bytes.len());
        let fresh = &bytes[start..];
        self.offset = bytes.len() as u64;

        let mut buffer = std::mem::take(&mut self.partial);
        buffer.extend_from_slice(fresh);

        let mut events = Vec::new();
        while let Some(newline) = buffer.iter().position(|&byte| byte == b'\n') {
            let line: Vec<u8> = buffer.drain(..=newline).collect();
            let trimmed = String::from_utf8_lossy(&line);
            let trimmed = trimmed.trim();
            if trimmed.is_empty() {
                continue;
            }
            match parse_event_line(trimmed) {
                Some(event) => events.push(event),
                None => self.malformed += 1,
            }
        }
        self.partial = buffer;
        Ok(events)
    }

    /// Returns the count of malformed lines skipped.
    #[must_use]
    pub const fn malformed_count(&self) -> u64 {
        self.malformed
    }

    /// Returns the tailed file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parses one `{type, payload}` line.
fn parse_event_line(line: &str) -> Option<(String, Value)> {
    let value: Value = serde_json::from_str(line).ok()?;
    let event_type = value.get("type")?.as_str()?.to_string();
    let payload = value.get("payload").cloned().unwrap_or(Value::Null);
    Some((event_type, payload))
}

// ============================================================================
// SECTION: Truncation
// ============================================================================

/// Caps a byte buffer, appending the truncation sentinel when it was cut.
#[must_use]
pub fn truncate_with_sentinel(bytes: Vec<u8>, cap: usize) -> Vec<u8> {
    if bytes.len() <= cap {
        return bytes;
    }
    let keep = cap.saturating_sub(TRUNCATION_SENTINEL.len());
    let mut truncated = bytes;
    truncated.truncate(keep);
    truncated.extend_from_slice(TRUNCATION_SENTINEL.as_bytes());
    truncated
}

// ============================================================================
// SECTION: Tests
// ============================================================================
