// crates/p2n-executor/src/kernel.rs
// ============================================================================
// Module: Worker Kernel
// Description: Persistent child process executing cells over JSON pipes.
// Purpose: Run notebook cells in order with per-cell captured output.
// Dependencies: serde, serde_json, tokio
// ============================================================================

//! ## Overview
//! The kernel is one child process per run speaking newline-delimited JSON on
//! stdin/stdout: the executor sends `{cell_index, source}`, the kernel
//! executes the source in a persistent namespace with stdout and stderr
//! captured per cell, and replies with a status object. Cell state persists
//! across cells, matching notebook semantics. The command line is injectable
//! so tests can substitute a scripted kernel.
//!
//! Security posture: the child runs untrusted generated code; isolation is
//! the scrubbed environment and the per-run working directory. See
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::ChildStdin;
use tokio::process::ChildStdout;
use tokio::process::Command;

// ============================================================================
// SECTION: Bootstrap
// ============================================================================

/// Python bootstrap implementing the cell protocol.
const PYTHON_BOOTSTRAP: &str = r#"
import contextlib
import io
import json
import sys
import traceback

namespace = {"__name__": "__main__"}
for line in sys.stdin:
    line = line.strip()
    if not line:
        continue
    request = json.loads(line)
    stdout_buffer = io.StringIO()
    stderr_buffer = io.StringIO()
    reply = {"status": "ok"}
    try:
        code = compile(request["source"], "<cell %d>" % request["cell_index"], "exec")
        with contextlib.redirect_stdout(stdout_buffer):
            with contextlib.redirect_stderr(stderr_buffer):
                exec(code, namespace)
    except BaseException as error:
        reply = {
            "status": "error",
            "ename": type(error).__name__,
            "evalue": str(error),
            "traceback": traceback.format_exc(),
        }
    reply["stdout"] = stdout_buffer.getvalue()
    reply["stderr"] = stderr_buffer.getvalue()
    sys.stdout.write(json.dumps(reply) + "\n")
    sys.stdout.flush()
"#;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Kernel command configuration.
///
/// # Invariants
/// - The command must speak the newline-delimited JSON cell protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// Program to spawn.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["-u".to_string(), "-c".to_string(), PYTHON_BOOTSTRAP.to_string()],
        }
    }
}

// ============================================================================
// SECTION: Protocol Types
// ============================================================================

/// One cell execution request.
#[derive(Debug, Serialize)]
struct CellRequest<'a> {
    /// Zero-based cell index for error reporting.
    cell_index: usize,
    /// Cell source text.
    source: &'a str,
}

/// Kernel reply for one cell.
///
/// # Invariants
/// - `status` is `ok` or `error`; error replies carry the exception triple.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CellReply {
    /// Reply status: `ok` or `error`.
    pub status: String,
    /// Captured stdout for the cell.
    #[serde(default)]
    pub stdout: String,
    /// Captured stderr for the cell.
    #[serde(default)]
    pub stderr: String,
    /// Exception class name on error.
    #[serde(default)]
    pub ename: Option<String>,
    /// Exception message on error.
    #[serde(default)]
    pub evalue: Option<String>,
    /// Formatted traceback on error.
    #[serde(default)]
    pub traceback: Option<String>,
}

impl CellReply {
    /// Returns true when the cell executed without raising.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Kernel process errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The kernel process could not be spawned.
    #[error("kernel spawn failure: {0}")]
    Spawn(String),
    /// The kernel pipe failed mid-protocol.
    #[error("kernel pipe failure: {0}")]
    Pipe(String),
    /// The kernel replied with something unparsable.
    #[error("kernel protocol violation: {0}")]
    Protocol(String),
    /// The kernel exited before replying.
    #[error("kernel exited unexpectedly")]
    Exited,
}

// ============================================================================
// SECTION: Kernel Process
// ============================================================================

/// A running worker kernel bound to one run's working directory.
///
/// # Invariants
/// - The child's working directory is never shared across runs.
/// - GPU visibility variables are scrubbed before spawn.
pub struct KernelProcess {
    /// Child process handle.
    child: Child,
    /// Child stdin for requests.
    stdin: ChildStdin,
    /// Buffered child stdout for replies.
    stdout: BufReader<ChildStdout>,
}

impl KernelProcess {
    /// Spawns a kernel in the working directory with a scrubbed environment.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Spawn`] when the process or its pipes cannot be
    /// created.
    pub fn spawn(
        config: &KernelConfig,
        working_dir: &Path,
        extra_env: &BTreeMap<String, String>,
    ) -> Result<Self, KernelError> {
        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .env("CUDA_VISIBLE_DEVICES", "")
            .env("HIP_VISIBLE_DEVICES", "")
            .env("NVIDIA_VISIBLE_DEVICES", "void");
        for (name, value) in extra_env {
            command.env(name, value);
        }

        let mut child = command.spawn().map_err(|err| KernelError::Spawn(err.to_string()))?;
        let stdin = child.stdin.take().ok_or_else(|| {
            KernelError::Spawn("kernel stdin pipe unavailable".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            KernelError::Spawn("kernel stdout pipe unavailable".to_string())
        })?;
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Executes one cell and waits for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] on pipe failure, protocol violations, or
    /// kernel exit.
    pub async fn execute_cell(
        &mut self,
        cell_index: usize,
        source: &str,
    ) -> Result<CellReply, KernelError> {
        let request = CellRequest {
            cell_index,
            source,
        };
        let mut line = serde_json::to_string(&request)
            .map_err(|err| KernelError::Protocol(err.to_string()))?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|err| KernelError::Pipe(err.to_string()))?;
        self.stdin.flush().await.map_err(|err| KernelError::Pipe(err.to_string()))?;

        let mut reply_line = String::new();
        let read = self
            .stdout
            .read_line(&mut reply_line)
            .await
            .map_err(|err| KernelError::Pipe(err.to_string()))?;
        if read == 0 {
            return Err(KernelError::Exited);
        }
        serde_json::from_str(&reply_line)
            .map_err(|err| KernelError::Protocol(format!("bad reply: {err}")))
    }

    /// Terminates the kernel process.
    pub async fn shutdown(mut self) {
        // Closing stdin lets a well-behaved kernel exit on its own.
        drop(self.stdin);
        if self.child.kill().await.is_err() {
            // Already exited.
        }
    }
}
