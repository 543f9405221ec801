mod local;

pub use local::{LocalSandbox, LocalSandboxProvider, default_sandbox_root};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Captured result of one shell command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status; `128 + signal` when the process was killed by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("sandbox I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("command timed out after {0} ms")]
    Timeout(u64),
    #[error("path escapes the sandbox: {0}")]
    InvalidPath(String),
    #[error("sandbox has been killed")]
    Killed,
    #[error("sandbox backend failure: {0}")]
    Backend(String),
}

/// Isolated execution environment driven through files and shell commands
///
/// Paths are relative to the sandbox root. Implementations must tolerate
/// concurrent calls from many test tasks sharing one handle.
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn upload_file(&self, content: &[u8], path: &str) -> Result<(), SandboxError>;

    /// Runs `command` through a shell inside `cwd` (the root when `None`)
    async fn execute_command(
        &self,
        command: &str,
        cwd: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, SandboxError>;

    async fn read_file(&self, path: &str) -> Result<String, SandboxError>;

    /// Tears the sandbox down; calling it again is a no-op
    async fn kill(&self) -> Result<(), SandboxError>;
}

/// Source of fresh sandboxes, one per evaluation
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn acquire(&self) -> Result<Arc<dyn Sandbox>, SandboxError>;
}
