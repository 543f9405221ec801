use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{CommandOutput, Sandbox, SandboxError, SandboxProvider};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Sandbox backed by a scratch directory on the host
///
/// LocalSandbox only confines file paths and bounds command time. It provides
/// no memory, filesystem, network or permission isolation and is intended for
/// development and trusted environments.
pub struct LocalSandbox {
    dir: PathBuf,
    killed: AtomicBool,
    shutdown: CancellationToken,
}

impl LocalSandbox {
    /// Creates a fresh timestamped directory under `root`
    pub async fn create(root: &Path) -> Result<Self, SandboxError> {
        let name = format!(
            "{}-{}-{}",
            Local::now().format("%y%m%d-%H-%M-%S"),
            std::process::id(),
            SEQUENCE.fetch_add(1, Ordering::Relaxed)
        );
        let dir = root.join(name);
        tokio::fs::create_dir_all(&dir).await?;

        log::debug!("LocalSandbox created at {}", dir.display());
        log::warn!(
            "LocalSandbox provides NO security isolation - use only in trusted environments"
        );

        Ok(Self {
            dir,
            killed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_alive(&self) -> Result<(), SandboxError> {
        if self.killed.load(Ordering::SeqCst) {
            Err(SandboxError::Killed)
        } else {
            Ok(())
        }
    }

    /// Maps a sandbox-relative path onto the scratch directory
    fn resolve(&self, path: &str) -> Result<PathBuf, SandboxError> {
        let relative = Path::new(path);
        let confined = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !confined {
            return Err(SandboxError::InvalidPath(path.to_string()));
        }
        Ok(self.dir.join(relative))
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    async fn upload_file(&self, content: &[u8], path: &str) -> Result<(), SandboxError> {
        self.ensure_alive()?;
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, content).await?;
        Ok(())
    }

    async fn execute_command(
        &self,
        command: &str,
        cwd: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, SandboxError> {
        self.ensure_alive()?;
        let workdir = match cwd {
            Some(cwd) => self.resolve(cwd)?,
            None => self.dir.clone(),
        };

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        log::debug!("LocalSandbox executing `{command}` in {}", workdir.display());
        let child = cmd.output();

        let output = tokio::select! {
            _ = self.shutdown.cancelled() => return Err(SandboxError::Killed),
            res = async {
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, child)
                        .await
                        .map_err(|_| SandboxError::Timeout(limit.as_millis() as u64))?
                        .map_err(SandboxError::from),
                    None => child.await.map_err(SandboxError::from),
                }
            } => res?,
        };

        Ok(CommandOutput {
            exit_code: exit_code(&output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        self.ensure_alive()?;
        let target = self.resolve(path)?;
        Ok(tokio::fs::read_to_string(target).await?)
    }

    async fn kill(&self) -> Result<(), SandboxError> {
        if self.killed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown.cancel();
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Hands out a new [`LocalSandbox`] under a common root for every evaluation
pub struct LocalSandboxProvider {
    root: PathBuf,
}

impl LocalSandboxProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SandboxProvider for LocalSandboxProvider {
    async fn acquire(&self) -> Result<Arc<dyn Sandbox>, SandboxError> {
        let sandbox = LocalSandbox::create(&self.root).await?;
        Ok(Arc::new(sandbox))
    }
}

/// Default root for local sandboxes: the user's cache directory, else the temp dir
pub fn default_sandbox_root() -> PathBuf {
    use directories::ProjectDirs;

    match ProjectDirs::from("", "", "fnjudge") {
        Some(dirs) => dirs.cache_dir().join("sandbox"),
        None => std::env::temp_dir().join("fnjudge-sandbox"),
    }
}
