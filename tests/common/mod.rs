#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use fnjudge::config::EvaluationConfig;
use fnjudge::judge::{Judge, TestCase};
use fnjudge::language::Languages;
use fnjudge::sandbox::{CommandOutput, Sandbox, SandboxError, SandboxProvider};
use fnjudge::schema::{DEFAULT_FUNCTION_NAME, FunctionSignatureSchema, Parameter, TypeDef};

/// One command seen by the scripted sandbox
#[derive(Debug, Clone)]
pub struct Call {
    pub command: String,
    pub cwd: Option<String>,
    /// Parsed arguments of a runner invocation; `None` for other commands
    pub input: Option<Value>,
}

/// What the scripted process does
pub enum Behavior {
    Return(Value),
    ReturnWithStdout(Value, String),
    Raise(String, String),
    Exit(i32, String),
    NoOutput,
    Garbage,
    Hang,
}

type Script = Box<dyn Fn(&Call) -> Behavior + Send + Sync>;

/// In-memory sandbox whose runner processes follow a script
pub struct ScriptedSandbox {
    files: Mutex<HashMap<String, Vec<u8>>>,
    script: Script,
    delay: Duration,
    pub calls: Mutex<Vec<Call>>,
    pub uploads: AtomicUsize,
    pub kills: AtomicUsize,
    active: AtomicUsize,
    pub peak: AtomicUsize,
}

impl ScriptedSandbox {
    pub fn new(script: impl Fn(&Call) -> Behavior + Send + Sync + 'static) -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            script: Box::new(script),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            uploads: AtomicUsize::new(0),
            kills: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Every command takes at least `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.files.lock().contains_key(path)
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files
            .lock()
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.command.clone()).collect()
    }

    fn join(cwd: Option<&str>, name: &str) -> String {
        match cwd {
            Some(dir) => format!("{dir}/{name}"),
            None => name.to_string(),
        }
    }

    fn write(&self, path: String, content: String) {
        self.files.lock().insert(path, content.into_bytes());
    }

    async fn run(
        &self,
        command: &str,
        cwd: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, SandboxError> {
        let tokens: Vec<&str> = command.split_whitespace().collect();
        let io_paths = match tokens.as_slice() {
            [.., input, output] if input.starts_with("input_") => Some((*input, *output)),
            _ => None,
        };

        let input = io_paths.and_then(|(input, _)| {
            let raw = self.file(&Self::join(cwd, input))?;
            serde_json::from_str(&raw).ok()
        });
        let call = Call {
            command: command.to_string(),
            cwd: cwd.map(str::to_string),
            input,
        };
        self.calls.lock().push(call.clone());
        tokio::time::sleep(self.delay).await;

        let behavior = (self.script)(&call);
        let output_path = io_paths.map(|(_, output)| Self::join(cwd, output));
        let ok = CommandOutput::default();

        match behavior {
            Behavior::Return(value) => {
                if let Some(path) = output_path {
                    self.write(
                        path,
                        json!({"success": true, "result": value, "stdout": ""}).to_string(),
                    );
                }
                Ok(ok)
            }
            Behavior::ReturnWithStdout(value, stdout) => {
                if let Some(path) = output_path {
                    self.write(
                        path,
                        json!({"success": true, "result": value, "stdout": stdout}).to_string(),
                    );
                }
                Ok(ok)
            }
            Behavior::Raise(error, stdout) => {
                if let Some(path) = output_path {
                    self.write(
                        path,
                        json!({"success": false, "error": error, "trace": "", "stdout": stdout})
                            .to_string(),
                    );
                }
                Ok(ok)
            }
            Behavior::Exit(exit_code, stderr) => Ok(CommandOutput {
                exit_code,
                stdout: String::new(),
                stderr,
            }),
            Behavior::NoOutput => Ok(ok),
            Behavior::Garbage => {
                if let Some(path) = output_path {
                    self.write(path, "Segmentation fault (core dumped)".to_string());
                }
                Ok(ok)
            }
            Behavior::Hang => match timeout {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    Err(SandboxError::Timeout(limit.as_millis() as u64))
                }
                None => std::future::pending().await,
            },
        }
    }
}

#[async_trait]
impl Sandbox for ScriptedSandbox {
    async fn upload_file(&self, content: &[u8], path: &str) -> Result<(), SandboxError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.files.lock().insert(path.to_string(), content.to_vec());
        Ok(())
    }

    async fn execute_command(
        &self,
        command: &str,
        cwd: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, SandboxError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let result = self.run(command, cwd, timeout).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        self.file(path).ok_or_else(|| {
            SandboxError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{path} not found"),
            ))
        })
    }

    async fn kill(&self) -> Result<(), SandboxError> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out the same scripted sandbox every time, counting acquisitions
pub struct SharedProvider {
    pub sandbox: Arc<ScriptedSandbox>,
    pub acquired: AtomicUsize,
}

impl SharedProvider {
    pub fn new(sandbox: ScriptedSandbox) -> Arc<Self> {
        Arc::new(Self {
            sandbox: Arc::new(sandbox),
            acquired: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SandboxProvider for SharedProvider {
    async fn acquire(&self) -> Result<Arc<dyn Sandbox>, SandboxError> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(self.sandbox.clone())
    }
}

pub fn judge(provider: Arc<SharedProvider>, settings: EvaluationConfig) -> Judge {
    Judge::new(settings, Languages::default(), provider)
}

pub fn two_sum_schema() -> FunctionSignatureSchema {
    FunctionSignatureSchema {
        function_name: DEFAULT_FUNCTION_NAME.to_string(),
        parameters: vec![
            Parameter {
                name: "nums".to_string(),
                ty: TypeDef::array(TypeDef::int()),
                optional: false,
            },
            Parameter {
                name: "target".to_string(),
                ty: TypeDef::int(),
                optional: false,
            },
        ],
        return_type: TypeDef::array(TypeDef::int()),
        named_types: vec![],
    }
}

pub fn test_case(input: Value, expected: Value) -> TestCase {
    TestCase {
        description: String::new(),
        is_edge_case: false,
        input: input.as_array().cloned().unwrap_or_default(),
        expected,
    }
}

/// Python two-sum returning indices in ascending order
pub const TWO_SUM_PY: &str = "def solution(nums, target):\n    seen = {}\n    for i, n in enumerate(nums):\n        if target - n in seen:\n            return [seen[target - n], i]\n        seen[n] = i\n    return []\n";
