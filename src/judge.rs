mod compile;
mod custom;
mod envelope;
mod result;
mod testing;

pub use compile::{Program, Setup, setup_program};
pub use custom::validate_custom_inputs;
pub use envelope::parse_envelope;
pub use result::{
    CustomTestResult, Execution, Outcome, TestCase, TestResult, TestStatus, canonical_json,
    results_match,
};
pub use testing::{describe_exit, run_input};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::EvaluationConfig;
use crate::language::{Language, Languages};
use crate::limiter::Limiter;
use crate::sandbox::{Sandbox, SandboxError, SandboxProvider};
use crate::schema::{FunctionSignatureSchema, SchemaError};

/// Trusted solution used to compute expected values for custom inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSolution {
    pub language: Language,
    pub source_code: String,
}

/// Custom input rejected before anything reaches the sandbox
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("at least one custom input is required")]
    NoInputs,
    #[error("{count} custom inputs given, at most {max} are allowed")]
    TooManyInputs { count: usize, max: usize },
    #[error("custom input {index} must be an array of arguments")]
    NotAnArray { index: usize },
    #[error("custom input {index} has {len} arguments, expected between {min} and {max}")]
    ArgumentCount {
        index: usize,
        len: usize,
        min: usize,
        max: usize,
    },
}

/// Failure that aborts a whole evaluation run
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("problem has no function signature schema")]
    MissingSchema,
    #[error("problem has no reference solution")]
    MissingReferenceSolution,
    #[error("invalid schema: {0}")]
    InvalidSchema(#[from] SchemaError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("reference solution failed to compile: {0}")]
    ReferenceCompilation(String),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

/// Runs solutions against test cases inside sandboxes from a provider
pub struct Judge {
    settings: EvaluationConfig,
    languages: Languages,
    provider: Arc<dyn SandboxProvider>,
}

impl Judge {
    pub fn new(
        settings: EvaluationConfig,
        languages: Languages,
        provider: Arc<dyn SandboxProvider>,
    ) -> Self {
        Self {
            settings,
            languages,
            provider,
        }
    }

    pub fn settings(&self) -> &EvaluationConfig {
        &self.settings
    }

    pub fn languages(&self) -> &Languages {
        &self.languages
    }

    /// Returns one result per test case, in test case order
    pub async fn evaluate(
        &self,
        schema: &FunctionSignatureSchema,
        language: Language,
        solution: &str,
        test_cases: &[TestCase],
    ) -> Result<Vec<TestResult>, RunError> {
        schema.validate()?;
        if test_cases.is_empty() {
            return Ok(Vec::new());
        }

        let sandbox = self.provider.acquire().await?;
        log::info!(
            "Evaluating {language} solution against {} test case(s)",
            test_cases.len()
        );

        let guard = SandboxGuard::new(sandbox.clone());
        let results = self
            .run_tests(sandbox, schema, language, solution, test_cases)
            .await;
        guard.release().await;
        Ok(results)
    }

    async fn run_tests(
        &self,
        sandbox: Arc<dyn Sandbox>,
        schema: &FunctionSignatureSchema,
        language: Language,
        solution: &str,
        test_cases: &[TestCase],
    ) -> Vec<TestResult> {
        let config = self.languages.get(language);
        let setup = setup_program(
            &*sandbox,
            "",
            schema,
            language,
            config,
            solution,
            self.settings.compile_timeout(),
        )
        .await;

        let program = match setup {
            Ok(Setup::Ready(program)) => Arc::new(program),
            Ok(Setup::CompilationFailed(message)) => {
                log::info!("Compilation failed, reporting every test case as an error");
                return fan_out(test_cases, Outcome::CompilationError(message));
            }
            Err(e) => {
                log::error!("Failed to set up the sandbox: {e}");
                return fan_out(
                    test_cases,
                    Outcome::HarnessFailure(format!("Sandbox setup failed: {e}")),
                );
            }
        };

        let limiter = Limiter::new(self.settings.concurrency);
        let timeout = self.settings.test_timeout();
        let tasks = test_cases.iter().enumerate().map(|(index, case)| {
            let sandbox = sandbox.clone();
            let program = program.clone();
            let input = case.input.clone();
            async move { run_input(&*sandbox, &program, index, &input, timeout).await }
        });
        let executions = limiter.run_all(tasks).await;

        executions
            .into_iter()
            .zip(test_cases)
            .map(|(execution, case)| {
                let execution = execution.unwrap_or_else(|| {
                    Execution::HarnessFailure("Test execution aborted unexpectedly".to_string())
                });
                Outcome::judge(execution, &case.expected).into_result(case)
            })
            .collect()
    }
}

fn fan_out(test_cases: &[TestCase], outcome: Outcome) -> Vec<TestResult> {
    test_cases
        .iter()
        .map(|case| outcome.clone().into_result(case))
        .collect()
}

/// Kills the sandbox exactly once, even when the evaluation future is dropped early
struct SandboxGuard {
    sandbox: Option<Arc<dyn Sandbox>>,
}

impl SandboxGuard {
    fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            sandbox: Some(sandbox),
        }
    }

    async fn release(mut self) {
        if let Some(sandbox) = self.sandbox.take() {
            if let Err(e) = sandbox.kill().await {
                log::warn!("Failed to release sandbox: {e}");
            }
        }
    }
}

impl Drop for SandboxGuard {
    fn drop(&mut self) {
        let Some(sandbox) = self.sandbox.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = sandbox.kill().await {
                        log::warn!("Failed to release abandoned sandbox: {e}");
                    }
                });
            }
            Err(_) => log::warn!("Sandbox dropped outside a runtime and was not released"),
        }
    }
}
