use std::sync::Arc;

use serde_json::Value;

use super::{
    CustomTestResult, Execution, Judge, ReferenceSolution, RunError, SandboxGuard, Setup,
    ValidationError, run_input, setup_program,
};
use crate::language::Language;
use crate::limiter::Limiter;
use crate::sandbox::Sandbox;
use crate::schema::FunctionSignatureSchema;

const REFERENCE_DIR: &str = "reference";
const USER_DIR: &str = "user";

/// Checks the shape of every custom input, returning their argument lists
pub fn validate_custom_inputs(
    schema: &FunctionSignatureSchema,
    inputs: &[Value],
    max_inputs: usize,
) -> Result<Vec<Vec<Value>>, ValidationError> {
    if inputs.is_empty() {
        return Err(ValidationError::NoInputs);
    }
    if inputs.len() > max_inputs {
        return Err(ValidationError::TooManyInputs {
            count: inputs.len(),
            max: max_inputs,
        });
    }

    let min = schema.required_parameter_count();
    let max = schema.parameter_count();
    inputs
        .iter()
        .enumerate()
        .map(|(index, input)| {
            let arguments = input
                .as_array()
                .ok_or(ValidationError::NotAnArray { index })?;
            if arguments.len() < min || arguments.len() > max {
                return Err(ValidationError::ArgumentCount {
                    index,
                    len: arguments.len(),
                    min,
                    max,
                });
            }
            Ok(arguments.clone())
        })
        .collect()
}

impl Judge {
    /// Runs the reference and the user solution on each custom input
    ///
    /// Every rejection happens before a sandbox is acquired. A reference
    /// solution that does not compile fails the run; a user solution that
    /// does not compile is reported on every input.
    pub async fn evaluate_custom(
        &self,
        schema: Option<&FunctionSignatureSchema>,
        language: Language,
        solution: &str,
        reference: Option<&ReferenceSolution>,
        inputs: &[Value],
    ) -> Result<Vec<CustomTestResult>, RunError> {
        let schema = schema.ok_or(RunError::MissingSchema)?;
        let reference = reference.ok_or(RunError::MissingReferenceSolution)?;
        schema.validate()?;
        let arguments = validate_custom_inputs(schema, inputs, self.settings.max_custom_inputs)?;

        let sandbox = self.provider.acquire().await?;
        log::info!(
            "Running {language} solution on {} custom input(s)",
            inputs.len()
        );

        let guard = SandboxGuard::new(sandbox.clone());
        let results = self
            .run_custom(sandbox, schema, language, solution, reference, inputs, arguments)
            .await;
        guard.release().await;
        results
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_custom(
        &self,
        sandbox: Arc<dyn Sandbox>,
        schema: &FunctionSignatureSchema,
        language: Language,
        solution: &str,
        reference: &ReferenceSolution,
        inputs: &[Value],
        arguments: Vec<Vec<Value>>,
    ) -> Result<Vec<CustomTestResult>, RunError> {
        let compile_timeout = self.settings.compile_timeout();

        let reference_program = match setup_program(
            &*sandbox,
            REFERENCE_DIR,
            schema,
            reference.language,
            self.languages.get(reference.language),
            &reference.source_code,
            compile_timeout,
        )
        .await?
        {
            Setup::Ready(program) => Arc::new(program),
            Setup::CompilationFailed(message) => {
                log::error!("Reference solution failed to compile: {message}");
                return Err(RunError::ReferenceCompilation(message));
            }
        };

        let user_setup = Arc::new(
            setup_program(
                &*sandbox,
                USER_DIR,
                schema,
                language,
                self.languages.get(language),
                solution,
                compile_timeout,
            )
            .await?,
        );

        let limiter = Limiter::new(self.settings.concurrency);
        let timeout = self.settings.test_timeout();
        let tasks = arguments.into_iter().enumerate().map(|(index, args)| {
            let sandbox = sandbox.clone();
            let reference_program = reference_program.clone();
            let user_setup = user_setup.clone();
            async move {
                let reference_run =
                    run_input(&*sandbox, &reference_program, index, &args, timeout).await;
                let user_run = match &*user_setup {
                    Setup::Ready(program) => {
                        run_input(&*sandbox, program, index, &args, timeout).await
                    }
                    Setup::CompilationFailed(message) => Execution::HarnessFailure(message.clone()),
                };
                (reference_run, user_run)
            }
        });
        let runs = limiter.run_all(tasks).await;

        Ok(runs
            .into_iter()
            .zip(inputs)
            .map(|(run, input)| match run {
                Some((reference_run, user_run)) => custom_result(input, reference_run, user_run),
                None => CustomTestResult {
                    input: input.clone(),
                    expected: Value::Null,
                    actual: Value::Null,
                    error: Some("Custom input execution aborted unexpectedly".to_string()),
                    stdout: None,
                },
            })
            .collect())
    }
}

/// Combines both runs; an error from the user's run wins over one from the reference
fn custom_result(input: &Value, reference_run: Execution, user_run: Execution) -> CustomTestResult {
    let (expected, reference_error) = match reference_run {
        Execution::Returned { value, .. } => (value, None),
        Execution::Raised { message, .. } | Execution::HarnessFailure(message) => (
            Value::Null,
            Some(format!("Reference solution failed: {message}")),
        ),
    };

    let (actual, error, stdout) = match user_run {
        Execution::Returned { value, stdout } => (value, reference_error, Some(stdout)),
        Execution::Raised { message, stdout } => (Value::Null, Some(message), Some(stdout)),
        Execution::HarnessFailure(message) => (Value::Null, Some(message), None),
    };

    CustomTestResult {
        input: input.clone(),
        expected,
        actual,
        error,
        stdout,
    }
}
