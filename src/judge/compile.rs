use std::time::Duration;

use crate::language::{Language, LanguageConfig};
use crate::sandbox::{Sandbox, SandboxError};
use crate::schema::FunctionSignatureSchema;

/// A program uploaded (and built, for compiled targets) inside one sandbox directory
#[derive(Debug, Clone)]
pub struct Program {
    /// Sandbox-relative directory; empty for the sandbox root
    dir: String,
    pub language: Language,
    pub config: LanguageConfig,
}

impl Program {
    pub fn path(&self, name: &str) -> String {
        if self.dir.is_empty() {
            name.to_string()
        } else {
            format!("{}/{name}", self.dir)
        }
    }

    pub fn cwd(&self) -> Option<&str> {
        (!self.dir.is_empty()).then_some(self.dir.as_str())
    }
}

#[derive(Debug)]
pub enum Setup {
    Ready(Program),
    CompilationFailed(String),
}

/// Prepares, uploads and (for compiled targets) builds a solution with its runner
///
/// The runner is generated once per program and shared by every test case.
pub async fn setup_program(
    sandbox: &dyn Sandbox,
    dir: &str,
    schema: &FunctionSignatureSchema,
    language: Language,
    config: &LanguageConfig,
    source_code: &str,
    compile_timeout: Duration,
) -> Result<Setup, SandboxError> {
    let program = Program {
        dir: dir.trim_matches('/').to_string(),
        language,
        config: config.clone(),
    };
    let generator = language.generator();
    let files = config.files();
    let solution = config.prepare_code(source_code, &schema.function_name);
    let runner = generator.generate_runner_code(schema);

    let Some(compile_command) = config.compile_command_line() else {
        sandbox
            .upload_file(solution.as_bytes(), &program.path(&files.solution))
            .await?;
        sandbox
            .upload_file(runner.as_bytes(), &program.path(&files.runner))
            .await?;
        return Ok(Setup::Ready(program));
    };

    let unit = generator.link(&runner, &solution);
    sandbox
        .upload_file(unit.as_bytes(), &program.path(&files.source))
        .await?;

    log::debug!("Compiling {language} program in `{}`", program.dir);
    let output = match sandbox
        .execute_command(&compile_command, program.cwd(), Some(compile_timeout))
        .await
    {
        Ok(output) => output,
        Err(SandboxError::Timeout(ms)) => {
            return Ok(Setup::CompilationFailed(format!(
                "Compilation timed out after {ms} ms"
            )));
        }
        Err(e) => return Err(e),
    };

    if output.success() {
        Ok(Setup::Ready(program))
    } else {
        Ok(Setup::CompilationFailed(compiler_message(
            output.exit_code,
            &output.stderr,
            &output.stdout,
        )))
    }
}

fn compiler_message(exit_code: i32, stderr: &str, stdout: &str) -> String {
    [stderr, stdout]
        .into_iter()
        .map(str::trim_end)
        .find(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Compilation failed with exit code {exit_code}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_compiler_message_prefers_stderr() {
        assert_eq!(
            compiler_message(1, "main.cpp:3: error\n", "noise"),
            "main.cpp:3: error"
        );
        assert_eq!(compiler_message(1, "  \n", "from stdout\n"), "from stdout");
        assert_eq!(
            compiler_message(4, "", ""),
            "Compilation failed with exit code 4"
        );
    }

    #[test]
    fn test_program_paths() {
        let config = Language::Python.default_config();
        let root = Program {
            dir: String::new(),
            language: Language::Python,
            config: config.clone(),
        };
        assert_eq!(root.path("input_0.json"), "input_0.json");
        assert_eq!(root.cwd(), None);

        let user = Program {
            dir: "user".to_string(),
            language: Language::Python,
            config,
        };
        assert_eq!(user.path("input_0.json"), "user/input_0.json");
        assert_eq!(user.cwd(), Some("user"));
    }
}
