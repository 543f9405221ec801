use std::time::Duration;

use serde_json::Value;

use super::compile::Program;
use super::envelope::parse_envelope;
use super::result::Execution;
use crate::sandbox::{Sandbox, SandboxError};

/// Extra wall time granted on top of the sandbox's own command timeout
const TIMEOUT_GRACE: Duration = Duration::from_secs(2);

const SIGNAL_EXIT_BASE: i32 = 128;

/// Runs `program` on one positional argument list and reads back its envelope
///
/// Files are named by `index` so concurrent runs in one sandbox never collide.
pub async fn run_input(
    sandbox: &dyn Sandbox,
    program: &Program,
    index: usize,
    input: &[Value],
    timeout: Duration,
) -> Execution {
    let input_name = format!("input_{index}.json");
    let output_name = format!("output_{index}.json");

    let payload = match serde_json::to_vec(input) {
        Ok(payload) => payload,
        Err(e) => return Execution::HarnessFailure(format!("Failed to encode input: {e}")),
    };
    if let Err(e) = sandbox
        .upload_file(&payload, &program.path(&input_name))
        .await
    {
        return Execution::HarnessFailure(format!("Failed to upload input: {e}"));
    }

    let command = program.config.run_command_line(&input_name, &output_name);
    let run = sandbox.execute_command(&command, program.cwd(), Some(timeout));
    let output = match tokio::time::timeout(timeout + TIMEOUT_GRACE, run).await {
        Ok(Ok(output)) => output,
        Ok(Err(SandboxError::Timeout(_))) | Err(_) => {
            return Execution::HarnessFailure(format!(
                "Time limit exceeded ({} ms)",
                timeout.as_millis()
            ));
        }
        Ok(Err(e)) => return Execution::HarnessFailure(format!("Sandbox error: {e}")),
    };

    if !output.success() {
        return Execution::HarnessFailure(describe_exit(
            program.config.is_compiled(),
            output.exit_code,
            &output.stderr,
        ));
    }

    match sandbox.read_file(&program.path(&output_name)).await {
        Ok(raw) => parse_envelope(&raw),
        Err(e) => Execution::HarnessFailure(format!("Failed to read runner output: {e}")),
    }
}

/// Human-readable cause of a non-zero runner exit
pub fn describe_exit(compiled: bool, exit_code: i32, stderr: &str) -> String {
    if compiled {
        let signal = exit_code - SIGNAL_EXIT_BASE;
        if signal == libc::SIGSEGV {
            return "Segmentation fault: the program accessed invalid memory (for example a null pointer dereference)".to_string();
        }
        if signal == libc::SIGABRT {
            return "Aborted: the program called abort() or failed an assertion".to_string();
        }
        if signal == libc::SIGFPE {
            return "Arithmetic exception: division by zero or another invalid arithmetic operation".to_string();
        }
    }

    let stderr = stderr.trim_end();
    if !stderr.trim().is_empty() {
        return stderr.to_string();
    }
    format!(
        "Execution failed with exit code {exit_code}. Check that the function signature matches the expected one."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_compiled_signal_exits() {
        assert!(describe_exit(true, 139, "").starts_with("Segmentation fault"));
        assert!(describe_exit(true, 134, "assertion failed").starts_with("Aborted"));
        assert!(describe_exit(true, 136, "").starts_with("Arithmetic exception"));
    }

    #[test]
    fn test_interpreted_exit_falls_back_to_stderr() {
        assert_eq!(
            describe_exit(false, 139, "Traceback: boom\n"),
            "Traceback: boom"
        );
        assert_eq!(
            describe_exit(false, 1, ""),
            "Execution failed with exit code 1. Check that the function signature matches the expected one."
        );
    }
}
