use serde_json::Value;

use super::result::Execution;

/// Interprets the contents of a runner's output file
pub fn parse_envelope(raw: &str) -> Execution {
    let envelope: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => return Execution::HarnessFailure(format!("Runner output is not valid JSON: {e}")),
    };

    let stdout = envelope
        .get("stdout")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match envelope.get("success").and_then(Value::as_bool) {
        Some(true) => Execution::Returned {
            value: envelope.get("result").cloned().unwrap_or(Value::Null),
            stdout,
        },
        Some(false) => {
            let mut message = envelope
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_string();
            if let Some(trace) = envelope.get("trace").and_then(Value::as_str) {
                if !trace.trim().is_empty() {
                    message.push('\n');
                    message.push_str(trace.trim_end());
                }
            }
            Execution::Raised { message, stdout }
        }
        None => Execution::HarnessFailure("Runner output is missing the success flag".to_string()),
    }
}
