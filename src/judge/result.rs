use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stored test case, consumed read-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_edge_case: bool,
    /// Positional arguments in parameter declaration order
    pub input: Vec<Value>,
    pub expected: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub test_case: TestCase,
    pub status: TestStatus,
    pub actual: Value,
    pub expected: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
}

/// Result for an ad-hoc input checked against a live reference run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomTestResult {
    pub input: Value,
    pub expected: Value,
    pub actual: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
}

/// What one runner invocation produced
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    /// Envelope with `success: true`
    Returned { value: Value, stdout: String },
    /// Envelope with `success: false`; the user's code raised
    Raised { message: String, stdout: String },
    /// Timeout, crash or unusable envelope
    HarnessFailure(String),
}

/// Classification of one test case
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    CompilationError(String),
    HarnessFailure(String),
    UserLogicError { message: String, stdout: String },
    LogicalMismatch { actual: Value, stdout: String },
    Passed { actual: Value, stdout: String },
}

impl Outcome {
    /// Classifies an execution against the expected value
    pub fn judge(execution: Execution, expected: &Value) -> Self {
        match execution {
            Execution::Returned { value, stdout } => {
                if results_match(&value, expected) {
                    Outcome::Passed {
                        actual: value,
                        stdout,
                    }
                } else {
                    Outcome::LogicalMismatch {
                        actual: value,
                        stdout,
                    }
                }
            }
            Execution::Raised { message, stdout } => Outcome::UserLogicError { message, stdout },
            Execution::HarnessFailure(message) => Outcome::HarnessFailure(message),
        }
    }

    pub fn status(&self) -> TestStatus {
        match self {
            Outcome::Passed { .. } => TestStatus::Pass,
            Outcome::LogicalMismatch { .. } => TestStatus::Fail,
            Outcome::CompilationError(_)
            | Outcome::HarnessFailure(_)
            | Outcome::UserLogicError { .. } => TestStatus::Error,
        }
    }

    pub fn into_result(self, test_case: &TestCase) -> TestResult {
        let status = self.status();
        let (actual, error, stdout) = match self {
            Outcome::Passed { actual, stdout } | Outcome::LogicalMismatch { actual, stdout } => {
                (actual, None, Some(stdout))
            }
            Outcome::UserLogicError { message, stdout } => {
                (Value::Null, Some(message), Some(stdout))
            }
            Outcome::CompilationError(message) | Outcome::HarnessFailure(message) => {
                (Value::Null, Some(message), None)
            }
        };
        TestResult {
            test_case: test_case.clone(),
            status,
            actual,
            expected: test_case.expected.clone(),
            error,
            stdout,
        }
    }
}

/// Exact equality of canonical JSON serialisations
///
/// Object keys are ordered before serialising and array order is significant.
/// Whole-number floats are written in integer form, so `2.0` matches `2`.
pub fn results_match(actual: &Value, expected: &Value) -> bool {
    canonical_json(actual) == canonical_json(expected)
}

pub fn canonical_json(value: &Value) -> String {
    sorted(value).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sorted(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        Value::Number(n) if n.is_f64() => integral(n).unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

/// Integer form of a float that holds a whole number inside the i64/u64 range
fn integral(n: &serde_json::Number) -> Option<Value> {
    let f = n.as_f64()?;
    if f.fract() != 0.0 {
        return None;
    }
    if f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(Value::from(f as i64))
    } else if f >= 0.0 && f < u64::MAX as f64 {
        Some(Value::from(f as u64))
    } else {
        None
    }
}
