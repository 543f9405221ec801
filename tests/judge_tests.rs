mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use common::{
    Behavior, ScriptedSandbox, SharedProvider, TWO_SUM_PY, judge, test_case, two_sum_schema,
};
use fnjudge::config::EvaluationConfig;
use fnjudge::judge::{ReferenceSolution, RunError, TestStatus, ValidationError};
use fnjudge::language::Language;
use fnjudge::schema::TypeDef;

fn settings() -> EvaluationConfig {
    EvaluationConfig {
        test_timeout_ms: 200,
        ..EvaluationConfig::default()
    }
}

/// Two-sum by brute force over the parsed runner input
fn two_sum(input: &Value, ascending: bool) -> Value {
    let nums: Vec<i64> = input[0]
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default();
    let target = input[1].as_i64().unwrap_or_default();
    for i in 0..nums.len() {
        for j in i + 1..nums.len() {
            if nums[i] + nums[j] == target {
                return if ascending { json!([i, j]) } else { json!([j, i]) };
            }
        }
    }
    json!([])
}

#[tokio::test]
async fn test_correct_solution_passes() {
    let provider = SharedProvider::new(ScriptedSandbox::new(|call| match &call.input {
        Some(input) => Behavior::ReturnWithStdout(two_sum(input, true), "checked\n".to_string()),
        None => Behavior::Exit(0, String::new()),
    }));
    let judge = judge(provider.clone(), settings());

    let results = judge
        .evaluate(
            &two_sum_schema(),
            Language::Python,
            TWO_SUM_PY,
            &[test_case(json!([[2, 7, 11, 15], 9]), json!([0, 1]))],
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, TestStatus::Pass);
    assert_eq!(results[0].actual, json!([0, 1]));
    assert_eq!(results[0].stdout.as_deref(), Some("checked\n"));
    assert_eq!(results[0].error, None);

    let sandbox = &provider.sandbox;
    assert_eq!(sandbox.file("solution.py").as_deref(), Some(TWO_SUM_PY));
    assert!(sandbox.has_file("runner.py"));
    assert_eq!(sandbox.file("input_0.json").as_deref(), Some("[[2,7,11,15],9]"));
    assert_eq!(
        sandbox.commands(),
        vec!["python3 runner.py input_0.json output_0.json".to_string()]
    );
    assert_eq!(sandbox.kills.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_reversed_indices_fail_exact_comparison() {
    let provider = SharedProvider::new(ScriptedSandbox::new(|call| match &call.input {
        Some(input) => Behavior::Return(two_sum(input, false)),
        None => Behavior::Exit(0, String::new()),
    }));
    let judge = judge(provider.clone(), settings());

    let results = judge
        .evaluate(
            &two_sum_schema(),
            Language::TypeScript,
            "export function solution(nums: number[], target: number): number[] { return []; }",
            &[test_case(json!([[2, 7, 11, 15], 9]), json!([0, 1]))],
        )
        .await
        .unwrap();

    assert_eq!(results[0].status, TestStatus::Fail);
    assert_eq!(results[0].actual, json!([1, 0]));
    assert_eq!(results[0].expected, json!([0, 1]));
    assert_eq!(provider.sandbox.kills.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_compilation_failure_fans_out() {
    let provider = SharedProvider::new(ScriptedSandbox::new(|call| {
        if call.command.starts_with("g++") {
            Behavior::Exit(1, "main.cpp:4:5: error: expected ';'\n".to_string())
        } else {
            Behavior::Return(Value::Null)
        }
    }));
    let judge = judge(provider.clone(), settings());
    let cases = vec![
        test_case(json!([[1, 2], 3]), json!([0, 1])),
        test_case(json!([[3, 3], 6]), json!([0, 1])),
        test_case(json!([[5], 5]), json!([])),
    ];

    let results = judge
        .evaluate(&two_sum_schema(), Language::Cpp, "int oops", &cases)
        .await
        .unwrap();

    assert_eq!(results.len(), cases.len());
    for result in &results {
        assert_eq!(result.status, TestStatus::Error);
        assert_eq!(result.error.as_deref(), Some("main.cpp:4:5: error: expected ';'"));
    }
    assert_eq!(
        provider.sandbox.commands(),
        vec!["g++ -std=c++17 -O2 -o runner main.cpp".to_string()]
    );
    assert!(provider.sandbox.has_file("main.cpp"));
    assert_eq!(provider.sandbox.kills.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_segfault_is_reported_not_hung() {
    let provider = SharedProvider::new(ScriptedSandbox::new(|call| match &call.input {
        Some(_) => Behavior::Exit(139, String::new()),
        None => Behavior::Exit(0, String::new()),
    }));
    let judge = judge(provider.clone(), settings());

    let results = judge
        .evaluate(
            &two_sum_schema(),
            Language::Cpp,
            "std::vector<int64_t> solution(std::vector<int64_t> nums, int64_t target) { int* p = nullptr; return {*p}; }",
            &[test_case(json!([[1, 2], 3]), json!([0, 1]))],
        )
        .await
        .unwrap();

    assert_eq!(results[0].status, TestStatus::Error);
    assert!(
        results[0]
            .error
            .as_deref()
            .unwrap_or_default()
            .starts_with("Segmentation fault")
    );
}

#[tokio::test]
async fn test_every_failure_mode_is_contained() {
    let provider = SharedProvider::new(ScriptedSandbox::new(|call| {
        let Some(input) = &call.input else {
            return Behavior::Exit(0, String::new());
        };
        match input[1].as_i64() {
            Some(0) => Behavior::Return(json!([0, 1])),
            Some(1) => Behavior::Raise("ValueError: bad input".to_string(), "before\n".to_string()),
            Some(2) => Behavior::NoOutput,
            Some(3) => Behavior::Garbage,
            Some(4) => Behavior::Hang,
            _ => Behavior::Exit(1, "Traceback (most recent call last)\n".to_string()),
        }
    }));
    let judge = judge(provider.clone(), settings());
    let cases: Vec<_> = (0..6)
        .map(|i| test_case(json!([[1], i]), json!([0, 1])))
        .collect();

    let results = judge
        .evaluate(&two_sum_schema(), Language::Python, TWO_SUM_PY, &cases)
        .await
        .unwrap();

    let statuses: Vec<TestStatus> = results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            TestStatus::Pass,
            TestStatus::Error,
            TestStatus::Error,
            TestStatus::Error,
            TestStatus::Error,
            TestStatus::Error,
        ]
    );
    assert_eq!(results[1].error.as_deref(), Some("ValueError: bad input"));
    assert_eq!(results[1].stdout.as_deref(), Some("before\n"));
    assert!(
        results[2]
            .error
            .as_deref()
            .unwrap_or_default()
            .starts_with("Failed to read runner output")
    );
    assert!(
        results[3]
            .error
            .as_deref()
            .unwrap_or_default()
            .starts_with("Runner output is not valid JSON")
    );
    assert_eq!(results[4].error.as_deref(), Some("Time limit exceeded (200 ms)"));
    assert_eq!(
        results[5].error.as_deref(),
        Some("Traceback (most recent call last)")
    );
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.test_case, cases[i]);
    }
    assert_eq!(provider.sandbox.kills.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrency_is_bounded_and_order_kept() {
    let provider = SharedProvider::new(
        ScriptedSandbox::new(|call| match &call.input {
            Some(input) => Behavior::Return(input[1].clone()),
            None => Behavior::Exit(0, String::new()),
        })
        .with_delay(Duration::from_millis(10)),
    );
    let judge = judge(
        provider.clone(),
        EvaluationConfig {
            concurrency: 3,
            ..settings()
        },
    );
    let cases: Vec<_> = (0..20)
        .map(|i| test_case(json!([[], i]), json!(i)))
        .collect();

    let results = judge
        .evaluate(&two_sum_schema(), Language::Python, TWO_SUM_PY, &cases)
        .await
        .unwrap();

    assert_eq!(results.len(), 20);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.status, TestStatus::Pass);
        assert_eq!(result.actual, json!(i));
    }
    let peak = provider.sandbox.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency was {peak}");
    assert_eq!(provider.sandbox.kills.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_typescript_solution_exports_schema_function_name() {
    let provider = SharedProvider::new(ScriptedSandbox::new(|call| match &call.input {
        Some(input) => Behavior::Return(two_sum(input, true)),
        None => Behavior::Exit(0, String::new()),
    }));
    let judge = judge(provider.clone(), settings());
    let mut schema = two_sum_schema();
    schema.function_name = "twoSum".to_string();

    let results = judge
        .evaluate(
            &schema,
            Language::TypeScript,
            "function twoSum(nums: number[], target: number): number[] {\n  return [];\n}",
            &[test_case(json!([[2, 7, 11, 15], 9]), json!([0, 1]))],
        )
        .await
        .unwrap();

    assert_eq!(results[0].status, TestStatus::Pass);
    let solution = provider.sandbox.file("solution.ts").unwrap_or_default();
    assert!(solution.ends_with("export { twoSum };\n"), "{solution}");
    assert!(!solution.contains("export { solution }"));
    let runner = provider.sandbox.file("runner.ts").unwrap_or_default();
    assert!(runner.contains("submission[\"twoSum\"]"));
}

#[tokio::test]
async fn test_empty_and_invalid_runs_skip_the_sandbox() {
    let provider = SharedProvider::new(ScriptedSandbox::new(|_| Behavior::Return(Value::Null)));
    let judge = judge(provider.clone(), settings());

    let results = judge
        .evaluate(&two_sum_schema(), Language::Python, TWO_SUM_PY, &[])
        .await
        .unwrap();
    assert!(results.is_empty());

    let mut schema = two_sum_schema();
    schema.return_type = TypeDef::reference("Missing");
    let err = judge
        .evaluate(
            &schema,
            Language::Python,
            TWO_SUM_PY,
            &[test_case(json!([[1], 1]), json!([]))],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::InvalidSchema(_)));
    assert_eq!(provider.acquired.load(Ordering::SeqCst), 0);
}

fn reference() -> ReferenceSolution {
    ReferenceSolution {
        language: Language::Python,
        source_code: TWO_SUM_PY.to_string(),
    }
}

#[tokio::test]
async fn test_custom_input_with_wrong_arity_rejected_before_sandbox() {
    let provider = SharedProvider::new(ScriptedSandbox::new(|_| Behavior::Return(Value::Null)));
    let judge = judge(provider.clone(), settings());
    let schema = two_sum_schema();

    let err = judge
        .evaluate_custom(
            Some(&schema),
            Language::Python,
            TWO_SUM_PY,
            Some(&reference()),
            &[json!([[1]])],
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RunError::Validation(ValidationError::ArgumentCount {
            index: 0,
            len: 1,
            min: 2,
            max: 2
        })
    ));
    assert_eq!(provider.acquired.load(Ordering::SeqCst), 0);
    assert_eq!(provider.sandbox.uploads.load(Ordering::SeqCst), 0);
    assert!(provider.sandbox.commands().is_empty());
}

#[tokio::test]
async fn test_custom_run_requires_schema_and_reference() {
    let provider = SharedProvider::new(ScriptedSandbox::new(|_| Behavior::Return(Value::Null)));
    let judge = judge(provider.clone(), settings());
    let schema = two_sum_schema();
    let inputs = [json!([[1, 2], 3])];

    let err = judge
        .evaluate_custom(None, Language::Python, TWO_SUM_PY, Some(&reference()), &inputs)
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::MissingSchema));

    let err = judge
        .evaluate_custom(Some(&schema), Language::Python, TWO_SUM_PY, None, &inputs)
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::MissingReferenceSolution));

    let too_many = vec![json!([[1, 2], 3]); 11];
    let err = judge
        .evaluate_custom(Some(&schema), Language::Python, TWO_SUM_PY, Some(&reference()), &too_many)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RunError::Validation(ValidationError::TooManyInputs { count: 11, max: 10 })
    ));
    assert_eq!(provider.acquired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_custom_inputs_use_reference_for_expected() {
    let provider = SharedProvider::new(ScriptedSandbox::new(|call| {
        let Some(input) = &call.input else {
            return Behavior::Exit(0, String::new());
        };
        match call.cwd.as_deref() {
            Some("reference") => Behavior::Return(two_sum(input, true)),
            Some("user") if input[1] == json!(6) => {
                Behavior::Raise("Error: duplicates unsupported".to_string(), String::new())
            }
            _ => Behavior::ReturnWithStdout(two_sum(input, false), "user\n".to_string()),
        }
    }));
    let judge = judge(provider.clone(), settings());
    let schema = two_sum_schema();
    let inputs = [json!([[2, 7, 11, 15], 9]), json!([[3, 3], 6])];

    let results = judge
        .evaluate_custom(
            Some(&schema),
            Language::TypeScript,
            "export function solution(nums: number[], target: number): number[] { return []; }",
            Some(&reference()),
            &inputs,
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].input, inputs[0]);
    assert_eq!(results[0].expected, json!([0, 1]));
    assert_eq!(results[0].actual, json!([1, 0]));
    assert_eq!(results[0].stdout.as_deref(), Some("user\n"));
    assert_eq!(results[0].error, None);

    assert_eq!(results[1].expected, json!([0, 1]));
    assert_eq!(results[1].actual, Value::Null);
    assert_eq!(results[1].error.as_deref(), Some("Error: duplicates unsupported"));

    let sandbox = &provider.sandbox;
    assert!(sandbox.has_file("reference/solution.py"));
    assert!(sandbox.has_file("user/solution.ts"));
    assert!(sandbox.has_file("user/input_1.json"));
    assert_eq!(sandbox.kills.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_reference_compilation_failure_fails_the_run() {
    let provider = SharedProvider::new(ScriptedSandbox::new(|call| {
        if call.command.starts_with("g++") {
            Behavior::Exit(1, "reference.cpp: error".to_string())
        } else {
            Behavior::Return(Value::Null)
        }
    }));
    let judge = judge(provider.clone(), settings());
    let schema = two_sum_schema();
    let reference = ReferenceSolution {
        language: Language::Cpp,
        source_code: "broken".to_string(),
    };

    let err = judge
        .evaluate_custom(
            Some(&schema),
            Language::Python,
            TWO_SUM_PY,
            Some(&reference),
            &[json!([[1, 2], 3])],
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RunError::ReferenceCompilation(ref message) if message == "reference.cpp: error"
    ));
    assert_eq!(provider.sandbox.kills.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_user_compilation_failure_reported_per_input() {
    let provider = SharedProvider::new(ScriptedSandbox::new(|call| {
        if call.command.starts_with("g++") {
            Behavior::Exit(1, "main.cpp: error: unknown type".to_string())
        } else if let Some(input) = &call.input {
            Behavior::Return(two_sum(input, true))
        } else {
            Behavior::Exit(0, String::new())
        }
    }));
    let judge = judge(provider.clone(), settings());
    let schema = two_sum_schema();

    let results = judge
        .evaluate_custom(
            Some(&schema),
            Language::Cpp,
            "broken",
            Some(&reference()),
            &[json!([[1, 2], 3]), json!([[4, 5], 9])],
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    for result in &results {
        assert_eq!(result.expected, json!([0, 1]));
        assert_eq!(result.error.as_deref(), Some("main.cpp: error: unknown type"));
    }
}
