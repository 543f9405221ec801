use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

use crate::judge::{ReferenceSolution, TestCase};
use crate::language::{Language, LanguageOverride};
use crate::schema::FunctionSignatureSchema;
use crate::sandbox::default_sandbox_root;

#[derive(Parser)]
#[command(name = "fnjudge", version = "0.1", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: String,

    /// Maximum number of test cases executed at once, overriding the configuration
    #[arg(long = "concurrency", short = 'j')]
    pub concurrency: Option<usize>,
}

impl CliArgs {
    /// Load the configuration from the specified file and apply command-line overrides
    pub fn to_config(&self) -> anyhow::Result<Config> {
        let file = std::fs::File::open(&self.config_path)
            .with_context(|| format!("Failed to open {}", self.config_path))?;
        let reader = std::io::BufReader::new(file);
        let mut config: Config = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse {}", self.config_path))?;

        if let Some(concurrency) = self.concurrency {
            config.evaluation.concurrency = concurrency;
        }
        for problem in &config.problems {
            if let Some(schema) = &problem.schema {
                schema
                    .validate()
                    .with_context(|| format!("Invalid schema for problem {}", problem.id))?;
            }
        }
        Ok(config)
    }
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub languages: HashMap<Language, LanguageOverride>,
    #[serde(default)]
    pub problems: Vec<ProblemConfig>,
}

#[derive(Deserialize, Debug)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Test cases of one evaluation allowed to run at once
    pub concurrency: usize,
    pub test_timeout_ms: u64,
    pub compile_timeout_ms: u64,
    pub max_custom_inputs: usize,
    pub sandbox_root: Option<PathBuf>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            concurrency: 100,
            test_timeout_ms: 10_000,
            compile_timeout_ms: 30_000,
            max_custom_inputs: 10,
            sandbox_root: None,
        }
    }
}

impl EvaluationConfig {
    pub fn test_timeout(&self) -> Duration {
        Duration::from_millis(self.test_timeout_ms)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }

    pub fn sandbox_root(&self) -> PathBuf {
        self.sandbox_root.clone().unwrap_or_else(default_sandbox_root)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ProblemConfig {
    pub id: u32,
    pub name: String,
    pub schema: Option<FunctionSignatureSchema>,
    pub reference_solution: Option<ReferenceSolution>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}
