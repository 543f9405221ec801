use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codegen::{CodeGenerator, CppGenerator, PythonGenerator, TypeScriptGenerator};

/// Targets a submission can be written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    Python,
    Cpp,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::TypeScript, Language::Python, Language::Cpp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::TypeScript => "typescript",
            Language::Python => "python",
            Language::Cpp => "cpp",
        }
    }

    pub fn generator(&self) -> &'static dyn CodeGenerator {
        match self {
            Language::TypeScript => &TypeScriptGenerator,
            Language::Python => &PythonGenerator,
            Language::Cpp => &CppGenerator,
        }
    }

    /// Built-in runtime configuration for this target
    pub fn default_config(&self) -> LanguageConfig {
        fn argv(parts: &[&str]) -> Vec<String> {
            parts.iter().map(|s| s.to_string()).collect()
        }

        match self {
            Language::TypeScript => LanguageConfig {
                extension: "ts",
                run_command: argv(&["npx", "tsx", "%RUNNER%", "%INPUT%", "%OUTPUT%"]),
                compile_command: None,
                prepare: prepare_typescript,
            },
            Language::Python => LanguageConfig {
                extension: "py",
                run_command: argv(&["python3", "%RUNNER%", "%INPUT%", "%OUTPUT%"]),
                compile_command: None,
                prepare: |code, _| normalize_source(code),
            },
            Language::Cpp => LanguageConfig {
                extension: "cpp",
                run_command: argv(&["./%BINARY%", "%INPUT%", "%OUTPUT%"]),
                compile_command: Some(argv(&[
                    "g++",
                    "-std=c++17",
                    "-O2",
                    "-o",
                    "%BINARY%",
                    "%SOURCE%",
                ])),
                prepare: |code, _| normalize_source(code),
            },
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnsupportedLanguage(s.to_string()))
    }
}

/// How a target's programs are laid out, built and started
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    pub extension: &'static str,
    pub run_command: Vec<String>,
    /// Present only for compiled targets
    pub compile_command: Option<Vec<String>>,
    prepare: fn(&str, &str) -> String,
}

/// File names making up one program inside the sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramFiles {
    pub solution: String,
    pub runner: String,
    /// Linked compilation unit of a compiled target
    pub source: String,
    pub binary: String,
}

impl LanguageConfig {
    pub fn is_compiled(&self) -> bool {
        self.compile_command.is_some()
    }

    /// Makes user code loadable by the runner; applying it twice changes nothing
    pub fn prepare_code(&self, code: &str, function_name: &str) -> String {
        (self.prepare)(code, function_name)
    }

    pub fn files(&self) -> ProgramFiles {
        ProgramFiles {
            solution: format!("solution.{}", self.extension),
            runner: format!("runner.{}", self.extension),
            source: format!("main.{}", self.extension),
            binary: "runner".to_string(),
        }
    }

    pub fn run_command_line(&self, input: &str, output: &str) -> String {
        let files = self.files();
        let mut mapping = HashMap::<&str, &str>::new();
        mapping.insert("%RUNNER%", &files.runner);
        mapping.insert("%BINARY%", &files.binary);
        mapping.insert("%SOURCE%", &files.source);
        mapping.insert("%INPUT%", input);
        mapping.insert("%OUTPUT%", output);
        apply_template_and_join(&self.run_command, &mapping)
    }

    pub fn compile_command_line(&self) -> Option<String> {
        let files = self.files();
        let mut mapping = HashMap::<&str, &str>::new();
        mapping.insert("%SOURCE%", &files.source);
        mapping.insert("%BINARY%", &files.binary);
        self.compile_command
            .as_ref()
            .map(|command| apply_template_and_join(command, &mapping))
    }
}

/// Command template replacement from the configuration file
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct LanguageOverride {
    pub run: Option<Vec<String>>,
    pub compile: Option<Vec<String>>,
}

/// Resolved runtime configuration of every target
#[derive(Debug, Clone)]
pub struct Languages {
    configs: HashMap<Language, LanguageConfig>,
}

impl Languages {
    pub fn new(overrides: &HashMap<Language, LanguageOverride>) -> Self {
        let configs = Language::ALL
            .into_iter()
            .map(|language| {
                let mut config = language.default_config();
                if let Some(o) = overrides.get(&language) {
                    if let Some(run) = &o.run {
                        config.run_command = run.clone();
                    }
                    // Only compiled targets take a compile step
                    if let (Some(compile), true) = (&o.compile, config.is_compiled()) {
                        config.compile_command = Some(compile.clone());
                    }
                }
                (language, config)
            })
            .collect();
        Self { configs }
    }

    pub fn get(&self, language: Language) -> &LanguageConfig {
        // Every variant is inserted by `new`
        &self.configs[&language]
    }
}

impl Default for Languages {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}

/// Substitutes the placeholders of each argument and joins them into one command line
fn apply_template_and_join(template: &[String], mapping: &HashMap<&str, &str>) -> String {
    template
        .iter()
        .map(|s| {
            let mut t = s.clone();
            for (k, v) in mapping.iter() {
                t = t.replace(k, v);
            }
            t
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_source(code: &str) -> String {
    let mut out = code.replace("\r\n", "\n");
    let trimmed = out.trim_end_matches('\n').len();
    out.truncate(trimmed);
    out.push('\n');
    out
}

fn prepare_typescript(code: &str, function_name: &str) -> String {
    let mut out = normalize_source(code);
    if !exports(&out, function_name) {
        out.push_str(&format!("export {{ {function_name} }};\n"));
    }
    out
}

fn exports(code: &str, name: &str) -> bool {
    code.lines()
        .filter(|line| line.trim_start().starts_with("export"))
        .any(|line| mentions_word(line, name))
}

fn mentions_word(line: &str, word: &str) -> bool {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$';
    line.match_indices(word).any(|(at, _)| {
        let before = line[..at].chars().next_back();
        let after = line[at + word.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}
