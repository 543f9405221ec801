mod cpp;
mod python;
mod typescript;

pub use cpp::CppGenerator;
pub use python::PythonGenerator;
pub use typescript::TypeScriptGenerator;

use std::collections::{BTreeMap, BTreeSet};

use crate::schema::{FunctionSignatureSchema, TypeDef};

/// Imports touched while rendering types, keyed by module
///
/// A module with no symbols is a plain include (`#include <vector>`), a module
/// with symbols is a selective import (`from typing import List`). Both maps
/// are ordered so rendering is de-duplicated and sorted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Imports {
    modules: BTreeMap<String, BTreeSet<String>>,
}

impl Imports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, module: &str) {
        self.modules.entry(module.to_string()).or_default();
    }

    pub fn add_symbol(&mut self, module: &str, symbol: &str) {
        self.modules
            .entry(module.to_string())
            .or_default()
            .insert(symbol.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn contains(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.modules.iter().map(|(m, s)| (m.as_str(), s))
    }
}

/// Per-language source generation driven by a function signature schema
pub trait CodeGenerator: Send + Sync {
    /// Renders a type in the target's syntax, recording the imports it needs
    fn type_to_string(
        &self,
        schema: &FunctionSignatureSchema,
        ty: &TypeDef,
        imports: &mut Imports,
    ) -> String;

    /// Declarations for every named type, in declaration order
    fn generate_type_definitions(
        &self,
        schema: &FunctionSignatureSchema,
        imports: &mut Imports,
    ) -> String;

    /// Function stub whose body signals that it is not implemented
    fn generate_scaffold(&self, schema: &FunctionSignatureSchema, imports: &mut Imports) -> String;

    fn render_imports(&self, imports: &Imports) -> String;

    /// Standalone program implementing the runner side of the envelope protocol
    fn generate_runner_code(&self, schema: &FunctionSignatureSchema) -> String;

    fn generate_starter_code(&self, schema: &FunctionSignatureSchema) -> String {
        let mut imports = Imports::new();
        let types = self.generate_type_definitions(schema, &mut imports);
        let scaffold = self.generate_scaffold(schema, &mut imports);
        let header = self.render_imports(&imports);

        [header, types, scaffold]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
            + "\n"
    }

    /// Joins a solution and its runner into one compilation unit
    fn link(&self, runner: &str, solution: &str) -> String {
        format!("{solution}\n{runner}")
    }
}

/// Replaces every `%KEY%` placeholder of `template` with its mapped value
pub fn apply_template(template: &str, mapping: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in mapping {
        out = out.replace(key, value);
    }
    out
}

/// Indents every non-empty line of `block` by `width` spaces
pub(crate) fn indent(block: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    block
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// JSON text of the parameter and named-type shapes embedded in dynamic runners
pub(crate) fn shape_tables(schema: &FunctionSignatureSchema) -> (String, String) {
    let parameters: Vec<&TypeDef> = schema.parameters.iter().map(|p| &p.ty).collect();
    let named: BTreeMap<&str, &TypeDef> = schema
        .named_types
        .iter()
        .map(|t| (t.name.as_str(), &t.definition))
        .collect();

    // Serializing plain data into a string cannot fail
    (
        serde_json::to_string(&parameters).unwrap_or_else(|_| "[]".to_string()),
        serde_json::to_string(&named).unwrap_or_else(|_| "{}".to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_imports_sorted_and_deduplicated() {
        let mut imports = Imports::new();
        imports.add("vector");
        imports.add_symbol("typing", "Optional");
        imports.add_symbol("typing", "List");
        imports.add_symbol("typing", "List");
        imports.add("string");
        imports.add("vector");

        let collected: Vec<(String, Vec<String>)> = imports
            .iter()
            .map(|(m, s)| (m.to_string(), s.iter().cloned().collect()))
            .collect();
        assert_eq!(
            collected,
            vec![
                ("string".to_string(), vec![]),
                (
                    "typing".to_string(),
                    vec!["List".to_string(), "Optional".to_string()]
                ),
                ("vector".to_string(), vec![]),
            ]
        );
    }

    #[test]
    fn test_apply_template() {
        let out = apply_template(
            "%RUNNER% %INPUT% %OUTPUT% %INPUT%",
            &[("%RUNNER%", "runner.py"), ("%INPUT%", "in.json"), ("%OUTPUT%", "out.json")],
        );
        assert_eq!(out, "runner.py in.json out.json in.json");
    }

    #[test]
    fn test_indent_skips_blank_lines() {
        assert_eq!(indent("a\n\nb", 4), "    a\n\n    b");
    }
}
