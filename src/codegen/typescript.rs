use super::{CodeGenerator, Imports, apply_template, shape_tables};
use crate::schema::{FunctionSignatureSchema, Primitive, TypeDef};

const RUNNER_TEMPLATE: &str = r#"// Generated runner: reads positional JSON arguments, calls %FUNCTION%, writes a result envelope.
import * as fs from "fs";

const PARAMETERS: any[] = %PARAMETERS%;
const NAMED_TYPES: Record<string, any> = %NAMED_TYPES%;

function conform(value: any, shape: any, path: string): any {
  switch (shape.type) {
    case "primitive":
      return conformPrimitive(value, shape.kind, path);
    case "array":
      if (!Array.isArray(value)) {
        throw new TypeError(`${path}: expected an array`);
      }
      return value.map((item: any, i: number) => conform(item, shape.items, `${path}[${i}]`));
    case "object": {
      if (value === null || typeof value !== "object" || Array.isArray(value)) {
        throw new TypeError(`${path}: expected an object`);
      }
      const out: Record<string, any> = {};
      for (const property of shape.properties) {
        const field = value[property.name] === undefined ? null : value[property.name];
        out[property.name] = conform(field, property.type, `${path}.${property.name}`);
      }
      return out;
    }
    case "map": {
      if (value === null || typeof value !== "object" || Array.isArray(value)) {
        throw new TypeError(`${path}: expected an object`);
      }
      const out: Record<string, any> = {};
      for (const [key, item] of Object.entries(value)) {
        out[key] = conform(item, shape.valueType, `${path}[${JSON.stringify(key)}]`);
      }
      return out;
    }
    case "tuple":
      if (!Array.isArray(value) || value.length !== shape.items.length) {
        throw new TypeError(`${path}: expected a tuple of ${shape.items.length} items`);
      }
      return value.map((item: any, i: number) => conform(item, shape.items[i], `${path}[${i}]`));
    case "union":
      for (const variant of shape.variants) {
        try {
          return conform(value, variant, path);
        } catch {
          // next variant
        }
      }
      throw new TypeError(`${path}: value matches no variant of the union`);
    case "reference":
      return conform(value, NAMED_TYPES[shape.name], path);
    default:
      throw new TypeError(`${path}: unknown shape ${shape.type}`);
  }
}

function conformPrimitive(value: any, kind: string, path: string): any {
  switch (kind) {
    case "int":
      if (typeof value !== "number" || !Number.isInteger(value)) {
        throw new TypeError(`${path}: expected an integer, got ${JSON.stringify(value)}`);
      }
      return value;
    case "float":
      if (typeof value !== "number") {
        throw new TypeError(`${path}: expected a number, got ${JSON.stringify(value)}`);
      }
      return value;
    case "string":
      if (typeof value !== "string") {
        throw new TypeError(`${path}: expected a string, got ${JSON.stringify(value)}`);
      }
      return value;
    case "boolean":
      if (typeof value !== "boolean") {
        throw new TypeError(`${path}: expected a boolean, got ${JSON.stringify(value)}`);
      }
      return value;
    case "null":
      if (value !== null) {
        throw new TypeError(`${path}: expected null, got ${JSON.stringify(value)}`);
      }
      return null;
  }
  throw new TypeError(`${path}: unknown primitive ${kind}`);
}

function render(args: unknown[]): string {
  return args.map((arg) => (typeof arg === "string" ? arg : JSON.stringify(arg))).join(" ");
}

async function main(): Promise<void> {
  const [inputPath, outputPath] = process.argv.slice(2);
  const input = JSON.parse(fs.readFileSync(inputPath, "utf8"));

  const captured: string[] = [];
  const original = { log: console.log, info: console.info, debug: console.debug };
  const capture = (...args: unknown[]) => {
    captured.push(render(args) + "\n");
  };
  console.log = capture;
  console.info = capture;
  console.debug = capture;

  let payload: string;
  try {
    if (!Array.isArray(input)) {
      throw new TypeError("input must be a JSON array");
    }
%ARGUMENTS%
    // Loaded after the capture so top-level logging lands in the envelope
    const submission: Record<string, any> = await import("./solution");
    const target = submission["%FUNCTION%"];
    if (typeof target !== "function") {
      throw new TypeError("%FUNCTION% is not an exported function");
    }
    const result = await target(%CALL%);
    payload = JSON.stringify({
      success: true,
      result: result === undefined ? null : result,
      stdout: captured.join(""),
    });
  } catch (err) {
    const error = err instanceof Error ? err : new Error(String(err));
    payload = JSON.stringify({
      success: false,
      error: error.message,
      trace: error.stack ?? "",
      stdout: captured.join(""),
    });
  } finally {
    console.log = original.log;
    console.info = original.info;
    console.debug = original.debug;
  }

  fs.writeFileSync(outputPath, payload);
}

main().catch((err) => {
  console.error(err);
  process.exit(1);
});
"#;

pub struct TypeScriptGenerator;

impl CodeGenerator for TypeScriptGenerator {
    fn type_to_string(
        &self,
        schema: &FunctionSignatureSchema,
        ty: &TypeDef,
        imports: &mut Imports,
    ) -> String {
        match ty {
            TypeDef::Primitive { kind } => match kind {
                Primitive::Int | Primitive::Float => "number",
                Primitive::String => "string",
                Primitive::Boolean => "boolean",
                Primitive::Null => "null",
            }
            .to_string(),
            TypeDef::Array { items } => {
                let inner = self.type_to_string(schema, items, imports);
                match **items {
                    TypeDef::Union { .. } => format!("({inner})[]"),
                    _ => format!("{inner}[]"),
                }
            }
            TypeDef::Object { properties } if properties.is_empty() => "{}".to_string(),
            TypeDef::Object { properties } => {
                let fields = properties
                    .iter()
                    .map(|p| format!("{}: {}", p.name, self.type_to_string(schema, &p.ty, imports)))
                    .collect::<Vec<_>>()
                    .join("; ");
                format!("{{ {fields} }}")
            }
            TypeDef::Map {
                key_type,
                value_type,
            } => {
                let key = match **key_type {
                    TypeDef::Primitive {
                        kind: Primitive::Int | Primitive::Float,
                    } => "number",
                    _ => "string",
                };
                let value = self.type_to_string(schema, value_type, imports);
                format!("Record<{key}, {value}>")
            }
            TypeDef::Tuple { items } => {
                let items = items
                    .iter()
                    .map(|t| self.type_to_string(schema, t, imports))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("[{items}]")
            }
            TypeDef::Union { variants } => variants
                .iter()
                .map(|t| self.type_to_string(schema, t, imports))
                .collect::<Vec<_>>()
                .join(" | "),
            TypeDef::Reference { name } => name.clone(),
        }
    }

    fn generate_type_definitions(
        &self,
        schema: &FunctionSignatureSchema,
        imports: &mut Imports,
    ) -> String {
        schema
            .named_types
            .iter()
            .map(|named| match &named.definition {
                TypeDef::Object { properties } => {
                    let fields: String = properties
                        .iter()
                        .map(|p| {
                            format!(
                                "  {}: {};\n",
                                p.name,
                                self.type_to_string(schema, &p.ty, imports)
                            )
                        })
                        .collect();
                    format!("export interface {} {{\n{fields}}}", named.name)
                }
                other => format!(
                    "export type {} = {};",
                    named.name,
                    self.type_to_string(schema, other, imports)
                ),
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn generate_scaffold(&self, schema: &FunctionSignatureSchema, imports: &mut Imports) -> String {
        let params = schema
            .parameters
            .iter()
            .map(|p| {
                let marker = if p.optional { "?" } else { "" };
                format!("{}{marker}: {}", p.name, self.type_to_string(schema, &p.ty, imports))
            })
            .collect::<Vec<_>>()
            .join(", ");
        let ret = self.type_to_string(schema, &schema.return_type, imports);

        format!(
            "export function {}({params}): {ret} {{\n  throw new Error(\"Not implemented\");\n}}",
            schema.function_name
        )
    }

    fn render_imports(&self, imports: &Imports) -> String {
        imports
            .iter()
            .map(|(module, symbols)| {
                if symbols.is_empty() {
                    format!("import \"{module}\";")
                } else {
                    let symbols: Vec<&str> = symbols.iter().map(String::as_str).collect();
                    format!("import {{ {} }} from \"{module}\";", symbols.join(", "))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn generate_runner_code(&self, schema: &FunctionSignatureSchema) -> String {
        let (parameters, named_types) = shape_tables(schema);

        let arguments = schema
            .parameters
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let decode = format!("conform(input[{i}], PARAMETERS[{i}], \"{}\")", p.name);
                if p.optional {
                    format!("    const arg{i} = input.length > {i} ? {decode} : undefined;")
                } else {
                    format!("    const arg{i} = {decode};")
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        let call = (0..schema.parameters.len())
            .map(|i| format!("arg{i}"))
            .collect::<Vec<_>>()
            .join(", ");

        apply_template(
            RUNNER_TEMPLATE,
            &[
                ("%PARAMETERS%", parameters.as_str()),
                ("%NAMED_TYPES%", named_types.as_str()),
                ("%ARGUMENTS%", arguments.as_str()),
                ("%CALL%", call.as_str()),
                ("%FUNCTION%", schema.function_name.as_str()),
            ],
        )
    }
}
