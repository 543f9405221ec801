use super::{CodeGenerator, Imports, apply_template, shape_tables};
use crate::schema::{FunctionSignatureSchema, Primitive, TypeDef};

const RUNNER_TEMPLATE: &str = r#"# Generated runner: reads positional JSON arguments, calls %FUNCTION%, writes a result envelope.
import contextlib
import io
import json
import sys
import traceback

PARAMETERS = json.loads(%PARAMETERS%)
NAMED_TYPES = json.loads(%NAMED_TYPES%)
MISSING = object()


def conform(value, shape, path):
    kind = shape["type"]
    if kind == "primitive":
        return conform_primitive(value, shape["kind"], path)
    if kind == "array":
        if not isinstance(value, list):
            raise TypeError(f"{path}: expected an array")
        return [conform(item, shape["items"], f"{path}[{i}]") for i, item in enumerate(value)]
    if kind == "object":
        if not isinstance(value, dict):
            raise TypeError(f"{path}: expected an object")
        return {
            prop["name"]: conform(value.get(prop["name"]), prop["type"], f"{path}.{prop['name']}")
            for prop in shape["properties"]
        }
    if kind == "map":
        if not isinstance(value, dict):
            raise TypeError(f"{path}: expected an object")
        return {key: conform(item, shape["valueType"], f"{path}[{key!r}]") for key, item in value.items()}
    if kind == "tuple":
        items = shape["items"]
        if not isinstance(value, list) or len(value) != len(items):
            raise TypeError(f"{path}: expected a tuple of {len(items)} items")
        return [conform(item, items[i], f"{path}[{i}]") for i, item in enumerate(value)]
    if kind == "union":
        for variant in shape["variants"]:
            try:
                return conform(value, variant, path)
            except TypeError:
                continue
        raise TypeError(f"{path}: value matches no variant of the union")
    if kind == "reference":
        return conform(value, NAMED_TYPES[shape["name"]], path)
    raise TypeError(f"{path}: unknown shape {kind}")


def conform_primitive(value, kind, path):
    if kind == "int":
        if isinstance(value, bool) or not isinstance(value, (int, float)):
            raise TypeError(f"{path}: expected an integer, got {value!r}")
        if isinstance(value, float):
            if not value.is_integer():
                raise TypeError(f"{path}: expected an integer, got {value!r}")
            return int(value)
        return value
    if kind == "float":
        if isinstance(value, bool) or not isinstance(value, (int, float)):
            raise TypeError(f"{path}: expected a number, got {value!r}")
        return value
    if kind == "string":
        if not isinstance(value, str):
            raise TypeError(f"{path}: expected a string, got {value!r}")
        return value
    if kind == "boolean":
        if not isinstance(value, bool):
            raise TypeError(f"{path}: expected a boolean, got {value!r}")
        return value
    if kind == "null":
        if value is not None:
            raise TypeError(f"{path}: expected null, got {value!r}")
        return None
    raise TypeError(f"{path}: unknown primitive {kind}")


def main():
    input_path, output_path = sys.argv[1], sys.argv[2]
    with open(input_path, encoding="utf-8") as handle:
        args = json.load(handle)

    captured = io.StringIO()
    try:
        if not isinstance(args, list):
            raise TypeError("input must be a JSON array")
%ARGUMENTS%
        call_args = [arg for arg in [%CALL%] if arg is not MISSING]
        with contextlib.redirect_stdout(captured):
            from solution import %FUNCTION% as target

            result = target(*call_args)
        payload = json.dumps(
            {"success": True, "result": result, "stdout": captured.getvalue()},
            allow_nan=False,
        )
    except BaseException as exc:
        payload = json.dumps(
            {
                "success": False,
                "error": f"{type(exc).__name__}: {exc}",
                "trace": traceback.format_exc(),
                "stdout": captured.getvalue(),
            }
        )

    with open(output_path, "w", encoding="utf-8") as handle:
        handle.write(payload)


if __name__ == "__main__":
    main()
"#;

pub struct PythonGenerator;

impl PythonGenerator {
    fn typing(&self, imports: &mut Imports, symbol: &str) {
        imports.add_symbol("typing", symbol);
    }

    fn join_types(
        &self,
        schema: &FunctionSignatureSchema,
        items: &[TypeDef],
        imports: &mut Imports,
    ) -> String {
        items
            .iter()
            .map(|t| self.type_to_string(schema, t, imports))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl CodeGenerator for PythonGenerator {
    fn type_to_string(
        &self,
        schema: &FunctionSignatureSchema,
        ty: &TypeDef,
        imports: &mut Imports,
    ) -> String {
        match ty {
            TypeDef::Primitive { kind } => match kind {
                Primitive::Int => "int",
                Primitive::Float => "float",
                Primitive::String => "str",
                Primitive::Boolean => "bool",
                Primitive::Null => "None",
            }
            .to_string(),
            TypeDef::Array { items } => {
                self.typing(imports, "List");
                format!("List[{}]", self.type_to_string(schema, items, imports))
            }
            TypeDef::Object { .. } => {
                self.typing(imports, "Any");
                self.typing(imports, "Dict");
                "Dict[str, Any]".to_string()
            }
            TypeDef::Map {
                key_type,
                value_type,
            } => {
                self.typing(imports, "Dict");
                let key = self.type_to_string(schema, key_type, imports);
                let value = self.type_to_string(schema, value_type, imports);
                format!("Dict[{key}, {value}]")
            }
            TypeDef::Tuple { items } if items.is_empty() => {
                self.typing(imports, "Tuple");
                "Tuple[()]".to_string()
            }
            TypeDef::Tuple { items } => {
                self.typing(imports, "Tuple");
                format!("Tuple[{}]", self.join_types(schema, items, imports))
            }
            TypeDef::Union { variants } => match ty.nullable_inner() {
                Some(inner) => {
                    self.typing(imports, "Optional");
                    format!("Optional[{}]", self.type_to_string(schema, inner, imports))
                }
                None => {
                    self.typing(imports, "Union");
                    format!("Union[{}]", self.join_types(schema, variants, imports))
                }
            },
            TypeDef::Reference { name } => format!("\"{name}\""),
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
                    self.typing(imports, "TypedDict");
                    let body = if properties.is_empty() {
                        "    pass\n".to_string()
                    } else {
                        properties
                            .iter()
                            .map(|p| {
                                format!(
                                    "    {}: {}\n",
                                    p.name,
                                    self.type_to_string(schema, &p.ty, imports)
                                )
                            })
                            .collect()
                    };
                    format!("class {}(TypedDict):\n{}", named.name, body.trim_end())
                }
                other => format!(
                    "{} = {}",
                    named.name,
                    self.type_to_string(schema, other, imports)
                ),
            })
            .collect::<Vec<_>>()
            .join("\n\n\n")
    }

    fn generate_scaffold(&self, schema: &FunctionSignatureSchema, imports: &mut Imports) -> String {
        let params = schema
            .parameters
            .iter()
            .map(|p| {
                let rendered = self.type_to_string(schema, &p.ty, imports);
                if !p.optional {
                    format!("{}: {rendered}", p.name)
                } else if p.ty.nullable_inner().is_some() {
                    format!("{}: {rendered} = None", p.name)
                } else {
                    self.typing(imports, "Optional");
                    format!("{}: Optional[{rendered}] = None", p.name)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let ret = self.type_to_string(schema, &schema.return_type, imports);

        format!(
            "def {}({params}) -> {ret}:\n    raise NotImplementedError(\"Not implemented\")",
            schema.function_name
        )
    }

    fn render_imports(&self, imports: &Imports) -> String {
        imports
            .iter()
            .map(|(module, symbols)| {
                if symbols.is_empty() {
                    format!("import {module}")
                } else {
                    let symbols: Vec<&str> = symbols.iter().map(String::as_str).collect();
                    format!("from {module} import {}", symbols.join(", "))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn generate_runner_code(&self, schema: &FunctionSignatureSchema) -> String {
        let (parameters, named_types) = shape_tables(schema);
        // The shape tables travel as Python string literals; JSON string
        // escaping is a subset of Python's.
        let parameters = serde_json::Value::String(parameters).to_string();
        let named_types = serde_json::Value::String(named_types).to_string();

        let arguments = schema
            .parameters
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let decode = format!("conform(args[{i}], PARAMETERS[{i}], \"{}\")", p.name);
                if p.optional {
                    format!("        arg{i} = {decode} if len(args) > {i} else MISSING")
                } else {
                    format!("        arg{i} = {decode}")
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
