use std::collections::HashSet;

use super::{CodeGenerator, Imports, apply_template, indent};
use crate::schema::{FunctionSignatureSchema, NamedType, Primitive, Property, TypeDef, TypeTable};

/// Line of the runner replaced by the user's solution when linking
pub const SOLUTION_MARKER: &str = "// @@SOLUTION@@";

const JSON_HEADER: &str = "nlohmann/json.hpp";

const RUNNER_TEMPLATE: &str = r#"// Generated runner: reads positional JSON arguments, calls %FUNCTION%, writes a result envelope.
#include <cmath>
#include <cstddef>
#include <cstdint>
#include <exception>
#include <fstream>
#include <iostream>
#include <map>
#include <optional>
#include <sstream>
#include <stdexcept>
#include <string>
#include <tuple>
#include <utility>
#include <vector>

#include <nlohmann/json.hpp>

%TYPE_DEFINITIONS%

// @@SOLUTION@@

namespace fnjudge {

using json = nlohmann::json;

template <typename T>
struct Codec;

template <>
struct Codec<int64_t> {
    static int64_t decode(const json& j, const std::string& path) {
        if (j.is_number_integer()) {
            return j.get<int64_t>();
        }
        if (j.is_number_float()) {
            double value = j.get<double>();
            if (std::isfinite(value) && std::floor(value) == value) {
                return static_cast<int64_t>(value);
            }
        }
        throw std::invalid_argument(path + ": expected an integer, got " + j.dump());
    }
    static json encode(int64_t value) { return value; }
};

template <>
struct Codec<double> {
    static double decode(const json& j, const std::string& path) {
        if (!j.is_number()) {
            throw std::invalid_argument(path + ": expected a number, got " + j.dump());
        }
        return j.get<double>();
    }
    static json encode(double value) { return value; }
};

template <>
struct Codec<std::string> {
    static std::string decode(const json& j, const std::string& path) {
        if (!j.is_string()) {
            throw std::invalid_argument(path + ": expected a string, got " + j.dump());
        }
        return j.get<std::string>();
    }
    static json encode(const std::string& value) { return value; }
};

template <>
struct Codec<bool> {
    static bool decode(const json& j, const std::string& path) {
        if (!j.is_boolean()) {
            throw std::invalid_argument(path + ": expected a boolean, got " + j.dump());
        }
        return j.get<bool>();
    }
    static json encode(bool value) { return value; }
};

template <>
struct Codec<std::nullptr_t> {
    static std::nullptr_t decode(const json& j, const std::string& path) {
        if (!j.is_null()) {
            throw std::invalid_argument(path + ": expected null, got " + j.dump());
        }
        return nullptr;
    }
    static json encode(std::nullptr_t) { return json(nullptr); }
};

template <>
struct Codec<json> {
    static json decode(const json& j, const std::string&) { return j; }
    static json encode(const json& value) { return value; }
};

template <typename T>
struct Codec<std::vector<T>> {
    static std::vector<T> decode(const json& j, const std::string& path) {
        if (!j.is_array()) {
            throw std::invalid_argument(path + ": expected an array");
        }
        std::vector<T> out;
        out.reserve(j.size());
        for (std::size_t i = 0; i < j.size(); ++i) {
            out.push_back(Codec<T>::decode(j[i], path + "[" + std::to_string(i) + "]"));
        }
        return out;
    }
    static json encode(const std::vector<T>& value) {
        json out = json::array();
        for (const auto& item : value) {
            out.push_back(Codec<T>::encode(item));
        }
        return out;
    }
};

template <typename K>
struct Key;

template <>
struct Key<std::string> {
    static std::string decode(const std::string& key, const std::string&) { return key; }
    static std::string encode(const std::string& key) { return key; }
};

template <>
struct Key<int64_t> {
    static int64_t decode(const std::string& key, const std::string& path) {
        std::size_t consumed = 0;
        long long value = 0;
        try {
            value = std::stoll(key, &consumed);
        } catch (const std::logic_error&) {
            consumed = 0;
        }
        if (consumed == 0 || consumed != key.size()) {
            throw std::invalid_argument(path + ": expected an integer key, got " + key);
        }
        return static_cast<int64_t>(value);
    }
    static std::string encode(int64_t key) { return std::to_string(key); }
};

template <>
struct Key<double> {
    static double decode(const std::string& key, const std::string& path) {
        std::size_t consumed = 0;
        double value = 0;
        try {
            value = std::stod(key, &consumed);
        } catch (const std::logic_error&) {
            consumed = 0;
        }
        if (consumed == 0 || consumed != key.size()) {
            throw std::invalid_argument(path + ": expected a numeric key, got " + key);
        }
        return value;
    }
    static std::string encode(double key) { return json(key).dump(); }
};

template <>
struct Key<bool> {
    static bool decode(const std::string& key, const std::string& path) {
        if (key == "true") {
            return true;
        }
        if (key == "false") {
            return false;
        }
        throw std::invalid_argument(path + ": expected a boolean key, got " + key);
    }
    static std::string encode(bool key) { return key ? "true" : "false"; }
};

template <typename K, typename V>
struct Codec<std::map<K, V>> {
    static std::map<K, V> decode(const json& j, const std::string& path) {
        if (!j.is_object()) {
            throw std::invalid_argument(path + ": expected an object");
        }
        std::map<K, V> out;
        for (auto it = j.begin(); it != j.end(); ++it) {
            out.emplace(Key<K>::decode(it.key(), path),
                        Codec<V>::decode(it.value(), path + "[" + it.key() + "]"));
        }
        return out;
    }
    static json encode(const std::map<K, V>& value) {
        json out = json::object();
        for (const auto& entry : value) {
            out[Key<K>::encode(entry.first)] = Codec<V>::encode(entry.second);
        }
        return out;
    }
};

template <typename... Ts>
struct Codec<std::tuple<Ts...>> {
    static std::tuple<Ts...> decode(const json& j, const std::string& path) {
        if (!j.is_array() || j.size() != sizeof...(Ts)) {
            throw std::invalid_argument(path + ": expected a tuple of " +
                                        std::to_string(sizeof...(Ts)) + " items");
        }
        return decode_items(j, path, std::index_sequence_for<Ts...>{});
    }
    static json encode(const std::tuple<Ts...>& value) {
        return encode_items(value, std::index_sequence_for<Ts...>{});
    }

private:
    template <std::size_t... I>
    static std::tuple<Ts...> decode_items(const json& j, const std::string& path,
                                          std::index_sequence<I...>) {
        return std::tuple<Ts...>(Codec<Ts>::decode(j[I], path + "[" + std::to_string(I) + "]")...);
    }
    template <std::size_t... I>
    static json encode_items(const std::tuple<Ts...>& value, std::index_sequence<I...>) {
        json out = json::array();
        (out.push_back(Codec<Ts>::encode(std::get<I>(value))), ...);
        return out;
    }
};

template <typename T>
struct Codec<std::optional<T>> {
    static std::optional<T> decode(const json& j, const std::string& path) {
        if (j.is_null()) {
            return std::nullopt;
        }
        return Codec<T>::decode(j, path);
    }
    static json encode(const std::optional<T>& value) {
        return value ? Codec<T>::encode(*value) : json(nullptr);
    }
};

template <typename T>
struct Codec<T*> {
    static T* decode(const json& j, const std::string& path) {
        if (j.is_null()) {
            return nullptr;
        }
        return new T(Codec<T>::decode(j, path));
    }
    static json encode(const T* value) {
        return value == nullptr ? json(nullptr) : Codec<T>::encode(*value);
    }
};

%STRUCT_CODECS%

inline const json& required_argument(const json& input, std::size_t index, const std::string& name) {
    if (index >= input.size()) {
        throw std::invalid_argument("missing argument " + name);
    }
    return input[index];
}

inline json optional_argument(const json& input, std::size_t index) {
    return index < input.size() ? input[index] : json(nullptr);
}

}  // namespace fnjudge

int main(int argc, char** argv) {
    using fnjudge::json;

    if (argc < 3) {
        std::cerr << "usage: " << argv[0] << " <input.json> <output.json>" << std::endl;
        return 2;
    }
    std::ifstream input_file(argv[1]);
    if (!input_file) {
        std::cerr << "cannot open input file " << argv[1] << std::endl;
        return 2;
    }
    json input = json::parse(input_file, nullptr, false);
    if (input.is_discarded()) {
        std::cerr << "input file is not valid JSON" << std::endl;
        return 2;
    }

    std::ostringstream captured;
    std::streambuf* original = std::cout.rdbuf(captured.rdbuf());
    json envelope = json::object();
    try {
        if (!input.is_array()) {
            throw std::invalid_argument("input must be a JSON array");
        }
%ARGUMENTS%
        auto result = %FUNCTION%(%CALL%);
        json encoded = fnjudge::Codec<%RETURN%>::encode(result);
        std::cout.flush();
        envelope["success"] = true;
        envelope["result"] = encoded;
    } catch (const std::exception& error) {
        envelope["success"] = false;
        envelope["error"] = error.what();
        envelope["trace"] = "";
    } catch (...) {
        envelope["success"] = false;
        envelope["error"] = "unknown exception";
        envelope["trace"] = "";
    }
    std::cout.rdbuf(original);
    envelope["stdout"] = captured.str();

    std::ofstream output_file(argv[2]);
    output_file << envelope.dump(-1, ' ', false, json::error_handler_t::replace);
    return output_file.good() ? 0 : 3;
}
"#;

/// C++17 target built around nlohmann/json
///
/// Named object types become structs behind per-type include guards, so the
/// copy in the user's starter code and the copy in the runner can coexist in
/// one translation unit. References to named object types are raw pointers.
///
/// Only `std::cout` is captured into the envelope. Output written through
/// `printf` or straight to file descriptor 1 is not recorded.
pub struct CppGenerator;

impl CppGenerator {
    fn guard(name: &str) -> String {
        format!("FNJUDGE_TYPE_{name}")
    }

    /// Parameter type for an optional argument along with its default value
    fn optional_parameter(
        &self,
        schema: &FunctionSignatureSchema,
        ty: &TypeDef,
        imports: &mut Imports,
    ) -> (String, &'static str) {
        let rendered = self.type_to_string(schema, ty, imports);
        if rendered.ends_with('*') {
            (rendered, "nullptr")
        } else if rendered.starts_with("std::optional<") {
            (rendered, "std::nullopt")
        } else {
            imports.add("optional");
            (format!("std::optional<{rendered}>"), "std::nullopt")
        }
    }

    fn parameter_type(
        &self,
        schema: &FunctionSignatureSchema,
        optional: bool,
        ty: &TypeDef,
        imports: &mut Imports,
    ) -> String {
        if optional {
            self.optional_parameter(schema, ty, imports).0
        } else {
            self.type_to_string(schema, ty, imports)
        }
    }

    fn struct_definition(
        &self,
        schema: &FunctionSignatureSchema,
        name: &str,
        properties: &[Property],
        imports: &mut Imports,
    ) -> String {
        let fields: Vec<(String, &str)> = properties
            .iter()
            .map(|p| (self.type_to_string(schema, &p.ty, imports), p.name.as_str()))
            .collect();

        let mut out = format!("struct {name} {{\n");
        for (ty, field) in &fields {
            out.push_str(&format!("    {ty} {field};\n"));
        }
        if fields.is_empty() {
            out.push_str(&format!("    {name}() {{}}\n"));
        } else {
            let defaults = fields
                .iter()
                .map(|(_, field)| format!("{field}()"))
                .collect::<Vec<_>>()
                .join(", ");
            let params = fields
                .iter()
                .map(|(ty, field)| format!("{ty} {field}"))
                .collect::<Vec<_>>()
                .join(", ");
            let inits = fields
                .iter()
                .map(|(_, field)| format!("{field}({field})"))
                .collect::<Vec<_>>()
                .join(", ");
            out.push('\n');
            out.push_str(&format!("    {name}() : {defaults} {{}}\n"));
            out.push_str(&format!("    {name}({params}) : {inits} {{}}\n"));
        }
        out.push_str("};");
        out
    }

    fn struct_codecs(&self, schema: &FunctionSignatureSchema) -> String {
        let mut imports = Imports::new();
        let objects: Vec<(&str, &[Property])> = schema
            .named_types
            .iter()
            .filter_map(|named| match &named.definition {
                TypeDef::Object { properties } => {
                    Some((named.name.as_str(), properties.as_slice()))
                }
                _ => None,
            })
            .collect();

        let declarations = objects.iter().map(|(name, _)| {
            format!(
                "template <>\nstruct Codec<{name}> {{\n    static {name} decode(const json& j, const std::string& path);\n    static json encode(const {name}& value);\n}};"
            )
        });

        let definitions = objects.iter().map(|(name, properties)| {
            let mut decode = format!(
                "inline {name} Codec<{name}>::decode(const json& j, const std::string& path) {{\n    if (!j.is_object()) {{\n        throw std::invalid_argument(path + \": expected an object\");\n    }}\n    {name} out;\n"
            );
            let mut encode = format!(
                "inline json Codec<{name}>::encode(const {name}& value) {{\n    json out = json::object();\n"
            );
            for p in properties.iter() {
                let ty = self.type_to_string(schema, &p.ty, &mut imports);
                let field = &p.name;
                decode.push_str(&format!(
                    "    out.{field} = Codec<{ty}>::decode(j.contains(\"{field}\") ? j.at(\"{field}\") : json(nullptr), path + \".{field}\");\n"
                ));
                encode.push_str(&format!(
                    "    out[\"{field}\"] = Codec<{ty}>::encode(value.{field});\n"
                ));
            }
            decode.push_str("    return out;\n}");
            encode.push_str("    return out;\n}");
            format!("{decode}\n\n{encode}")
        });

        declarations
            .chain(definitions)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl CodeGenerator for CppGenerator {
    fn type_to_string(
        &self,
        schema: &FunctionSignatureSchema,
        ty: &TypeDef,
        imports: &mut Imports,
    ) -> String {
        match ty {
            TypeDef::Primitive { kind } => match kind {
                Primitive::Int => {
                    imports.add("cstdint");
                    "int64_t".to_string()
                }
                Primitive::Float => "double".to_string(),
                Primitive::String => {
                    imports.add("string");
                    "std::string".to_string()
                }
                Primitive::Boolean => "bool".to_string(),
                Primitive::Null => {
                    imports.add("cstddef");
                    "std::nullptr_t".to_string()
                }
            },
            TypeDef::Array { items } => {
                imports.add("vector");
                format!("std::vector<{}>", self.type_to_string(schema, items, imports))
            }
            TypeDef::Object { .. } => {
                imports.add(JSON_HEADER);
                "nlohmann::json".to_string()
            }
            TypeDef::Map {
                key_type,
                value_type,
            } => {
                imports.add("map");
                let key = self.type_to_string(schema, key_type, imports);
                let value = self.type_to_string(schema, value_type, imports);
                format!("std::map<{key}, {value}>")
            }
            TypeDef::Tuple { items } => {
                imports.add("tuple");
                let items = items
                    .iter()
                    .map(|t| self.type_to_string(schema, t, imports))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("std::tuple<{items}>")
            }
            TypeDef::Union { .. } => match ty.nullable_inner() {
                Some(TypeDef::Reference { name }) if schema.type_table().is_object(name) => {
                    format!("{name}*")
                }
                Some(inner) => {
                    imports.add("optional");
                    format!("std::optional<{}>", self.type_to_string(schema, inner, imports))
                }
                None => {
                    imports.add(JSON_HEADER);
                    "nlohmann::json".to_string()
                }
            },
            TypeDef::Reference { name } if schema.type_table().is_object(name) => {
                format!("{name}*")
            }
            TypeDef::Reference { name } => name.clone(),
        }
    }

    fn generate_type_definitions(
        &self,
        schema: &FunctionSignatureSchema,
        imports: &mut Imports,
    ) -> String {
        let forward: Vec<String> = schema
            .named_types
            .iter()
            .filter(|named| matches!(named.definition, TypeDef::Object { .. }))
            .map(|named| format!("struct {};", named.name))
            .collect();

        // Structs hold other objects by pointer, so only aliases need ordering
        let mut blocks = Vec::new();
        for named in alias_order(schema) {
            let body = format!(
                "using {} = {};",
                named.name,
                self.type_to_string(schema, &named.definition, imports)
            );
            blocks.push((named.name.as_str(), body));
        }
        for named in &schema.named_types {
            if let TypeDef::Object { properties } = &named.definition {
                let body = self.struct_definition(schema, &named.name, properties, imports);
                blocks.push((named.name.as_str(), body));
            }
        }
        let blocks = blocks.into_iter().map(|(name, body)| {
            let guard = Self::guard(name);
            format!("#ifndef {guard}\n#define {guard}\n{body}\n#endif")
        });

        let mut sections = Vec::new();
        if !forward.is_empty() {
            sections.push(forward.join("\n"));
        }
        sections.extend(blocks);
        sections.join("\n\n")
    }

    fn generate_scaffold(&self, schema: &FunctionSignatureSchema, imports: &mut Imports) -> String {
        let params = schema
            .parameters
            .iter()
            .map(|p| {
                if p.optional {
                    let (ty, default) = self.optional_parameter(schema, &p.ty, imports);
                    format!("{ty} {} = {default}", p.name)
                } else {
                    format!("{} {}", self.type_to_string(schema, &p.ty, imports), p.name)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let ret = self.type_to_string(schema, &schema.return_type, imports);
        imports.add("stdexcept");

        format!(
            "{ret} {}({params}) {{\n    throw std::runtime_error(\"Not implemented\");\n}}",
            schema.function_name
        )
    }

    fn render_imports(&self, imports: &Imports) -> String {
        imports
            .iter()
            .map(|(header, _)| format!("#include <{header}>"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn generate_runner_code(&self, schema: &FunctionSignatureSchema) -> String {
        let mut imports = Imports::new();
        let type_definitions = self.generate_type_definitions(schema, &mut imports);
        let struct_codecs = self.struct_codecs(schema);

        let arguments = schema
            .parameters
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let ty = self.parameter_type(schema, p.optional, &p.ty, &mut imports);
                let source = if p.optional {
                    format!("fnjudge::optional_argument(input, {i})")
                } else {
                    format!("fnjudge::required_argument(input, {i}, \"{}\")", p.name)
                };
                format!(
                    "auto arg{i} = fnjudge::Codec<{ty}>::decode({source}, \"{}\");",
                    p.name
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let call = (0..schema.parameters.len())
            .map(|i| format!("arg{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let ret = self.type_to_string(schema, &schema.return_type, &mut imports);

        apply_template(
            RUNNER_TEMPLATE,
            &[
                ("%TYPE_DEFINITIONS%", type_definitions.as_str()),
                ("%STRUCT_CODECS%", struct_codecs.as_str()),
                ("%ARGUMENTS%", indent(&arguments, 8).as_str()),
                ("%CALL%", call.as_str()),
                ("%RETURN%", ret.as_str()),
                ("%FUNCTION%", schema.function_name.as_str()),
            ],
        )
    }

    fn link(&self, runner: &str, solution: &str) -> String {
        if runner.contains(SOLUTION_MARKER) {
            runner.replacen(SOLUTION_MARKER, solution, 1)
        } else {
            format!("{solution}\n{runner}")
        }
    }
}

/// Non-object named types, each placed after the aliases it mentions
fn alias_order(schema: &FunctionSignatureSchema) -> Vec<&NamedType> {
    fn visit<'a>(
        named: &'a NamedType,
        table: &TypeTable<'a>,
        seen: &mut HashSet<&'a str>,
        out: &mut Vec<&'a NamedType>,
    ) {
        if !seen.insert(named.name.as_str()) {
            return;
        }
        let mut used = Vec::new();
        named.definition.walk(&mut |ty| {
            if let TypeDef::Reference { name } = ty {
                used.push(name.as_str());
            }
        });
        for name in used {
            if let Some(dependency) = table.get(name).filter(|d| !table.is_object(&d.name)) {
                visit(dependency, table, seen, out);
            }
        }
        out.push(named);
    }

    let table = schema.type_table();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for named in &schema.named_types {
        if !matches!(named.definition, TypeDef::Object { .. }) {
            visit(named, &table, &mut seen, &mut out);
        }
    }
    out
}
