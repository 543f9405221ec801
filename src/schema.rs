use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the function every runner invokes
pub const DEFAULT_FUNCTION_NAME: &str = "solution";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    Int,
    Float,
    String,
    Boolean,
    Null,
}

/// Shape of a JSON value exchanged with a runner
///
/// Recursive structures never embed themselves: they go through
/// `Reference`, which is resolved against the schema's [`TypeTable`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypeDef {
    Primitive {
        kind: Primitive,
    },
    Array {
        items: Box<TypeDef>,
    },
    Object {
        properties: Vec<Property>,
    },
    Map {
        #[serde(rename = "keyType")]
        key_type: Box<TypeDef>,
        #[serde(rename = "valueType")]
        value_type: Box<TypeDef>,
    },
    Tuple {
        items: Vec<TypeDef>,
    },
    Union {
        variants: Vec<TypeDef>,
    },
    Reference {
        name: String,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDef,
}

impl TypeDef {
    pub fn int() -> Self {
        Self::Primitive {
            kind: Primitive::Int,
        }
    }

    pub fn float() -> Self {
        Self::Primitive {
            kind: Primitive::Float,
        }
    }

    pub fn string() -> Self {
        Self::Primitive {
            kind: Primitive::String,
        }
    }

    pub fn boolean() -> Self {
        Self::Primitive {
            kind: Primitive::Boolean,
        }
    }

    pub fn null() -> Self {
        Self::Primitive {
            kind: Primitive::Null,
        }
    }

    pub fn array(items: TypeDef) -> Self {
        Self::Array {
            items: Box::new(items),
        }
    }

    pub fn object<N: Into<String>>(properties: impl IntoIterator<Item = (N, TypeDef)>) -> Self {
        Self::Object {
            properties: properties
                .into_iter()
                .map(|(name, ty)| Property {
                    name: name.into(),
                    ty,
                })
                .collect(),
        }
    }

    pub fn map(key_type: TypeDef, value_type: TypeDef) -> Self {
        Self::Map {
            key_type: Box::new(key_type),
            value_type: Box::new(value_type),
        }
    }

    pub fn tuple(items: Vec<TypeDef>) -> Self {
        Self::Tuple { items }
    }

    pub fn union(variants: Vec<TypeDef>) -> Self {
        Self::Union { variants }
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::Reference { name: name.into() }
    }

    /// `union[inner, null]`
    pub fn nullable(inner: TypeDef) -> Self {
        Self::Union {
            variants: vec![inner, Self::null()],
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(
            self,
            Self::Primitive {
                kind: Primitive::Null
            }
        )
    }

    /// Returns the non-null member of a two-variant union with `null`
    pub fn nullable_inner(&self) -> Option<&TypeDef> {
        match self {
            Self::Union { variants } if variants.len() == 2 => {
                match (variants[0].is_null(), variants[1].is_null()) {
                    (false, true) => Some(&variants[0]),
                    (true, false) => Some(&variants[1]),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Visits every type reachable from `self` without crossing a reference
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a TypeDef)) {
        visit(self);
        match self {
            Self::Primitive { .. } | Self::Reference { .. } => {}
            Self::Array { items } => items.walk(visit),
            Self::Object { properties } => {
                for property in properties {
                    property.ty.walk(visit);
                }
            }
            Self::Map {
                key_type,
                value_type,
            } => {
                key_type.walk(visit);
                value_type.walk(visit);
            }
            Self::Tuple { items: members } | Self::Union { variants: members } => {
                for member in members {
                    member.walk(visit);
                }
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDef,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NamedType {
    pub name: String,
    pub definition: TypeDef,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSignatureSchema {
    #[serde(default = "default_function_name")]
    pub function_name: String,
    pub parameters: Vec<Parameter>,
    pub return_type: TypeDef,
    #[serde(default)]
    pub named_types: Vec<NamedType>,
}

fn default_function_name() -> String {
    DEFAULT_FUNCTION_NAME.to_string()
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("named type {0} is declared more than once")]
    DuplicateType(String),

    #[error("parameter {0} is declared more than once")]
    DuplicateParameter(String),

    #[error("reference to unknown type {0}")]
    UnresolvedReference(String),

    #[error("named type {0} refers to itself without passing through an object")]
    RecursiveAlias(String),

    #[error("required parameter {0} follows an optional one")]
    RequiredAfterOptional(String),

    #[error("union without variants")]
    EmptyUnion,
}

/// Arena of the schema's named types with a name index
pub struct TypeTable<'a> {
    types: &'a [NamedType],
    index: HashMap<&'a str, usize>,
}

impl<'a> TypeTable<'a> {
    pub fn new(types: &'a [NamedType]) -> Self {
        let index = types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.as_str(), i))
            .collect();
        Self { types, index }
    }

    pub fn get(&self, name: &str) -> Option<&'a NamedType> {
        self.index.get(name).map(|&i| &self.types[i])
    }

    pub fn resolve(&self, name: &str) -> Option<&'a TypeDef> {
        self.get(name).map(|t| &t.definition)
    }

    /// Whether `name` resolves to a struct-like named type
    pub fn is_object(&self, name: &str) -> bool {
        matches!(self.resolve(name), Some(TypeDef::Object { .. }))
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a NamedType> {
        self.types.iter()
    }
}

impl FunctionSignatureSchema {
    pub fn type_table(&self) -> TypeTable<'_> {
        TypeTable::new(&self.named_types)
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn required_parameter_count(&self) -> usize {
        self.parameters.iter().filter(|p| !p.optional).count()
    }

    /// Checks the structural invariants the generators rely on
    pub fn validate(&self) -> Result<(), SchemaError> {
        check_identifier(&self.function_name)?;

        let mut seen = HashSet::new();
        for named in &self.named_types {
            check_identifier(&named.name)?;
            if !seen.insert(named.name.as_str()) {
                return Err(SchemaError::DuplicateType(named.name.clone()));
            }
        }

        let mut seen = HashSet::new();
        let mut optional_seen = false;
        for param in &self.parameters {
            check_identifier(&param.name)?;
            if !seen.insert(param.name.as_str()) {
                return Err(SchemaError::DuplicateParameter(param.name.clone()));
            }
            if param.optional {
                optional_seen = true;
            } else if optional_seen {
                return Err(SchemaError::RequiredAfterOptional(param.name.clone()));
            }
        }

        let table = self.type_table();
        let roots = self
            .parameters
            .iter()
            .map(|p| &p.ty)
            .chain(std::iter::once(&self.return_type))
            .chain(self.named_types.iter().map(|t| &t.definition));
        for root in roots {
            check_type(root, &table)?;
        }

        for named in &self.named_types {
            if !matches!(named.definition, TypeDef::Object { .. }) {
                check_alias_recursion(named, &table)?;
            }
        }

        Ok(())
    }
}

fn check_identifier(name: &str) -> Result<(), SchemaError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier(name.to_string()))
    }
}

fn check_type(root: &TypeDef, table: &TypeTable<'_>) -> Result<(), SchemaError> {
    let mut result = Ok(());
    root.walk(&mut |ty| {
        if result.is_err() {
            return;
        }
        result = match ty {
            TypeDef::Reference { name } if table.get(name).is_none() => {
                Err(SchemaError::UnresolvedReference(name.clone()))
            }
            TypeDef::Union { variants } if variants.is_empty() => Err(SchemaError::EmptyUnion),
            TypeDef::Object { properties } => properties
                .iter()
                .try_for_each(|p| check_identifier(&p.name)),
            _ => Ok(()),
        };
    });
    result
}

/// Rejects non-object named types that reach themselves again. References to
/// object types are pointer-like and end the search.
fn check_alias_recursion(start: &NamedType, table: &TypeTable<'_>) -> Result<(), SchemaError> {
    let mut visited = HashSet::new();
    let mut pending = vec![&start.definition];

    while let Some(def) = pending.pop() {
        let mut found = Vec::new();
        def.walk(&mut |ty| {
            if let TypeDef::Reference { name } = ty {
                found.push(name.as_str());
            }
        });

        for name in found {
            if table.is_object(name) {
                continue;
            }
            if name == start.name {
                return Err(SchemaError::RecursiveAlias(start.name.clone()));
            }
            if visited.insert(name) {
                pending.extend(table.resolve(name));
            }
        }
    }

    Ok(())
}
