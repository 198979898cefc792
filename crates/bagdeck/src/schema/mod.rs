// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message type definitions.
//!
//! Types are described in the `.msg` text dialect used by robot middleware:
//!
//! ```text
//! # comment
//! Header header                  # complex field (std_msgs/Header)
//! float64[9] covariance          # fixed-size array
//! geometry_msgs/Point[] points   # dynamic array of a type from another package
//! uint8 MODE_AUTO=1              # constant
//! ```
//!
//! Type names are stored fully-qualified (`pkg/msg/Type`). The abbreviated
//! form `pkg/Type` is accepted everywhere and normalised on lookup.

pub mod builtin;
pub mod resolver;

pub use resolver::{ResolvedSchema, SchemaResolver};

use std::collections::HashMap;
use thiserror::Error;

/// Encoding tag attached to rendered schema blobs.
pub const SCHEMA_ENCODING: &str = "ros1msg";

/// Separator line between definitions in a multi-definition schema blob.
pub const SECTION_SEPARATOR: &str =
    "================================================================================";

/// Primitive (built-in) field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    String,
    Time,
    Duration,
}

impl PrimitiveType {
    /// Parse a primitive type keyword.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => Self::Bool,
            "int8" | "byte" => Self::Int8,
            "uint8" | "char" => Self::UInt8,
            "int16" => Self::Int16,
            "uint16" => Self::UInt16,
            "int32" => Self::Int32,
            "uint32" => Self::UInt32,
            "int64" => Self::Int64,
            "uint64" => Self::UInt64,
            "float32" => Self::Float32,
            "float64" => Self::Float64,
            "string" => Self::String,
            "time" => Self::Time,
            "duration" => Self::Duration,
            _ => return None,
        })
    }

    /// Canonical keyword for this type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::String => "string",
            Self::Time => "time",
            Self::Duration => "duration",
        }
    }

    /// Serialized size in bytes (None for strings).
    pub fn size(&self) -> Option<usize> {
        match self {
            Self::Bool | Self::Int8 | Self::UInt8 => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 | Self::Float32 => Some(4),
            Self::Int64 | Self::UInt64 | Self::Float64 | Self::Time | Self::Duration => Some(8),
            Self::String => None,
        }
    }
}

/// Type of a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Primitive(PrimitiveType),
    /// Reference to another definition (fully-qualified name).
    Complex(String),
}

/// Array shape of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    Scalar,
    Dynamic,
    Fixed(usize),
}

/// A field of a message type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    pub array: ArrayKind,
}

impl FieldDefinition {
    /// Complex type referenced by this field, if any.
    pub fn complex_type(&self) -> Option<&str> {
        match &self.field_type {
            FieldType::Complex(name) => Some(name),
            FieldType::Primitive(_) => None,
        }
    }
}

/// A named constant declared in a message type.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDefinition {
    pub name: String,
    pub primitive: PrimitiveType,
    pub value: String,
}

/// A named message type with ordered fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
    /// Fully-qualified name (`pkg/msg/Type`).
    pub name: String,
    pub fields: Vec<FieldDefinition>,
    pub constants: Vec<ConstantDefinition>,
}

/// Errors raised while parsing definitions.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("{type_name}:{line}: {reason}")]
    Syntax {
        type_name: String,
        line: usize,
        reason: String,
    },

    #[error("schema section {index} has no `MSG:` header")]
    MissingSectionHeader { index: usize },

    #[error("unknown type: {0}")]
    UnknownType(String),
}

impl TypeDefinition {
    /// Create an empty definition.
    pub fn new(name: &str) -> Self {
        Self {
            name: normalize_type_name(name),
            fields: Vec::new(),
            constants: Vec::new(),
        }
    }

    /// Parse `.msg` text into a definition named `name`.
    ///
    /// Bare complex names resolve within the package of `name`, except
    /// `Header` which always means `std_msgs/msg/Header`.
    pub fn parse(name: &str, text: &str) -> Result<Self, SchemaError> {
        let mut def = Self::new(name);
        let package = package_of(&def.name).map(str::to_string);

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let syntax = |reason: &str| SchemaError::Syntax {
                type_name: def.name.clone(),
                line: idx + 1,
                reason: reason.to_string(),
            };

            let (type_token, rest) = line
                .split_once(char::is_whitespace)
                .ok_or_else(|| syntax("expected `<type> <name>`"))?;
            let rest = rest.trim();

            if let Some((const_name, value)) = rest.split_once('=') {
                let primitive = PrimitiveType::from_name(type_token)
                    .ok_or_else(|| syntax("constants must have a primitive type"))?;
                let const_name = const_name.trim();
                if !is_identifier(const_name) {
                    return Err(syntax("invalid constant name"));
                }
                def.constants.push(ConstantDefinition {
                    name: const_name.to_string(),
                    primitive,
                    value: value.trim().to_string(),
                });
                continue;
            }

            if !is_identifier(rest) {
                return Err(syntax("invalid field name"));
            }

            let (base, array) =
                split_array_suffix(type_token).ok_or_else(|| syntax("malformed array suffix"))?;
            let field_type = match PrimitiveType::from_name(base) {
                Some(p) => FieldType::Primitive(p),
                None => FieldType::Complex(qualify_complex(base, package.as_deref())),
            };

            def.fields.push(FieldDefinition {
                name: rest.to_string(),
                field_type,
                array,
            });
        }

        Ok(def)
    }

    /// Complex types referenced by this definition, in field order.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter_map(FieldDefinition::complex_type)
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Render back to `.msg` text (constants first, then fields).
    pub fn to_msg_text(&self) -> String {
        let mut out = String::new();
        for c in &self.constants {
            out.push_str(&format!("{} {}={}\n", c.primitive.name(), c.name, c.value));
        }
        for f in &self.fields {
            let base = match &f.field_type {
                FieldType::Primitive(p) => p.name().to_string(),
                FieldType::Complex(name) => short_type_name(name),
            };
            let suffix = match f.array {
                ArrayKind::Scalar => String::new(),
                ArrayKind::Dynamic => "[]".to_string(),
                ArrayKind::Fixed(n) => format!("[{}]", n),
            };
            out.push_str(&format!("{}{} {}\n", base, suffix, f.name));
        }
        out
    }
}

/// Normalise a type name to its fully-qualified `pkg/msg/Type` form.
///
/// Names that already carry a category segment, and bare names without a
/// package, are returned unchanged.
pub fn normalize_type_name(name: &str) -> String {
    let parts: Vec<&str> = name.split('/').collect();
    match parts.as_slice() {
        [pkg, ty] if !pkg.is_empty() && !ty.is_empty() => format!("{}/msg/{}", pkg, ty),
        _ => name.to_string(),
    }
}

/// Abbreviated `pkg/Type` form of a fully-qualified name.
pub fn short_type_name(name: &str) -> String {
    let parts: Vec<&str> = name.split('/').collect();
    match parts.as_slice() {
        [pkg, "msg", ty] => format!("{}/{}", pkg, ty),
        _ => name.to_string(),
    }
}

fn package_of(name: &str) -> Option<&str> {
    name.split_once('/').map(|(pkg, _)| pkg)
}

fn qualify_complex(base: &str, package: Option<&str>) -> String {
    if base == "Header" {
        return "std_msgs/msg/Header".to_string();
    }
    if base.contains('/') {
        return normalize_type_name(base);
    }
    match package {
        Some(pkg) => format!("{}/msg/{}", pkg, base),
        None => base.to_string(),
    }
}

fn split_array_suffix(token: &str) -> Option<(&str, ArrayKind)> {
    let Some(open) = token.find('[') else {
        return Some((token, ArrayKind::Scalar));
    };
    let inner = token[open + 1..].strip_suffix(']')?;
    let base = &token[..open];
    if inner.is_empty() || inner.starts_with("<=") {
        Some((base, ArrayKind::Dynamic))
    } else {
        inner.parse().ok().map(|n| (base, ArrayKind::Fixed(n)))
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Registry of known message types keyed by fully-qualified name.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDefinition>,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the common robot message types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (name, text) in builtin::DEFINITIONS {
            if let Err(e) = registry.register_text(name, text) {
                tracing::error!("Builtin definition {} failed to parse: {}", name, e);
            }
        }
        registry
    }

    /// Build a registry from a rendered schema blob.
    pub fn from_schema_blob(root: &str, text: &str) -> Result<Self, SchemaError> {
        let mut registry = Self::new();
        registry.register_schema_blob(root, text)?;
        Ok(registry)
    }

    /// Register a definition, returning the one it replaced.
    pub fn register(&mut self, def: TypeDefinition) -> Option<TypeDefinition> {
        self.types.insert(def.name.clone(), def)
    }

    /// Parse and register `.msg` text.
    pub fn register_text(&mut self, name: &str, text: &str) -> Result<(), SchemaError> {
        self.register(TypeDefinition::parse(name, text)?);
        Ok(())
    }

    /// Register every definition of a multi-definition blob.
    ///
    /// The first section belongs to `root`; later sections start with a
    /// `MSG: pkg/Type` line. Returns the number of definitions registered.
    pub fn register_schema_blob(&mut self, root: &str, text: &str) -> Result<usize, SchemaError> {
        let mut sections: Vec<Vec<&str>> = vec![Vec::new()];
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.len() >= 3 && trimmed.chars().all(|c| c == '=') {
                sections.push(Vec::new());
            } else if let Some(current) = sections.last_mut() {
                current.push(line);
            }
        }

        let mut count = 0;
        for (index, lines) in sections.iter().enumerate() {
            let (name, body) = if index == 0 {
                (root.to_string(), lines.join("\n"))
            } else {
                let header_pos = lines
                    .iter()
                    .position(|l| !l.trim().is_empty())
                    .ok_or(SchemaError::MissingSectionHeader { index })?;
                let name = lines[header_pos]
                    .trim()
                    .strip_prefix("MSG:")
                    .ok_or(SchemaError::MissingSectionHeader { index })?
                    .trim()
                    .to_string();
                (name, lines[header_pos + 1..].join("\n"))
            };
            self.register_text(&name, &body)?;
            count += 1;
        }
        Ok(count)
    }

    /// Look up a type (abbreviated names are normalised).
    pub fn get(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(&normalize_type_name(name))
    }

    /// Check whether a type is known.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True when no type is registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Registered type names (unordered).
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_type_name() {
        assert_eq!(
            normalize_type_name("geometry_msgs/Transform"),
            "geometry_msgs/msg/Transform"
        );
        assert_eq!(
            normalize_type_name("geometry_msgs/msg/Transform"),
            "geometry_msgs/msg/Transform"
        );
        assert_eq!(normalize_type_name("Header"), "Header");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for name in ["a/B", "a/msg/B", "B", "a/srv/B"] {
            let once = normalize_type_name(name);
            assert_eq!(normalize_type_name(&once), once);
        }
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("std_msgs/msg/Header"), "std_msgs/Header");
        assert_eq!(short_type_name("std_msgs/Header"), "std_msgs/Header");
    }

    #[test]
    fn test_parse_fields_and_constants() {
        let def = TypeDefinition::parse(
            "sensor_msgs/Demo",
            "# demo\nHeader header\nfloat64[9] cov  # trailing\nPoint[] points\n\
             uint8 MODE_AUTO = 1\n\nstring label\n",
        )
        .expect("parse");

        assert_eq!(def.name, "sensor_msgs/msg/Demo");
        assert_eq!(def.fields.len(), 4);
        assert_eq!(
            def.fields[0].field_type,
            FieldType::Complex("std_msgs/msg/Header".into())
        );
        assert_eq!(def.fields[1].array, ArrayKind::Fixed(9));
        assert_eq!(
            def.fields[2].field_type,
            FieldType::Complex("sensor_msgs/msg/Point".into())
        );
        assert_eq!(def.fields[2].array, ArrayKind::Dynamic);
        assert_eq!(def.constants.len(), 1);
        assert_eq!(def.constants[0].name, "MODE_AUTO");
        assert_eq!(def.constants[0].value, "1");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TypeDefinition::parse("a/B", "float64").is_err());
        assert!(TypeDefinition::parse("a/B", "float64[x] v").is_err());
        assert!(TypeDefinition::parse("a/B", "Point P=1").is_err());
    }

    #[test]
    fn test_msg_text_roundtrip() {
        let text = "uint8 MODE=2\nstd_msgs/Header header\nfloat64[3] v\nstring[] names\n";
        let def = TypeDefinition::parse("demo_msgs/Thing", text).expect("parse");
        assert_eq!(def.to_msg_text(), text);
        let again = TypeDefinition::parse("demo_msgs/Thing", &def.to_msg_text()).expect("reparse");
        assert_eq!(again, def);
    }

    #[test]
    fn test_builtins_parse() {
        let registry = TypeRegistry::with_builtins();
        assert_eq!(registry.len(), builtin::DEFINITIONS.len());
        assert!(registry.contains("tf2_msgs/TFMessage"));
        assert!(registry.contains("geometry_msgs/msg/TransformStamped"));
    }

    #[test]
    fn test_register_schema_blob() {
        let blob = format!(
            "Inner a\nInner b\n{}\nMSG: demo/Inner\nfloat64 x\n",
            SECTION_SEPARATOR
        );
        let registry = TypeRegistry::from_schema_blob("demo/Outer", &blob).expect("blob");
        assert_eq!(registry.len(), 2);
        let outer = registry.get("demo/Outer").expect("outer");
        assert_eq!(outer.dependencies().collect::<Vec<_>>(), ["demo/msg/Inner"; 2]);
        assert!(registry.contains("demo/msg/Inner"));
    }

    #[test]
    fn test_blob_section_without_header() {
        let blob = format!("float64 x\n{}\nfloat64 y\n", SECTION_SEPARATOR);
        assert!(matches!(
            TypeRegistry::from_schema_blob("demo/A", &blob),
            Err(SchemaError::MissingSectionHeader { index: 1 })
        ));
    }
}
