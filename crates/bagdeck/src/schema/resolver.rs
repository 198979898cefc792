// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flattening of a type and its nested dependencies into one schema.

use super::{normalize_type_name, short_type_name, TypeDefinition, TypeRegistry, SECTION_SEPARATOR};
use std::collections::HashSet;

/// A type together with every type it transitively references.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSchema {
    /// Fully-qualified root type name.
    pub root: String,

    /// Definitions, dependencies before their first user, root last.
    pub definitions: Vec<TypeDefinition>,

    /// Names that could not be resolved (skipped).
    pub gaps: Vec<String>,
}

impl ResolvedSchema {
    /// True when every referenced type resolved.
    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty()
    }

    /// Definition of the root type, if it resolved.
    pub fn root_definition(&self) -> Option<&TypeDefinition> {
        self.definitions.iter().find(|d| d.name == self.root)
    }

    /// Check whether a type is part of this schema.
    pub fn contains(&self, name: &str) -> bool {
        let name = normalize_type_name(name);
        self.definitions.iter().any(|d| d.name == name)
    }

    /// Render the schema blob: the root definition followed by one
    /// `MSG:` section per dependency. Empty when the root is unknown.
    pub fn to_schema_text(&self) -> String {
        let Some(root) = self.root_definition() else {
            return String::new();
        };

        let mut text = root.to_msg_text();
        for def in self.definitions.iter().filter(|d| d.name != self.root) {
            text.push_str(SECTION_SEPARATOR);
            text.push('\n');
            text.push_str(&format!("MSG: {}\n", short_type_name(&def.name)));
            text.push_str(&def.to_msg_text());
        }
        text
    }
}

/// Resolves types against a [`TypeRegistry`].
pub struct SchemaResolver<'a> {
    registry: &'a TypeRegistry,
}

impl<'a> SchemaResolver<'a> {
    /// Create a resolver over a registry.
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self { registry }
    }

    /// Resolve `type_name` and its dependency closure.
    ///
    /// Unknown names are skipped and reported in [`ResolvedSchema::gaps`].
    pub fn resolve(&self, type_name: &str) -> ResolvedSchema {
        let root = normalize_type_name(type_name);
        let mut visited = HashSet::new();
        let mut definitions = Vec::new();
        let mut gaps = Vec::new();

        self.visit(&root, &mut visited, &mut definitions, &mut gaps);

        for gap in &gaps {
            tracing::warn!("Schema for {} references unknown type {}", root, gap);
        }

        ResolvedSchema {
            root,
            definitions,
            gaps,
        }
    }

    fn visit(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        definitions: &mut Vec<TypeDefinition>,
        gaps: &mut Vec<String>,
    ) {
        if !visited.insert(name.to_string()) {
            return;
        }

        let Some(def) = self.registry.get(name) else {
            gaps.push(name.to_string());
            return;
        };

        for dep in def.dependencies() {
            self.visit(dep, visited, definitions, gaps);
        }
        definitions.push(def.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(schema: &ResolvedSchema) -> Vec<&str> {
        schema.definitions.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn test_diamond_dependency_flattened_once() {
        let mut registry = TypeRegistry::new();
        registry
            .register_text("demo/Top", "Left left\nRight right\n")
            .expect("top");
        registry
            .register_text("demo/Left", "Shared shared\n")
            .expect("left");
        registry
            .register_text("demo/Right", "Shared shared\nfloat64 r\n")
            .expect("right");
        registry
            .register_text("demo/Shared", "float64 value\n")
            .expect("shared");

        let schema = SchemaResolver::new(&registry).resolve("demo/Top");

        assert!(schema.is_complete());
        assert_eq!(
            names(&schema),
            [
                "demo/msg/Shared",
                "demo/msg/Left",
                "demo/msg/Right",
                "demo/msg/Top"
            ]
        );
    }

    #[test]
    fn test_resolution_order_is_stable() {
        let registry = TypeRegistry::with_builtins();
        let resolver = SchemaResolver::new(&registry);

        let first = resolver.resolve("tf2_msgs/TFMessage");
        let second = resolver.resolve("tf2_msgs/msg/TFMessage");
        assert_eq!(first, second);
        assert_eq!(
            first.definitions.last().map(|d| d.name.as_str()),
            Some("tf2_msgs/msg/TFMessage")
        );
        assert!(first.contains("std_msgs/Header"));
        assert!(first.contains("geometry_msgs/Quaternion"));
    }

    #[test]
    fn test_unknown_nested_type_is_a_gap() {
        let mut registry = TypeRegistry::new();
        registry
            .register_text("demo/Outer", "Missing m\nfloat32 x\n")
            .expect("outer");

        let schema = SchemaResolver::new(&registry).resolve("demo/Outer");

        assert_eq!(schema.gaps, ["demo/msg/Missing"]);
        assert_eq!(names(&schema), ["demo/msg/Outer"]);
        assert!(!schema.to_schema_text().is_empty());
    }

    #[test]
    fn test_unknown_root_renders_empty() {
        let registry = TypeRegistry::new();
        let schema = SchemaResolver::new(&registry).resolve("demo/Nothing");
        assert!(schema.definitions.is_empty());
        assert_eq!(schema.to_schema_text(), "");
    }

    #[test]
    fn test_schema_text_reparses_to_same_closure() {
        let registry = TypeRegistry::with_builtins();
        let schema = SchemaResolver::new(&registry).resolve("nav_msgs/Odometry");
        let text = schema.to_schema_text();

        assert!(text.starts_with("std_msgs/Header header\n"));
        assert!(text.contains("MSG: geometry_msgs/PoseWithCovariance\n"));

        let reparsed = TypeRegistry::from_schema_blob("nav_msgs/Odometry", &text).expect("blob");
        let again = SchemaResolver::new(&reparsed).resolve("nav_msgs/Odometry");
        assert_eq!(again, schema);
    }
}
