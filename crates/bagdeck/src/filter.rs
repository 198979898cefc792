// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic and type selection.
//!
//! Patterns are matched whole against a name; `*` matches any run of
//! characters (including `/`), so `/sensors/*` selects every topic below
//! `/sensors`.

use serde::{Deserialize, Serialize};

/// Whether patterns select or reject names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Keep only matching names.
    Include,
    /// Keep everything except matching names.
    Exclude,
}

/// Topic name filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicFilter {
    mode: FilterMode,
    patterns: Vec<String>,
}

impl TopicFilter {
    /// Keep only topics matching one of `patterns`.
    pub fn include<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: FilterMode::Include,
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Keep every topic not matching one of `patterns`.
    pub fn exclude<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: FilterMode::Exclude,
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Filter that accepts every topic.
    pub fn all() -> Self {
        Self::exclude(Vec::<String>::new())
    }

    /// Check whether a topic passes the filter.
    pub fn matches(&self, topic: &str) -> bool {
        apply(self.mode, &self.patterns, topic)
    }

    /// Topics from `topics` that pass the filter, in input order.
    pub fn select<'a, I>(&self, topics: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        topics
            .into_iter()
            .filter(|t| self.matches(t))
            .map(str::to_string)
            .collect()
    }

    /// Patterns of this filter.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// True for include filters.
    pub fn is_include(&self) -> bool {
        self.mode == FilterMode::Include
    }
}

impl Default for TopicFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Message type filter.
///
/// Patterns written in the abbreviated `pkg/Type` form also match the
/// fully-qualified `pkg/msg/Type` name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeFilter {
    mode: FilterMode,
    patterns: Vec<String>,
}

impl TypeFilter {
    /// Keep only types matching one of `patterns`.
    pub fn include<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: FilterMode::Include,
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Keep every type not matching one of `patterns`.
    pub fn exclude<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: FilterMode::Exclude,
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Check whether a type name passes the filter.
    pub fn matches(&self, type_name: &str) -> bool {
        let short = crate::schema::short_type_name(type_name);
        let is_match = self
            .patterns
            .iter()
            .any(|p| glob_match(p, type_name) || glob_match(p, &short));

        match self.mode {
            FilterMode::Include => is_match,
            FilterMode::Exclude => !is_match,
        }
    }

    /// Patterns of this filter.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// True for include filters.
    pub fn is_include(&self) -> bool {
        self.mode == FilterMode::Include
    }
}

fn apply(mode: FilterMode, patterns: &[String], name: &str) -> bool {
    let is_match = patterns.iter().any(|p| glob_match(p, name));
    match mode {
        FilterMode::Include => is_match,
        FilterMode::Exclude => !is_match,
    }
}

/// Whole-string wildcard match, `*` matching any (possibly empty) run.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }

    let (first, rest) = (parts[0], &parts[1..]);
    let Some(mut remaining) = name.strip_prefix(first) else {
        return false;
    };

    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return true,
    };

    for part in middle {
        match remaining.find(part) {
            Some(pos) => remaining = &remaining[pos + part.len()..],
            None => return false,
        }
    }

    remaining.len() >= last.len() && remaining.ends_with(last)
}
