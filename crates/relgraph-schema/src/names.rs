//! GraphQL-safe names for database identifiers.
//!
//! GraphQL names match `[_A-Za-z][_0-9A-Za-z]*`. Database identifiers often
//! do not (Firebird system-style names carry `$`). Invalid characters are
//! replaced by a placeholder that starts as `__` and grows by one underscore
//! until the result collides neither with an original name of the scope nor
//! with a name already handed out.

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

const PLACEHOLDER: &str = "__";

/// Escaped names for one scope (all tables, or the fields of one table).
#[derive(Debug, Clone, Default)]
pub struct NameScope {
    escaped: IndexMap<String, String>,
    originals: HashMap<String, String>,
}

impl NameScope {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let names: Vec<&str> = names.into_iter().collect();
        let all: HashSet<&str> = names.iter().copied().collect();
        let mut scope = Self::default();
        for name in names {
            if scope.escaped.contains_key(name) {
                continue;
            }
            let escaped = scope.pick(name, |candidate| {
                all.contains(candidate) && candidate != name
            });
            scope.originals.insert(escaped.clone(), name.to_string());
            scope.escaped.insert(name.to_string(), escaped);
        }
        scope
    }

    /// Escaped form of a name that belongs to the scope.
    pub fn escaped(&self, original: &str) -> Option<&str> {
        self.escaped.get(original).map(String::as_str)
    }

    /// Original name behind an escaped one.
    pub fn original(&self, escaped: &str) -> Option<&str> {
        self.originals.get(escaped).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.escaped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.escaped.is_empty()
    }

    /// Escaped names handed out by this scope.
    pub fn escaped_names(&self) -> impl Iterator<Item = &str> {
        self.escaped.values().map(String::as_str)
    }

    fn pick(&self, name: &str, collides_with_original: impl Fn(&str) -> bool) -> String {
        if is_valid_name(name) {
            return name.to_string();
        }
        let mut placeholder = PLACEHOLDER.to_string();
        loop {
            let candidate = replace_invalid(name, &placeholder);
            if !collides_with_original(&candidate) && !self.originals.contains_key(&candidate) {
                return candidate;
            }
            placeholder.push('_');
        }
    }
}

/// Names synthesized on top of a scope (`link_X`, `EMULATED_T_1`).
///
/// A derived name never takes a reserved name or one issued before; it grows
/// by `_` until it is free. Issuing the same base twice returns the first
/// result.
#[derive(Debug, Clone, Default)]
pub struct DerivedNames {
    reserved: HashSet<String>,
    issued: HashMap<String, String>,
}

impl DerivedNames {
    pub fn new<'a>(reserved: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            reserved: reserved.into_iter().map(str::to_string).collect(),
            issued: HashMap::new(),
        }
    }

    pub fn issue(&mut self, base: &str) -> String {
        if let Some(name) = self.issued.get(base) {
            return name.clone();
        }
        let mut name = if is_valid_name(base) {
            base.to_string()
        } else {
            replace_invalid(base, PLACEHOLDER)
        };
        while self.reserved.contains(&name) {
            name.push('_');
        }
        self.reserved.insert(name.clone());
        self.issued.insert(base.to_string(), name.clone());
        name
    }

    /// Name issued for `base`, if any.
    pub fn get(&self, base: &str) -> Option<&str> {
        self.issued.get(base).map(String::as_str)
    }
}

pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn replace_invalid(name: &str, placeholder: &str) -> String {
    let mut out = String::with_capacity(name.len() + placeholder.len());
    if name.chars().next().is_none_or(|c| c.is_ascii_digit()) {
        out.push_str(placeholder);
    }
    for c in name.chars() {
        if c == '_' || c.is_ascii_alphanumeric() {
            out.push(c);
        } else {
            out.push_str(placeholder);
        }
    }
    out
}
