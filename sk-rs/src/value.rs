//! Values, classes, and item types used by the `aliases` and `variables`
//! sections, plus an in-memory [`VariableStore`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::services::VariableStore;

// ── Value ─────────────────────────────────────────────────────────────────────

/// A value parsed from a `variables` entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Str(String),
    /// A value of a registered class, kept in its textual form.
    Object { class: String, text: String },
}

impl Default for Value {
    fn default() -> Self {
        Value::Str(String::new())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Object { text, .. } => write!(f, "{text}"),
        }
    }
}

impl Value {
    /// Code name of the value's class.
    pub fn class_name(&self) -> &str {
        match self {
            Value::Int(_) => "integer",
            Value::Str(_) => "text",
            Value::Object { class, .. } => class,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

// ── ClassInfo / ItemType ──────────────────────────────────────────────────────

/// Registry entry for a value class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    /// Name used inside variable names (`<player>`).
    pub code_name: String,
    /// Class values must be converted to before they are stored.
    pub serialize_as: Option<String>,
}

impl ClassInfo {
    pub fn new(code_name: impl Into<String>) -> Self {
        Self {
            code_name: code_name.into(),
            serialize_as: None,
        }
    }

    pub fn stored_as(mut self, class: impl Into<String>) -> Self {
        self.serialize_as = Some(class.into());
        self
    }
}

/// An item-type descriptor produced by alias resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemType {
    pub name: String,
    pub ids: Vec<String>,
}

// ── MemoryVariables ───────────────────────────────────────────────────────────

/// A process-local variable store.
#[derive(Debug, Default)]
pub struct MemoryVariables {
    vars: Mutex<HashMap<String, Value>>,
}

impl MemoryVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vars.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VariableStore for MemoryVariables {
    fn get(&self, name: &str) -> Option<Value> {
        self.vars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn set(&self, name: &str, value: Value) {
        self.vars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned(), value);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Value::Int(-7).to_string(), "-7");
        assert_eq!(Value::from("hello").to_string(), "hello");
        assert_eq!(
            Value::Object {
                class: "location".into(),
                text: "0, 64, 0".into()
            }
            .to_string(),
            "0, 64, 0"
        );
    }

    #[test]
    fn class_names() {
        assert_eq!(Value::Int(0).class_name(), "integer");
        assert_eq!(Value::from("x").class_name(), "text");
        assert_eq!(
            Value::Object {
                class: "player".into(),
                text: "Notch".into()
            }
            .class_name(),
            "player"
        );
    }

    #[test]
    fn set_and_get() {
        let vars = MemoryVariables::new();
        vars.set("score::<player>", Value::Int(0));
        assert_eq!(vars.get("score::<player>"), Some(Value::Int(0)));
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn overwrite() {
        let vars = MemoryVariables::new();
        vars.set("x", "old".into());
        vars.set("x", "new".into());
        assert_eq!(vars.get("x"), Some(Value::from("new")));
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn missing_returns_none() {
        let vars = MemoryVariables::new();
        assert!(vars.get("nope").is_none());
        assert!(vars.is_empty());
    }

    #[test]
    fn class_info_builder() {
        let ci = ClassInfo::new("location").stored_as("text");
        assert_eq!(ci.serialize_as.as_deref(), Some("text"));
    }
}
