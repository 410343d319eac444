//! Registry of values that references resolve against at emission time.

use crate::value::{Handle, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Serialized form of one external binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExternalDef {
    /// Plain data captured from the enclosing scope.
    Value { value: serde_json::Value },
    /// A captured `undefined`.
    Undefined,
    /// A captured host function.
    Closure { name: String },
    /// A table resource exposing integration operations.
    Table { name: String },
}

impl From<ExternalDef> for Value {
    fn from(def: ExternalDef) -> Self {
        match def {
            ExternalDef::Value { value } => Value::from(value),
            ExternalDef::Undefined => Value::Undefined,
            ExternalDef::Closure { name } => Value::Opaque(Handle::Closure { name }),
            ExternalDef::Table { name } => Value::Opaque(Handle::Table { name }),
        }
    }
}

/// Name → value map consulted when dereferencing reference nodes.
#[derive(Debug, Clone, Default)]
pub struct Externals {
    values: IndexMap<String, Value>,
}

impl Externals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a binding.
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(name.into(), value.into())
    }

    pub fn table(&mut self, name: impl Into<String>, table_name: impl Into<String>) -> Option<Value> {
        self.define(
            name,
            Value::Opaque(Handle::Table {
                name: table_name.into(),
            }),
        )
    }

    pub fn resolve(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, ExternalDef)> for Externals {
    fn from_iter<I: IntoIterator<Item = (String, ExternalDef)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(name, def)| (name, Value::from(def)))
                .collect(),
        }
    }
}
