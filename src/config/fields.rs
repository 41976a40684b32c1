//! Typed access to the untyped document tree
//!
//! Every lookup goes through [`Record`], which knows its own path in the
//! document and records a [`ValidationError`] instead of failing, so a single
//! pass reports every problem at once. A key that is absent or explicitly
//! null is treated as "not set".

use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Accumulated validation findings
#[derive(Debug, Default)]
pub struct Findings {
    errors: Vec<ValidationError>,
}

impl Findings {
    pub fn push(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        self.errors.push(ValidationError::new(path, reason));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn into_inner(self) -> Vec<ValidationError> {
        self.errors
    }
}

/// A value type that can be read out of a document field
pub trait FromField: Sized {
    /// Human-readable type, used in findings
    const EXPECTED: &'static str;

    fn from_field(value: &Value) -> Option<Self>;

    fn is_blank(&self) -> bool {
        false
    }
}

impl FromField for bool {
    const EXPECTED: &'static str = "a boolean (true or false)";

    fn from_field(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromField for i64 {
    const EXPECTED: &'static str = "an integer";

    fn from_field(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromField for String {
    const EXPECTED: &'static str = "a string";

    fn from_field(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl FromField for Vec<String> {
    const EXPECTED: &'static str = "a list of strings";

    fn from_field(value: &Value) -> Option<Self> {
        value
            .as_array()?
            .iter()
            .map(|item| match String::from_field(item) {
                Some(s) if !s.is_empty() => Some(s),
                _ => None,
            })
            .collect()
    }
}

/// A mapping in the document, addressed by its path
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    path: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> Record<'a> {
    /// View `value` as a record, reporting a finding when it is not a mapping
    pub fn new(path: &'a str, value: &'a Value, findings: &mut Findings) -> Option<Self> {
        match value.as_object() {
            Some(map) => Some(Self { path, map }),
            None => {
                findings.push(path, "must be a mapping");
                None
            }
        }
    }

    /// Full path of a field in this record
    pub fn field_path(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        }
    }

    /// Raw value of a field, `None` when absent or null
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|value| !value.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Typed value of an optional field
    pub fn optional<T: FromField>(&self, key: &str, findings: &mut Findings) -> Option<T> {
        let value = self.get(key)?;
        match T::from_field(value) {
            Some(parsed) if parsed.is_blank() => {
                findings.push(self.field_path(key), "must not be blank");
                None
            }
            Some(parsed) => Some(parsed),
            None => {
                findings.push(self.field_path(key), format!("must be {}", T::EXPECTED));
                None
            }
        }
    }

    /// Typed value of an optional field, falling back to `T::default()`
    pub fn or_default<T: FromField + Default>(&self, key: &str, findings: &mut Findings) -> T {
        self.optional(key, findings).unwrap_or_default()
    }

    /// Typed value of a field that must be present
    pub fn required<T: FromField>(&self, key: &str, findings: &mut Findings) -> Option<T> {
        if !self.contains(key) {
            findings.push(self.field_path(key), "is missing");
            return None;
        }
        self.optional(key, findings)
    }

    /// Whether a boolean flag is set; absent flags are false
    pub fn flag(&self, key: &str, findings: &mut Findings) -> bool {
        self.or_default(key, findings)
    }

    /// Elements of a list field, each paired with its own path
    pub fn list(&self, key: &str, findings: &mut Findings) -> Vec<(String, &'a Value)> {
        match self.get(key) {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| (format!("{}[{}]", self.field_path(key), i), item))
                .collect(),
            Some(_) => {
                findings.push(self.field_path(key), "must be a list");
                Vec::new()
            }
        }
    }

    /// Keys present in this record that are not in `known`
    pub fn unknown_keys(&self, known: &[&str]) -> Vec<String> {
        self.map
            .keys()
            .filter(|key| !known.contains(&key.as_str()))
            .map(|key| self.field_path(key))
            .collect()
    }
}
