//! Key/value fields attached to applications, rooms, connections, and
//! sessions.
//!
//! A field carries an arbitrary JSON value plus a sharing flag. Shared
//! fields are pushed to clients inside `token` and `roomData` envelopes;
//! private fields are visible only to server-side callers.

use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// A single named field with its value and sharing flag.
#[derive(Debug, Clone)]
pub struct Field {
    /// Field name, validated against `fieldNameRegExp` by the owning entity.
    pub name: String,
    /// Arbitrary JSON value.
    pub value: Value,
    /// Whether the field is pushed to clients.
    pub is_shared: bool,
}

/// A collection of fields owned by one entity.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    fields: HashMap<String, Field>,
}

impl FieldMap {
    /// Creates an empty field map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, replacing any previous value and sharing flag.
    pub fn set(&mut self, name: &str, value: Value, is_shared: bool) {
        self.fields.insert(
            name.to_string(),
            Field {
                name: name.to_string(),
                value,
                is_shared,
            },
        );
    }

    /// Returns the field with the given name, shared or not.
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Returns true when no fields are set.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of fields set.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns fields in wire form: a map of name to
    /// `{"fieldName": .., "fieldValue": ..}` objects.
    ///
    /// With `shared_only` set, private fields are omitted.
    pub fn wire_map(&self, shared_only: bool) -> Map<String, Value> {
        let mut out = Map::new();
        for (name, field) in &self.fields {
            if shared_only && !field.is_shared {
                continue;
            }
            out.insert(
                name.clone(),
                json!({ "fieldName": field.name, "fieldValue": field.value }),
            );
        }
        out
    }

    /// Returns the shared fields in wire form, or `None` when there are no
    /// shared fields so that the enclosing envelope can omit the key.
    pub fn shared_wire(&self) -> Option<Value> {
        let map = self.wire_map(true);
        if map.is_empty() {
            None
        } else {
            Some(Value::Object(map))
        }
    }

    /// Applies a `*DefaultFieldObj` option value.
    ///
    /// The expected shape is a map of field name to
    /// `{"fieldValue": .., "fieldOption": {"isShared": bool}}`. A null or
    /// non-object value applies nothing.
    pub fn apply_default_field_obj(&mut self, default_obj: &Value) {
        let Some(obj) = default_obj.as_object() else {
            return;
        };
        for (name, spec) in obj {
            let value = spec.get("fieldValue").cloned().unwrap_or(Value::Null);
            let is_shared = spec
                .get("fieldOption")
                .and_then(|o| o.get("isShared"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            self.set(name, value, is_shared);
        }
    }
}
