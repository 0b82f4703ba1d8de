use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::warn;

/// A typed Tiled custom property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    String(String),
}

/// Named custom properties attached to tiles, layers and objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    values: HashMap<String, PropertyValue>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: PropertyValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Bools also accept the strings `"true"`/`"false"` since older maps
    /// stored every property as a string.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name)? {
            PropertyValue::Bool(value) => Some(*value),
            PropertyValue::String(value) => match value.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.values.get(name)? {
            PropertyValue::Int(value) => Some(*value),
            PropertyValue::String(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_u32(&self, name: &str) -> Option<u32> {
        self.get_i64(name).and_then(|value| u32::try_from(value).ok())
    }

    pub fn get_f32(&self, name: &str) -> Option<f32> {
        match self.values.get(name)? {
            PropertyValue::Float(value) => Some(*value),
            PropertyValue::Int(value) => Some(*value as f32),
            _ => None,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.values.get(name)? {
            PropertyValue::String(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

/// Wire form of a single property: `{name, type, value}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PropertyDescription {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub value: JsonValue,
}

impl PropertyDescription {
    fn to_value(&self) -> Option<PropertyValue> {
        let value = &self.value;
        match self.kind.as_deref() {
            Some("bool") => value.as_bool().map(PropertyValue::Bool),
            Some("int") | Some("object") => value.as_i64().map(PropertyValue::Int),
            Some("float") => value.as_f64().map(|n| PropertyValue::Float(n as f32)),
            Some("string") | Some("file") | Some("color") | Some("class") => {
                value.as_str().map(|s| PropertyValue::String(s.to_owned()))
            }
            Some(_) | None => infer_value(value),
        }
    }
}

fn infer_value(value: &JsonValue) -> Option<PropertyValue> {
    if let Some(v) = value.as_bool() {
        Some(PropertyValue::Bool(v))
    } else if let Some(v) = value.as_i64() {
        Some(PropertyValue::Int(v))
    } else if let Some(v) = value.as_f64() {
        Some(PropertyValue::Float(v as f32))
    } else {
        value.as_str().map(|s| PropertyValue::String(s.to_owned()))
    }
}

/// Properties whose value cannot be decoded are skipped with a warning
/// rather than failing the whole level.
pub fn properties_from_descriptions(descriptions: &[PropertyDescription]) -> Properties {
    let mut out = Properties::new();
    for description in descriptions {
        match description.to_value() {
            Some(value) => out.insert(description.name.clone(), value),
            None => warn!(
                name = %description.name,
                kind = ?description.kind,
                "property_value_undecodable_skipped"
            ),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn describe(name: &str, kind: Option<&str>, value: JsonValue) -> PropertyDescription {
        PropertyDescription {
            name: name.to_string(),
            kind: kind.map(str::to_string),
            value,
        }
    }

    #[test]
    fn typed_properties_decode_to_matching_variants() {
        let props = properties_from_descriptions(&[
            describe("collision", Some("bool"), json!(true)),
            describe("controls", Some("object"), json!(12)),
            describe("speed", Some("float"), json!(1.5)),
            describe("state", Some("string"), json!("burning")),
        ]);

        assert_eq!(props.get_bool("collision"), Some(true));
        assert_eq!(props.get_u32("controls"), Some(12));
        assert_eq!(props.get_f32("speed"), Some(1.5));
        assert_eq!(props.get_str("state"), Some("burning"));
    }

    #[test]
    fn untyped_properties_are_inferred() {
        let props = properties_from_descriptions(&[
            describe("a", None, json!(false)),
            describe("b", None, json!(7)),
            describe("c", None, json!("x")),
        ]);
        assert_eq!(props.get_bool("a"), Some(false));
        assert_eq!(props.get_i64("b"), Some(7));
        assert_eq!(props.get_str("c"), Some("x"));
    }

    #[test]
    fn mistyped_value_is_skipped() {
        let props = properties_from_descriptions(&[describe("broken", Some("bool"), json!("no"))]);
        assert!(props.is_empty());
    }

    #[test]
    fn string_booleans_are_accepted() {
        let mut props = Properties::new();
        props.insert("collision", PropertyValue::String("true".to_string()));
        assert_eq!(props.get_bool("collision"), Some(true));
    }
}
