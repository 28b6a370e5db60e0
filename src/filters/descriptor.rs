//! Declarative, serializable filter descriptors: the wire format a task's
//! `filters` field carries, and the input [`crate::filters::FilterFactory`] consumes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// `{"type": "blur", "radius": 5}` — a filter's name plus its constructor
/// parameters, exactly as it travels over the wire or sits in a task record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterDescriptor {
    #[serde(rename = "type")]
    pub filter_type: String,
    #[serde(flatten)]
    pub params: HashMap<String, Value>,
}

impl FilterDescriptor {
    pub fn new(filter_type: impl Into<String>) -> Self {
        Self {
            filter_type: filter_type.into(),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn get_f32(&self, key: &str) -> Option<f32> {
        self.params.get(key).and_then(Value::as_f64).map(|v| v as f32)
    }

    /// Normalizes a wire-level `filters` array that may mix bare filter-name
    /// strings (`"grayscale"`) with full descriptor objects
    /// (`{"type": "blur", "radius": 5}`), matching the original façade's
    /// `[{"type": f} for f in filters]` behavior for bare strings.
    pub fn normalize_wire(values: &[Value]) -> Vec<FilterDescriptor> {
        values
            .iter()
            .filter_map(|v| match v {
                Value::String(name) => Some(FilterDescriptor::new(name.clone())),
                Value::Object(_) => serde_json::from_value(v.clone()).ok(),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_wire_accepts_bare_strings_and_objects() {
        let values = vec![json!("grayscale"), json!({"type": "blur", "radius": 5})];
        let descriptors = FilterDescriptor::normalize_wire(&values);
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].filter_type, "grayscale");
        assert_eq!(descriptors[1].filter_type, "blur");
        assert_eq!(descriptors[1].get_f32("radius"), Some(5.0));
    }

    #[test]
    fn normalize_wire_skips_unrepresentable_entries() {
        let values = vec![json!(42), json!(null)];
        let descriptors = FilterDescriptor::normalize_wire(&values);
        assert!(descriptors.is_empty());
    }

    #[test]
    fn round_trips_through_json() {
        let descriptor = FilterDescriptor::new("brightness").with_param("factor", 1.5);
        let json = serde_json::to_value(&descriptor).unwrap();
        let back: FilterDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, descriptor);
    }
}
