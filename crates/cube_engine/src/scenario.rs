//! Value lookup against the loaded scenario document.
//!
//! The engines never see the scenario backend directly: they read values
//! through [`ScenarioStore::value_by_path`], a synchronous in-memory lookup.

use serde_json::Value;

/// Read access to a nested scenario document.
pub trait ScenarioStore {
    /// Value at `path`, or `None` when any segment is missing.
    ///
    /// JSON `null` is reported as missing.
    fn value_by_path(&self, path: &[String]) -> Option<Value>;

    /// Value at `path`, falling back to `default`.
    fn value_by_path_or(&self, path: &[String], default: Value) -> Value {
        self.value_by_path(path).unwrap_or(default)
    }
}

impl<F> ScenarioStore for F
where
    F: Fn(&[String]) -> Option<Value>,
{
    fn value_by_path(&self, path: &[String]) -> Option<Value> {
        self(path)
    }
}

/// Build an owned path from string segments.
pub fn to_path(segments: &[&str]) -> Vec<String> {
    segments.iter().map(|s| s.to_string()).collect()
}

/// Scenario document held as a `serde_json::Value`.
///
/// Object segments are matched by key; array segments by decimal index.
///
/// # Examples
///
/// ```
/// use cube_engine::scenario::{to_path, JsonScenario, ScenarioStore};
/// use serde_json::json;
///
/// let scenario = JsonScenario::new(json!({
///     "settings": {"financing": {"discountRate": 0.08}},
///     "costs": {"capex": [{"year": 0, "value": -150.0}]}
/// }));
///
/// let rate = scenario.value_by_path(&to_path(&["settings", "financing", "discountRate"]));
/// assert_eq!(rate, Some(json!(0.08)));
///
/// let first = scenario.value_by_path(&to_path(&["costs", "capex", "0", "value"]));
/// assert_eq!(first, Some(json!(-150.0)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct JsonScenario {
    document: Value,
}

impl JsonScenario {
    /// Wrap a parsed document.
    pub fn new(document: Value) -> Self {
        Self { document }
    }

    /// Parse a document from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    /// The underlying document.
    pub fn document(&self) -> &Value {
        &self.document
    }
}

impl ScenarioStore for JsonScenario {
    fn value_by_path(&self, path: &[String]) -> Option<Value> {
        let mut current = &self.document;
        for segment in path {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        match current {
            Value::Null => None,
            other => Some(other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_segments() {
        let scenario = JsonScenario::new(json!({"a": {"b": [1, 2]}, "n": null}));
        assert_eq!(scenario.value_by_path(&to_path(&["a", "b", "1"])), Some(json!(2)));
        assert_eq!(scenario.value_by_path(&to_path(&["a", "b", "7"])), None);
        assert_eq!(scenario.value_by_path(&to_path(&["a", "b", "x"])), None);
        assert_eq!(scenario.value_by_path(&to_path(&["a", "c"])), None);
        assert_eq!(scenario.value_by_path(&to_path(&["n"])), None);
    }

    #[test]
    fn test_empty_path_is_document() {
        let scenario = JsonScenario::new(json!({"k": 1}));
        assert_eq!(scenario.value_by_path(&[]), Some(json!({"k": 1})));
    }

    #[test]
    fn test_default_value() {
        let scenario = JsonScenario::new(json!({}));
        assert_eq!(scenario.value_by_path_or(&to_path(&["x"]), json!(3)), json!(3));
    }

    #[test]
    fn test_closure_store() {
        let store = |path: &[String]| (path.len() == 1).then(|| json!(path[0].len()));
        assert_eq!(store.value_by_path(&to_path(&["abc"])), Some(json!(3)));
    }

    #[test]
    fn test_from_json() {
        let scenario = JsonScenario::from_json(r#"{"x": [10]}"#).unwrap();
        assert_eq!(scenario.value_by_path(&to_path(&["x", "0"])), Some(json!(10)));
        assert!(JsonScenario::from_json("{").is_err());
    }
}
