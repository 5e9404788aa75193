use crate::error::Result;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value as JsonValue;

/// One rowset row: friendly column name to coerced scalar value.
///
/// Insertion order follows the response schema, so JSON output keeps
/// the column order the server declared. Rows are emitted the moment
/// their closing tag is seen; they are never buffered as a set when
/// streaming.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<(String, JsonValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: JsonValue) {
        self.values.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Serialize as a single JSON object line, the unit of the
    /// streaming output contract.
    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_line_preserves_insertion_order() {
        let mut row = Row::new();
        row.push("Zeta", json!(1));
        row.push("Alpha", json!("x"));
        assert_eq!(row.to_json_line().unwrap(), r#"{"Zeta":1,"Alpha":"x"}"#);
    }

    #[test]
    fn get_by_friendly_name() {
        let mut row = Row::new();
        row.push("Amount", json!(12.5));
        assert_eq!(row.get("Amount"), Some(&json!(12.5)));
        assert_eq!(row.get("Missing"), None);
    }
}
