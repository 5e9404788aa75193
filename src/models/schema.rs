use crate::error::{Result, XmlaLinkError};
use serde_json::Value as JsonValue;

/// Declared wire type of a rowset column.
///
/// Discovered from the `xsd:element` declarations that precede the row
/// data in an XMLA response. Unknown types fall back to [`ColumnType::Text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Double,
    Boolean,
    Text,
}

impl ColumnType {
    /// Map a wire type name (e.g. `xsd:int`, `xsd:double`) to a column type.
    /// The namespace prefix is stripped before matching.
    pub fn from_wire(type_name: &str) -> Self {
        let local = match type_name.rsplit_once(':') {
            Some((_, local)) => local,
            None => type_name,
        };
        match local {
            "int" | "long" | "integer" | "short" => ColumnType::Int,
            "double" | "float" | "decimal" => ColumnType::Double,
            "boolean" => ColumnType::Boolean,
            _ => ColumnType::Text,
        }
    }

    /// Coerce element text into a typed JSON value.
    ///
    /// Booleans are `true` unless the text is literally `"false"`.
    /// Unparseable numerics are a protocol-format violation, not a
    /// silent fallback to string.
    pub fn coerce(&self, text: &str, column: &str) -> Result<JsonValue> {
        match self {
            ColumnType::Int => text.parse::<i64>().map(JsonValue::from).map_err(|_| {
                XmlaLinkError::Protocol {
                    description: format!("column '{}': '{}' is not a valid integer", column, text),
                    code: "coercion".to_string(),
                }
            }),
            ColumnType::Double => text.parse::<f64>().map(JsonValue::from).map_err(|_| {
                XmlaLinkError::Protocol {
                    description: format!("column '{}': '{}' is not a valid double", column, text),
                    code: "coercion".to_string(),
                }
            }),
            ColumnType::Boolean => Ok(JsonValue::from(text != "false")),
            ColumnType::Text => Ok(JsonValue::from(text)),
        }
    }
}

/// One column of a rowset schema.
///
/// Schema is scoped to a single response; a new response re-derives it.
#[derive(Debug, Clone)]
pub struct SchemaColumn {
    /// Human-facing column name from the `sql:field` attribute.
    pub friendly_name: String,
    /// Element name used in `<row>` children, stored lower-cased.
    pub wire_name: String,
    pub data_type: ColumnType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_wire_strips_namespace_prefix() {
        assert_eq!(ColumnType::from_wire("xsd:int"), ColumnType::Int);
        assert_eq!(ColumnType::from_wire("xsd:double"), ColumnType::Double);
        assert_eq!(ColumnType::from_wire("xsd:boolean"), ColumnType::Boolean);
        assert_eq!(ColumnType::from_wire("xsd:string"), ColumnType::Text);
        assert_eq!(ColumnType::from_wire("double"), ColumnType::Double);
        assert_eq!(ColumnType::from_wire("xsd:anyURI"), ColumnType::Text);
    }

    #[test]
    fn coercion_table() {
        assert_eq!(ColumnType::Int.coerce("42", "c").unwrap(), json!(42));
        assert_eq!(ColumnType::Double.coerce("3.14", "c").unwrap(), json!(3.14));
        assert_eq!(ColumnType::Boolean.coerce("false", "c").unwrap(), json!(false));
        assert_eq!(ColumnType::Boolean.coerce("true", "c").unwrap(), json!(true));
        assert_eq!(ColumnType::Text.coerce("xyz", "c").unwrap(), json!("xyz"));
    }

    #[test]
    fn boolean_is_true_unless_literally_false() {
        assert_eq!(ColumnType::Boolean.coerce("0", "c").unwrap(), json!(true));
        assert_eq!(ColumnType::Boolean.coerce("False", "c").unwrap(), json!(true));
    }

    #[test]
    fn unparseable_numerics_are_protocol_errors() {
        let err = ColumnType::Int.coerce("abc", "amount").unwrap_err();
        assert!(err.to_string().contains("amount"));
        assert!(ColumnType::Double.coerce("n/a", "amount").is_err());
    }
}
