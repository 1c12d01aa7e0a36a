//! Caller-facing query filters and the condition variants they carry.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// An abstract query: where-tree, ordering, window, and projection.
///
/// The where-clause keeps the relational-flavored JSON shape callers supply
/// (`{"age": {"gt": 21}}`, `{"or": [...]}`); translation to the store's
/// selector syntax happens in [`crate::selector`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    pub where_clause: Option<JsonValue>,
    pub order: Option<Vec<String>>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    pub fields: Option<Vec<String>>,
    /// Name of a specific index the store should use for this query
    pub use_index: Option<String>,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    pub fn with_where(mut self, where_clause: JsonValue) -> Self {
        self.where_clause = Some(where_clause);
        self
    }

    pub fn with_order(mut self, order: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.order = Some(order.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_use_index(mut self, index: impl Into<String>) -> Self {
        self.use_index = Some(index.into());
        self
    }
}

/// One field condition from a where-clause, decided once at
/// selector-construction time rather than re-inspected downstream.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Plain equality against a literal value
    Literal(JsonValue),
    /// An operator object such as `{"gt": 21}`; `options` carries regex
    /// flags for the `regexp` operator
    Operator {
        name: String,
        value: JsonValue,
        options: Option<String>,
    },
}

impl Condition {
    /// Classify a raw condition value. Any JSON object is an operator
    /// container whose first non-`options` key names the operator; every
    /// other value is literal equality.
    pub fn from_value(value: &JsonValue) -> Condition {
        let Some(map) = value.as_object() else {
            return Condition::Literal(value.clone());
        };
        let options = map
            .get("options")
            .and_then(|o| o.as_str())
            .map(String::from);
        match map.iter().find(|(k, _)| k.as_str() != "options") {
            Some((name, operand)) => Condition::Operator {
                name: name.clone(),
                value: operand.clone(),
                options,
            },
            None => Condition::Literal(value.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_condition_is_literal() {
        assert_eq!(
            Condition::from_value(&json!("ada")),
            Condition::Literal(json!("ada"))
        );
        assert_eq!(
            Condition::from_value(&json!([1, 2])),
            Condition::Literal(json!([1, 2]))
        );
    }

    #[test]
    fn test_operator_condition_carries_name_and_value() {
        assert_eq!(
            Condition::from_value(&json!({"gt": 21})),
            Condition::Operator {
                name: "gt".to_string(),
                value: json!(21),
                options: None,
            }
        );
    }

    #[test]
    fn test_regexp_condition_extracts_options() {
        assert_eq!(
            Condition::from_value(&json!({"regexp": "^a", "options": "i"})),
            Condition::Operator {
                name: "regexp".to_string(),
                value: json!("^a"),
                options: Some("i".to_string()),
            }
        );
    }

    #[test]
    fn test_filter_builder() {
        let filter = Filter::new()
            .with_where(json!({"age": {"gt": 0}}))
            .with_order(["age"])
            .with_limit(10)
            .with_skip(2)
            .with_fields(["age", "name"]);
        assert_eq!(filter.limit, Some(10));
        assert_eq!(filter.skip, Some(2));
        assert_eq!(filter.order.as_deref(), Some(&["age".to_string()][..]));
    }
}
