use rusqlite::types::Value;

use crate::config::AttributeType;
use crate::error::{TileError, TileResult};
use crate::registry::FeatureCollection;

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
}

impl FilterValue {
    pub fn parse(attribute: &str, kind: AttributeType, raw: &str) -> TileResult<Self> {
        let invalid = |expected: &'static str| TileError::InvalidFilterValue {
            attribute: attribute.to_string(),
            value: raw.to_string(),
            expected,
        };
        match kind {
            AttributeType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(FilterValue::Integer)
                .map_err(|_| invalid("an integer")),
            AttributeType::Float => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(FilterValue::Float)
                .ok_or_else(|| invalid("a number")),
            AttributeType::Text => Ok(FilterValue::Text(raw.to_string())),
            AttributeType::Boolean => match raw.trim() {
                "True" | "true" | "1" => Ok(FilterValue::Boolean(true)),
                "False" | "false" | "0" => Ok(FilterValue::Boolean(false)),
                _ => Err(invalid("True or False")),
            },
        }
    }

    pub fn to_sql(&self) -> Value {
        match self {
            FilterValue::Integer(value) => Value::Integer(*value),
            FilterValue::Float(value) => Value::Real(*value),
            FilterValue::Text(value) => Value::Text(value.clone()),
            FilterValue::Boolean(value) => Value::Integer(i64::from(*value)),
        }
    }
}

// Equality constraint on one column; several values mean "any of".
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub values: Vec<FilterValue>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterSet {
    pub filters: Vec<Filter>,
}

impl FilterSet {
    pub fn parse(
        pairs: &[(String, String)],
        layer: &str,
        collection: &FeatureCollection,
    ) -> TileResult<Self> {
        let mut filters: Vec<Filter> = Vec::new();
        for (key, raw) in pairs {
            let kind = if key == "id" {
                AttributeType::Integer
            } else {
                collection
                    .attribute(key)
                    .map(|attr| attr.kind)
                    .ok_or_else(|| TileError::UnknownAttribute {
                        layer: layer.to_string(),
                        attribute: key.clone(),
                    })?
            };
            let value = FilterValue::parse(key, kind, raw)?;
            match filters.iter_mut().find(|filter| &filter.column == key) {
                Some(filter) => filter.values.push(value),
                None => filters.push(Filter {
                    column: key.clone(),
                    values: vec![value],
                }),
            }
        }
        Ok(Self { filters })
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
