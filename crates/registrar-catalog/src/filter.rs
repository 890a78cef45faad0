//! Attribute filtering over service registrations.
//!
//! A filter is a dotted path into the JSON form of a [`Service`], an operator
//! and a value, e.g. `meta.location prefix building-1` or
//! `apis.0.protocol equals MQTT`.

use std::str::FromStr;

use serde_json::Value;

use crate::error::{CatalogError, Result};
use crate::service::Service;

/// Comparison applied to the value at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Exact match.
    Equals,
    /// Value starts with the operand.
    Prefix,
    /// Value ends with the operand.
    Suffix,
    /// Value contains the operand.
    Contains,
}

impl FilterOp {
    fn apply(self, candidate: &str, operand: &str) -> bool {
        match self {
            Self::Equals => candidate == operand,
            Self::Prefix => candidate.starts_with(operand),
            Self::Suffix => candidate.ends_with(operand),
            Self::Contains => candidate.contains(operand),
        }
    }
}

impl FromStr for FilterOp {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "equals" => Ok(Self::Equals),
            "prefix" => Ok(Self::Prefix),
            "suffix" => Ok(Self::Suffix),
            "contains" => Ok(Self::Contains),
            other => Err(CatalogError::bad_request(format!(
                "unknown filter operator: {other}"
            ))),
        }
    }
}

/// Compiled filter expression.
#[derive(Debug, Clone)]
pub struct Filter {
    path: Vec<String>,
    op: FilterOp,
    value: String,
}

impl Filter {
    /// Parses a filter from its path, operator name and operand.
    pub fn new(path: &str, op: &str, value: impl Into<String>) -> Result<Self> {
        if path.is_empty() {
            return Err(CatalogError::bad_request("filter path must not be empty"));
        }
        Ok(Self {
            path: path.split('.').map(ToOwned::to_owned).collect(),
            op: op.parse()?,
            value: value.into(),
        })
    }

    /// Evaluates the filter against a service.
    pub fn matches(&self, service: &Service) -> Result<bool> {
        let json = serde_json::to_value(service)?;
        Ok(self.matches_value(&json, &self.path))
    }

    fn matches_value(&self, value: &Value, path: &[String]) -> bool {
        let Some((segment, rest)) = path.split_first() else {
            return self.matches_leaf(value);
        };

        match value {
            Value::Object(map) => map
                .get(segment)
                .is_some_and(|child| self.matches_value(child, rest)),
            Value::Array(items) => match segment.parse::<usize>() {
                Ok(index) => items
                    .get(index)
                    .is_some_and(|child| self.matches_value(child, rest)),
                // Non-numeric segment: any element may match
                Err(_) => items.iter().any(|item| self.matches_value(item, path)),
            },
            _ => false,
        }
    }

    fn matches_leaf(&self, value: &Value) -> bool {
        match value {
            Value::String(s) => self.op.apply(s, &self.value),
            Value::Number(n) => self.op.apply(&n.to_string(), &self.value),
            Value::Bool(b) => self.op.apply(&b.to_string(), &self.value),
            Value::Array(items) => items.iter().any(|item| self.matches_leaf(item)),
            Value::Null | Value::Object(_) => false,
        }
    }
}
