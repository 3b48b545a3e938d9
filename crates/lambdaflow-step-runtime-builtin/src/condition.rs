//! Declarative condition groups.
//!
//! Conditions are data, not code: a group of `{field, operator, value}`
//! comparisons joined by `and`/`or`, evaluated against the step input.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::step::lookup;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Logic {
  #[default]
  And,
  Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
  #[serde(alias = "==")]
  Eq,
  #[serde(alias = "!=")]
  Ne,
  #[serde(alias = ">")]
  Gt,
  #[serde(alias = ">=")]
  Gte,
  #[serde(alias = "<")]
  Lt,
  #[serde(alias = "<=")]
  Lte,
  Contains,
  NotContains,
  StartsWith,
  EndsWith,
  Empty,
  NotEmpty,
  Exists,
  NotExists,
}

/// One comparison. `field` is a dotted path into the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
  pub field: String,
  pub operator: Operator,
  #[serde(default)]
  pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
  #[serde(default)]
  pub logic: Logic,
  #[serde(default)]
  pub conditions: Vec<Condition>,
}

impl ConditionGroup {
  /// An empty `and` group passes; an empty `or` group fails.
  pub fn evaluate(&self, input: &Value) -> bool {
    match self.logic {
      Logic::And => self.conditions.iter().all(|c| c.evaluate(input)),
      Logic::Or => self.conditions.iter().any(|c| c.evaluate(input)),
    }
  }
}

impl Condition {
  pub fn evaluate(&self, input: &Value) -> bool {
    let actual = lookup(input, &self.field);
    let expected = &self.value;

    match self.operator {
      Operator::Eq => equals(actual, expected),
      Operator::Ne => !equals(actual, expected),
      Operator::Gt => compare(actual, expected, |a, b| a > b),
      Operator::Gte => compare(actual, expected, |a, b| a >= b),
      Operator::Lt => compare(actual, expected, |a, b| a < b),
      Operator::Lte => compare(actual, expected, |a, b| a <= b),
      Operator::Contains => contains(actual, expected),
      Operator::NotContains => !contains(actual, expected),
      Operator::StartsWith => actual
        .and_then(Value::as_str)
        .is_some_and(|s| s.starts_with(&display(expected))),
      Operator::EndsWith => actual
        .and_then(Value::as_str)
        .is_some_and(|s| s.ends_with(&display(expected))),
      Operator::Empty => is_empty(actual),
      Operator::NotEmpty => !is_empty(actual),
      Operator::Exists => actual.is_some_and(|v| !v.is_null()),
      Operator::NotExists => actual.is_none_or(Value::is_null),
    }
  }
}

fn display(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

fn number(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok(),
    _ => None,
  }
}

fn equals(actual: Option<&Value>, expected: &Value) -> bool {
  let Some(actual) = actual else {
    return expected.is_null();
  };
  match (number(actual), number(expected)) {
    (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
    _ if actual.is_object() || actual.is_array() => actual == expected,
    _ => display(actual) == display(expected),
  }
}

fn compare(actual: Option<&Value>, expected: &Value, op: fn(f64, f64) -> bool) -> bool {
  match (actual.and_then(number), number(expected)) {
    (Some(a), Some(b)) => op(a, b),
    _ => false,
  }
}

fn contains(actual: Option<&Value>, expected: &Value) -> bool {
  match actual {
    Some(Value::String(s)) => s.contains(&display(expected)),
    Some(Value::Array(items)) => items.iter().any(|item| equals(Some(item), expected)),
    Some(Value::Object(map)) => expected.as_str().is_some_and(|key| map.contains_key(key)),
    _ => false,
  }
}

fn is_empty(actual: Option<&Value>) -> bool {
  match actual {
    None | Some(Value::Null) => true,
    Some(Value::String(s)) => s.is_empty(),
    Some(Value::Array(items)) => items.is_empty(),
    Some(Value::Object(map)) => map.is_empty(),
    Some(_) => false,
  }
}
