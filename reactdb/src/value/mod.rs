// Typed values: what columns store, what rows return and what inserts accept

use crate::error::{ReactDbError, Result};
use crate::model::Row;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// The three scalar column kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    String,
    Number,
    Boolean,
}

impl ScalarKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Number => "number",
            ScalarKind::Boolean => "boolean",
        }
    }

    /// Value given to a column that was not supplied on insert.
    pub fn default_value(&self) -> Scalar {
        match self {
            ScalarKind::String => Scalar::String(String::new()),
            ScalarKind::Number => Scalar::Number(0.0),
            ScalarKind::Boolean => Scalar::Boolean(false),
        }
    }
}

/// A scalar column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Boolean(bool),
    Number(f64),
    String(String),
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::String(_) => ScalarKind::String,
            Scalar::Number(_) => ScalarKind::Number,
            Scalar::Boolean(_) => ScalarKind::Boolean,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Order two scalars of the same kind. Mixed kinds are unordered.
    pub fn compare(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::String(a), Scalar::String(b)) => Some(a.cmp(b)),
            (Scalar::Number(a), Scalar::Number(b)) => a.partial_cmp(b),
            (Scalar::Boolean(a), Scalar::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Text form used by persistence: plain string, shortest number, `true`/`false`.
    pub fn to_text(&self) -> String {
        match self {
            Scalar::String(s) => s.clone(),
            Scalar::Number(n) => n.to_string(),
            Scalar::Boolean(b) => b.to_string(),
        }
    }

    /// Parse the text form back into a scalar of `kind`.
    pub fn from_text(kind: ScalarKind, text: &str) -> Result<Scalar> {
        match kind {
            ScalarKind::String => Ok(Scalar::String(text.to_string())),
            ScalarKind::Number => text.trim().parse::<f64>().map(Scalar::Number).map_err(|_| {
                ReactDbError::TypeMismatch {
                    expected: "number",
                    found: "string",
                }
            }),
            ScalarKind::Boolean => Ok(Scalar::Boolean(text.trim() == "true")),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Scalar::String(s) => serde_json::Value::String(s.clone()),
            Scalar::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Scalar::Boolean(b) => serde_json::Value::Bool(*b),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// The current value of one column of one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Ref(Option<Row>),
    Refs(Vec<Row>),
}

impl Value {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_str)
    }

    pub fn as_number(&self) -> Option<f64> {
        self.as_scalar().and_then(Scalar::as_number)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_scalar().and_then(Scalar::as_bool)
    }

    /// The referenced row of a `ref` value.
    pub fn as_row(&self) -> Option<&Row> {
        match self {
            Value::Ref(row) => row.as_ref(),
            _ => None,
        }
    }

    /// The members of a `refs` value.
    pub fn as_rows(&self) -> Option<&[Row]> {
        match self {
            Value::Refs(rows) => Some(rows),
            _ => None,
        }
    }

    /// An empty `ref` cell.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Ref(None))
    }

    /// Text form used by persistence: ref as target id (or empty), refs as
    /// newline-joined ids.
    pub fn to_text(&self) -> String {
        match self {
            Value::Scalar(s) => s.to_text(),
            Value::Ref(Some(row)) => row.id().to_string(),
            Value::Ref(None) => String::new(),
            Value::Refs(rows) => rows
                .iter()
                .map(|r| r.id().to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<Scalar> for Value {
    fn from(value: Scalar) -> Self {
        Value::Scalar(value)
    }
}

/// A value supplied to `insert` or `set`.
#[derive(Debug, Clone)]
pub enum Input {
    Null,
    String(String),
    Number(f64),
    Boolean(bool),
    /// An existing row.
    Row(Row),
    /// A nested object, inserted into the relation's target model.
    Object(Fields),
    List(Vec<Input>),
}

impl Input {
    pub fn type_name(&self) -> &'static str {
        match self {
            Input::Null => "null",
            Input::String(_) => "string",
            Input::Number(_) => "number",
            Input::Boolean(_) => "boolean",
            Input::Row(_) => "row",
            Input::Object(_) => "object",
            Input::List(_) => "list",
        }
    }

    pub(crate) fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Input::String(s) => Some(Scalar::String(s.clone())),
            Input::Number(n) => Some(Scalar::Number(*n)),
            Input::Boolean(b) => Some(Scalar::Boolean(*b)),
            _ => None,
        }
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Input::String(value.to_string())
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Input::String(value)
    }
}

impl From<f64> for Input {
    fn from(value: f64) -> Self {
        Input::Number(value)
    }
}

impl From<i32> for Input {
    fn from(value: i32) -> Self {
        Input::Number(value as f64)
    }
}

impl From<i64> for Input {
    fn from(value: i64) -> Self {
        Input::Number(value as f64)
    }
}

impl From<bool> for Input {
    fn from(value: bool) -> Self {
        Input::Boolean(value)
    }
}

impl From<Row> for Input {
    fn from(value: Row) -> Self {
        Input::Row(value)
    }
}

impl From<&Row> for Input {
    fn from(value: &Row) -> Self {
        Input::Row(value.clone())
    }
}

impl From<Option<Row>> for Input {
    fn from(value: Option<Row>) -> Self {
        value.map(Input::Row).unwrap_or(Input::Null)
    }
}

impl From<Scalar> for Input {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::String(s) => Input::String(s),
            Scalar::Number(n) => Input::Number(n),
            Scalar::Boolean(b) => Input::Boolean(b),
        }
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        match value {
            Value::Scalar(s) => s.into(),
            Value::Ref(row) => row.into(),
            Value::Refs(rows) => Input::List(rows.into_iter().map(Input::Row).collect()),
        }
    }
}

impl From<Fields> for Input {
    fn from(value: Fields) -> Self {
        Input::Object(value)
    }
}

impl From<Vec<Input>> for Input {
    fn from(value: Vec<Input>) -> Self {
        Input::List(value)
    }
}

impl From<serde_json::Value> for Input {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Input::Null,
            serde_json::Value::Bool(b) => Input::Boolean(b),
            serde_json::Value::Number(n) => Input::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Input::String(s),
            serde_json::Value::Array(items) => {
                Input::List(items.into_iter().map(Input::from).collect())
            }
            serde_json::Value::Object(map) => Input::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Input::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Named inputs for one row, in the order they were given.
#[derive(Debug, Clone, Default)]
pub struct Fields {
    entries: Vec<(String, Input)>,
}

impl Fields {
    pub fn new() -> Self {
        Fields::default()
    }

    /// Builder form of [`Fields::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Input>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a field, replacing an earlier value with the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Input>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Input> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn remove(&mut self, name: &str) -> Option<Input> {
        let index = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Input)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build fields from a JSON object.
    pub fn from_json(value: serde_json::Value) -> Result<Fields> {
        match Input::from(value) {
            Input::Object(fields) => Ok(fields),
            other => Err(ReactDbError::TypeMismatch {
                expected: "object",
                found: other.type_name(),
            }),
        }
    }
}

impl<K: Into<String>, V: Into<Input>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.set(k, v);
        }
        fields
    }
}

impl IntoIterator for Fields {
    type Item = (String, Input);
    type IntoIter = std::vec::IntoIter<(String, Input)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_text_round_trip() {
        assert_eq!(Scalar::Number(25.0).to_text(), "25");
        assert_eq!(Scalar::Number(2.5).to_text(), "2.5");
        assert_eq!(
            Scalar::from_text(ScalarKind::Number, "2.5").unwrap(),
            Scalar::Number(2.5)
        );
        assert_eq!(
            Scalar::from_text(ScalarKind::Boolean, "true").unwrap(),
            Scalar::Boolean(true)
        );
        assert!(Scalar::from_text(ScalarKind::Number, "abc").is_err());
    }

    #[test]
    fn test_scalar_compare() {
        let a = Scalar::Number(13.0);
        let b = Scalar::Number(15.0);
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        assert_eq!(a.compare(&Scalar::String("13".into())), None);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(ScalarKind::String.default_value(), Scalar::String(String::new()));
        assert_eq!(ScalarKind::Number.default_value(), Scalar::Number(0.0));
        assert_eq!(ScalarKind::Boolean.default_value(), Scalar::Boolean(false));
    }

    #[test]
    fn test_fields_from_json() {
        let fields = Fields::from_json(json!({
            "name": "ookie",
            "phone": { "model": "nookiea" },
            "oshis": [{ "name": "ennaur" }]
        }))
        .unwrap();

        assert!(matches!(fields.get("name"), Some(Input::String(s)) if s == "ookie"));
        assert!(matches!(fields.get("phone"), Some(Input::Object(_))));
        assert!(matches!(fields.get("oshis"), Some(Input::List(items)) if items.len() == 1));
    }

    #[test]
    fn test_fields_from_json_rejects_non_object() {
        let err = Fields::from_json(json!([1, 2])).unwrap_err();
        assert_eq!(err.code(), "TYPE_MISMATCH");
    }

    #[test]
    fn test_fields_set_replaces() {
        let fields = Fields::new().with("age", 13).with("age", 27);
        assert_eq!(fields.len(), 1);
        assert!(matches!(fields.get("age"), Some(Input::Number(n)) if *n == 27.0));
    }
}
