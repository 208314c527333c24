//! Rows.
//!
//! A row is an ordered map from column name to a scalar [Value].  Rows in the same batch don't have to agree on their
//! columns; the writer works out the union.
//!
//! Missing columns and columns holding [Value::Null] are treated the same way everywhere in this crate: both end up as
//! SQL `NULL`.
use smallvec::SmallVec;

use crate::{Error, Result};

/// A single scalar value in a row.
///
/// There is no declared column type in the tables this crate creates, so the value's own type is what sqlite stores.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    /// Stored by sqlite as the integers 0 and 1, and read back as [Value::Integer].
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    /// Never produced by [Row::from_serialize], but may come back from reads of data written by something else.
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn from_json(value: serde_json::Value) -> Value {
        use serde_json::Value as J;

        match value {
            J::Null => Value::Null,
            J::Bool(b) => Value::Bool(b),
            J::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else if n.is_f64() {
                    Value::Real(n.as_f64().unwrap_or(f64::NAN))
                } else {
                    // Integers past i64 would lose digits as reals, so they keep every digit as text.
                    Value::Text(n.to_string())
                }
            }
            J::String(s) => Value::Text(s),
            // Nested data goes in as JSON text, which sqlite's json functions can still get at.
            nested @ (J::Array(_) | J::Object(_)) => Value::Text(nested.to_string()),
        }
    }

    /// With `wide_integers`, text holding an integer too big for [Value::Integer] comes back as a number.
    fn to_json(&self, wide_integers: bool) -> serde_json::Value {
        use serde_json::Value as J;

        match self {
            Value::Text(s) if wide_integers && is_wide_integer(s) => s
                .parse::<serde_json::Number>()
                .map(J::Number)
                .unwrap_or_else(|_| J::String(s.clone())),
            Value::Null => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::Integer(i) => J::from(*i),
            Value::Real(f) => serde_json::Number::from_f64(*f)
                .map(J::Number)
                .unwrap_or(J::Null),
            Value::Text(s) => J::String(s.clone()),
            Value::Blob(b) => J::from(b.clone()),
        }
    }
}

fn is_wide_integer(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) && s.parse::<i64>().is_err()
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Value {
                Value::Integer(v.into())
            }
        })*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(v: f32) -> Value {
        Value::Real(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Value {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Value {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// We build and throw away a row per record written, so keep small rows off the heap.
#[derive(Clone, Debug, PartialEq)]
struct RowEntry {
    name: String,
    value: Value,
}

/// A row: column names mapped to values, in insertion order.
///
/// Rows compare equal when they have the same columns, in the same order, with the same values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    entries: SmallVec<[RowEntry; 16]>,
}

impl Row {
    pub fn new() -> Row {
        Default::default()
    }

    /// Builder-style [Row::insert].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Row {
        self.insert(name, value);
        self
    }

    /// Set a column, returning the old value if there was one.  An existing column keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let name = name.into();
        let value = value.into();

        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(e) => Some(std::mem::replace(&mut e.value, value)),
            None => {
                self.entries.push(RowEntry { name, value });
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.value)
    }

    /// True if the column is missing or holds [Value::Null].
    pub fn is_null(&self, name: &str) -> bool {
        self.get(name).map_or(true, Value::is_null)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|e| (e.name.as_str(), &e.value))
    }

    /// Build a row from anything serde can turn into a map, e.g. a struct or a `HashMap`.
    ///
    /// Nested arrays and objects become JSON text.  Since this goes through `serde_json`'s map, columns come out
    /// sorted by name rather than in field order.
    pub fn from_serialize(value: &impl serde::Serialize) -> Result<Row> {
        match serde_json::to_value(value)? {
            serde_json::Value::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| (k, Value::from_json(v)))
                .collect()),
            other => Err(Error::Database(format!(
                "Rows must serialize to a map, but got {}",
                other
            ))),
        }
    }

    /// Convert this row into some deserializable type, usually a struct matching the columns of a query.
    ///
    /// Integers too big for sqlite were written as text.  If the row doesn't fit `T` as it is, it is tried once more
    /// with those read as numbers.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        match serde_json::from_value(self.to_json(false)) {
            Ok(x) => Ok(x),
            Err(e) if self.iter().any(|(_, v)| matches!(v, Value::Text(s) if is_wide_integer(s))) => {
                serde_json::from_value(self.to_json(true)).map_err(|_| e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn to_json(&self, wide_integers: bool) -> serde_json::Value {
        serde_json::Value::Object(
            self.iter()
                .map(|(k, v)| (k.to_string(), v.to_json(wide_integers)))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Row {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}
