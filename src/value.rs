use std::borrow::Cow;

use serde::{Serialize, Serializer};

/**
A loosely typed value in an event [`Payload`](crate::Payload).

Callers hand the client whatever shape describes their event: strings for
names and descriptions, numbers for the metric, a sequence for tags. The
conversions on this type mean most call sites never name it directly:

```
let mut payload = mettric::Payload::new();

payload.insert("service", "charge.created");
payload.insert("metric", 3);
payload.insert("tags", ["stripe"]);
```
*/
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /**
    A string.
    */
    String(String),
    /**
    An integer.
    */
    Int(i64),
    /**
    A floating point number.
    */
    Float(f64),
    /**
    A boolean.
    */
    Bool(bool),
    /**
    A sequence of values, used for tags.
    */
    Seq(Vec<Value>),
}

impl Value {
    /**
    Get the value as a borrowed string, if it is one.
    */
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    // Scalars render to their display form; sequences have no text form
    pub(crate) fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::String(value) => Some(Cow::Borrowed(value)),
            Value::Int(value) => Some(Cow::Owned(value.to_string())),
            Value::Float(value) => Some(Cow::Owned(value.to_string())),
            Value::Bool(value) => Some(Cow::Owned(value.to_string())),
            Value::Seq(_) => None,
        }
    }

    // Flattens nested sequences, stringifying each scalar in order
    pub(crate) fn collect_tags(&self, tags: &mut Vec<String>) {
        match self {
            Value::Seq(values) => {
                for value in values {
                    value.collect_tags(tags);
                }
            }
            scalar => {
                if let Some(text) = scalar.as_text() {
                    tags.push(text.into_owned());
                }
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::String(value) => serializer.serialize_str(value),
            Value::Int(value) => serializer.serialize_i64(*value),
            Value::Float(value) => serializer.serialize_f64(*value),
            Value::Bool(value) => serializer.serialize_bool(*value),
            Value::Seq(values) => serializer.collect_seq(values),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::Seq(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(values: [T; N]) -> Self {
        Value::Seq(values.into_iter().map(Into::into).collect())
    }
}
