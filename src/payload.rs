use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::value::Value;

/**
An event payload: an unordered mapping from field names to loosely typed
[`Value`]s.

A payload handed to [`Client::append`](crate::Client::append) is a raw event.
It carries whatever fields describe the thing that happened, with only one
requirement: a `service` field that resolves to a non-empty string. The
client normalizes the raw event into its canonical wire shape before
sending; see [`Client::append`](crate::Client::append) for the rules.

The [`payload!`](crate::payload!) macro is the usual way to build one:

```
let payload = mettric::payload! {
    service: "charge.created",
    tags: ["stripe"],
};

assert_eq!("charge.created", payload.get("service").and_then(|v| v.as_str()).unwrap());
```
*/
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Payload(BTreeMap<String, Value>);

impl Payload {
    /**
    Create an empty payload.
    */
    pub fn new() -> Self {
        Payload(BTreeMap::new())
    }

    /**
    Set a field, replacing any previous value for the same name.
    */
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /**
    Get a field by name.
    */
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /**
    Remove a field by name, returning its value if it was present.
    */
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /**
    Whether a field with the given name is present.
    */
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /**
    The number of fields in the payload.
    */
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /**
    Whether the payload has no fields.
    */
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /**
    Iterate over the payload's fields.
    */
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Payload(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/**
Build a [`Payload`] from field names and values.

```
let payload = mettric::payload! {
    service: "charge.created",
    metric: 3,
    tags: ["stripe"],
};

assert_eq!(3, payload.len());
```
*/
#[macro_export]
macro_rules! payload {
    ($($key:ident: $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut payload = $crate::Payload::new();
        $(
            payload.insert(stringify!($key), $value);
        )*
        payload
    }};
}
