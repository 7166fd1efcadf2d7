use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// A persisted property value, postcard encoded.
///
/// Stores treat it as an opaque blob; only the target type knows how to decode it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Value(Vec<u8>);

/// One logical record per key: property name to its last persisted value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record(BTreeMap<String, Value>);

// Implementations

impl Value {
    pub fn encode<T>(value: &T) -> anyhow::Result<Self>
    where
        T: Serialize + ?Sized,
    {
        Ok(Self(postcard::to_stdvec(value)?))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        Ok(postcard::from_bytes(&self.0)?)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.0.get(property)
    }

    /// Decode a property straight into `T`, `None` if it was never persisted.
    pub fn get_as<T: DeserializeOwned>(&self, property: &str) -> Option<anyhow::Result<T>> {
        self.get(property).map(Value::decode)
    }

    pub fn set(&mut self, property: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(property.into(), value)
    }

    pub fn remove(&mut self, property: &str) -> Option<Value> {
        self.0.remove(property)
    }

    pub fn contains(&self, property: &str) -> bool {
        self.0.contains_key(property)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
