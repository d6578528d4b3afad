//! Multi-valued maps for concrete requests/responses and their matcher counterparts.
//!
//! Concrete maps (`MultiMap`, `CookieMap`) hold what was actually sent. Matcher maps
//! (`KeyMatchers`, `CookieMatchers`) hold `NottableString` names and values.
//!
//! Both accept the object form (`{"name": ["v1", "v2"]}`) and the array form
//! (`[{"name": "n", "values": ["v1"]}]`) on input.

use super::nottable::NottableString;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Ordered multi-valued map. Name lookups ignore ASCII case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiMap {
    entries: Vec<(String, Vec<String>)>,
}

impl MultiMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[(String, Vec<String>)] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.position(name).map(|i| self.entries[i].1.as_slice())
    }

    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    /// Append a value, merging into an existing entry with the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(i) => self.entries[i].1.push(value.into()),
            None => self.entries.push((name, vec![value.into()])),
        }
    }

    /// Set all values for a name, replacing any existing entry in place.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(i) => self.entries[i].1 = values,
            None => self.entries.push((name, values)),
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        before != self.entries.len()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

impl FromIterator<(String, String)> for MultiMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut map = MultiMap::new();
        for (name, value) in iter {
            map.append(name, value);
        }
        map
    }
}

impl Serialize for MultiMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, values) in &self.entries {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MultiMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let mut map = MultiMap::new();
        for (name, values) in multi_entries(raw).map_err(D::Error::custom)? {
            let name = name_text(&name).map_err(D::Error::custom)?;
            if values.is_empty() && !map.contains(&name) {
                map.insert(name.clone(), Vec::new());
            }
            for value in values {
                map.append(name.clone(), value_text(value));
            }
        }
        Ok(map)
    }
}

/// Ordered single-valued cookie map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CookieMap {
    entries: Vec<(String, String)>,
}

impl CookieMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replace the value of an existing cookie. Returns false when absent.
    pub fn replace(&mut self, name: &str, value: &str) -> bool {
        let mut replaced = false;
        for (n, v) in self.entries.iter_mut() {
            if n == name {
                *v = value.to_string();
                replaced = true;
            }
        }
        replaced
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| n != name);
        before != self.entries.len()
    }

    /// Parse `Cookie` header values (`a=b; c=d`).
    pub fn parse_header<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut cookies = CookieMap::new();
        for value in values {
            for pair in value.split(';') {
                let pair = pair.trim();
                if pair.is_empty() {
                    continue;
                }
                match pair.split_once('=') {
                    Some((name, value)) => cookies.push(name.trim(), value.trim()),
                    None => cookies.push(pair, ""),
                }
            }
        }
        cookies
    }

    /// Render as a single `Cookie` header value.
    pub fn to_header(&self) -> String {
        self.entries
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl Serialize for CookieMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CookieMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let mut cookies = CookieMap::new();
        for (name, value) in single_entries(raw).map_err(D::Error::custom)? {
            cookies.push(name_text(&name).map_err(D::Error::custom)?, value_text(value));
        }
        Ok(cookies)
    }
}

/// A matcher entry: a name with the values it must carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyToMultiValue {
    pub name: NottableString,
    #[serde(default)]
    pub values: Vec<NottableString>,
}

impl KeyToMultiValue {
    pub fn new(name: impl Into<NottableString>, values: Vec<NottableString>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Matcher entries for headers, query parameters or path parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyMatchers(pub Vec<KeyToMultiValue>);

impl KeyMatchers {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KeyToMultiValue> {
        self.0.iter()
    }
}

impl Serialize for KeyMatchers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for KeyMatchers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let mut out = Vec::new();
        for (name, values) in multi_entries(raw).map_err(D::Error::custom)? {
            let name: NottableString = serde_json::from_value(name).map_err(D::Error::custom)?;
            let values = values
                .into_iter()
                .map(serde_json::from_value)
                .collect::<Result<Vec<NottableString>, _>>()
                .map_err(D::Error::custom)?;
            out.push(KeyToMultiValue { name, values });
        }
        Ok(KeyMatchers(out))
    }
}

/// A cookie matcher entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyToValue {
    pub name: NottableString,
    pub value: NottableString,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CookieMatchers(pub Vec<KeyToValue>);

impl CookieMatchers {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KeyToValue> {
        self.0.iter()
    }
}

impl Serialize for CookieMatchers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CookieMatchers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let mut out = Vec::new();
        for (name, value) in single_entries(raw).map_err(D::Error::custom)? {
            out.push(KeyToValue {
                name: serde_json::from_value(name).map_err(D::Error::custom)?,
                value: serde_json::from_value(value).map_err(D::Error::custom)?,
            });
        }
        Ok(CookieMatchers(out))
    }
}

/// Normalize either wire form into `(name, values)` pairs.
fn multi_entries(raw: Value) -> Result<Vec<(Value, Vec<Value>)>, String> {
    match raw {
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(name, values)| (Value::String(name), one_or_many(values)))
            .collect()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(mut entry) => {
                    let name = entry
                        .remove("name")
                        .ok_or_else(|| "entry is missing \"name\"".to_string())?;
                    let values = entry
                        .remove("values")
                        .or_else(|| entry.remove("value"))
                        .map(one_or_many)
                        .unwrap_or_default();
                    Ok((name, values))
                }
                other => Err(format!("expected an object entry, found {other}")),
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(format!("expected an object or array, found {other}")),
    }
}

fn single_entries(raw: Value) -> Result<Vec<(Value, Value)>, String> {
    match raw {
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(name, value)| (Value::String(name), value))
            .collect()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(mut entry) => {
                    let name = entry
                        .remove("name")
                        .ok_or_else(|| "entry is missing \"name\"".to_string())?;
                    let value = entry
                        .remove("value")
                        .ok_or_else(|| "entry is missing \"value\"".to_string())?;
                    Ok((name, value))
                }
                other => Err(format!("expected an object entry, found {other}")),
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(format!("expected an object or array, found {other}")),
    }
}

fn one_or_many(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    }
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn name_text(name: &Value) -> Result<String, String> {
    match name {
        Value::String(s) => Ok(s.clone()),
        other => Err(format!("expected a string name, found {other}")),
    }
}
