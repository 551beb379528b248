//! Cache Key Module
//!
//! Derives stable cache keys from an operation name and its parameters.
//!
//! Parameters are modelled as [`ParamValue`], a JSON-shaped sum type whose
//! maps keep insertion order. Key derivation sorts map keys at every level
//! before rendering, so two structurally equal parameter bags always produce
//! the same key no matter how they were built.
//!
//! Inputs are assumed to be plain DTOs. Owned Rust values cannot form cycles,
//! and non-finite floats render as `null`, matching JSON.

use std::collections::BTreeMap;

use serde::{
    ser::{SerializeMap, SerializeSeq},
    Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::{Number, Value};

use crate::error::Result;

/// Separator between the operation name and the rendered parameters.
pub const KEY_SEPARATOR: &str = "::";

// == Param Value ==
/// Parameter bag used for cache-key derivation and tag building.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ParamValue {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<ParamValue>),
    /// Ordered as inserted; see [`ParamValue::canonicalize`]
    Map(Vec<(String, ParamValue)>),
}

impl ParamValue {
    /// Starts an empty map for builder-style construction.
    pub fn map() -> Self {
        ParamValue::Map(Vec::new())
    }

    /// Appends `key: value` to a map. On non-map values this is a no-op.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        if let ParamValue::Map(entries) = &mut self {
            entries.push((key.into(), value.into()));
        }
        self
    }

    /// Looks up a top-level map field. Later duplicates shadow earlier ones.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        match self {
            ParamValue::Map(entries) => entries
                .iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Renders scalars usable inside a tag: strings as-is, numbers and bools
    /// in their JSON form.
    pub fn as_tag_fragment(&self) -> Option<String> {
        match self {
            ParamValue::String(s) if !s.is_empty() => Some(s.clone()),
            ParamValue::Number(n) => Some(n.to_string()),
            ParamValue::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    // == Canonicalize ==
    /// Returns a copy with map keys sorted at every nesting level.
    ///
    /// A key repeated within one map keeps its last value.
    pub fn canonicalize(&self) -> ParamValue {
        match self {
            ParamValue::List(items) => {
                ParamValue::List(items.iter().map(ParamValue::canonicalize).collect())
            }
            ParamValue::Map(entries) => {
                let sorted: BTreeMap<&str, ParamValue> = entries
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.canonicalize()))
                    .collect();
                ParamValue::Map(
                    sorted
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v))
                        .collect(),
                )
            }
            scalar => scalar.clone(),
        }
    }

    /// Renders the canonical form as compact JSON.
    pub fn to_canonical_string(&self) -> String {
        Value::from(&self.canonicalize()).to_string()
    }
}

// == Key Derivation ==
/// Derives the cache key for `name` called with `params`.
///
/// Without parameters the key is the name itself. Otherwise the canonical
/// rendering of the parameters is appended after [`KEY_SEPARATOR`].
pub fn get_cache_key(name: &str, params: Option<&ParamValue>) -> String {
    match params {
        None => name.to_string(),
        Some(params) => format!("{name}{KEY_SEPARATOR}{}", params.to_canonical_string()),
    }
}

/// Converts typed call arguments into parameters.
///
/// Arguments that serialize to JSON `null`, such as `()` or `None`, mean
/// "no parameters".
pub fn params_from<A: Serialize + ?Sized>(args: &A) -> Result<Option<ParamValue>> {
    let value = serde_json::to_value(args)?;
    Ok(match value {
        Value::Null => None,
        other => Some(ParamValue::from(other)),
    })
}

// == Conversions ==
impl From<Value> for ParamValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ParamValue::Null,
            Value::Bool(b) => ParamValue::Bool(b),
            Value::Number(n) => ParamValue::Number(n),
            Value::String(s) => ParamValue::String(s),
            Value::Array(items) => {
                ParamValue::List(items.into_iter().map(ParamValue::from).collect())
            }
            Value::Object(fields) => ParamValue::Map(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, ParamValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&ParamValue> for Value {
    fn from(param: &ParamValue) -> Self {
        match param {
            ParamValue::Null => Value::Null,
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::Number(n) => Value::Number(n.clone()),
            ParamValue::String(s) => Value::String(s.clone()),
            ParamValue::List(items) => Value::Array(items.iter().map(Value::from).collect()),
            ParamValue::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ParamValue {
                fn from(n: $t) -> Self {
                    ParamValue::Number(Number::from(n))
                }
            }
        )*
    };
}

impl_from_integer!(i32, i64, u32, u64, usize);

impl From<f64> for ParamValue {
    fn from(f: f64) -> Self {
        Number::from_f64(f)
            .map(ParamValue::Number)
            .unwrap_or(ParamValue::Null)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::String(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::String(s)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(items: Vec<T>) -> Self {
        ParamValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

// == Serde ==
impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ParamValue::Null => serializer.serialize_unit(),
            ParamValue::Bool(b) => serializer.serialize_bool(*b),
            ParamValue::Number(n) => n.serialize(serializer),
            ParamValue::String(s) => serializer.serialize_str(s),
            ParamValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            ParamValue::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(ParamValue::from)
    }
}
