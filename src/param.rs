//! Bound statement parameters as recorded by the query log.

use std::fmt;

use sea_orm::Value;
use serde::Serialize;

/// Key a parameter was bound under.
///
/// Ordinal keys sort before named keys, so a statement that mixes both forms
/// substitutes its positional placeholders first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum ParamKey {
    Position(usize),
    Named(String),
}

impl ParamKey {
    pub fn is_position(&self) -> bool {
        matches!(self, ParamKey::Position(_))
    }

    /// The `:name` token this key stands for in SQL text.
    ///
    /// Returns `None` for ordinal keys.
    pub fn token(&self) -> Option<String> {
        match self {
            ParamKey::Position(_) => None,
            ParamKey::Named(name) if name.starts_with(':') => Some(name.clone()),
            ParamKey::Named(name) => Some(format!(":{name}")),
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKey::Position(pos) => write!(f, "{pos}"),
            ParamKey::Named(name) => f.write_str(name),
        }
    }
}

impl From<usize> for ParamKey {
    fn from(pos: usize) -> Self {
        ParamKey::Position(pos)
    }
}

impl From<&str> for ParamKey {
    fn from(name: &str) -> Self {
        ParamKey::Named(name.to_string())
    }
}

impl From<String> for ParamKey {
    fn from(name: String) -> Self {
        ParamKey::Named(name)
    }
}

/// Declared type of a bound parameter. Drives how the value is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    Str,
    Int,
    Bool,
    Other,
}

/// Opaque value handed to the driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl ParamValue {
    /// Text form of the value, used for string rendering.
    pub fn to_text(&self) -> String {
        match self {
            ParamValue::Null => String::new(),
            ParamValue::Bool(true) => "1".to_string(),
            ParamValue::Bool(false) => String::new(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) => f.to_string(),
            ParamValue::Text(s) => s.clone(),
            ParamValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }

    /// Integer coercion: text yields its leading integer, anything unparseable 0.
    pub fn to_int(&self) -> i64 {
        match self {
            ParamValue::Null => 0,
            ParamValue::Bool(b) => i64::from(*b),
            ParamValue::Int(i) => *i,
            ParamValue::Float(f) => f.trunc() as i64,
            ParamValue::Text(s) => leading_int(s),
            ParamValue::Bytes(b) => leading_int(&String::from_utf8_lossy(b)),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            ParamValue::Null => false,
            ParamValue::Bool(b) => *b,
            ParamValue::Int(i) => *i != 0,
            ParamValue::Float(f) => *f != 0.0,
            ParamValue::Text(s) => !s.is_empty() && s != "0",
            ParamValue::Bytes(b) => !b.is_empty() && b.as_slice() != b"0",
        }
    }

    /// Convert into a SeaORM value; `ty` picks the column type of a NULL.
    pub fn to_sea_value(&self, ty: ParamType) -> Value {
        match self {
            ParamValue::Null => match ty {
                ParamType::Int => Value::BigInt(None),
                ParamType::Bool => Value::Bool(None),
                ParamType::Str | ParamType::Other => Value::String(None),
            },
            ParamValue::Bool(b) => Value::from(*b),
            ParamValue::Int(i) => Value::from(*i),
            ParamValue::Float(f) => Value::from(*f),
            ParamValue::Text(s) => Value::from(s.clone()),
            ParamValue::Bytes(b) => Value::from(b.clone()),
        }
    }

    /// Convert a SeaORM value, inferring the declared type from its variant.
    pub fn from_sea_value(value: &Value) -> (ParamValue, ParamType) {
        match value {
            Value::Bool(b) => (b.map_or(ParamValue::Null, ParamValue::Bool), ParamType::Bool),
            Value::TinyInt(i) => (int_or_null(i.map(i64::from)), ParamType::Int),
            Value::SmallInt(i) => (int_or_null(i.map(i64::from)), ParamType::Int),
            Value::Int(i) => (int_or_null(i.map(i64::from)), ParamType::Int),
            Value::BigInt(i) => (int_or_null(*i), ParamType::Int),
            Value::TinyUnsigned(i) => (int_or_null(i.map(i64::from)), ParamType::Int),
            Value::SmallUnsigned(i) => (int_or_null(i.map(i64::from)), ParamType::Int),
            Value::Unsigned(i) => (int_or_null(i.map(i64::from)), ParamType::Int),
            Value::BigUnsigned(Some(i)) => match i64::try_from(*i) {
                Ok(i) => (ParamValue::Int(i), ParamType::Int),
                Err(_) => (ParamValue::Text(i.to_string()), ParamType::Other),
            },
            Value::BigUnsigned(None) => (ParamValue::Null, ParamType::Int),
            Value::Float(f) => (
                f.map_or(ParamValue::Null, |f| ParamValue::Float(f64::from(f))),
                ParamType::Other,
            ),
            Value::Double(f) => (f.map_or(ParamValue::Null, ParamValue::Float), ParamType::Other),
            Value::String(s) => (
                s.as_ref()
                    .map_or(ParamValue::Null, |s| ParamValue::Text(s.to_string())),
                ParamType::Str,
            ),
            Value::Char(c) => (
                c.map_or(ParamValue::Null, |c| ParamValue::Text(c.to_string())),
                ParamType::Str,
            ),
            Value::Bytes(b) => (
                b.as_ref()
                    .map_or(ParamValue::Null, |b| ParamValue::Bytes(b.to_vec())),
                ParamType::Other,
            ),
            other => (ParamValue::Text(format!("{other:?}")), ParamType::Other),
        }
    }
}

fn int_or_null(value: Option<i64>) -> ParamValue {
    value.map_or(ParamValue::Null, ParamValue::Int)
}

fn leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    s[..end].parse().unwrap_or(0)
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<i32> for ParamValue {
    fn from(i: i32) -> Self {
        ParamValue::Int(i64::from(i))
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<f64> for ParamValue {
    fn from(f: f64) -> Self {
        ParamValue::Float(f)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(b: Vec<u8>) -> Self {
        ParamValue::Bytes(b)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParamValue::Null, Into::into)
    }
}

/// A single bound parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub key: ParamKey,
    pub value: ParamValue,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
}

impl Parameter {
    pub fn new(key: impl Into<ParamKey>, value: impl Into<ParamValue>, param_type: ParamType) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            param_type,
            length: None,
        }
    }

    pub fn positional(pos: usize, value: impl Into<ParamValue>, param_type: ParamType) -> Self {
        Self::new(ParamKey::Position(pos), value, param_type)
    }

    pub fn named(name: &str, value: impl Into<ParamValue>, param_type: ParamType) -> Self {
        Self::new(ParamKey::from(name), value, param_type)
    }

    pub fn with_length(mut self, length: Option<usize>) -> Self {
        self.length = length;
        self
    }
}

/// Parameters in bind order. Rebinding a key replaces the earlier entry in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, param: Parameter) {
        match self.params.iter_mut().find(|p| p.key == param.key) {
            Some(existing) => *existing = param,
            None => self.params.push(param),
        }
    }

    pub fn get(&self, key: &ParamKey) -> Option<&Parameter> {
        self.params.iter().find(|p| &p.key == key)
    }

    pub fn as_slice(&self) -> &[Parameter] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Parameter> {
        self.params.clone()
    }
}
