//! Dynamic values handled by the reference realization of type plans.
//!
//! Every variant is totally ordered and hashable so data can live in sets and
//! as map keys; floats go through `OrderedFloat` for that.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use ordered_float::OrderedFloat;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Datum {
    Null,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Text(String),
    Timestamp(DateTime<Utc>),
    List(Vec<Datum>),
    Set(BTreeSet<Datum>),
    Map(BTreeMap<Datum, Datum>),
    Record(BTreeMap<String, Datum>),
}

impl Datum {
    pub fn text(s: impl Into<String>) -> Self {
        Datum::Text(s.into())
    }

    pub fn float(f: f64) -> Self {
        Datum::Float(OrderedFloat(f))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Int(i) => Some(*i as f64),
            Datum::Float(f) => Some(f.0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Length for strings (Unicode scalar values) and size for containers.
    pub fn len(&self) -> Option<u64> {
        match self {
            Datum::Text(s) => Some(s.chars().count() as u64),
            Datum::List(xs) => Some(xs.len() as u64),
            Datum::Set(xs) => Some(xs.len() as u64),
            Datum::Map(m) => Some(m.len() as u64),
            _ => None,
        }
    }

    /// Untyped conversion; integral numbers become `Int`, strings stay `Text`.
    pub fn from_json(v: &Value) -> Datum {
        match v {
            Value::Null => Datum::Null,
            Value::Bool(b) => Datum::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Datum::Int(i),
                None => Datum::float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Datum::Text(s.clone()),
            Value::Array(xs) => Datum::List(xs.iter().map(Datum::from_json).collect()),
            Value::Object(m) => Datum::Record(m.iter().map(|(k, v)| (k.clone(), Datum::from_json(v))).collect()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Datum::Null => Value::Null,
            Datum::Bool(b) => Value::Bool(*b),
            Datum::Int(i) => Value::from(*i),
            // non-finite floats have no JSON form; they serialize as strings
            Datum::Float(f) => serde_json::Number::from_f64(f.0)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(f.0.to_string())),
            Datum::Text(s) => Value::String(s.clone()),
            Datum::Timestamp(t) => Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Datum::List(xs) => Value::Array(xs.iter().map(Datum::to_json).collect()),
            Datum::Set(xs) => Value::Array(xs.iter().map(Datum::to_json).collect()),
            Datum::Map(m) => {
                let mut out = serde_json::Map::new();
                for (k, v) in m {
                    let key = match k {
                        Datum::Text(s) => s.clone(),
                        other => other.to_string(),
                    };
                    out.insert(key, v.to_json());
                }
                Value::Object(out)
            }
            Datum::Record(m) => Value::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Text(s) => write!(f, "{s:?}"),
            Datum::Float(x) if !x.0.is_finite() => write!(f, "{}", x.0),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::Text(s.to_string())
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Datum::Text(s)
    }
}

impl From<i64> for Datum {
    fn from(i: i64) -> Self {
        Datum::Int(i)
    }
}

impl From<f64> for Datum {
    fn from(f: f64) -> Self {
        Datum::float(f)
    }
}

impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Datum::Bool(b)
    }
}
