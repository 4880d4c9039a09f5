//! Typed option values and the coercion engine.
//!
//! Every option declares one [`ValueKind`] out of a closed set of variants;
//! raw input from any source arrives as a [`RawValue`] and is coerced into
//! the declared kind here. Coercion is deliberately forgiving about the
//! shapes real sources produce: numbers may arrive as strings (env vars,
//! INI-style files), lists may arrive as comma-separated strings, durations
//! as `"1h30m"` style text or bare seconds.

use std::fmt;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use serde::Serializer;

use crate::errors::ValueError;

/// Raw interchange value flowing through decode, flatten and parse.
///
/// Decoders produce nested maps of this type; the merge pipeline hands one
/// leaf per dotted key to the option's parser.
pub type RawValue = serde_json::Value;

/// Closed set of kinds an option can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Int,
    Uint,
    Float,
    Str,
    Duration,
    Time,
    BoolList,
    IntList,
    UintList,
    FloatList,
    StrList,
    DurationList,
    TimeList,
}

impl ValueKind {
    pub fn is_list(&self) -> bool {
        self.element().is_some()
    }

    /// Element kind for list variants, `None` for scalars.
    pub fn element(&self) -> Option<ValueKind> {
        match self {
            ValueKind::BoolList => Some(ValueKind::Bool),
            ValueKind::IntList => Some(ValueKind::Int),
            ValueKind::UintList => Some(ValueKind::Uint),
            ValueKind::FloatList => Some(ValueKind::Float),
            ValueKind::StrList => Some(ValueKind::Str),
            ValueKind::DurationList => Some(ValueKind::Duration),
            ValueKind::TimeList => Some(ValueKind::Time),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Bool => write!(f, "bool"),
            ValueKind::Int => write!(f, "int"),
            ValueKind::Uint => write!(f, "uint"),
            ValueKind::Float => write!(f, "float"),
            ValueKind::Str => write!(f, "string"),
            ValueKind::Duration => write!(f, "duration"),
            ValueKind::Time => write!(f, "time"),
            ValueKind::BoolList => write!(f, "[bool]"),
            ValueKind::IntList => write!(f, "[int]"),
            ValueKind::UintList => write!(f, "[uint]"),
            ValueKind::FloatList => write!(f, "[float]"),
            ValueKind::StrList => write!(f, "[string]"),
            ValueKind::DurationList => write!(f, "[duration]"),
            ValueKind::TimeList => write!(f, "[time]"),
        }
    }
}

/// A typed option value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    Duration(Duration),
    Time(DateTime<Utc>),
    BoolList(Vec<bool>),
    IntList(Vec<i64>),
    UintList(Vec<u64>),
    FloatList(Vec<f64>),
    StrList(Vec<String>),
    DurationList(Vec<Duration>),
    TimeList(Vec<DateTime<Utc>>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Uint(_) => ValueKind::Uint,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Duration(_) => ValueKind::Duration,
            Value::Time(_) => ValueKind::Time,
            Value::BoolList(_) => ValueKind::BoolList,
            Value::IntList(_) => ValueKind::IntList,
            Value::UintList(_) => ValueKind::UintList,
            Value::FloatList(_) => ValueKind::FloatList,
            Value::StrList(_) => ValueKind::StrList,
            Value::DurationList(_) => ValueKind::DurationList,
            Value::TimeList(_) => ValueKind::TimeList,
        }
    }

    /// The kind's zero value, served when an option has neither a default
    /// nor a committed value.
    pub fn zero(kind: ValueKind) -> Value {
        match kind {
            ValueKind::Bool => Value::Bool(false),
            ValueKind::Int => Value::Int(0),
            ValueKind::Uint => Value::Uint(0),
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Str => Value::Str(String::new()),
            ValueKind::Duration => Value::Duration(Duration::ZERO),
            ValueKind::Time => Value::Time(DateTime::<Utc>::UNIX_EPOCH),
            ValueKind::BoolList => Value::BoolList(Vec::new()),
            ValueKind::IntList => Value::IntList(Vec::new()),
            ValueKind::UintList => Value::UintList(Vec::new()),
            ValueKind::FloatList => Value::FloatList(Vec::new()),
            ValueKind::StrList => Value::StrList(Vec::new()),
            ValueKind::DurationList => Value::DurationList(Vec::new()),
            ValueKind::TimeList => Value::TimeList(Vec::new()),
        }
    }

    /// Coerce a raw value into `kind`.
    ///
    /// Scalar rules:
    /// - bool: booleans, `"1"/"t"/"true"/"yes"/"on"` (and their negative
    ///   counterparts, case-insensitive), nonzero numbers
    /// - int/uint/float: numbers and numeric strings; floats truncate into
    ///   the integer kinds; uint rejects negatives
    /// - string: any scalar, stringified
    /// - duration: `"300ms"`, `"1h30m"`, `"2.5s"` style text, or bare
    ///   numbers interpreted as seconds
    /// - time: RFC 3339 text, or bare numbers interpreted as Unix seconds
    ///
    /// List kinds additionally accept a JSON array (per-element coercion),
    /// a comma-separated string, or a single scalar as a one-element list.
    pub fn coerce(kind: ValueKind, raw: &RawValue) -> Result<Value, ValueError> {
        match kind {
            ValueKind::Bool => coerce_bool(kind, raw).map(Value::Bool),
            ValueKind::Int => coerce_int(kind, raw).map(Value::Int),
            ValueKind::Uint => coerce_uint(kind, raw).map(Value::Uint),
            ValueKind::Float => coerce_float(kind, raw).map(Value::Float),
            ValueKind::Str => coerce_str(kind, raw).map(Value::Str),
            ValueKind::Duration => coerce_duration(kind, raw).map(Value::Duration),
            ValueKind::Time => coerce_time(kind, raw).map(Value::Time),
            ValueKind::BoolList => {
                let items = list_items(kind, raw)?;
                items
                    .iter()
                    .map(|r| coerce_bool(kind, r))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::BoolList)
            }
            ValueKind::IntList => {
                let items = list_items(kind, raw)?;
                items
                    .iter()
                    .map(|r| coerce_int(kind, r))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::IntList)
            }
            ValueKind::UintList => {
                let items = list_items(kind, raw)?;
                items
                    .iter()
                    .map(|r| coerce_uint(kind, r))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::UintList)
            }
            ValueKind::FloatList => {
                let items = list_items(kind, raw)?;
                items
                    .iter()
                    .map(|r| coerce_float(kind, r))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::FloatList)
            }
            ValueKind::StrList => {
                let items = list_items(kind, raw)?;
                items
                    .iter()
                    .map(|r| coerce_str(kind, r))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::StrList)
            }
            ValueKind::DurationList => {
                let items = list_items(kind, raw)?;
                items
                    .iter()
                    .map(|r| coerce_duration(kind, r))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::DurationList)
            }
            ValueKind::TimeList => {
                let items = list_items(kind, raw)?;
                items
                    .iter()
                    .map(|r| coerce_time(kind, r))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::TimeList)
            }
        }
    }

    /// Render back into the raw interchange form.
    ///
    /// Durations become fractional seconds, timestamps RFC 3339 strings;
    /// both round-trip through [`Value::coerce`].
    pub fn to_raw(&self) -> RawValue {
        match self {
            Value::Bool(b) => RawValue::Bool(*b),
            Value::Int(i) => RawValue::from(*i),
            Value::Uint(u) => RawValue::from(*u),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(RawValue::Number)
                .unwrap_or(RawValue::Null),
            Value::Str(s) => RawValue::String(s.clone()),
            Value::Duration(d) => serde_json::Number::from_f64(d.as_secs_f64())
                .map(RawValue::Number)
                .unwrap_or(RawValue::Null),
            Value::Time(t) => RawValue::String(t.to_rfc3339()),
            Value::BoolList(v) => RawValue::Array(v.iter().map(|b| RawValue::Bool(*b)).collect()),
            Value::IntList(v) => RawValue::Array(v.iter().map(|i| RawValue::from(*i)).collect()),
            Value::UintList(v) => RawValue::Array(v.iter().map(|u| RawValue::from(*u)).collect()),
            Value::FloatList(v) => RawValue::Array(
                v.iter()
                    .map(|f| {
                        serde_json::Number::from_f64(*f)
                            .map(RawValue::Number)
                            .unwrap_or(RawValue::Null)
                    })
                    .collect(),
            ),
            Value::StrList(v) => {
                RawValue::Array(v.iter().map(|s| RawValue::String(s.clone())).collect())
            }
            Value::DurationList(v) => RawValue::Array(
                v.iter()
                    .map(|d| {
                        serde_json::Number::from_f64(d.as_secs_f64())
                            .map(RawValue::Number)
                            .unwrap_or(RawValue::Null)
                    })
                    .collect(),
            ),
            Value::TimeList(v) => {
                RawValue::Array(v.iter().map(|t| RawValue::String(t.to_rfc3339())).collect())
            }
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::Uint(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Value::Duration(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_bool_list(&self) -> Option<&[bool]> {
        match self {
            Value::BoolList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int_list(&self) -> Option<&[i64]> {
        match self {
            Value::IntList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_uint_list(&self) -> Option<&[u64]> {
        match self {
            Value::UintList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float_list(&self) -> Option<&[f64]> {
        match self {
            Value::FloatList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str_list(&self) -> Option<&[String]> {
        match self {
            Value::StrList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_duration_list(&self) -> Option<&[Duration]> {
        match self {
            Value::DurationList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_time_list(&self) -> Option<&[DateTime<Utc>]> {
        match self {
            Value::TimeList(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Uint(u) => write!(f, "{u}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Duration(d) => write!(f, "{d:?}"),
            Value::Time(t) => write!(f, "{}", t.to_rfc3339()),
            _ => write!(f, "{}", self.to_raw()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_raw().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Uint(v.into())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Duration> for Value {
    fn from(v: Duration) -> Self {
        Value::Duration(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Time(v)
    }
}

impl From<Vec<bool>> for Value {
    fn from(v: Vec<bool>) -> Self {
        Value::BoolList(v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::IntList(v)
    }
}

impl From<Vec<u64>> for Value {
    fn from(v: Vec<u64>) -> Self {
        Value::UintList(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::FloatList(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::StrList(v)
    }
}

impl From<Vec<&str>> for Value {
    fn from(v: Vec<&str>) -> Self {
        Value::StrList(v.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<Duration>> for Value {
    fn from(v: Vec<Duration>) -> Self {
        Value::DurationList(v)
    }
}

impl From<Vec<DateTime<Utc>>> for Value {
    fn from(v: Vec<DateTime<Utc>>) -> Self {
        Value::TimeList(v)
    }
}

fn coerce_err(kind: ValueKind, raw: &RawValue) -> ValueError {
    let rendered = raw.to_string();
    let input = if rendered.chars().count() > 64 {
        let mut s: String = rendered.chars().take(64).collect();
        s.push('…');
        s
    } else {
        rendered
    };
    ValueError::Coerce { kind, input }
}

fn coerce_bool(kind: ValueKind, raw: &RawValue) -> Result<bool, ValueError> {
    match raw {
        RawValue::Bool(b) => Ok(*b),
        RawValue::Null => Ok(false),
        RawValue::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
        RawValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "yes" | "on" => Ok(true),
            "" | "0" | "f" | "false" | "no" | "off" => Ok(false),
            _ => Err(coerce_err(kind, raw)),
        },
        _ => Err(coerce_err(kind, raw)),
    }
}

fn coerce_int(kind: ValueKind, raw: &RawValue) -> Result<i64, ValueError> {
    match raw {
        RawValue::Bool(b) => Ok(i64::from(*b)),
        RawValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            float_to_int(kind, raw, n.as_f64())
        }
        RawValue::String(s) => {
            let t = s.trim();
            if let Ok(i) = t.parse::<i64>() {
                return Ok(i);
            }
            float_to_int(kind, raw, t.parse::<f64>().ok())
        }
        _ => Err(coerce_err(kind, raw)),
    }
}

fn float_to_int(kind: ValueKind, raw: &RawValue, f: Option<f64>) -> Result<i64, ValueError> {
    match f {
        Some(f) if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 => Ok(f as i64),
        _ => Err(coerce_err(kind, raw)),
    }
}

fn coerce_uint(kind: ValueKind, raw: &RawValue) -> Result<u64, ValueError> {
    match raw {
        RawValue::Bool(b) => Ok(u64::from(*b)),
        RawValue::Number(n) => {
            if let Some(u) = n.as_u64() {
                return Ok(u);
            }
            float_to_uint(kind, raw, n.as_f64())
        }
        RawValue::String(s) => {
            let t = s.trim();
            if let Ok(u) = t.parse::<u64>() {
                return Ok(u);
            }
            float_to_uint(kind, raw, t.parse::<f64>().ok())
        }
        _ => Err(coerce_err(kind, raw)),
    }
}

fn float_to_uint(kind: ValueKind, raw: &RawValue, f: Option<f64>) -> Result<u64, ValueError> {
    match f {
        Some(f) if f.is_finite() && f >= 0.0 && f <= u64::MAX as f64 => Ok(f as u64),
        _ => Err(coerce_err(kind, raw)),
    }
}

fn coerce_float(kind: ValueKind, raw: &RawValue) -> Result<f64, ValueError> {
    match raw {
        RawValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        RawValue::Number(n) => n.as_f64().ok_or_else(|| coerce_err(kind, raw)),
        RawValue::String(s) => s.trim().parse::<f64>().map_err(|_| coerce_err(kind, raw)),
        _ => Err(coerce_err(kind, raw)),
    }
}

fn coerce_str(kind: ValueKind, raw: &RawValue) -> Result<String, ValueError> {
    match raw {
        RawValue::String(s) => Ok(s.clone()),
        RawValue::Bool(b) => Ok(b.to_string()),
        RawValue::Number(n) => Ok(n.to_string()),
        _ => Err(coerce_err(kind, raw)),
    }
}

fn coerce_duration(kind: ValueKind, raw: &RawValue) -> Result<Duration, ValueError> {
    match raw {
        RawValue::String(s) => {
            let t = s.trim();
            if let Some(d) = parse_duration(t) {
                Ok(d)
            } else {
                // Unitless numeric text means seconds, matching bare
                // numbers from decoders.
                match t.parse::<f64>() {
                    Ok(f) if f.is_finite() && f >= 0.0 => {
                        Duration::try_from_secs_f64(f).map_err(|_| coerce_err(kind, raw))
                    }
                    _ => Err(coerce_err(kind, raw)),
                }
            }
        }
        RawValue::Number(n) => match n.as_f64() {
            Some(f) if f.is_finite() && f >= 0.0 => {
                Duration::try_from_secs_f64(f).map_err(|_| coerce_err(kind, raw))
            }
            _ => Err(coerce_err(kind, raw)),
        },
        _ => Err(coerce_err(kind, raw)),
    }
}

fn coerce_time(kind: ValueKind, raw: &RawValue) -> Result<DateTime<Utc>, ValueError> {
    match raw {
        RawValue::String(s) => {
            let t = s.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(t) {
                Ok(parsed.with_timezone(&Utc))
            } else if let Ok(secs) = t.parse::<i64>() {
                DateTime::from_timestamp(secs, 0).ok_or_else(|| coerce_err(kind, raw))
            } else {
                Err(coerce_err(kind, raw))
            }
        }
        RawValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                return DateTime::from_timestamp(i, 0).ok_or_else(|| coerce_err(kind, raw));
            }
            match n.as_f64() {
                Some(f) if f.is_finite() => DateTime::from_timestamp_millis((f * 1000.0) as i64)
                    .ok_or_else(|| coerce_err(kind, raw)),
                _ => Err(coerce_err(kind, raw)),
            }
        }
        _ => Err(coerce_err(kind, raw)),
    }
}

fn list_items(kind: ValueKind, raw: &RawValue) -> Result<Vec<RawValue>, ValueError> {
    match raw {
        RawValue::Array(items) => Ok(items.clone()),
        RawValue::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(t.split(',')
                    .map(|p| RawValue::String(p.trim().to_string()))
                    .collect())
            }
        }
        RawValue::Bool(_) | RawValue::Number(_) => Ok(vec![raw.clone()]),
        _ => Err(coerce_err(kind, raw)),
    }
}

/// Parse `"300ms"`, `"1h30m"`, `"2.5s"` style duration text.
///
/// Accepts the units `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`; segments are
/// summed. A bare `"0"` needs no unit. Negative durations are rejected.
pub(crate) fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s == "0" {
        return Some(Duration::ZERO);
    }
    let mut rest = s.strip_prefix('+').unwrap_or(s);
    if rest.is_empty() {
        return None;
    }
    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return None;
        }
        let value: f64 = rest[..num_len].parse().ok()?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total = total.checked_add(Duration::try_from_secs_f64(value * scale).ok()?)?;
    }
    Some(total)
}
