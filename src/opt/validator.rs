//! Ready-made validators for [`Opt::with_validator`].
//!
//! Each constructor returns a closure compatible with
//! [`Opt::with_validator`](crate::Opt::with_validator).

use crate::errors::BoxError;
use crate::opt::value::Value;

/// Accepts ints inside `min..=max`.
pub fn int_range(min: i64, max: i64) -> impl Fn(&Value) -> Result<(), BoxError> + Send + Sync {
    move |v: &Value| match v.as_int() {
        Some(i) if (min..=max).contains(&i) => Ok(()),
        Some(i) => Err(format!("{i} is outside the range [{min}, {max}]").into()),
        None => Err(format!("expected an int, got {}", v.kind()).into()),
    }
}

/// Accepts uints inside `min..=max`.
pub fn uint_range(min: u64, max: u64) -> impl Fn(&Value) -> Result<(), BoxError> + Send + Sync {
    move |v: &Value| match v.as_uint() {
        Some(u) if (min..=max).contains(&u) => Ok(()),
        Some(u) => Err(format!("{u} is outside the range [{min}, {max}]").into()),
        None => Err(format!("expected a uint, got {}", v.kind()).into()),
    }
}

/// Accepts floats inside `min..=max`.
pub fn float_range(min: f64, max: f64) -> impl Fn(&Value) -> Result<(), BoxError> + Send + Sync {
    move |v: &Value| match v.as_float() {
        Some(f) if f >= min && f <= max => Ok(()),
        Some(f) => Err(format!("{f} is outside the range [{min}, {max}]").into()),
        None => Err(format!("expected a float, got {}", v.kind()).into()),
    }
}

/// Accepts strings whose character count is inside `min..=max`.
pub fn str_len(min: usize, max: usize) -> impl Fn(&Value) -> Result<(), BoxError> + Send + Sync {
    move |v: &Value| match v.as_str() {
        Some(s) => {
            let n = s.chars().count();
            if (min..=max).contains(&n) {
                Ok(())
            } else {
                Err(format!("length {n} is outside the range [{min}, {max}]").into())
            }
        }
        None => Err(format!("expected a string, got {}", v.kind()).into()),
    }
}

/// Accepts strings drawn from a fixed set of choices.
pub fn one_of<I, S>(choices: I) -> impl Fn(&Value) -> Result<(), BoxError> + Send + Sync
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let choices: Vec<String> = choices.into_iter().map(Into::into).collect();
    move |v: &Value| match v.as_str() {
        Some(s) if choices.iter().any(|c| c == s) => Ok(()),
        Some(s) => Err(format!("{s:?} is not one of {choices:?}").into()),
        None => Err(format!("expected a string, got {}", v.kind()).into()),
    }
}

/// Rejects empty strings and empty lists.
pub fn non_empty() -> impl Fn(&Value) -> Result<(), BoxError> + Send + Sync {
    |v: &Value| {
        let empty = match v {
            Value::Str(s) => s.is_empty(),
            Value::BoolList(x) => x.is_empty(),
            Value::IntList(x) => x.is_empty(),
            Value::UintList(x) => x.is_empty(),
            Value::FloatList(x) => x.is_empty(),
            Value::StrList(x) => x.is_empty(),
            Value::DurationList(x) => x.is_empty(),
            Value::TimeList(x) => x.is_empty(),
            _ => false,
        };
        if empty {
            Err("value must not be empty".into())
        } else {
            Ok(())
        }
    }
}
