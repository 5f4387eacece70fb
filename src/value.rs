//! Guarded positional access into untyped JSON arrays.
//!
//! The remote payload has no field names: every field is addressed by a
//! chain of array indices. All reads go through [`at`] and its typed
//! wrappers so a shifted or missing position becomes a [`PathError`]
//! instead of a panic or a silently wrong value.

use std::fmt::Write as _;

use serde_json::Value;

/// A failed positional read, carrying the full index path that was requested.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum PathError {
    /// The position does not exist or holds `null`.
    #[error("no value at {}", display_path(.path))]
    Missing { path: Vec<usize> },

    /// The position exists but holds the wrong kind of value.
    #[error("expected {expected} at {}, found {found}", display_path(.path))]
    WrongShape {
        path: Vec<usize>,
        expected: &'static str,
        found: &'static str,
    },
}

impl PathError {
    /// The index path that failed.
    #[must_use]
    pub fn path(&self) -> &[usize] {
        match self {
            Self::Missing { path } | Self::WrongShape { path, .. } => path,
        }
    }
}

fn display_path(path: &[usize]) -> String {
    let mut out = String::from("$");
    for index in path {
        let _ = write!(out, "[{index}]");
    }
    out
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn wrong_shape(path: &[usize], expected: &'static str, found: &Value) -> PathError {
    PathError::WrongShape {
        path: path.to_vec(),
        expected,
        found: kind(found),
    }
}

/// Walks `path` from `root`, requiring every intermediate value to be an array.
///
/// A `null` anywhere along the way (including the leaf) is reported as
/// [`PathError::Missing`], the same as an out-of-range index.
///
/// # Errors
///
/// Returns [`PathError`] naming the first prefix of `path` that could not be
/// followed.
pub fn at<'a>(root: &'a Value, path: &[usize]) -> Result<&'a Value, PathError> {
    let mut current = root;
    for (depth, &index) in path.iter().enumerate() {
        let items = match current {
            Value::Array(items) => items,
            Value::Null => {
                return Err(PathError::Missing {
                    path: path[..depth].to_vec(),
                });
            }
            other => return Err(wrong_shape(&path[..depth], "array", other)),
        };
        current = items.get(index).ok_or_else(|| PathError::Missing {
            path: path[..=depth].to_vec(),
        })?;
    }
    if current.is_null() {
        return Err(PathError::Missing {
            path: path.to_vec(),
        });
    }
    Ok(current)
}

/// Reads an array at `path`.
///
/// # Errors
///
/// See [`at`]; additionally fails if the value is not an array.
pub fn array_at<'a>(root: &'a Value, path: &[usize]) -> Result<&'a [Value], PathError> {
    match at(root, path)? {
        Value::Array(items) => Ok(items),
        other => Err(wrong_shape(path, "array", other)),
    }
}

/// Reads a string at `path`.
///
/// # Errors
///
/// See [`at`]; additionally fails if the value is not a string.
pub fn str_at<'a>(root: &'a Value, path: &[usize]) -> Result<&'a str, PathError> {
    match at(root, path)? {
        Value::String(s) => Ok(s),
        other => Err(wrong_shape(path, "string", other)),
    }
}

/// Reads a floating point number at `path`.
///
/// # Errors
///
/// See [`at`]; additionally fails if the value is not a number.
pub fn f64_at(root: &Value, path: &[usize]) -> Result<f64, PathError> {
    let value = at(root, path)?;
    value
        .as_f64()
        .ok_or_else(|| wrong_shape(path, "number", value))
}

/// Reads an integer at `path`.
///
/// Integral floats and strings holding a base-10 integer are accepted, since
/// the service has sent epoch timestamps in both forms.
///
/// # Errors
///
/// See [`at`]; additionally fails if the value is not an integer.
pub fn i64_at(root: &Value, path: &[usize]) -> Result<i64, PathError> {
    let value = at(root, path)?;
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| wrong_shape(path, "integer", value))
}

/// Reads a boolean at `path`. The numbers `0` and `1` count as booleans.
///
/// # Errors
///
/// See [`at`]; additionally fails if the value is neither a bool nor `0`/`1`.
pub fn bool_at(root: &Value, path: &[usize]) -> Result<bool, PathError> {
    let value = at(root, path)?;
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) if n.as_u64() == Some(0) => Ok(false),
        Value::Number(n) if n.as_u64() == Some(1) => Ok(true),
        other => Err(wrong_shape(path, "bool", other)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn walks_nested_arrays() {
        let v = json!([null, [0, [null, -122.08, 37.42]]]);
        assert_eq!(f64_at(&v, &[1, 1, 2]).unwrap(), 37.42);
        assert_eq!(f64_at(&v, &[1, 1, 1]).unwrap(), -122.08);
    }

    #[test]
    fn empty_path_is_root() {
        let v = json!(["a"]);
        assert_eq!(at(&v, &[]).unwrap(), &v);
    }

    #[test]
    fn out_of_range_is_missing_with_full_prefix() {
        let v = json!([[1, 2]]);
        let err = at(&v, &[0, 5]).unwrap_err();
        assert_eq!(err, PathError::Missing { path: vec![0, 5] });
    }

    #[test]
    fn null_intermediate_is_missing_at_that_depth() {
        let v = json!([null, null]);
        let err = f64_at(&v, &[1, 1, 2]).unwrap_err();
        assert_eq!(err, PathError::Missing { path: vec![1] });
    }

    #[test]
    fn scalar_intermediate_is_wrong_shape() {
        let v = json!(["oops"]);
        let err = at(&v, &[0, 1]).unwrap_err();
        assert_eq!(
            err,
            PathError::WrongShape {
                path: vec![0],
                expected: "array",
                found: "string",
            }
        );
    }

    #[test]
    fn null_leaf_is_missing() {
        let v = json!([1, null]);
        assert!(matches!(str_at(&v, &[1]), Err(PathError::Missing { .. })));
    }

    #[test]
    fn typed_reads_reject_other_kinds() {
        let v = json!(["text", 3, true]);
        assert!(matches!(f64_at(&v, &[0]), Err(PathError::WrongShape { .. })));
        assert!(matches!(str_at(&v, &[1]), Err(PathError::WrongShape { .. })));
        assert!(matches!(array_at(&v, &[2]), Err(PathError::WrongShape { .. })));
    }

    #[test]
    fn integers_accept_numeric_strings_and_integral_floats() {
        let v = json!(["1700000000123", 1700000000123_i64, 42.0, 4.5, "x"]);
        assert_eq!(i64_at(&v, &[0]).unwrap(), 1_700_000_000_123);
        assert_eq!(i64_at(&v, &[1]).unwrap(), 1_700_000_000_123);
        assert_eq!(i64_at(&v, &[2]).unwrap(), 42);
        assert!(i64_at(&v, &[3]).is_err());
        assert!(i64_at(&v, &[4]).is_err());
    }

    #[test]
    fn bools_accept_zero_and_one() {
        let v = json!([true, 0, 1, 2]);
        assert!(bool_at(&v, &[0]).unwrap());
        assert!(!bool_at(&v, &[1]).unwrap());
        assert!(bool_at(&v, &[2]).unwrap());
        assert!(bool_at(&v, &[3]).is_err());
    }

    #[test]
    fn error_message_names_the_path() {
        let v = json!([]);
        let err = at(&v, &[6, 0]).unwrap_err();
        assert_eq!(err.to_string(), "no value at $[6]");
        assert_eq!(err.path(), &[6]);
    }
}
