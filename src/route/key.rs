//! Route keys.
//!
//! A [`RouteKey`] is the value an application extracts from a message to pick
//! its handler chain. Keys compare by value; [`RouteKey::Wildcard`] stands for
//! "no key" and is the slot fallback lookups use.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::hash::{Hash, Hasher};

use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// RouteKey
// ============================================================================

/// Comparable key selecting a handler chain.
///
/// Floats compare with IEEE equality, so `0.0 == -0.0` and NaN equals
/// nothing. Keys containing NaN are rejected at registration
/// (see [`RouteKey::is_comparable`]).
///
/// Struct keys compare field by field in order; build them with
/// [`RouteKey::structured`], which sorts fields by name.
#[derive(Debug, Clone)]
pub enum RouteKey {
    /// Matches anything; also the fallback slot.
    Wildcard,
    /// Boolean key.
    Bool(bool),
    /// Integer key.
    Int(i64),
    /// Floating point key.
    Float(f64),
    /// String key.
    Str(String),
    /// Structured key made of named fields.
    Struct(Vec<(String, RouteKey)>),
}

// ============================================================================
// Constructors
// ============================================================================

impl RouteKey {
    /// Creates a struct key, sorting fields by name.
    #[must_use]
    pub fn structured<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<RouteKey>,
    {
        let mut fields: Vec<(String, RouteKey)> = fields
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        Self::Struct(fields)
    }

    /// Converts a decoded JSON value into a key.
    ///
    /// `null` maps to [`RouteKey::Wildcard`], objects to struct keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NonComparableRouteKey`] for arrays, which have no
    /// key form.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::Wildcard),
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Self::Int(i)),
                None => Ok(Self::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            Value::String(s) => Ok(Self::Str(s.clone())),
            Value::Array(_) => Err(Error::non_comparable_key(value.to_string())),
            Value::Object(map) => {
                let mut fields = Vec::with_capacity(map.len());
                for (name, field) in map {
                    fields.push((name.clone(), Self::from_json(field)?));
                }
                Ok(Self::structured(fields))
            }
        }
    }
}

// ============================================================================
// Predicates
// ============================================================================

impl RouteKey {
    /// Returns `true` for [`RouteKey::Wildcard`].
    #[inline]
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard)
    }

    /// Returns `true` if the key equals itself and can be stored in a table.
    #[must_use]
    pub fn is_comparable(&self) -> bool {
        match self {
            Self::Float(f) => !f.is_nan(),
            Self::Struct(fields) => fields.iter().all(|(_, v)| v.is_comparable()),
            _ => true,
        }
    }
}

// ============================================================================
// Equality & Hashing
// ============================================================================

impl PartialEq for RouteKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Wildcard, Self::Wildcard) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Struct(a), Self::Struct(b)) => a == b,
            _ => false,
        }
    }
}

// Registration rejects NaN, so every stored key is reflexive.
impl Eq for RouteKey {}

impl Hash for RouteKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Wildcard => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(f) => {
                // -0.0 == 0.0, so both must hash alike
                let f = if *f == 0.0 { 0.0 } else { *f };
                f.to_bits().hash(state);
            }
            Self::Str(s) => s.hash(state),
            Self::Struct(fields) => fields.hash(state),
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<&str> for RouteKey {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for RouteKey {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for RouteKey {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for RouteKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for RouteKey {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for RouteKey {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for RouteKey {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<()> for RouteKey {
    fn from((): ()) -> Self {
        Self::Wildcard
    }
}

impl<T: Into<RouteKey>> From<Option<T>> for RouteKey {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Wildcard, Into::into)
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => f.write_str("*"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
            Self::Struct(fields) => {
                f.write_str("{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use rustc_hash::FxHashSet;
    use serde_json::json;

    #[test]
    fn test_equal_keys_hash_alike() {
        let mut set = FxHashSet::default();
        set.insert(RouteKey::from("chat"));
        set.insert(RouteKey::Float(0.0));

        assert!(set.contains(&RouteKey::Str("chat".into())));
        assert!(set.contains(&RouteKey::Float(-0.0)));
        assert!(!set.contains(&RouteKey::Int(0)));
    }

    #[test]
    fn test_nan_is_not_comparable() {
        assert!(!RouteKey::Float(f64::NAN).is_comparable());
        assert!(!RouteKey::structured([("x", f64::NAN)]).is_comparable());
        assert!(RouteKey::structured([("x", 1.5)]).is_comparable());
    }

    #[test]
    fn test_structured_sorts_fields() {
        let a = RouteKey::structured([("b", 2), ("a", 1)]);
        let b = RouteKey::structured([("a", 1), ("b", 2)]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "{a: 1, b: 2}");
    }

    #[test]
    fn test_option_none_is_wildcard() {
        assert!(RouteKey::from(None::<&str>).is_wildcard());
        assert_eq!(RouteKey::from(Some(7)), RouteKey::Int(7));
    }

    #[test]
    fn test_from_json() {
        assert!(RouteKey::from_json(&Value::Null).unwrap().is_wildcard());
        assert_eq!(
            RouteKey::from_json(&json!("chat")).unwrap(),
            RouteKey::from("chat")
        );
        assert_eq!(RouteKey::from_json(&json!(3)).unwrap(), RouteKey::Int(3));
        assert_eq!(
            RouteKey::from_json(&json!({"room": 1, "op": "join"})).unwrap(),
            RouteKey::structured([("op", RouteKey::from("join")), ("room", RouteKey::Int(1))])
        );
    }

    #[test]
    fn test_from_json_rejects_arrays() {
        let err = RouteKey::from_json(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, Error::NonComparableRouteKey { .. }));
    }
}
