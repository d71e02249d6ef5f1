//! Property collaborator contract.
//!
//! The container never parses configuration sources itself. It consumes a
//! narrow, string-based contract: key existence, value lookup, typed binding,
//! subkey enumeration, and opaque placeholder resolution. Hosts plug in their
//! own configuration subsystem; [`MapProperties`] is a ready-made in-memory
//! implementation for tests and simple applications.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use crate::error::{BeanError, BeanResult};

/// Read-only view over a key-value property source.
///
/// Keys are dot-separated paths (`server.grpc.port`). All values travel as
/// strings; typed conversion happens at the binding site via [`bind`].
pub trait Properties: Send + Sync {
    /// Returns whether `key` is present in the source.
    fn has(&self, key: &str) -> bool;

    /// Returns the raw string value for `key`, if present.
    fn get(&self, key: &str) -> Option<String>;

    /// Enumerates the distinct child segments directly under `key`.
    ///
    /// For keys `db.primary.url` and `db.replica.url`, `sub_keys("db")`
    /// returns `["primary", "replica"]` (sorted, de-duplicated).
    fn sub_keys(&self, key: &str) -> BeanResult<Vec<String>>;

    /// Expands placeholder expressions in `text` and returns the result.
    ///
    /// The placeholder grammar belongs to the collaborator; the container
    /// only invokes this as an opaque step. A text without placeholders must
    /// come back unchanged.
    fn resolve(&self, text: &str) -> BeanResult<String>;

    /// Returns the value for `key`, or `default` when the key is absent.
    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }
}

/// Binds the value at `key` into a typed target.
///
/// Conversion goes through [`FromStr`]; a missing key or a failed parse is a
/// [`BeanError::Property`].
///
/// # Examples
///
/// ```rust
/// use wirebox::props::{bind, MapProperties, Properties};
///
/// let mut props = MapProperties::new();
/// props.set("server.port", "8080");
///
/// let port: u16 = bind(&props, "server.port").unwrap();
/// assert_eq!(port, 8080);
/// assert!(bind::<u16>(&props, "server.host").is_err());
/// ```
pub fn bind<T>(props: &dyn Properties, key: &str) -> BeanResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = props
        .get(key)
        .ok_or_else(|| BeanError::Property(format!("key {:?} not found", key)))?;
    parse_value(&raw, key)
}

/// Parses an already-resolved raw string into a typed value.
pub(crate) fn parse_value<T>(raw: &str, context: &str) -> BeanResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse::<T>().map_err(|e| {
        BeanError::Property(format!(
            "cannot convert {:?} for {:?}: {}",
            raw, context, e
        ))
    })
}

/// In-memory property source backed by a sorted map.
///
/// Supports the minimal `${key}` / `${key:=default}` placeholder form in
/// [`Properties::resolve`]. Hosts with a richer expression grammar supply
/// their own implementation.
#[derive(Debug, Clone, Default)]
pub struct MapProperties {
    data: BTreeMap<String, String>,
}

impl MapProperties {
    /// Creates an empty property source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a key to a raw string value, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Removes a key, if present.
    pub fn remove(&mut self, key: &str) {
        self.data.remove(key);
    }

    /// Builds a source from `(key, value)` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut p = Self::new();
        for (k, v) in pairs {
            p.set(k, v);
        }
        p
    }
}

impl Properties for MapProperties {
    fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    fn get(&self, key: &str) -> Option<String> {
        self.data.get(key).cloned()
    }

    fn sub_keys(&self, key: &str) -> BeanResult<Vec<String>> {
        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{}.", key)
        };
        let mut out: Vec<String> = Vec::new();
        for k in self.data.keys() {
            if let Some(rest) = k.strip_prefix(&prefix) {
                let segment = rest.split('.').next().unwrap_or(rest);
                if !segment.is_empty() && out.iter().all(|s| s != segment) {
                    out.push(segment.to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }

    fn resolve(&self, text: &str) -> BeanResult<String> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let inner = &rest[start + 2..];
            let end = inner.find('}').ok_or_else(|| {
                BeanError::Property(format!("unterminated placeholder in {:?}", text))
            })?;
            let body = &inner[..end];
            let (key, default) = match body.split_once(":=") {
                Some((k, d)) => (k.trim(), Some(d)),
                None => (body.trim(), None),
            };
            match self.get(key) {
                Some(v) => out.push_str(&v),
                None => match default {
                    Some(d) => out.push_str(d),
                    None => {
                        return Err(BeanError::Property(format!(
                            "placeholder key {:?} not found",
                            key
                        )))
                    }
                },
            }
            rest = &inner[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}
