//! Dynamic property refresh.
//!
//! Beans opt into refresh by embedding [`Dynamic<V>`] fields and declaring
//! bindings on their builder. The engine re-binds every registered path from
//! a new property snapshot into staged values, validates each candidate, and
//! either commits the whole batch atomically or rejects it leaving the
//! previously wired values untouched. Concurrent refresh calls serialize
//! against each other; reads through [`Dynamic::get`] never block on an idle
//! engine.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{BeanError, BeanResult};
use crate::expr;
use crate::props::{parse_value, Properties};

/// A live, refreshable value owned by a wired bean.
///
/// Cheap to clone (shared interior). Reads take a short read lock; the
/// refresh engine is the only writer after wiring completes.
///
/// # Examples
///
/// ```rust
/// use wirebox::Dynamic;
///
/// let limit = Dynamic::new(4u32);
/// assert_eq!(limit.get(), 4);
/// ```
pub struct Dynamic<V> {
    inner: Arc<DynamicInner<V>>,
}

struct DynamicInner<V> {
    value: RwLock<V>,
    watchers: Mutex<Vec<Box<dyn Fn(&V) + Send + Sync>>>,
}

impl<V> Clone for Dynamic<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: Clone> Dynamic<V> {
    /// Creates a dynamic value with its initial content.
    pub fn new(initial: V) -> Self {
        Self {
            inner: Arc::new(DynamicInner {
                value: RwLock::new(initial),
                watchers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns a clone of the current value.
    pub fn get(&self) -> V {
        self.inner.value.read().clone()
    }

    /// Registers a hook invoked after every committed refresh of this value.
    pub fn on_update<F>(&self, f: F)
    where
        F: Fn(&V) + Send + Sync + 'static,
    {
        self.inner.watchers.lock().push(Box::new(f));
    }

    pub(crate) fn set(&self, v: V) {
        *self.inner.value.write() = v.clone();
        for w in self.inner.watchers.lock().iter() {
            w(&v);
        }
    }
}

impl<V: Clone + Default> Default for Dynamic<V> {
    fn default() -> Self {
        Self::new(V::default())
    }
}

/// Deferred write produced by staging; runs only when the whole batch passed.
pub(crate) type Commit = Box<dyn FnOnce() + Send>;

/// One refreshable binding, staged and committed as part of a batch.
pub(crate) trait RefreshTarget: Send + Sync {
    fn key(&self) -> &str;

    /// Re-binds the value from `props` into a staged commit. An absent key
    /// keeps the current value (no-op commit).
    fn stage(&self, props: &dyn Properties) -> BeanResult<Commit>;
}

/// Typed binding between a property key and a [`Dynamic`] field.
pub(crate) struct DynamicBinding<V> {
    key: String,
    validate: Option<String>,
    dynamic: Dynamic<V>,
}

impl<V> DynamicBinding<V> {
    pub(crate) fn new(key: String, validate: Option<String>, dynamic: Dynamic<V>) -> Self {
        Self {
            key,
            validate,
            dynamic,
        }
    }
}

impl<V> RefreshTarget for DynamicBinding<V>
where
    V: FromStr + Clone + Send + Sync + 'static,
    V::Err: Display,
{
    fn key(&self) -> &str {
        &self.key
    }

    fn stage(&self, props: &dyn Properties) -> BeanResult<Commit> {
        let raw = match props.get(&self.key) {
            Some(raw) => raw,
            None => return Ok(Box::new(|| {})),
        };
        if let Some(expr) = &self.validate {
            if !expr::eval(expr, &raw)? {
                return Err(BeanError::Validation(format!(
                    "value {:?} rejected by {:?} for key {:?}",
                    raw, expr, self.key
                )));
            }
        }
        let staged: V = parse_value(&raw, &self.key)?;
        let dynamic = self.dynamic.clone();
        Ok(Box::new(move || dynamic.set(staged)))
    }
}

struct Entry {
    bean: String,
    target: Box<dyn RefreshTarget>,
}

/// Batch refresh engine. Registered during wiring, driven by
/// [`Container::refresh_properties`](crate::Container::refresh_properties).
#[derive(Default)]
pub(crate) struct RefreshEngine {
    entries: Mutex<Vec<Entry>>,
    serial: Mutex<()>,
}

impl RefreshEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a binding and performs its initial bind against `props`.
    /// Initial bind failures are wiring errors.
    pub(crate) fn register(
        &self,
        bean: String,
        target: Box<dyn RefreshTarget>,
        props: &dyn Properties,
    ) -> BeanResult<()> {
        let commit = target.stage(props)?;
        commit();
        self.entries.lock().push(Entry { bean, target });
        Ok(())
    }

    /// Applies a new property snapshot: stage everything, validate, then
    /// commit together. Any failure rejects the whole batch.
    pub(crate) fn refresh(&self, props: &dyn Properties) -> BeanResult<()> {
        let _serial = self.serial.lock();
        let entries = self.entries.lock();

        let mut commits = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if suppressed(&entries, i) {
                continue;
            }
            let commit = entry.target.stage(props).map_err(|err| {
                BeanError::Refresh(format!(
                    "binding {:?} of bean {}: {}",
                    entry.target.key(),
                    entry.bean,
                    err
                ))
            })?;
            commits.push(commit);
        }
        for commit in commits {
            commit();
        }
        tracing::debug!(bindings = entries.len(), "property refresh committed");
        Ok(())
    }

    pub(crate) fn binding_count(&self) -> usize {
        self.entries.lock().len()
    }
}

// A struct-typed binding owns its whole subtree: entries whose key sits
// strictly under another registered key are not refreshed independently.
fn suppressed(entries: &[Entry], i: usize) -> bool {
    let key = entries[i].target.key();
    entries.iter().enumerate().any(|(j, other)| {
        j != i
            && key
                .strip_prefix(other.target.key())
                .is_some_and(|rest| rest.starts_with('.'))
    })
}
