//! Condition engine.
//!
//! Conditions are pure predicates evaluated once per bean during resolution.
//! They see the world through a [`CondContext`]: property lookups against the
//! collaborator, and bean-existence probes which lazily resolve the probed
//! bean first. Conditions compose with [`all`], [`any`], [`not`] and
//! [`none`]; evaluation short-circuits and sub-errors propagate wrapped with
//! the combinator's description.

use std::sync::Arc;

use crate::bean::Selector;
use crate::error::{BeanError, BeanResult};
use crate::expr;
use crate::props::Properties;

/// Property key listing the active profiles (comma-separated).
pub const PROFILES_KEY: &str = "app.profiles.active";

/// Resolution-time bean probing, implemented by the resolver pass.
pub(crate) trait BeanLookup {
    /// Counts non-deleted beans matching the selector, resolving unexamined
    /// candidates first. Beans whose own evaluation is in progress report as
    /// absent, which breaks recursive condition cycles.
    fn bean_count(&mut self, selector: &Selector) -> BeanResult<usize>;
}

/// Evaluation context handed to [`Condition::matches`].
pub struct CondContext<'a> {
    pub(crate) props: &'a dyn Properties,
    pub(crate) lookup: &'a mut dyn BeanLookup,
}

impl<'a> CondContext<'a> {
    /// Whether the property key is present.
    pub fn has_prop(&self, key: &str) -> bool {
        self.props.has(key)
    }

    /// The raw property value, if present.
    pub fn prop(&self, key: &str) -> Option<String> {
        self.props.get(key)
    }

    /// Counts matching beans; probing an unresolved bean resolves it first.
    pub fn bean_count(&mut self, selector: &Selector) -> BeanResult<usize> {
        self.lookup.bean_count(selector)
    }

    /// The active profile names.
    pub fn profiles(&self) -> Vec<String> {
        self.props
            .get(PROFILES_KEY)
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A predicate gating whether a bean definition survives resolution.
pub trait Condition: Send + Sync {
    /// Evaluates the predicate. Errors abort resolution of the bean's
    /// subtree.
    fn matches(&self, ctx: &mut CondContext<'_>) -> BeanResult<bool>;

    /// Stable description used in diagnostics and error wrapping.
    fn describe(&self) -> String;
}

fn wrap(desc: String, err: BeanError) -> BeanError {
    BeanError::Condition(format!("{}: {}", desc, err))
}

// ----- Atomic predicates -----

/// Property-based condition with optional value matching.
///
/// Truth table over (present, `having_value`, `match_if_missing`):
/// present + matching value (or no expected value) is true; present +
/// mismatch is false; absent is true only with `match_if_missing`.
pub struct OnProperty {
    key: String,
    having_value: Option<String>,
    match_if_missing: bool,
}

/// Matches when the property is present (optionally with a specific value).
pub fn on_property(key: impl Into<String>) -> OnProperty {
    OnProperty {
        key: key.into(),
        having_value: None,
        match_if_missing: false,
    }
}

impl OnProperty {
    /// Requires the property value to equal `value`, or to satisfy a
    /// comparison when prefixed with `expr:` (e.g. `expr:$>3`).
    pub fn having_value(mut self, value: impl Into<String>) -> Self {
        self.having_value = Some(value.into());
        self
    }

    /// Makes an absent property match instead of failing.
    pub fn match_if_missing(mut self) -> Self {
        self.match_if_missing = true;
        self
    }

    pub fn arc(self) -> Arc<dyn Condition> {
        Arc::new(self)
    }
}

impl Condition for OnProperty {
    fn matches(&self, ctx: &mut CondContext<'_>) -> BeanResult<bool> {
        match ctx.prop(&self.key) {
            Some(actual) => match &self.having_value {
                Some(expected) => match expected.strip_prefix("expr:") {
                    Some(e) => {
                        expr::eval(e, &actual).map_err(|err| wrap(self.describe(), err))
                    }
                    None => Ok(actual == *expected),
                },
                None => Ok(true),
            },
            None => Ok(self.match_if_missing),
        }
    }

    fn describe(&self) -> String {
        match &self.having_value {
            Some(v) => format!("OnProperty({}={})", self.key, v),
            None => format!("OnProperty({})", self.key),
        }
    }
}

struct OnMissingProperty {
    key: String,
}

/// Matches when the property is absent.
pub fn on_missing_property(key: impl Into<String>) -> Arc<dyn Condition> {
    Arc::new(OnMissingProperty { key: key.into() })
}

impl Condition for OnMissingProperty {
    fn matches(&self, ctx: &mut CondContext<'_>) -> BeanResult<bool> {
        Ok(!ctx.has_prop(&self.key))
    }

    fn describe(&self) -> String {
        format!("OnMissingProperty({})", self.key)
    }
}

struct OnBean {
    selector: Selector,
}

/// Matches when at least one bean satisfies the selector.
pub fn on_bean(selector: Selector) -> Arc<dyn Condition> {
    Arc::new(OnBean { selector })
}

impl Condition for OnBean {
    fn matches(&self, ctx: &mut CondContext<'_>) -> BeanResult<bool> {
        let n = ctx
            .bean_count(&self.selector)
            .map_err(|e| wrap(self.describe(), e))?;
        Ok(n > 0)
    }

    fn describe(&self) -> String {
        format!("OnBean({})", self.selector)
    }
}

struct OnMissingBean {
    selector: Selector,
}

/// Matches when no bean satisfies the selector.
pub fn on_missing_bean(selector: Selector) -> Arc<dyn Condition> {
    Arc::new(OnMissingBean { selector })
}

impl Condition for OnMissingBean {
    fn matches(&self, ctx: &mut CondContext<'_>) -> BeanResult<bool> {
        let n = ctx
            .bean_count(&self.selector)
            .map_err(|e| wrap(self.describe(), e))?;
        Ok(n == 0)
    }

    fn describe(&self) -> String {
        format!("OnMissingBean({})", self.selector)
    }
}

struct OnSingleBean {
    selector: Selector,
}

/// Matches when exactly one bean satisfies the selector.
pub fn on_single_bean(selector: Selector) -> Arc<dyn Condition> {
    Arc::new(OnSingleBean { selector })
}

impl Condition for OnSingleBean {
    fn matches(&self, ctx: &mut CondContext<'_>) -> BeanResult<bool> {
        let n = ctx
            .bean_count(&self.selector)
            .map_err(|e| wrap(self.describe(), e))?;
        Ok(n == 1)
    }

    fn describe(&self) -> String {
        format!("OnSingleBean({})", self.selector)
    }
}

struct OnProfile {
    profile: String,
}

/// Matches when the named profile is active (see [`PROFILES_KEY`]).
pub fn on_profile(profile: impl Into<String>) -> Arc<dyn Condition> {
    Arc::new(OnProfile {
        profile: profile.into(),
    })
}

impl Condition for OnProfile {
    fn matches(&self, ctx: &mut CondContext<'_>) -> BeanResult<bool> {
        Ok(ctx.profiles().iter().any(|p| p == &self.profile))
    }

    fn describe(&self) -> String {
        format!("OnProfile({})", self.profile)
    }
}

struct Always;

/// Matches unconditionally.
pub fn always() -> Arc<dyn Condition> {
    Arc::new(Always)
}

impl Condition for Always {
    fn matches(&self, _ctx: &mut CondContext<'_>) -> BeanResult<bool> {
        Ok(true)
    }

    fn describe(&self) -> String {
        "Always".to_string()
    }
}

// ----- Combinators -----

struct And {
    parts: Vec<Arc<dyn Condition>>,
}

/// True when every part matches; short-circuits on the first false.
/// Zero parts are vacuously true; one part degenerates to that part.
pub fn all(mut parts: Vec<Arc<dyn Condition>>) -> Arc<dyn Condition> {
    match parts.len() {
        0 => always(),
        1 => parts.remove(0),
        _ => Arc::new(And { parts }),
    }
}

impl Condition for And {
    fn matches(&self, ctx: &mut CondContext<'_>) -> BeanResult<bool> {
        for p in &self.parts {
            if !p.matches(ctx).map_err(|e| wrap(self.describe(), e))? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn describe(&self) -> String {
        format!(
            "And({})",
            self.parts
                .iter()
                .map(|p| p.describe())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

struct Or {
    parts: Vec<Arc<dyn Condition>>,
}

/// True when any part matches; short-circuits on the first true.
/// Zero parts are treated as absent (always true); one part degenerates to
/// that part.
pub fn any(mut parts: Vec<Arc<dyn Condition>>) -> Arc<dyn Condition> {
    match parts.len() {
        0 => always(),
        1 => parts.remove(0),
        _ => Arc::new(Or { parts }),
    }
}

impl Condition for Or {
    fn matches(&self, ctx: &mut CondContext<'_>) -> BeanResult<bool> {
        for p in &self.parts {
            if p.matches(ctx).map_err(|e| wrap(self.describe(), e))? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn describe(&self) -> String {
        format!(
            "Or({})",
            self.parts
                .iter()
                .map(|p| p.describe())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

struct Not {
    inner: Arc<dyn Condition>,
}

/// Inverts a condition.
pub fn not(inner: Arc<dyn Condition>) -> Arc<dyn Condition> {
    Arc::new(Not { inner })
}

impl Condition for Not {
    fn matches(&self, ctx: &mut CondContext<'_>) -> BeanResult<bool> {
        let v = self
            .inner
            .matches(ctx)
            .map_err(|e| wrap(self.describe(), e))?;
        Ok(!v)
    }

    fn describe(&self) -> String {
        format!("Not({})", self.inner.describe())
    }
}

struct NoneOf {
    parts: Vec<Arc<dyn Condition>>,
}

/// True iff all parts are false.
pub fn none(parts: Vec<Arc<dyn Condition>>) -> Arc<dyn Condition> {
    Arc::new(NoneOf { parts })
}

impl Condition for NoneOf {
    fn matches(&self, ctx: &mut CondContext<'_>) -> BeanResult<bool> {
        for p in &self.parts {
            if p.matches(ctx).map_err(|e| wrap(self.describe(), e))? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn describe(&self) -> String {
        format!(
            "None({})",
            self.parts
                .iter()
                .map(|p| p.describe())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::MapProperties;

    struct NoBeans;
    impl BeanLookup for NoBeans {
        fn bean_count(&mut self, _selector: &Selector) -> BeanResult<usize> {
            Ok(0)
        }
    }

    fn ctx_with<'a>(props: &'a MapProperties, lookup: &'a mut NoBeans) -> CondContext<'a> {
        CondContext { props, lookup }
    }

    #[test]
    fn on_property_truth_table() {
        let mut lookup = NoBeans;
        let mut present = MapProperties::new();
        present.set("x", "1");
        let absent = MapProperties::new();

        // present, no expected value
        let c = on_property("x");
        assert!(c.matches(&mut ctx_with(&present, &mut lookup)).unwrap());

        // present, matching value
        let c = on_property("x").having_value("1");
        assert!(c.matches(&mut ctx_with(&present, &mut lookup)).unwrap());

        // present, mismatching value (match_if_missing does not help)
        let c = on_property("x").having_value("2").match_if_missing();
        assert!(!c.matches(&mut ctx_with(&present, &mut lookup)).unwrap());

        // absent without match_if_missing
        let c = on_property("x").having_value("1");
        assert!(!c.matches(&mut ctx_with(&absent, &mut lookup)).unwrap());

        // absent with match_if_missing
        let c = on_property("x").match_if_missing();
        assert!(c.matches(&mut ctx_with(&absent, &mut lookup)).unwrap());
    }

    #[test]
    fn on_property_expression_values() {
        let mut lookup = NoBeans;
        let mut props = MapProperties::new();
        props.set("threads", "8");

        let c = on_property("threads").having_value("expr:$>4");
        assert!(c.matches(&mut ctx_with(&props, &mut lookup)).unwrap());

        let c = on_property("threads").having_value("expr:$>16");
        assert!(!c.matches(&mut ctx_with(&props, &mut lookup)).unwrap());
    }

    #[test]
    fn combinators_short_circuit_and_degenerate() {
        let mut lookup = NoBeans;
        let props = MapProperties::new();

        assert!(all(vec![])
            .matches(&mut ctx_with(&props, &mut lookup))
            .unwrap());
        assert!(any(vec![])
            .matches(&mut ctx_with(&props, &mut lookup))
            .unwrap());

        // one-argument combinator keeps the inner description
        let single = all(vec![on_missing_property("x")]);
        assert_eq!(single.describe(), "OnMissingProperty(x)");

        let c = none(vec![on_property("a").arc(), on_property("b").arc()]);
        assert!(c.matches(&mut ctx_with(&props, &mut lookup)).unwrap());

        let c = not(on_missing_property("a"));
        assert!(!c.matches(&mut ctx_with(&props, &mut lookup)).unwrap());
    }

    #[test]
    fn profiles_parse_comma_list() {
        let mut lookup = NoBeans;
        let mut props = MapProperties::new();
        props.set(PROFILES_KEY, "dev, test");

        assert!(on_profile("dev")
            .matches(&mut ctx_with(&props, &mut lookup))
            .unwrap());
        assert!(!on_profile("prod")
            .matches(&mut ctx_with(&props, &mut lookup))
            .unwrap());
    }
}
