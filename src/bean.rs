//! Bean metadata model.
//!
//! A [`BeanDefinition`] is the canonical, type-erased description of one
//! managed object: how to produce it (pre-built instance or factory plus an
//! ordered list of dependency slots), which conditions gate it, which
//! capability types it exports, and which lifecycle hooks it carries.
//! Definitions are created through the typed [`BeanBuilder`], which captures
//! all downcasts at compile time; the container never inspects types at
//! runtime beyond `TypeId` equality.

use std::any::{Any, TypeId};
use std::fmt;
use std::fmt::Display;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

use crate::cond::Condition;
use crate::error::{BeanError, BeanResult};
use crate::lifecycle::Lifecycle;
use crate::props::parse_value;
use crate::refresh::{DynamicBinding, RefreshTarget};
use crate::refresh::Dynamic;
use crate::wiring::Args;

/// Type-erased shared instance.
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

/// Erases a (possibly unsized) `Arc<U>` into the uniform view payload.
///
/// All selector-typed views of a bean use this shape: the `dyn Any` payload
/// is the sized `Arc<U>` itself, so trait objects and concrete types travel
/// the same way.
pub(crate) fn erase_view<U>(v: Arc<U>) -> AnyArc
where
    U: ?Sized + Send + Sync + 'static,
{
    Arc::new(v)
}

/// Recovers a typed `Arc<U>` from a view payload produced by [`erase_view`].
pub(crate) fn view_as<U>(any: &AnyArc) -> Option<Arc<U>>
where
    U: ?Sized + Send + Sync + 'static,
{
    any.downcast_ref::<Arc<U>>().cloned()
}

pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    // Generic arguments carry their own paths; take the last segment of the
    // base path only, so `Vec<app::Handler>` shortens to `Vec`.
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Selects beans by type (concrete or exported capability) and optional name.
///
/// # Examples
///
/// ```rust
/// use wirebox::Selector;
///
/// trait Repo: Send + Sync {}
/// struct PgRepo;
///
/// let any_repo = Selector::of::<dyn Repo>();
/// let named = Selector::of::<PgRepo>().named("primary");
/// assert_eq!(named.name(), Some("primary"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Selector {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) name: Option<String>,
}

impl Selector {
    /// Builds a selector for a concrete type or a `dyn Trait` capability.
    pub fn of<U>() -> Self
    where
        U: ?Sized + Send + Sync + 'static,
    {
        Self {
            type_id: TypeId::of::<U>(),
            type_name: std::any::type_name::<U>(),
            name: None,
        }
    }

    /// Restricts the selector to a specific bean name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the name restriction, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(n) => write!(f, "{}(name={})", short_type_name(self.type_name), n),
            None => write!(f, "{}", short_type_name(self.type_name)),
        }
    }
}

/// Capability view a bean advertises: a target type plus the caster that
/// produces it from the type-erased instance.
pub(crate) struct Export {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) cast: Arc<dyn Fn(&AnyArc) -> Option<AnyArc> + Send + Sync>,
}

impl Clone for Export {
    fn clone(&self) -> Self {
        Self {
            type_id: self.type_id,
            type_name: self.type_name,
            cast: self.cast.clone(),
        }
    }
}

pub(crate) fn identity_export<T: Send + Sync + 'static>() -> Export {
    Export {
        type_id: TypeId::of::<T>(),
        type_name: std::any::type_name::<T>(),
        cast: Arc::new(|inst: &AnyArc| inst.clone().downcast::<T>().ok().map(erase_view)),
    }
}

/// Dependency slot kinds. The wildcard entry in collection ordering is the
/// literal `"*"`.
pub(crate) enum Slot {
    /// A literal value captured at registration time (view-shaped payload).
    Literal(AnyArc),
    /// A property placeholder resolved and converted at wiring time.
    Prop {
        expr: String,
        binder: Arc<dyn Fn(&str) -> BeanResult<AnyArc> + Send + Sync>,
    },
    /// A single bean reference.
    Bean {
        selector: Selector,
        nullable: bool,
        lazy: bool,
    },
    /// All beans assignable to an element type, with explicit ordering.
    Collection {
        elem: Selector,
        order: Vec<String>,
        nullable: bool,
    },
    /// Padding for index-addressed option arguments.
    Hole,
}

impl Clone for Slot {
    fn clone(&self) -> Self {
        match self {
            Slot::Literal(v) => Slot::Literal(v.clone()),
            Slot::Prop { expr, binder } => Slot::Prop {
                expr: expr.clone(),
                binder: binder.clone(),
            },
            Slot::Bean {
                selector,
                nullable,
                lazy,
            } => Slot::Bean {
                selector: selector.clone(),
                nullable: *nullable,
                lazy: *lazy,
            },
            Slot::Collection {
                elem,
                order,
                nullable,
            } => Slot::Collection {
                elem: elem.clone(),
                order: order.clone(),
                nullable: *nullable,
            },
            Slot::Hole => Slot::Hole,
        }
    }
}

pub(crate) type FactoryFn = Arc<dyn Fn(&Args<'_>) -> BeanResult<AnyArc> + Send + Sync>;
pub(crate) type HookFn = Arc<dyn Fn(&AnyArc) -> BeanResult<()> + Send + Sync>;

/// Bean lifecycle status. Transitions are monotonic; `Deleted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeanStatus {
    /// Registered, not yet examined
    Default,
    /// Condition evaluation in progress
    Resolving,
    /// Conditions passed; part of the active set
    Resolved,
    /// Conditions failed or mock displaced it; permanently excluded
    Deleted,
    /// Factory invocation in progress
    Creating,
    /// Constructed, hooks not yet complete
    Created,
    /// Fully wired and observable by dependents
    Wired,
}

/// Include/exclude patterns for configuration-bean factory-method scanning.
///
/// Patterns use `*` as a wildcard. With no include pattern, the conventional
/// factory-method prefix `new_*` is assumed.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationScan {
    pub(crate) includes: Vec<String>,
    pub(crate) excludes: Vec<String>,
}

impl ConfigurationScan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an include pattern; at least one include must match a method.
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.includes.push(pattern.into());
        self
    }

    /// Adds an exclude pattern; any match drops the method.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.excludes.push(pattern.into());
        self
    }
}

/// A named factory method registered on a configuration bean. Surviving
/// methods are expanded into child bean definitions by the resolver.
pub(crate) struct FactoryMethod {
    pub(crate) name: String,
    pub(crate) def: BeanDefinition,
}

pub(crate) struct RefreshBinding {
    pub(crate) key: String,
    pub(crate) validate: Option<String>,
    pub(crate) make: Arc<dyn Fn(&AnyArc) -> Option<Box<dyn RefreshTarget>> + Send + Sync>,
}

impl Clone for RefreshBinding {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            validate: self.validate.clone(),
            make: self.make.clone(),
        }
    }
}

/// Type-erased bean description. Built through [`BeanBuilder`].
pub struct BeanDefinition {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) name: String,
    pub(crate) instance: Option<AnyArc>,
    pub(crate) factory: Option<FactoryFn>,
    pub(crate) slots: Vec<Slot>,
    pub(crate) conditions: Vec<Arc<dyn Condition>>,
    pub(crate) exports: Vec<Export>,
    pub(crate) depends_on: Vec<Selector>,
    pub(crate) init: Option<HookFn>,
    pub(crate) destroy: Option<HookFn>,
    pub(crate) configuration: Option<ConfigurationScan>,
    pub(crate) methods: Vec<FactoryMethod>,
    pub(crate) refresh_bindings: Vec<RefreshBinding>,
    pub(crate) primary: bool,
}

impl BeanDefinition {
    /// The bean name (unique within its type scope).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The produced type's name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn describe(&self) -> String {
        format!("{}({})", short_type_name(self.type_name), self.name)
    }

    pub(crate) fn exports_type(&self, type_id: TypeId) -> bool {
        self.exports.iter().any(|e| e.type_id == type_id)
    }

    pub(crate) fn has_destroy_action(&self) -> bool {
        self.destroy.is_some() || self.exports_type(TypeId::of::<dyn Lifecycle>())
    }
}

/// Handle returned from registration; identifies the bean for later lookups.
#[derive(Clone, Debug)]
pub struct BeanHandle {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) name: String,
}

impl BeanHandle {
    /// The registered bean name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A selector targeting exactly this bean.
    pub fn selector(&self) -> Selector {
        Selector {
            type_id: self.type_id,
            type_name: self.type_name,
            name: Some(self.name.clone()),
        }
    }
}

/// Typed builder producing a [`BeanDefinition`].
///
/// # Examples
///
/// ```rust
/// use wirebox::{Args, BeanBuilder, BeanResult, Selector};
/// use std::sync::Arc;
///
/// struct Config { url: String }
/// struct Repo { config: Arc<Config> }
///
/// let config = BeanBuilder::instance(Config { url: "postgres://localhost".into() })
///     .name("config");
///
/// let repo = BeanBuilder::factory(|args: &Args| {
///     Ok(Repo { config: args.get::<Config>(0)? })
/// })
/// .arg(Selector::of::<Config>());
/// ```
pub struct BeanBuilder<T: Send + Sync + 'static> {
    def: BeanDefinition,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> BeanBuilder<T> {
    fn empty() -> Self {
        Self {
            def: BeanDefinition {
                type_id: TypeId::of::<T>(),
                type_name: std::any::type_name::<T>(),
                name: short_type_name(std::any::type_name::<T>()).to_string(),
                instance: None,
                factory: None,
                slots: Vec::new(),
                conditions: Vec::new(),
                exports: vec![identity_export::<T>()],
                depends_on: Vec::new(),
                init: None,
                destroy: None,
                configuration: None,
                methods: Vec::new(),
                refresh_bindings: Vec::new(),
                primary: false,
            },
            _marker: PhantomData,
        }
    }

    /// Starts from a pre-built instance; no factory is invoked.
    pub fn instance(value: T) -> Self {
        let mut b = Self::empty();
        b.def.instance = Some(Arc::new(value));
        b
    }

    /// Starts from a factory invoked during wiring with bound arguments.
    pub fn factory<F>(f: F) -> Self
    where
        F: Fn(&Args<'_>) -> BeanResult<T> + Send + Sync + 'static,
    {
        let mut b = Self::empty();
        b.def.factory = Some(Arc::new(move |args: &Args<'_>| {
            Ok(Arc::new(f(args)?) as AnyArc)
        }));
        b
    }

    /// Overrides the bean name (default: the short type name).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.def.name = name.into();
        self
    }

    /// Appends a condition; all conditions must pass for the bean to survive
    /// resolution.
    pub fn condition(mut self, cond: Arc<dyn Condition>) -> Self {
        self.def.conditions.push(cond);
        self
    }

    /// Advertises the bean under a capability type. The caster is checked
    /// against the constructed value during wiring.
    pub fn export<U>(mut self, cast: fn(Arc<T>) -> Arc<U>) -> Self
    where
        U: ?Sized + Send + Sync + 'static,
    {
        self.def.exports.push(Export {
            type_id: TypeId::of::<U>(),
            type_name: std::any::type_name::<U>(),
            cast: Arc::new(move |inst: &AnyArc| {
                inst.clone()
                    .downcast::<T>()
                    .ok()
                    .map(|t| erase_view(cast(t)))
            }),
        });
        self
    }

    /// Adds an explicit extra dependency edge wired before this bean.
    pub fn depends_on(mut self, selector: Selector) -> Self {
        self.def.depends_on.push(selector);
        self
    }

    /// Marks this bean as the winner of ambiguous scalar-selection ties.
    pub fn primary(mut self) -> Self {
        self.def.primary = true;
        self
    }

    /// Runs after construction and injection; a failure aborts startup.
    pub fn init<F>(mut self, f: F) -> Self
    where
        F: Fn(&Arc<T>) -> BeanResult<()> + Send + Sync + 'static,
    {
        self.def.init = Some(Arc::new(move |inst: &AnyArc| {
            let t = inst
                .clone()
                .downcast::<T>()
                .map_err(|_| BeanError::Init("init hook target type mismatch".to_string()))?;
            f(&t)
        }));
        self
    }

    /// Runs during shutdown in dependency order; errors are logged, never
    /// propagated.
    pub fn destroy<F>(mut self, f: F) -> Self
    where
        F: Fn(&Arc<T>) -> BeanResult<()> + Send + Sync + 'static,
    {
        self.def.destroy = Some(Arc::new(move |inst: &AnyArc| {
            let t = inst
                .clone()
                .downcast::<T>()
                .map_err(|_| BeanError::Init("destroy hook target type mismatch".to_string()))?;
            f(&t)
        }));
        self
    }

    /// Exports the bean's own [`Lifecycle`] implementation; `on_init` runs
    /// after the init hook and `on_destroy` joins the destroy sequence.
    pub fn lifecycle(self) -> Self
    where
        T: Lifecycle,
    {
        self.export::<dyn Lifecycle>(|t| t as Arc<dyn Lifecycle>)
    }

    // ----- Dependency slots -----

    /// Binds the next factory argument to a literal value.
    pub fn arg_value<V: Send + Sync + 'static>(mut self, value: V) -> Self {
        self.def.slots.push(Slot::Literal(erase_view(Arc::new(value))));
        self
    }

    /// Binds the next factory argument to a property placeholder, resolved
    /// through the property collaborator and converted via `FromStr`.
    pub fn arg_prop<V>(mut self, placeholder: impl Into<String>) -> Self
    where
        V: FromStr + Send + Sync + 'static,
        V::Err: Display,
    {
        let expr = placeholder.into();
        let context = expr.clone();
        self.def.slots.push(Slot::Prop {
            expr,
            binder: Arc::new(move |raw: &str| {
                let v: V = parse_value(raw, &context)?;
                Ok(erase_view(Arc::new(v)))
            }),
        });
        self
    }

    /// Binds the next factory argument to exactly one bean.
    pub fn arg(mut self, selector: Selector) -> Self {
        self.def.slots.push(Slot::Bean {
            selector,
            nullable: false,
            lazy: false,
        });
        self
    }

    /// Like [`arg`](Self::arg), but a missing candidate yields `None` instead
    /// of an error.
    pub fn arg_nullable(mut self, selector: Selector) -> Self {
        self.def.slots.push(Slot::Bean {
            selector,
            nullable: true,
            lazy: false,
        });
        self
    }

    /// Defers resolution of this argument until after the primary wiring pass.
    /// The factory receives a [`Lazy`](crate::Lazy) handle; this is the
    /// sanctioned way to break an instantiation cycle.
    pub fn arg_lazy(mut self, selector: Selector) -> Self {
        self.def.slots.push(Slot::Bean {
            selector,
            nullable: false,
            lazy: true,
        });
        self
    }

    /// Binds the next factory argument to all beans assignable to the element
    /// type. `order` lists bean names placed around at most one `"*"`
    /// wildcard; the wildcard group is sorted by bean name.
    pub fn arg_collection<U>(mut self, order: &[&str]) -> Self
    where
        U: ?Sized + Send + Sync + 'static,
    {
        self.def.slots.push(Slot::Collection {
            elem: Selector::of::<U>(),
            order: order.iter().map(|s| s.to_string()).collect(),
            nullable: false,
        });
        self
    }

    /// Like [`arg_collection`](Self::arg_collection), but an empty result is
    /// allowed.
    pub fn arg_collection_nullable<U>(mut self, order: &[&str]) -> Self
    where
        U: ?Sized + Send + Sync + 'static,
    {
        self.def.slots.push(Slot::Collection {
            elem: Selector::of::<U>(),
            order: order.iter().map(|s| s.to_string()).collect(),
            nullable: true,
        });
        self
    }

    /// Places a bean argument at a fixed index, padding skipped positions.
    /// Unfilled positions read as absent option arguments.
    pub fn arg_at(mut self, index: usize, selector: Selector) -> Self {
        while self.def.slots.len() < index {
            self.def.slots.push(Slot::Hole);
        }
        self.def.slots.push(Slot::Bean {
            selector,
            nullable: true,
            lazy: false,
        });
        self
    }

    // ----- Configuration scanning -----

    /// Marks this bean as a configuration scanner with the given patterns.
    pub fn configuration(mut self, scan: ConfigurationScan) -> Self {
        self.def.configuration = Some(scan);
        self
    }

    /// Registers a named factory method; surviving methods become child beans
    /// conditioned on this bean's presence.
    pub fn method<U: Send + Sync + 'static>(
        mut self,
        name: impl Into<String>,
        child: BeanBuilder<U>,
    ) -> Self {
        let name = name.into();
        let mut def = child.into_definition();
        def.name = name.clone();
        self.def.methods.push(FactoryMethod { name, def });
        self
    }

    // ----- Dynamic refresh -----

    /// Registers a refreshable binding: `accessor` returns the [`Dynamic`]
    /// field owned by the bean, re-bound from `key` on every property
    /// refresh.
    pub fn refreshable<V, A>(self, key: impl Into<String>, accessor: A) -> Self
    where
        V: FromStr + Clone + Send + Sync + 'static,
        V::Err: Display,
        A: Fn(&T) -> Dynamic<V> + Send + Sync + 'static,
    {
        self.refresh_binding(key, None, accessor)
    }

    /// Like [`refreshable`](Self::refreshable), with a validation expression
    /// (`$` is the candidate raw value, e.g. `"$<6"`) checked before commit.
    pub fn refreshable_validated<V, A>(
        self,
        key: impl Into<String>,
        validate: impl Into<String>,
        accessor: A,
    ) -> Self
    where
        V: FromStr + Clone + Send + Sync + 'static,
        V::Err: Display,
        A: Fn(&T) -> Dynamic<V> + Send + Sync + 'static,
    {
        self.refresh_binding(key, Some(validate.into()), accessor)
    }

    fn refresh_binding<V, A>(
        mut self,
        key: impl Into<String>,
        validate: Option<String>,
        accessor: A,
    ) -> Self
    where
        V: FromStr + Clone + Send + Sync + 'static,
        V::Err: Display,
        A: Fn(&T) -> Dynamic<V> + Send + Sync + 'static,
    {
        let key = key.into();
        let binding_key = key.clone();
        let binding_validate = validate.clone();
        self.def.refresh_bindings.push(RefreshBinding {
            key,
            validate,
            make: Arc::new(move |inst: &AnyArc| {
                let t = inst.clone().downcast::<T>().ok()?;
                Some(Box::new(DynamicBinding::new(
                    binding_key.clone(),
                    binding_validate.clone(),
                    accessor(&t),
                )) as Box<dyn RefreshTarget>)
            }),
        });
        self
    }

    /// Finalizes the builder. Needed when handing definitions to
    /// [`Container::group_register`](crate::Container::group_register);
    /// [`Container::register`](crate::Container::register) accepts the
    /// builder directly.
    pub fn into_definition(self) -> BeanDefinition {
        self.def
    }
}

/// Replacement object applied during resolution in place of a matched bean.
///
/// The mock declares the capability types it implements; resolution fails
/// with an unimplemented-interface error if the displaced bean exports a
/// capability the mock does not cover.
pub struct MockObject {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) instance: AnyArc,
    pub(crate) exports: Vec<Export>,
}

impl MockObject {
    /// Wraps a concrete replacement value.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            instance: Arc::new(value),
            exports: vec![identity_export::<T>()],
        }
    }

    /// Declares a capability the mock satisfies.
    pub fn export<T, U>(mut self, cast: fn(Arc<T>) -> Arc<U>) -> Self
    where
        T: Send + Sync + 'static,
        U: ?Sized + Send + Sync + 'static,
    {
        self.exports.push(Export {
            type_id: TypeId::of::<U>(),
            type_name: std::any::type_name::<U>(),
            cast: Arc::new(move |inst: &AnyArc| {
                inst.clone()
                    .downcast::<T>()
                    .ok()
                    .map(|t| erase_view(cast(t)))
            }),
        });
        self
    }
}

pub(crate) struct BeanMock {
    pub(crate) object: MockObject,
    pub(crate) selector: Selector,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_type_names() {
        assert_eq!(short_type_name("app::repo::PgRepo"), "PgRepo");
        assert_eq!(short_type_name("PgRepo"), "PgRepo");
        assert_eq!(short_type_name("alloc::vec::Vec<app::Handler>"), "Vec");
        assert_eq!(
            short_type_name("dyn app::Handler + Send + Sync"),
            "Handler + Send + Sync"
        );
    }

    #[test]
    fn default_bean_name_drops_generic_arguments() {
        struct Wrapper<T>(std::marker::PhantomData<T>);
        struct Inner;

        let def = BeanBuilder::instance(Wrapper::<Inner>(std::marker::PhantomData))
            .into_definition();
        assert_eq!(def.name(), "Wrapper");
    }
}
