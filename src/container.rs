//! The container: registration surface, startup pipeline, lookups, and
//! shutdown.
//!
//! A [`Container`] is an explicit value owned by the host application; there
//! is no process-global instance. Its lifecycle is `Default` (accepting
//! registrations) -> `Refreshing` (resolution and wiring in progress) ->
//! `Refreshed` (serving wired instances). After `Refreshed`, only the
//! refresh engine mutates state, and only field values, never topology.

use std::any::TypeId;
use std::sync::Arc;

use crate::bean::{
    BeanBuilder, BeanDefinition, BeanHandle, BeanMock, BeanStatus, MockObject, Selector,
};
use crate::error::{BeanError, BeanResult};
use crate::lifecycle::{DestroySequencer, Lifecycle};
use crate::props::Properties;
use crate::refresh::RefreshEngine;
use crate::resolver::resolve_all;
use crate::wiring::{select_candidate, wire_all, WiringCtx, WiringStack};
use crate::bean::{view_as, AnyArc};

pub(crate) type GroupFn =
    Box<dyn Fn(&dyn Properties) -> BeanResult<Vec<BeanDefinition>> + Send + Sync>;

/// Container lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// Accepting registrations
    Default,
    /// Resolution and wiring in progress
    Refreshing,
    /// Wired; serving lookups
    Refreshed,
}

/// Runtime record for one registered bean.
pub(crate) struct BeanRecord {
    pub(crate) def: BeanDefinition,
    pub(crate) status: BeanStatus,
    pub(crate) instance: Option<AnyArc>,
    pub(crate) mock: Option<MockObject>,
}

impl BeanRecord {
    pub(crate) fn new(def: BeanDefinition) -> Self {
        Self {
            def,
            status: BeanStatus::Default,
            instance: None,
            mock: None,
        }
    }

    /// Whether this bean is assignable to the selector. Mocked beans match
    /// through the capabilities the mock declares.
    pub(crate) fn matches(&self, selector: &Selector) -> bool {
        if self.status == BeanStatus::Deleted {
            return false;
        }
        if let Some(name) = &selector.name {
            if *name != self.def.name {
                return false;
            }
        }
        match &self.mock {
            Some(mock) => mock.exports.iter().any(|e| e.type_id == selector.type_id),
            None => self.def.exports_type(selector.type_id),
        }
    }

    /// Produces the typed view of the wired instance for a selector type.
    pub(crate) fn view_of(&self, type_id: TypeId) -> Option<AnyArc> {
        let instance = self.instance.as_ref()?;
        let exports = match &self.mock {
            Some(mock) => &mock.exports,
            None => &self.def.exports,
        };
        exports
            .iter()
            .find(|e| e.type_id == type_id)
            .and_then(|e| (e.cast)(instance))
    }

    pub(crate) fn has_destroy_action(&self) -> bool {
        self.mock.is_none() && self.def.has_destroy_action()
    }
}

/// Bean container.
///
/// # Examples
///
/// ```rust
/// use wirebox::{Args, BeanBuilder, Container, MapProperties, Selector};
/// use std::sync::Arc;
///
/// struct Config { url: String }
/// struct Repo { config: Arc<Config> }
///
/// let mut c = Container::new(MapProperties::new());
/// c.register(BeanBuilder::instance(Config { url: "localhost".into() })).unwrap();
/// c.register(
///     BeanBuilder::factory(|args: &Args| {
///         Ok(Repo { config: args.get::<Config>(0)? })
///     })
///     .arg(Selector::of::<Config>()),
/// )
/// .unwrap();
///
/// c.refresh().unwrap();
/// let repo = c.get::<Repo>().unwrap();
/// assert_eq!(repo.config.url, "localhost");
/// c.close();
/// ```
pub struct Container {
    props: Arc<dyn Properties>,
    state: ContainerState,
    records: Vec<BeanRecord>,
    groups: Vec<GroupFn>,
    mocks: Vec<BeanMock>,
    refresh_engine: RefreshEngine,
    destroyers: DestroySequencer,
    destroyed: bool,
}

impl Container {
    /// Creates a container over a property collaborator.
    pub fn new(props: impl Properties + 'static) -> Self {
        Self::with_props(Arc::new(props))
    }

    /// Creates a container over a shared property collaborator.
    pub fn with_props(props: Arc<dyn Properties>) -> Self {
        Self {
            props,
            state: ContainerState::Default,
            records: Vec::new(),
            groups: Vec::new(),
            mocks: Vec::new(),
            refresh_engine: RefreshEngine::new(),
            destroyers: DestroySequencer::new(),
            destroyed: false,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ContainerState {
        self.state
    }

    /// Registers a bean definition. Only legal before [`refresh`](Self::refresh).
    pub fn register<T: Send + Sync + 'static>(
        &mut self,
        builder: BeanBuilder<T>,
    ) -> BeanResult<BeanHandle> {
        if self.state != ContainerState::Default {
            return Err(BeanError::State("registration after refresh started"));
        }
        let def = builder.into_definition();
        let handle = BeanHandle {
            type_id: def.type_id,
            type_name: def.type_name,
            name: def.name.clone(),
        };
        self.records.push(BeanRecord::new(def));
        Ok(handle)
    }

    /// Registers a generator invoked at resolution time with the property
    /// source; its definitions join the bean set. Enables config-driven
    /// fan-out such as one bean per configured sub-section.
    pub fn group_register<F>(&mut self, generator: F) -> BeanResult<()>
    where
        F: Fn(&dyn Properties) -> BeanResult<Vec<BeanDefinition>> + Send + Sync + 'static,
    {
        if self.state != ContainerState::Default {
            return Err(BeanError::State("group registration after refresh started"));
        }
        self.groups.push(Box::new(generator));
        Ok(())
    }

    /// Registers a mock applied during resolution, before condition
    /// evaluation. The selector must match exactly one bean.
    pub fn mock(&mut self, object: MockObject, selector: Selector) -> BeanResult<()> {
        if self.state != ContainerState::Default {
            return Err(BeanError::State("mock registration after refresh started"));
        }
        self.mocks.push(BeanMock { object, selector });
        Ok(())
    }

    /// Runs resolution and wiring once: group fan-out, configuration
    /// expansion, mocks, conditions, duplicate checks, then demand-driven
    /// instantiation with the deferred lazy pass. On success the container
    /// is `Refreshed` and serves lookups. After a failed refresh the
    /// container cannot be retried; [`close`](Self::close) still tears down
    /// whatever was constructed.
    pub fn refresh(&mut self) -> BeanResult<()> {
        match self.state {
            ContainerState::Default => {}
            ContainerState::Refreshing => {
                return Err(BeanError::State(
                    "previous refresh attempt failed; the container cannot be reused",
                ))
            }
            ContainerState::Refreshed => {
                return Err(BeanError::State("container already refreshed"))
            }
        }
        self.state = ContainerState::Refreshing;

        let props = self.props.clone();
        resolve_all(
            &mut self.records,
            &self.groups,
            std::mem::take(&mut self.mocks),
            props.as_ref(),
        )?;

        let mut ctx = WiringCtx {
            records: &mut self.records,
            props: props.as_ref(),
            refresh: &self.refresh_engine,
            stack: WiringStack::new(),
        };
        let wired = wire_all(&mut ctx);
        // Beans constructed before a wiring failure still need their destroy
        // actions on close(), so the edges are kept either way.
        self.destroyers = ctx.stack.destroyers;
        wired?;

        self.state = ContainerState::Refreshed;
        tracing::debug!(
            beans = self.records.len(),
            refreshable = self.refresh_engine.binding_count(),
            "container refreshed"
        );
        Ok(())
    }

    /// Applies a new property snapshot to all refreshable bindings.
    /// Validation failures reject the whole batch; previously committed
    /// values stay readable. Concurrent calls serialize against each other
    /// without blocking bean reads.
    pub fn refresh_properties(&self, snapshot: &dyn Properties) -> BeanResult<()> {
        if self.state != ContainerState::Refreshed {
            return Err(BeanError::State("refresh_properties before container wired"));
        }
        self.refresh_engine.refresh(snapshot)
    }

    fn ensure_refreshed(&self) -> BeanResult<()> {
        if self.state != ContainerState::Refreshed {
            return Err(BeanError::State("lookup before container wired"));
        }
        Ok(())
    }

    /// Resolves the single bean assignable to `U` (primary wins ties).
    pub fn get<U: ?Sized + Send + Sync + 'static>(&self) -> BeanResult<Arc<U>> {
        self.find(&Selector::of::<U>())
    }

    /// Resolves the single bean assignable to `U` with the given name.
    pub fn get_named<U: ?Sized + Send + Sync + 'static>(&self, name: &str) -> BeanResult<Arc<U>> {
        self.find(&Selector::of::<U>().named(name))
    }

    /// Resolves by explicit selector.
    pub fn find<U: ?Sized + Send + Sync + 'static>(&self, selector: &Selector) -> BeanResult<Arc<U>> {
        self.ensure_refreshed()?;
        match select_candidate(&self.records, selector)? {
            Some(i) => self.records[i]
                .view_of(selector.type_id)
                .and_then(|v| view_as::<U>(&v))
                .ok_or_else(|| BeanError::NotFound(selector.to_string())),
            None => Err(BeanError::NotFound(selector.to_string())),
        }
    }

    /// All wired beans assignable to `U`, sorted by bean name.
    pub fn get_all<U: ?Sized + Send + Sync + 'static>(&self) -> BeanResult<Vec<Arc<U>>> {
        Ok(self
            .get_all_named::<U>()?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    /// All wired beans assignable to `U` with their names, sorted by name.
    pub fn get_all_named<U: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> BeanResult<Vec<(String, Arc<U>)>> {
        self.ensure_refreshed()?;
        let selector = Selector::of::<U>();
        let mut out: Vec<(String, Arc<U>)> = self
            .records
            .iter()
            .filter(|r| r.matches(&selector))
            .filter_map(|r| {
                r.view_of(selector.type_id)
                    .and_then(|v| view_as::<U>(&v))
                    .map(|v| (r.def.name.clone(), v))
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    /// Bean names and statuses, for diagnostics.
    pub fn bean_statuses(&self) -> Vec<(String, BeanStatus)> {
        self.records
            .iter()
            .map(|r| (r.def.describe(), r.status))
            .collect()
    }

    /// Runs the destroy sequence: dependents strictly before their
    /// dependencies, each destroy action at most once. Destroy errors are
    /// logged and never block later actions. Idempotent.
    pub fn close(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        let order = self.destroyers.sequence();
        for index in order {
            let record = &self.records[index];
            let Some(instance) = record.instance.clone() else {
                continue;
            };
            let describe = record.def.describe();
            if let Some(destroy) = record.def.destroy.clone() {
                if let Err(e) = destroy(&instance) {
                    tracing::error!(bean = %describe, error = %e, "destroy hook failed");
                }
            }
            if let Some(view) = record.view_of(TypeId::of::<dyn Lifecycle>()) {
                if let Some(lc) = view_as::<dyn Lifecycle>(&view) {
                    lc.on_destroy();
                }
            }
        }
        tracing::debug!("container closed");
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if !self.destroyed && !self.destroyers.is_empty() {
            tracing::warn!(
                "container dropped with pending destroy actions; call close() before dropping"
            );
        }
    }
}
