//! Wiring engine: demand-driven, memoized bean instantiation.
//!
//! Wiring walks the resolved bean set, constructing each bean at most once.
//! A bean's dependency slots are bound first (recursively wiring their
//! targets), then its factory runs, exports are verified, hooks fire, and
//! refreshable bindings register. The wiring stack detects true
//! instantiation cycles and reports the full path; slots marked lazy are
//! queued and filled in a second pass once the primary pass completes, which
//! is the sanctioned way to break a cycle.

use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::bean::{view_as, AnyArc, BeanStatus, Selector, Slot};
use crate::container::BeanRecord;
use crate::error::{BeanError, BeanResult};
use crate::lifecycle::{DestroySequencer, Lifecycle};
use crate::props::Properties;
use crate::refresh::RefreshEngine;

/// Deferred bean reference delivered to factories for lazy slots.
///
/// Empty during the primary wiring pass; resolved before the container
/// reports `Refreshed`. Reading it from inside a factory is an error by
/// construction (that would be the cycle the lazy edge exists to break).
pub struct Lazy<U: ?Sized + Send + Sync + 'static> {
    cell: Arc<OnceCell<AnyArc>>,
    what: String,
    _marker: PhantomData<fn() -> Arc<U>>,
}

impl<U: ?Sized + Send + Sync + 'static> Clone for Lazy<U> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            what: self.what.clone(),
            _marker: PhantomData,
        }
    }
}

impl<U: ?Sized + Send + Sync + 'static> Lazy<U> {
    /// Returns the resolved bean, or an error when the deferred pass has not
    /// run (or found nothing for a nullable slot).
    pub fn get(&self) -> BeanResult<Arc<U>> {
        self.try_get()
            .ok_or_else(|| BeanError::NotFound(format!("lazy reference {}", self.what)))
    }

    /// Non-failing variant of [`get`](Self::get).
    pub fn try_get(&self) -> Option<Arc<U>> {
        self.cell.get().and_then(view_as::<U>)
    }
}

pub(crate) struct PendingLazy {
    cell: Arc<OnceCell<AnyArc>>,
    selector: Selector,
    nullable: bool,
    owner: String,
}

/// Per-refresh wiring state: the instantiation chain, destroyer edges, and
/// the deferred-injection queue.
pub(crate) struct WiringStack {
    path: Vec<usize>,
    pub(crate) destroyers: DestroySequencer,
    lazy: Vec<PendingLazy>,
}

impl WiringStack {
    pub(crate) fn new() -> Self {
        Self {
            path: Vec::new(),
            destroyers: DestroySequencer::new(),
            lazy: Vec::new(),
        }
    }

    fn path_names(&self, records: &[BeanRecord], current: usize) -> Vec<String> {
        let mut names: Vec<String> = self
            .path
            .iter()
            .map(|&i| records[i].def.describe())
            .collect();
        names.push(records[current].def.describe());
        names
    }
}

enum ResolvedSlot {
    One(AnyArc),
    Missing,
    Many(Vec<AnyArc>),
    Value(AnyArc),
    Lazy(Arc<OnceCell<AnyArc>>, String),
}

/// Bound factory arguments, indexed by slot position.
///
/// Accessors are typed at the call site; a kind or type mismatch against the
/// declared slot is a factory error.
pub struct Args<'a> {
    bean: &'a str,
    slots: Vec<ResolvedSlot>,
}

impl<'a> Args<'a> {
    fn slot(&self, index: usize) -> BeanResult<&ResolvedSlot> {
        self.slots.get(index).ok_or_else(|| {
            BeanError::Factory(format!(
                "bean {} has no argument slot {}",
                self.bean, index
            ))
        })
    }

    fn mismatch(&self, index: usize, expected: &str) -> BeanError {
        BeanError::Factory(format!(
            "argument {} of bean {} is not a {} slot of the requested type",
            index, self.bean, expected
        ))
    }

    /// A required single-bean slot.
    pub fn get<U: ?Sized + Send + Sync + 'static>(&self, index: usize) -> BeanResult<Arc<U>> {
        match self.slot(index)? {
            ResolvedSlot::One(v) => view_as::<U>(v).ok_or_else(|| self.mismatch(index, "bean")),
            _ => Err(self.mismatch(index, "bean")),
        }
    }

    /// A nullable single-bean slot (also reads unfilled option positions).
    pub fn get_opt<U: ?Sized + Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> BeanResult<Option<Arc<U>>> {
        match self.slot(index)? {
            ResolvedSlot::One(v) => view_as::<U>(v)
                .map(Some)
                .ok_or_else(|| self.mismatch(index, "bean")),
            ResolvedSlot::Missing => Ok(None),
            _ => Err(self.mismatch(index, "bean")),
        }
    }

    /// A literal or property slot value.
    pub fn value<V: Clone + Send + Sync + 'static>(&self, index: usize) -> BeanResult<V> {
        match self.slot(index)? {
            ResolvedSlot::Value(v) => view_as::<V>(v)
                .map(|arc| (*arc).clone())
                .ok_or_else(|| self.mismatch(index, "value")),
            _ => Err(self.mismatch(index, "value")),
        }
    }

    /// A collection slot, in its deterministic injection order.
    pub fn many<U: ?Sized + Send + Sync + 'static>(&self, index: usize) -> BeanResult<Vec<Arc<U>>> {
        match self.slot(index)? {
            ResolvedSlot::Many(items) => items
                .iter()
                .map(|v| view_as::<U>(v).ok_or_else(|| self.mismatch(index, "collection")))
                .collect(),
            _ => Err(self.mismatch(index, "collection")),
        }
    }

    /// A lazy slot handle, resolved after the primary wiring pass.
    pub fn lazy<U: ?Sized + Send + Sync + 'static>(&self, index: usize) -> BeanResult<Lazy<U>> {
        match self.slot(index)? {
            ResolvedSlot::Lazy(cell, what) => Ok(Lazy {
                cell: cell.clone(),
                what: what.clone(),
                _marker: PhantomData,
            }),
            _ => Err(self.mismatch(index, "lazy")),
        }
    }

    /// Number of bound slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the factory has no bound slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

pub(crate) struct WiringCtx<'a> {
    pub(crate) records: &'a mut Vec<BeanRecord>,
    pub(crate) props: &'a dyn Properties,
    pub(crate) refresh: &'a RefreshEngine,
    pub(crate) stack: WiringStack,
}

/// Wires every resolved bean, then runs the deferred lazy pass.
pub(crate) fn wire_all(ctx: &mut WiringCtx<'_>) -> BeanResult<()> {
    for i in 0..ctx.records.len() {
        if ctx.records[i].status == BeanStatus::Resolved {
            wire_bean(ctx, i)?;
        }
    }
    resolve_lazy(ctx)
}

fn wire_bean(ctx: &mut WiringCtx<'_>, index: usize) -> BeanResult<()> {
    match ctx.records[index].status {
        BeanStatus::Created | BeanStatus::Wired => return Ok(()),
        BeanStatus::Creating => {
            // Revisiting a bean mid-construction while its stack predecessor
            // is also mid-construction is a true instantiation cycle.
            return Err(BeanError::Circular(
                ctx.stack.path_names(ctx.records, index),
            ));
        }
        BeanStatus::Resolved => {}
        _ => {
            return Err(BeanError::State(
                "wiring reached a bean outside the resolved set",
            ))
        }
    }

    ctx.records[index].status = BeanStatus::Creating;
    ctx.stack.path.push(index);

    let result = construct(ctx, index);

    ctx.stack.path.pop();
    match result {
        Ok(()) => {
            ctx.records[index].status = BeanStatus::Wired;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn construct(ctx: &mut WiringCtx<'_>, index: usize) -> BeanResult<()> {
    let describe = ctx.records[index].def.describe();

    // Destroy-order edge: link with the nearest enclosing destroyer.
    if ctx.records[index].has_destroy_action() {
        let dependent = ctx.stack.path[..ctx.stack.path.len() - 1]
            .iter()
            .rev()
            .copied()
            .find(|&j| ctx.records[j].has_destroy_action());
        ctx.stack.destroyers.record(index, dependent);
    }

    // Explicit extra dependencies wire first.
    let depends_on = ctx.records[index].def.depends_on.clone();
    for sel in &depends_on {
        let matches = find_matches(ctx.records, sel);
        if matches.is_empty() {
            return Err(BeanError::NotFound(format!(
                "{} (depends_on of {})",
                sel, describe
            )));
        }
        for j in matches {
            wire_bean(ctx, j)?;
        }
    }

    // Bind dependency slots.
    let slots = ctx.records[index].def.slots.clone();
    let mut resolved = Vec::with_capacity(slots.len());
    for (slot_idx, slot) in slots.iter().enumerate() {
        let bound = bind_slot(ctx, index, slot_idx, slot, &describe)?;
        resolved.push(bound);
    }

    // Construct: mock replacement wins, then factory, then pre-built
    // instance.
    let instance = if let Some(mock) = &ctx.records[index].mock {
        mock.instance.clone()
    } else if let Some(factory) = ctx.records[index].def.factory.clone() {
        let args = Args {
            bean: &describe,
            slots: resolved,
        };
        factory(&args)?
    } else {
        ctx.records[index]
            .def
            .instance
            .clone()
            .ok_or_else(|| BeanError::Factory(format!("{} has no factory or instance", describe)))?
    };
    ctx.records[index].instance = Some(instance.clone());
    ctx.records[index].status = BeanStatus::Created;

    // Verify the produced value satisfies every advertised capability.
    let exports = if ctx.records[index].mock.is_some() {
        ctx.records[index].mock.as_ref().map(|m| m.exports.clone()).unwrap_or_default()
    } else {
        ctx.records[index].def.exports.clone()
    };
    for export in &exports {
        if (export.cast)(&instance).is_none() {
            return Err(BeanError::Export(format!(
                "{} does not satisfy export {}",
                describe, export.type_name
            )));
        }
    }

    // Mocked beans skip the original's hooks and refresh bindings.
    if ctx.records[index].mock.is_some() {
        return Ok(());
    }

    if let Some(init) = ctx.records[index].def.init.clone() {
        init(&instance).map_err(|e| BeanError::Init(format!("{}: {}", describe, e)))?;
    }
    if let Some(view) = ctx.records[index].view_of(TypeId::of::<dyn Lifecycle>()) {
        if let Some(lc) = view_as::<dyn Lifecycle>(&view) {
            lc.on_init()
                .map_err(|e| BeanError::Init(format!("{}: {}", describe, e)))?;
        }
    }

    let bindings = ctx.records[index].def.refresh_bindings.clone();
    for binding in &bindings {
        match (binding.make)(&instance) {
            Some(target) => ctx.refresh.register(describe.clone(), target, ctx.props)?,
            None => {
                return Err(BeanError::Factory(format!(
                    "refresh binding {:?} of {} does not match the constructed type",
                    binding.key, describe
                )))
            }
        }
    }

    Ok(())
}

fn bind_slot(
    ctx: &mut WiringCtx<'_>,
    owner: usize,
    slot_idx: usize,
    slot: &Slot,
    describe: &str,
) -> BeanResult<ResolvedSlot> {
    match slot {
        Slot::Literal(v) => Ok(ResolvedSlot::Value(v.clone())),
        Slot::Prop { expr, binder } => {
            let raw = ctx.props.resolve(expr).map_err(|e| {
                BeanError::Property(format!("argument {} of {}: {}", slot_idx, describe, e))
            })?;
            Ok(ResolvedSlot::Value(binder(&raw)?))
        }
        Slot::Bean {
            selector,
            nullable,
            lazy,
        } => {
            if *lazy {
                let cell = Arc::new(OnceCell::new());
                ctx.stack.lazy.push(PendingLazy {
                    cell: cell.clone(),
                    selector: selector.clone(),
                    nullable: *nullable,
                    owner: describe.to_string(),
                });
                return Ok(ResolvedSlot::Lazy(cell, selector.to_string()));
            }
            match select_candidate(ctx.records, selector)? {
                Some(j) => {
                    wire_bean(ctx, j)?;
                    let view = ctx.records[j]
                        .view_of(selector.type_id)
                        .ok_or_else(|| {
                            BeanError::Export(format!(
                                "{} has no view as {}",
                                ctx.records[j].def.describe(),
                                selector
                            ))
                        })?;
                    Ok(ResolvedSlot::One(view))
                }
                None if *nullable => Ok(ResolvedSlot::Missing),
                None => Err(BeanError::NotFound(format!(
                    "{} (injected into {} at slot {}, path: {})",
                    selector,
                    describe,
                    slot_idx,
                    path_string(ctx, owner)
                ))),
            }
        }
        Slot::Collection {
            elem,
            order,
            nullable,
        } => {
            let chosen = order_collection(ctx.records, elem, order, describe)?;
            if chosen.is_empty() && !*nullable {
                return Err(BeanError::NotFound(format!(
                    "no beans assignable to {} (collection in {})",
                    elem, describe
                )));
            }
            let mut views = Vec::with_capacity(chosen.len());
            for j in chosen {
                wire_bean(ctx, j)?;
                let view = ctx.records[j].view_of(elem.type_id).ok_or_else(|| {
                    BeanError::Export(format!(
                        "{} has no view as {}",
                        ctx.records[j].def.describe(),
                        elem
                    ))
                })?;
                views.push(view);
            }
            Ok(ResolvedSlot::Many(views))
        }
        Slot::Hole => Ok(ResolvedSlot::Missing),
    }
}

fn path_string(ctx: &WiringCtx<'_>, current: usize) -> String {
    ctx.stack.path_names(ctx.records, current).join(" -> ")
}

/// All non-deleted beans matching the selector, in registration order.
pub(crate) fn find_matches(records: &[BeanRecord], selector: &Selector) -> Vec<usize> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.matches(selector))
        .map(|(i, _)| i)
        .collect()
}

/// Scalar selection: exactly one candidate, or a single primary among many.
pub(crate) fn select_candidate(
    records: &[BeanRecord],
    selector: &Selector,
) -> BeanResult<Option<usize>> {
    let matches = find_matches(records, selector);
    match matches.len() {
        0 => Ok(None),
        1 => Ok(Some(matches[0])),
        _ => {
            let primaries: Vec<usize> = matches
                .iter()
                .copied()
                .filter(|&i| records[i].def.primary)
                .collect();
            match primaries.len() {
                1 => Ok(Some(primaries[0])),
                0 => Err(BeanError::Ambiguous(format!(
                    "{} matches [{}] and none is primary",
                    selector,
                    names_of(records, &matches)
                ))),
                _ => Err(BeanError::Ambiguous(format!(
                    "{} matches multiple primary beans [{}]",
                    selector,
                    names_of(records, &primaries)
                ))),
            }
        }
    }
}

fn names_of(records: &[BeanRecord], indices: &[usize]) -> String {
    indices
        .iter()
        .map(|&i| records[i].def.describe())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Applies collection ordering: explicit names keep tag order around a
/// single `*` wildcard; the wildcard group is sorted by bean name. An empty
/// order means "everything, sorted by name".
fn order_collection(
    records: &[BeanRecord],
    elem: &Selector,
    order: &[String],
    describe: &str,
) -> BeanResult<Vec<usize>> {
    let candidates = find_matches(records, elem);

    let sorted_by_name = |mut v: Vec<usize>| -> Vec<usize> {
        v.sort_by(|&a, &b| records[a].def.name.cmp(&records[b].def.name));
        v
    };

    if order.is_empty() {
        return Ok(sorted_by_name(candidates));
    }

    if order.iter().filter(|e| *e == "*").count() > 1 {
        return Err(BeanError::Factory(format!(
            "collection in {} names more than one wildcard",
            describe
        )));
    }

    let mut used: Vec<usize> = Vec::new();
    let mut pre: Vec<usize> = Vec::new();
    let mut post: Vec<usize> = Vec::new();
    let mut seen_wildcard = false;

    for entry in order {
        if entry == "*" {
            seen_wildcard = true;
            continue;
        }
        let found = candidates
            .iter()
            .copied()
            .find(|&i| records[i].def.name == *entry)
            .ok_or_else(|| {
                BeanError::NotFound(format!(
                    "bean {:?} listed in collection order of {} (element type {})",
                    entry, describe, elem
                ))
            })?;
        used.push(found);
        if seen_wildcard {
            post.push(found);
        } else {
            pre.push(found);
        }
    }

    let mut out = pre;
    if seen_wildcard {
        let rest: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|i| !used.contains(i))
            .collect();
        out.extend(sorted_by_name(rest));
    }
    out.extend(post);
    Ok(out)
}

/// Second pass: fill every queued lazy cell against the fully wired graph.
fn resolve_lazy(ctx: &mut WiringCtx<'_>) -> BeanResult<()> {
    let pending = std::mem::take(&mut ctx.stack.lazy);
    for p in pending {
        match select_candidate(ctx.records, &p.selector)? {
            Some(j) => {
                let view = ctx.records[j].view_of(p.selector.type_id).ok_or_else(|| {
                    BeanError::Export(format!(
                        "{} has no view as {}",
                        ctx.records[j].def.describe(),
                        p.selector
                    ))
                })?;
                let _ = p.cell.set(view);
            }
            None if p.nullable => {}
            None => {
                return Err(BeanError::NotFound(format!(
                    "{} (lazy injection into {})",
                    p.selector, p.owner
                )))
            }
        }
    }
    Ok(())
}
