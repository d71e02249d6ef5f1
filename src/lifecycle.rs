//! Lifecycle hooks and destroy-order sequencing.
//!
//! Construction order is discovered during wiring: when a bean with a
//! destroy action lands on the wiring stack, the sequencer records that the
//! dependent above it must be destroyed first. Shutdown replays destroyers
//! through a stable partial topological sort, so dependents always go before
//! their dependencies and unconstrained beans keep registration order.

use std::collections::{HashMap, HashSet};

use crate::error::BeanResult;

/// Self-managed lifecycle capability.
///
/// Export it with [`BeanBuilder::lifecycle`](crate::BeanBuilder::lifecycle):
/// `on_init` runs after the registered init hook; `on_destroy` joins the
/// dependency-ordered destroy sequence. Destroy failures are logged, never
/// propagated.
pub trait Lifecycle: Send + Sync {
    /// Called once the bean is constructed and injected.
    fn on_init(&self) -> BeanResult<()> {
        Ok(())
    }

    /// Called during container shutdown.
    fn on_destroy(&self) {}
}

/// Tracks destroyers and their "destroyed before" constraints.
///
/// Keys are bean indices in the container's record table.
#[derive(Default)]
pub(crate) struct DestroySequencer {
    /// Destroyers in the order wiring reached them.
    order: Vec<usize>,
    /// bean -> beans that must be destroyed before it
    before: HashMap<usize, HashSet<usize>>,
}

impl DestroySequencer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records a destroyer. `dependent` is the nearest enclosing destroyer on
    /// the wiring stack; it gets torn down before `bean`.
    pub(crate) fn record(&mut self, bean: usize, dependent: Option<usize>) {
        if !self.order.contains(&bean) {
            self.order.push(bean);
        }
        if let Some(dep) = dependent {
            self.before.entry(bean).or_default().insert(dep);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Total order respecting every recorded "before" edge. Stable: among
    /// unconstrained beans the wiring order is preserved. Tolerates edge
    /// cycles by falling back to the first remaining bean rather than
    /// looping.
    pub(crate) fn sequence(&self) -> Vec<usize> {
        let mut remaining = self.order.clone();
        let mut done: HashSet<usize> = HashSet::new();
        let mut out = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let pos = remaining
                .iter()
                .position(|&b| {
                    self.before
                        .get(&b)
                        .map(|deps| deps.iter().all(|d| done.contains(d) || !self.order.contains(d)))
                        .unwrap_or(true)
                })
                .unwrap_or(0);
            let bean = remaining.remove(pos);
            done.insert(bean);
            out.push(bean);
        }
        out
    }
}
