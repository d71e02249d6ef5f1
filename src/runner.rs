//! Application runners (requires the `async` feature).
//!
//! Beans exporting [`Runner`] become the application's long-lived tasks: a
//! [`TaskSet`] spawns every runner after refresh, hands each a
//! [`ShutdownSignal`], and on shutdown waits up to a grace period for tasks
//! to drain before abandoning stragglers.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::container::Container;
use crate::error::{BeanError, BeanResult};

/// A long-lived application task owned by the container.
///
/// Export it from a bean with
/// `BeanBuilder::export::<dyn Runner>(|t| t as Arc<dyn Runner>)`. Runners
/// should select between their own work and `shutdown.cancelled()` and
/// return once the signal fires.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, shutdown: ShutdownSignal) -> BeanResult<()>;
}

/// Cooperative shutdown signal shared by every spawned runner.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Completes when shutdown is requested. Returns immediately if it
    /// already was.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Running application tasks, one per [`Runner`] bean.
pub struct TaskSet {
    tx: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<BeanResult<()>>)>,
}

impl TaskSet {
    /// Spawns every bean exported as `dyn Runner`. Must run inside a tokio
    /// runtime.
    pub fn start(container: &Container) -> BeanResult<Self> {
        let (tx, rx) = watch::channel(false);
        let runners = container.get_all_named::<dyn Runner>()?;
        let mut tasks = Vec::with_capacity(runners.len());
        for (name, runner) in runners {
            let signal = ShutdownSignal { rx: rx.clone() };
            let task_name = name.clone();
            let handle = tokio::spawn(async move {
                let result = runner.run(signal).await;
                if let Err(e) = &result {
                    tracing::error!(runner = %task_name, error = %e, "runner failed");
                }
                result
            });
            tracing::debug!(runner = %name, "runner started");
            tasks.push((name, handle));
        }
        Ok(Self { tx, tasks })
    }

    /// Number of spawned runners.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signals shutdown and waits up to `grace` for each task. Tasks still
    /// running after the grace period are aborted and reported as an error.
    pub async fn shutdown(self, grace: Duration) -> BeanResult<()> {
        let _ = self.tx.send(true);
        let mut stragglers = Vec::new();
        for (name, mut handle) in self.tasks {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    tracing::error!(runner = %name, error = %e, "runner exited with error");
                }
                Ok(Err(join)) => {
                    tracing::error!(runner = %name, error = %join, "runner panicked");
                    stragglers.push(name);
                }
                Err(_) => {
                    tracing::warn!(runner = %name, "runner did not stop within grace period");
                    handle.abort();
                    stragglers.push(name);
                }
            }
        }
        if stragglers.is_empty() {
            Ok(())
        } else {
            Err(BeanError::State("runners did not shut down cleanly"))
        }
    }
}
