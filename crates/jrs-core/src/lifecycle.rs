//! The service lifecycle capability interface and the harness it runs on.
//!
//! Rather than a class hierarchy (the source's controllers/services are
//! polymorphic via inheritance), this realizes spec.md §9's suggested
//! capability interface: `{start, stop, is_done, mark_done}` plus an
//! ordered sequence of nested children held by a concrete harness type.

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{error, info, warn};

use jrs_foundation::Result;

/// A startable/stoppable component that participates in a parent harness's
/// lifecycle.
#[async_trait]
pub trait Service: Send + Sync {
    /// Start this service. Called in registration order by the parent.
    async fn start(&self) -> Result<()>;

    /// Stop this service. Called in reverse registration order by the
    /// parent, and skipped entirely if [`Service::is_done`] is already true.
    async fn stop(&self) -> Result<()>;

    /// Whether this service has been permanently torn down.
    fn is_done(&self) -> bool;

    /// Permanently mark this service done. One-way: once set, it never
    /// resets, and the parent's teardown will skip calling `stop()` on it.
    fn mark_done(&self);
}

/// A `done` flag implementors embed by composition.
#[derive(Debug, Default)]
pub struct DoneFlag(AtomicBool);

impl DoneFlag {
    /// A fresh, not-done flag.
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Whether [`DoneFlag::mark`] has been called.
    pub fn is_done(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// One-way transition to done.
    pub fn mark(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// An event emitted by a [`ServiceHarness`] over its broadcast channel.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// The named harness finished starting all of its children.
    Started(String),
    /// The named harness finished stopping all of its children.
    Stopped(String),
    /// A periodic iteration raised an error (see [`PeriodicTask`]).
    IterationError { name: String, message: String },
}

/// A nested-children lifecycle harness: the building block every service
/// in this workspace (including the connector) is mounted under.
pub struct ServiceHarness {
    name: String,
    done: DoneFlag,
    children: RwLock<Vec<Arc<dyn Service>>>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl ServiceHarness {
    /// Create an empty harness with no children yet registered.
    pub fn new(name: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self { name: name.into(), done: DoneFlag::new(), children: RwLock::new(Vec::new()), events }
    }

    /// Register a nested child. Children start in registration order and
    /// stop in the reverse order.
    pub async fn add_child(&self, child: Arc<dyn Service>) {
        self.children.write().await.push(child);
    }

    /// Subscribe to lifecycle events emitted by this harness.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// The harness's name, used in log lines and events.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Service for ServiceHarness {
    async fn start(&self) -> Result<()> {
        let children = self.children.read().await.clone();
        for child in children.iter() {
            child.start().await?;
        }
        info!(harness = %self.name, children = children.len(), "started");
        let _ = self.events.send(LifecycleEvent::Started(self.name.clone()));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let children = self.children.read().await.clone();
        for child in children.iter().rev() {
            if child.is_done() {
                continue;
            }
            child.stop().await?;
        }
        self.done.mark();
        info!(harness = %self.name, "stopped");
        let _ = self.events.send(LifecycleEvent::Stopped(self.name.clone()));
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.done.is_done()
    }

    fn mark_done(&self) {
        self.done.mark();
    }
}

/// Controls for a [`PeriodicTask`]'s overlap and error-propagation behavior.
#[derive(Debug, Clone, Copy)]
pub struct IterationConfig {
    /// If false (the default), an iteration still running when the next
    /// tick fires is dropped rather than queued.
    pub allow_parallel_iterations: bool,
    /// If true, an iteration error halts the loop (after logging). If
    /// false (the default), it is logged and swallowed.
    pub throw_on_iteration_error: bool,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self { allow_parallel_iterations: false, throw_on_iteration_error: false }
    }
}

type IterationFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// A periodic iteration scheduled after `first_delay` and repeating every
/// `interval`, matching spec.md §4.8's `startLoop`/`stopLoop`.
pub struct PeriodicTask {
    stopped: Arc<AtomicBool>,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl PeriodicTask {
    /// Schedule `callback` to run after `first_delay`, then every `interval`
    /// thereafter, until [`PeriodicTask::stop`] is called.
    pub fn start<F, Fut>(
        name: impl Into<String>,
        first_delay: Duration,
        interval: Duration,
        config: IterationConfig,
        events: Option<broadcast::Sender<LifecycleEvent>>,
        callback: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let callback: IterationFn = Arc::new(move || Box::pin(callback()));
        let stopped = Arc::new(AtomicBool::new(false));
        let stopped_task = stopped.clone();
        let running = Arc::new(AtomicBool::new(false));

        let handle = tokio::spawn(async move {
            tokio::time::sleep(first_delay).await;
            loop {
                if stopped_task.load(Ordering::SeqCst) {
                    break;
                }

                if config.allow_parallel_iterations {
                    let cb = callback.clone();
                    let name = name.clone();
                    let events = events.clone();
                    let throw = config.throw_on_iteration_error;
                    tokio::spawn(async move {
                        if let Err(err) = cb().await {
                            report_iteration_error(&name, &err, throw, events.as_ref());
                        }
                    });
                } else if running.swap(true, Ordering::SeqCst) {
                    warn!(task = %name, "dropping overlapping iteration");
                } else {
                    let result = callback().await;
                    running.store(false, Ordering::SeqCst);
                    if let Err(err) = result {
                        let fatal = report_iteration_error(&name, &err, config.throw_on_iteration_error, events.as_ref());
                        if fatal {
                            break;
                        }
                    }
                }

                if stopped_task.load(Ordering::SeqCst) {
                    break;
                }
                tokio::time::sleep(interval).await;
            }
        });

        Self { stopped, handle: Mutex::new(Some(handle)) }
    }

    /// Prevent further iterations from starting. The iteration currently in
    /// flight, if any, runs to completion — it is never cancelled.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
    }
}

fn report_iteration_error(
    name: &str,
    err: &jrs_foundation::Error,
    throw: bool,
    events: Option<&broadcast::Sender<LifecycleEvent>>,
) -> bool {
    error!(task = %name, error = %err, "iteration failed");
    if let Some(events) = events {
        let _ = events.send(LifecycleEvent::IterationError { name: name.to_string(), message: err.to_string() });
    }
    throw
}

/// A specialization of [`ServiceHarness`] for the process entry point: it
/// prints the resolved environment configuration, installs a signal trap
/// that stops the harness on `SIGINT`/`SIGTERM`, and runs an optional boot
/// hook (standing in for a database adapter's connect step) before
/// starting its nested children.
pub struct MainHarness {
    harness: ServiceHarness,
    boot: Option<Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>>,
}

impl MainHarness {
    /// Create a new main harness.
    pub fn new(name: impl Into<String>) -> Self {
        Self { harness: ServiceHarness::new(name), boot: None }
    }

    /// Register an async boot hook run once, before nested startup.
    pub fn with_boot<F, Fut>(mut self, boot: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.boot = Some(Arc::new(move || Box::pin(boot())));
        self
    }

    /// Register a nested child service.
    pub async fn add_child(&self, child: Arc<dyn Service>) {
        self.harness.add_child(child).await;
    }

    /// Print a resolved configuration (any `Debug` value) at info level
    /// before startup, standing in for the source's env-dump-on-boot habit.
    pub fn print_config<T: std::fmt::Debug>(&self, config: &T) {
        info!(harness = %self.harness.name(), config = ?config, "resolved configuration");
    }

    /// Run the boot hook (if any), start all nested children, install the
    /// signal trap, and block until a shutdown signal is received — at
    /// which point nested children are stopped in reverse order.
    pub async fn run(&self) -> Result<()> {
        if let Some(boot) = &self.boot {
            boot().await?;
        }
        self.harness.start().await?;

        wait_for_shutdown_signal().await;
        info!(harness = %self.harness.name(), "shutdown signal received");

        self.harness.stop().await
    }

    /// Access the underlying harness, e.g. to subscribe to lifecycle events.
    pub fn harness(&self) -> &ServiceHarness {
        &self.harness
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingService {
        label: &'static str,
        done: DoneFlag,
        log: Arc<StdMutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Service for RecordingService {
        async fn start(&self) -> Result<()> {
            self.log.lock().expect("lock").push(self.label);
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.log.lock().expect("lock").push(self.label);
            Ok(())
        }

        fn is_done(&self) -> bool {
            self.done.is_done()
        }

        fn mark_done(&self) {
            self.done.mark();
        }
    }

    #[tokio::test]
    async fn children_start_forward_and_stop_reverse() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let harness = ServiceHarness::new("root");
        harness
            .add_child(Arc::new(RecordingService { label: "a", done: DoneFlag::new(), log: log.clone() }))
            .await;
        harness
            .add_child(Arc::new(RecordingService { label: "b", done: DoneFlag::new(), log: log.clone() }))
            .await;

        harness.start().await.expect("start");
        assert_eq!(*log.lock().expect("lock"), vec!["a", "b"]);

        log.lock().expect("lock").clear();
        harness.stop().await.expect("stop");
        assert_eq!(*log.lock().expect("lock"), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn done_children_are_skipped_on_teardown() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let harness = ServiceHarness::new("root");
        let already_done = Arc::new(RecordingService { label: "done", done: DoneFlag::new(), log: log.clone() });
        already_done.mark_done();
        harness.add_child(already_done).await;
        harness
            .add_child(Arc::new(RecordingService { label: "live", done: DoneFlag::new(), log: log.clone() }))
            .await;

        harness.stop().await.expect("stop");
        assert_eq!(*log.lock().expect("lock"), vec!["live"]);
    }

    #[tokio::test]
    async fn periodic_task_drops_overlapping_iterations() {
        let count = Arc::new(AtomicBool::new(false));
        let runs = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let runs2 = runs.clone();
        let task = PeriodicTask::start(
            "test",
            Duration::from_millis(1),
            Duration::from_millis(1),
            IterationConfig { allow_parallel_iterations: false, throw_on_iteration_error: false },
            None,
            move || {
                let runs2 = runs2.clone();
                async move {
                    runs2.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(())
                }
            },
        );
        let _ = count;
        tokio::time::sleep(Duration::from_millis(15)).await;
        task.stop().await;
        assert!(runs.load(Ordering::SeqCst) >= 1);
    }
}
