//! The runtime: an explicit scheduler object owning the worker pool.
//!
//! There is no global runtime. A [`Runtime`] is constructed from a
//! [`RuntimeConfig`], fibers are started on it with [`Runtime::fork`] or
//! [`Runtime::run`], and it is torn down with [`Runtime::shutdown`], which
//! interrupts every fiber still alive (including daemons) and waits for
//! their finalizers before stopping the worker threads.
//!
//! # Example
//!
//! ```rust,ignore
//! use millrace::prelude::*;
//!
//! let runtime = Runtime::new(RuntimeConfig::default().with_worker_threads(2))?;
//! let exit = runtime.run(succeed::<_, String>(21).map(|x| x * 2));
//! assert_eq!(exit, Exit::Success(42));
//! runtime.shutdown();
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::effect::Effect;
use crate::exit::Exit;
use crate::fiber::{self, FiberHandle, FiberInner};

/// Default number of concurrently running effects for
/// [`Concurrency::Default`](crate::effect::Concurrency::Default).
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Runtime configuration.
///
/// Plain data with `with_*` builders. Validated when a [`Runtime`] is built.
///
/// ```rust
/// use millrace::RuntimeConfig;
/// use std::time::Duration;
///
/// let config = RuntimeConfig::default()
///     .with_worker_threads(2)
///     .with_default_concurrency(8)
///     .with_shutdown_timeout(Duration::from_secs(1));
///
/// assert_eq!(config.worker_threads(), 2);
/// assert_eq!(config.default_concurrency(), 8);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    worker_threads: usize,
    thread_name: String,
    default_concurrency: usize,
    shutdown_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        RuntimeConfig {
            worker_threads: workers,
            thread_name: "millrace-worker".to_string(),
            default_concurrency: DEFAULT_CONCURRENCY,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl RuntimeConfig {
    /// Number of worker threads in an owned pool.
    pub fn with_worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = n;
        self
    }

    /// Name given to worker threads.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Limit used by `run_all` when called with `Concurrency::Default`.
    pub fn with_default_concurrency(mut self, n: usize) -> Self {
        self.default_concurrency = n;
        self
    }

    /// How long shutdown waits for fibers to unwind.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Worker thread count.
    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    /// Worker thread name.
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Default `run_all` concurrency.
    pub fn default_concurrency(&self) -> usize {
        self.default_concurrency
    }

    /// Shutdown grace period.
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Check the configuration for values that would make the runtime
    /// unusable.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.worker_threads == 0 {
            return Err(RuntimeError::InvalidConfig(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        if self.default_concurrency == 0 {
            return Err(RuntimeError::InvalidConfig(
                "default_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Error building a [`Runtime`].
#[derive(Debug)]
pub enum RuntimeError {
    /// The configuration was rejected by [`RuntimeConfig::validate`].
    InvalidConfig(String),
    /// The worker pool could not be started.
    Build(std::io::Error),
    /// [`Runtime::current`] was called outside a tokio runtime.
    NoCurrentRuntime,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::InvalidConfig(msg) => write!(f, "invalid runtime config: {}", msg),
            RuntimeError::Build(e) => write!(f, "failed to start worker pool: {}", e),
            RuntimeError::NoCurrentRuntime => write!(f, "no tokio runtime is running"),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RuntimeError::Build(e) => Some(e),
            _ => None,
        }
    }
}

/// State shared by every fiber of one runtime.
pub(crate) struct RuntimeShared {
    handle: Handle,
    root: Arc<FiberInner>,
    config: RuntimeConfig,
}

impl RuntimeShared {
    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }

    pub(crate) fn root(&self) -> &Arc<FiberInner> {
        &self.root
    }

    pub(crate) fn default_concurrency(&self) -> usize {
        self.config.default_concurrency
    }
}

/// The scheduler: runs fibers on a bounded worker pool.
pub struct Runtime {
    tokio: Option<tokio::runtime::Runtime>,
    shared: Arc<RuntimeShared>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("owned_pool", &self.tokio.is_some())
            .field("live_fibers", &self.shared.root.live_children())
            .field("config", &self.shared.config)
            .finish()
    }
}

impl Runtime {
    /// Start a runtime with its own multi-threaded worker pool.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        let tokio = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()
            .map_err(RuntimeError::Build)?;
        tracing::debug!(workers = config.worker_threads, "runtime started");
        let handle = tokio.handle().clone();
        Ok(Runtime {
            tokio: Some(tokio),
            shared: Self::shared(handle, config),
        })
    }

    /// Run fibers on an existing tokio runtime. `worker_threads` and
    /// `thread_name` are ignored; the pool belongs to the caller.
    pub fn from_handle(handle: Handle, config: RuntimeConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        Ok(Runtime {
            tokio: None,
            shared: Self::shared(handle, config),
        })
    }

    /// [`from_handle`](Self::from_handle) on the tokio runtime driving the
    /// current task, with the default configuration.
    pub fn current() -> Result<Self, RuntimeError> {
        let handle = Handle::try_current().map_err(|_| RuntimeError::NoCurrentRuntime)?;
        Self::from_handle(handle, RuntimeConfig::default())
    }

    fn shared(handle: Handle, config: RuntimeConfig) -> Arc<RuntimeShared> {
        Arc::new(RuntimeShared {
            handle,
            root: FiberInner::root(),
            config,
        })
    }

    /// The configuration this runtime was built with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    /// Number of top-level fibers (forked here or daemons) still running.
    pub fn live_fibers(&self) -> usize {
        self.shared.root.live_children()
    }

    /// Start `effect` on a new top-level fiber.
    pub fn fork<Eff>(&self, effect: Eff) -> FiberHandle<Eff::Output, Eff::Error>
    where
        Eff: Effect + 'static,
        Eff::Output: 'static,
        Eff::Error: 'static,
    {
        fiber::spawn(effect, &self.shared.root, &self.shared)
    }

    /// Run `effect` to completion and return its exit, blocking the
    /// current thread.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an asynchronous context; use
    /// [`run_async`](Self::run_async) there.
    pub fn run<Eff>(&self, effect: Eff) -> Exit<Eff::Output, Eff::Error>
    where
        Eff: Effect + 'static,
        Eff::Output: 'static,
        Eff::Error: 'static,
    {
        let handle = self.fork(effect);
        self.shared.handle.block_on(handle.wait())
    }

    /// Run `effect` to completion from async code.
    pub async fn run_async<Eff>(&self, effect: Eff) -> Exit<Eff::Output, Eff::Error>
    where
        Eff: Effect + 'static,
        Eff::Output: 'static,
        Eff::Error: 'static,
    {
        self.fork(effect).wait().await
    }

    /// Interrupt every live top-level fiber and wait, up to the configured
    /// shutdown timeout, for them to finish unwinding.
    pub async fn shutdown_async(&self) {
        let timeout = self.shared.config.shutdown_timeout;
        let live = self.shared.root.live_children();
        if live > 0 {
            tracing::debug!(live, "interrupting live fibers");
        }
        if tokio::time::timeout(timeout, self.shared.root.interrupt_children())
            .await
            .is_err()
        {
            tracing::warn!(
                live = self.shared.root.live_children(),
                ?timeout,
                "fibers still running after shutdown timeout"
            );
        }
    }

    /// Interrupt all fibers, wait for them, and stop the worker pool.
    ///
    /// On a runtime adopted with [`from_handle`](Self::from_handle) the
    /// pool is left running and fibers are only signalled; await
    /// [`shutdown_async`](Self::shutdown_async) first to wait for them.
    pub fn shutdown(mut self) {
        match self.tokio.take() {
            Some(tokio) => {
                tokio.block_on(self.shutdown_async());
                tokio.shutdown_timeout(self.shared.config.shutdown_timeout);
                tracing::debug!("runtime stopped");
            }
            None => {
                for child in self.shared.root.children_snapshot() {
                    child.interrupt();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.worker_threads() >= 1);
        assert_eq!(config.default_concurrency(), DEFAULT_CONCURRENCY);
        assert_eq!(config.thread_name(), "millrace-worker");
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = Runtime::new(RuntimeConfig::default().with_worker_threads(0)).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidConfig(_)));
        assert!(err.to_string().contains("worker_threads"));
    }

    #[test]
    fn zero_default_concurrency_is_rejected() {
        let config = RuntimeConfig::default().with_default_concurrency(0);
        assert!(matches!(
            config.validate(),
            Err(RuntimeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn current_requires_a_tokio_runtime() {
        assert!(matches!(
            Runtime::current(),
            Err(RuntimeError::NoCurrentRuntime)
        ));
    }

    #[test]
    fn owned_runtime_starts_and_stops() {
        let runtime = Runtime::new(
            RuntimeConfig::default()
                .with_worker_threads(1)
                .with_thread_name("millrace-test"),
        )
        .unwrap();
        assert_eq!(runtime.live_fibers(), 0);
        assert_eq!(runtime.config().worker_threads(), 1);
        runtime.shutdown();
    }
}
