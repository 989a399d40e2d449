//! Engine instance with a memory quota
//!
//! A [`Runtime`] owns one engine instance. Its memory quota is fixed at
//! creation and bounds the heap shared by every [`Context`] derived from it.
//!
//! # Examples
//!
//! ```
//! use jsbridge_runtime::api::Runtime;
//! use jsbridge_runtime::Value;
//!
//! let runtime = Runtime::new(4 * 1024 * 1024).unwrap();
//! let context = runtime.new_context().unwrap();
//!
//! let result = context.execute("6 * 7").unwrap();
//! assert_eq!(result, Value::Int(42));
//! ```

use crate::api::context::{Context, ContextOptions};
use crate::error::{BridgeError, Result};
use jsbridge_config::EngineConfig;
use log::debug;
use rquickjs::qjs;
use std::cell::Cell;
use std::fmt;
use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_RUNTIME_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuntimeId(u64);

impl RuntimeId {
    fn next() -> Self {
        RuntimeId(NEXT_RUNTIME_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

/// Heap statistics of an engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    /// Bytes currently allocated by the engine
    pub allocated: usize,
    /// Bytes in use by live engine objects
    pub used: usize,
    /// Number of live engine objects
    pub objects: usize,
    /// The instance's fixed quota
    pub quota: usize,
}

impl MemoryStats {
    fn from_usage(usage: &qjs::JSMemoryUsage, quota: usize) -> Self {
        Self {
            allocated: clamp(usage.malloc_size),
            used: clamp(usage.memory_used_size),
            objects: clamp(usage.obj_count),
            quota,
        }
    }

    /// Bytes left under the quota
    pub fn headroom(&self) -> usize {
        self.quota.saturating_sub(self.allocated)
    }
}

fn clamp(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

pub(crate) struct RuntimeInner {
    pub(crate) engine: rquickjs::Runtime,
    pub(crate) id: RuntimeId,
    quota: usize,
    pub(crate) live_contexts: Cell<usize>,
    /// Runtime-wide request depth
    pub(crate) depth: Cell<usize>,
    /// Raw engine handle, known once the first context exists
    pub(crate) raw: Cell<Option<NonNull<qjs::JSRuntime>>>,
}

impl RuntimeInner {
    /// Raw engine handle when a request is active and the safe API is locked out
    fn busy_raw(&self) -> Option<NonNull<qjs::JSRuntime>> {
        if self.depth.get() > 0 {
            self.raw.get()
        } else {
            None
        }
    }

    pub(crate) fn memory_usage(&self) -> MemoryStats {
        match self.busy_raw() {
            Some(rt) => {
                let mut usage = MaybeUninit::<qjs::JSMemoryUsage>::uninit();
                // SAFETY: `rt` is alive while any context exists and the call only fills `usage`.
                let usage = unsafe {
                    qjs::JS_ComputeMemoryUsage(rt.as_ptr(), usage.as_mut_ptr());
                    usage.assume_init()
                };
                MemoryStats::from_usage(&usage, self.quota)
            }
            None => MemoryStats::from_usage(&self.engine.memory_usage(), self.quota),
        }
    }

    pub(crate) fn run_gc(&self) {
        match self.busy_raw() {
            // SAFETY: as above; collection is permitted from inside a request.
            Some(rt) => unsafe { qjs::JS_RunGC(rt.as_ptr()) },
            None => self.engine.run_gc(),
        }
    }
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        debug!("destroying {}", self.id);
    }
}

/// One engine instance plus its memory quota
///
/// Cloning the handle is cheap and refers to the same instance. Contexts,
/// compiled scripts and function handles keep the instance alive, so dropping
/// the host's handle first is harmless.
///
/// A `Runtime` is confined to the thread that created it:
///
/// ```compile_fail
/// fn assert_send<T: Send>() {}
/// assert_send::<jsbridge_runtime::api::Runtime>();
/// ```
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create an engine instance whose heap may not exceed `memory_quota` bytes
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` - `memory_quota` is zero
    /// * `ResourceExhausted` - the freshly initialized engine already uses more than the quota
    pub fn new(memory_quota: usize) -> Result<Self> {
        if memory_quota == 0 {
            return Err(BridgeError::InvalidArgument(
                "memory quota must be a positive number of bytes".to_string(),
            ));
        }

        let engine = rquickjs::Runtime::new().map_err(|e| match e {
            rquickjs::Error::Allocation => {
                BridgeError::ResourceExhausted("cannot allocate engine instance".to_string())
            }
            other => BridgeError::Engine(other.to_string()),
        })?;

        let baseline = clamp(engine.memory_usage().malloc_size);
        if baseline > memory_quota {
            return Err(BridgeError::ResourceExhausted(format!(
                "quota of {} bytes is below the {} bytes the engine needs to start",
                memory_quota, baseline
            )));
        }
        engine.set_memory_limit(memory_quota);

        let inner = RuntimeInner {
            engine,
            id: RuntimeId::next(),
            quota: memory_quota,
            live_contexts: Cell::new(0),
            depth: Cell::new(0),
            raw: Cell::new(None),
        };
        debug!(
            "created {} with quota {} bytes ({} in use)",
            inner.id, memory_quota, baseline
        );

        Ok(Self {
            inner: Rc::new(inner),
        })
    }

    /// Create an engine instance from configuration
    ///
    /// The quota is required; stack size and GC threshold are applied when present.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| BridgeError::InvalidArgument(e.to_string()))?;
        let quota = config.memory_quota.ok_or_else(|| {
            BridgeError::InvalidArgument("engine.memory_quota is not configured".to_string())
        })?;

        let runtime = Self::new(quota)?;
        if let Some(stack) = config.max_stack_size {
            runtime.inner.engine.set_max_stack_size(stack);
        }
        if let Some(threshold) = config.gc_threshold {
            runtime.inner.engine.set_gc_threshold(threshold);
        }
        Ok(runtime)
    }

    /// Create a context with default options
    pub fn new_context(&self) -> Result<Context> {
        Context::new(self, ContextOptions::default())
    }

    /// Create a context with the given options
    pub fn new_context_with(&self, options: ContextOptions) -> Result<Context> {
        Context::new(self, options)
    }

    /// Identity of this engine instance
    pub fn id(&self) -> RuntimeId {
        self.inner.id
    }

    /// The fixed memory quota in bytes
    pub fn memory_quota(&self) -> usize {
        self.inner.quota
    }

    /// Number of contexts currently alive on this instance
    pub fn live_contexts(&self) -> usize {
        self.inner.live_contexts.get()
    }

    /// Current runtime-wide request depth (0 when idle)
    pub fn request_depth(&self) -> usize {
        self.inner.depth.get()
    }

    /// Current heap statistics
    pub fn memory_usage(&self) -> MemoryStats {
        self.inner.memory_usage()
    }

    /// Run a full garbage collection
    pub fn run_gc(&self) {
        self.inner.run_gc();
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("id", &self.inner.id)
            .field("quota", &self.inner.quota)
            .field("live_contexts", &self.inner.live_contexts.get())
            .finish()
    }
}
