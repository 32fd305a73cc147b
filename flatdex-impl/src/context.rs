use crate::error::Error;
use crate::function::{FunctionHandleCache, FunctionLibrary};
use crate::host::{ContextOptions, HostContext};
use crate::worker_pool::WorkerPool;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type Resource = Arc<dyn Any + Send + Sync>;

/// Named, type-erased resources shared by the collaborators running under one
/// execution context.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: Mutex<HashMap<String, Resource>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `resource` under `name`, replacing any previous resource.
    pub fn insert<T: Any + Send + Sync>(&self, name: impl Into<String>, resource: T) {
        self.resources.lock().insert(name.into(), Arc::new(resource));
    }

    /// Looks up `name`, returning `None` if it is missing or of another type.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let resource = self.resources.lock().get(name).cloned()?;
        resource.downcast::<T>().ok()
    }

    /// Returns the resource under `name`, creating it with `init` first if
    /// it is missing. `None` if a resource of another type holds the name.
    pub fn get_or_insert_with<T, F>(&self, name: &str, init: F) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let resource = Arc::clone(
            self.resources
                .lock()
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(init())),
        );
        resource.downcast::<T>().ok()
    }

    pub fn remove(&self, name: &str) -> bool {
        self.resources.lock().remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.resources.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.lock().is_empty()
    }

    pub fn clear(&self) {
        self.resources.lock().clear();
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let resources = self.resources.lock();
        let mut names = resources.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_struct("ResourceRegistry")
            .field("resources", &names)
            .finish()
    }
}

/// Everything a source iterator and a mapping function need to run on behalf
/// of one index. Owned by that index and torn down with it.
pub struct ExecutionContext {
    cancellation: CancellationToken,
    resources: ResourceRegistry,
    functions: FunctionHandleCache,
    worker_pool: WorkerPool,
    options: ContextOptions,
}

impl ExecutionContext {
    /// Builds a context from the host, cloning its function library.
    pub fn new(host: &dyn HostContext) -> Result<Self, Error> {
        let library = host.clone_function_library()?;
        Ok(Self::with_library(library, host.options()))
    }

    pub fn with_library(library: FunctionLibrary, options: ContextOptions) -> Self {
        debug!(
            pool = %options.worker_pool_name,
            functions = library.len(),
            "built execution context"
        );
        ExecutionContext {
            cancellation: CancellationToken::new(),
            resources: ResourceRegistry::new(),
            functions: FunctionHandleCache::new(library),
            worker_pool: WorkerPool::new(options.worker_pool_name.clone()),
            options,
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fails with [`Error::Cancelled`] once the context has been cancelled.
    pub fn check_cancelled(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn function_handle_cache(&self) -> &FunctionHandleCache {
        &self.functions
    }

    pub fn worker_pool(&self) -> &WorkerPool {
        &self.worker_pool
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("cancelled", &self.is_cancelled())
            .field("resources", &self.resources)
            .field("worker_pool", &self.worker_pool)
            .field("options", &self.options)
            .finish()
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.cancellation.cancel();
        self.functions.clear();
        self.resources.clear();
    }
}
