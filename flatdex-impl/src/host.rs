use crate::error::Error;
use crate::function::FunctionLibrary;

pub const DEFAULT_WORKER_POOL_NAME: &str = "flatdex_random_access_index";
pub const DEFAULT_ITERATOR_PREFIX: &str = "Iterator";

/// Settings an execution context is built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    /// Name of the worker pool, used in logs.
    pub worker_pool_name: String,
    /// Prefix handed to the source sequence when its iterator is opened.
    pub iterator_prefix: String,
}

impl Default for ContextOptions {
    fn default() -> Self {
        ContextOptions {
            worker_pool_name: DEFAULT_WORKER_POOL_NAME.to_string(),
            iterator_prefix: DEFAULT_ITERATOR_PREFIX.to_string(),
        }
    }
}

/// The caller's environment an index is created from.
pub trait HostContext: Send + Sync {
    /// Clones the function-resolution environment for a new execution
    /// context. Failure poisons the index being built.
    fn clone_function_library(&self) -> Result<FunctionLibrary, Error>;

    fn options(&self) -> ContextOptions {
        ContextOptions::default()
    }
}

/// A host backed by an in-process function library.
#[derive(Debug, Clone, Default)]
pub struct Host {
    library: FunctionLibrary,
    options: ContextOptions,
}

impl Host {
    pub fn new(library: FunctionLibrary) -> Self {
        Host {
            library,
            options: ContextOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ContextOptions) -> Self {
        self.options = options;
        self
    }

    pub fn library_mut(&mut self) -> &mut FunctionLibrary {
        &mut self.library
    }
}

impl HostContext for Host {
    fn clone_function_library(&self) -> Result<FunctionLibrary, Error> {
        Ok(self.library.clone())
    }

    fn options(&self) -> ContextOptions {
        self.options.clone()
    }
}
