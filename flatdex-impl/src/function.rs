use crate::context::ExecutionContext;
use crate::error::Error;
use crate::value::{Element, Value};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A function from one element to a tuple of values, before it is bound to
/// an execution context.
#[async_trait]
pub trait MapFunction: Send + Sync {
    async fn instantiate(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<Arc<dyn InstantiatedFunction>, Error>;
}

/// A mapping function ready to run against a context.
#[async_trait]
pub trait InstantiatedFunction: Send + Sync {
    async fn run(&self, ctx: &ExecutionContext, args: Element) -> Result<Vec<Value>, Error>;
}

/// Adapts a plain closure into a [`MapFunction`].
pub struct FnMap<F> {
    f: Arc<F>,
}

impl<F> FnMap<F>
where
    F: Fn(Element) -> Result<Vec<Value>, Error> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        FnMap { f: Arc::new(f) }
    }
}

impl<F> Clone for FnMap<F> {
    fn clone(&self) -> Self {
        FnMap {
            f: Arc::clone(&self.f),
        }
    }
}

#[async_trait]
impl<F> MapFunction for FnMap<F>
where
    F: Fn(Element) -> Result<Vec<Value>, Error> + Send + Sync + 'static,
{
    async fn instantiate(
        &self,
        _ctx: &ExecutionContext,
    ) -> Result<Arc<dyn InstantiatedFunction>, Error> {
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl<F> InstantiatedFunction for FnMap<F>
where
    F: Fn(Element) -> Result<Vec<Value>, Error> + Send + Sync + 'static,
{
    async fn run(&self, _ctx: &ExecutionContext, args: Element) -> Result<Vec<Value>, Error> {
        (self.f)(args)
    }
}

/// Named functions a host can resolve. Each index works on its own clone.
#[derive(Clone, Default)]
pub struct FunctionLibrary {
    functions: HashMap<String, Arc<dyn MapFunction>>,
}

impl FunctionLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, function: Arc<dyn MapFunction>) {
        self.functions.insert(name.into(), function);
    }

    pub fn with(mut self, name: impl Into<String>, function: Arc<dyn MapFunction>) -> Self {
        self.register(name, function);
        self
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn MapFunction>> {
        self.functions.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl std::fmt::Debug for FunctionLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self.functions.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_struct("FunctionLibrary")
            .field("functions", &names)
            .finish()
    }
}

/// Instantiates library functions at most once per execution context.
pub struct FunctionHandleCache {
    library: FunctionLibrary,
    handles: Mutex<HashMap<String, Arc<dyn InstantiatedFunction>>>,
}

impl FunctionHandleCache {
    pub fn new(library: FunctionLibrary) -> Self {
        FunctionHandleCache {
            library,
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn library(&self) -> &FunctionLibrary {
        &self.library
    }

    /// Returns the cached instantiation of `name`, instantiating it on first
    /// use. If two callers race, the first stored handle wins.
    pub async fn instantiate(
        &self,
        name: &str,
        ctx: &ExecutionContext,
    ) -> Result<Arc<dyn InstantiatedFunction>, Error> {
        let cached = self.handles.lock().get(name).cloned();
        if let Some(handle) = cached {
            return Ok(handle);
        }

        let function = self.library.lookup(name).ok_or_else(|| {
            Error::function_invocation(format!("function `{}` is not in the library", name))
        })?;
        let handle = function.instantiate(ctx).await?;
        debug!(function = name, "instantiated function");

        Ok(Arc::clone(
            self.handles
                .lock()
                .entry(name.to_string())
                .or_insert(handle),
        ))
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    pub fn clear(&self) {
        self.handles.lock().clear();
    }
}

/// A mapping function resolved by name through the context's function
/// handle cache.
#[derive(Debug, Clone)]
pub struct NamedFunction {
    name: String,
}

impl NamedFunction {
    pub fn new(name: impl Into<String>) -> Self {
        NamedFunction { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl MapFunction for NamedFunction {
    async fn instantiate(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<Arc<dyn InstantiatedFunction>, Error> {
        ctx.function_handle_cache()
            .instantiate(&self.name, ctx)
            .await
    }
}
