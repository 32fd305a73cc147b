use crate::error::Error;
use tracing::instrument;

/// Runs blocking work on behalf of collaborators (source iterators and
/// mapping functions) without stalling the task that drives an index.
///
/// The pool has no threads of its own. It is a named front for the
/// runtime's shared blocking pool: with the `tokio` or `async-std` feature
/// the work goes there, tagged with the pool name in its tracing span.
/// Without either feature, or when a `tokio` build is driven outside a tokio
/// runtime, the work runs inline on the calling task.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    name: String,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>) -> Self {
        WorkerPool { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// How many pieces of work can make progress at once.
    pub fn parallelism(&self) -> usize {
        #[cfg(any(feature = "async-std", feature = "tokio"))]
        {
            crate::async_runtime::available_parallelism()
        }

        #[cfg(not(any(feature = "async-std", feature = "tokio")))]
        {
            1
        }
    }

    #[instrument(skip(self, f), fields(pool = %self.name))]
    pub async fn run<F, T>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        #[cfg(any(feature = "async-std", feature = "tokio"))]
        {
            crate::async_runtime::spawn_blocking(f).await.map_err(|e| {
                Error::function_invocation(format!(
                    "worker pool `{}` task failed: {}",
                    self.name, e
                ))
            })
        }

        #[cfg(not(any(feature = "async-std", feature = "tokio")))]
        {
            Ok(f())
        }
    }
}
