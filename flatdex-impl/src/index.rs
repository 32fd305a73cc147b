use crate::cache::CardinalityCache;
use crate::cardinality::{Cardinality, CumulativeCardinalities};
use crate::context::ExecutionContext;
use crate::error::Error;
use crate::function::MapFunction;
use crate::host::HostContext;
use crate::materialize::Materializer;
use crate::sequence::SequenceRef;
use futures::lock::Mutex;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

enum IndexState {
    /// The execution context could not be built. Every query returns the
    /// stored error.
    Poisoned(Error),
    Ready {
        ctx: ExecutionContext,
        cache: Mutex<CardinalityCache>,
    },
}

/// Cardinality index over `input.flat_map(map_func)`.
///
/// The first query drains `input` through `map_func` and builds the
/// cumulative cardinality table of the resulting sub-sequences. The table,
/// or the error that stopped it, is kept for the lifetime of the index.
/// Concurrent queries wait for the first one and share its result.
///
/// ```
/// # futures::executor::block_on(async {
/// use flatdex_impl::{Cardinality, FlatMapIndex, FnMap, Host, MemorySequence, Value};
/// use std::sync::Arc;
///
/// // element n maps to the sequence 0..n
/// let index = FlatMapIndex::new(
///     &Host::default(),
///     Arc::new(MemorySequence::range(0, 4)),
///     Arc::new(FnMap::new(|element: Vec<Value>| {
///         let n = element[0].as_i64().unwrap_or_default();
///         Ok(vec![Value::sequence(Arc::new(MemorySequence::range(0, n)))])
///     })),
/// );
///
/// assert_eq!(index.cardinality().await, Ok(Cardinality::Finite(6)));
/// # });
/// ```
pub struct FlatMapIndex {
    input: SequenceRef,
    map_func: Arc<dyn MapFunction>,
    state: IndexState,
}

impl FlatMapIndex {
    /// Builds the index. A host whose function library cannot be cloned
    /// yields a poisoned index rather than an error.
    pub fn new(
        host: &dyn HostContext,
        input: SequenceRef,
        map_func: Arc<dyn MapFunction>,
    ) -> Self {
        let state = match ExecutionContext::new(host) {
            Ok(ctx) => IndexState::Ready {
                ctx,
                cache: Mutex::new(CardinalityCache::new()),
            },
            Err(e) => {
                warn!(error = %e, "flat map index is poisoned");
                IndexState::Poisoned(e)
            }
        };

        FlatMapIndex {
            input,
            map_func,
            state,
        }
    }

    /// Total number of elements across all sub-sequences.
    #[instrument(skip(self))]
    pub async fn cardinality(&self) -> Result<Cardinality, Error> {
        let (ctx, cache) = self.ready()?;
        let materializer = Materializer::new(self.input.as_ref(), self.map_func.as_ref(), ctx);
        cache.lock().await.cardinality(&materializer).await
    }

    /// Entry `i` is the number of elements in sub-sequences `0..=i`, up to
    /// the first infinite or unknown entry.
    #[instrument(skip(self))]
    pub async fn cumulative_cardinalities(&self) -> Result<CumulativeCardinalities, Error> {
        let (ctx, cache) = self.ready()?;
        let materializer = Materializer::new(self.input.as_ref(), self.map_func.as_ref(), ctx);
        cache.lock().await.table(&materializer).await.clone()
    }

    /// Blocks the current thread until [`FlatMapIndex::cardinality`]
    /// completes. Must not be called from within an async task.
    pub fn blocking_cardinality(&self) -> Result<Cardinality, Error> {
        futures::executor::block_on(self.cardinality())
    }

    /// Number of materialized sub-sequences, once materialization has
    /// succeeded.
    pub async fn subsequence_count(&self) -> Option<usize> {
        match &self.state {
            IndexState::Poisoned(_) => None,
            IndexState::Ready { cache, .. } => cache.lock().await.subsequences().map(|s| s.len()),
        }
    }

    /// Cancels in-flight and future computation. Queries that have not yet
    /// cached a result fail with [`Error::Cancelled`].
    pub fn cancel(&self) {
        if let IndexState::Ready { ctx, .. } = &self.state {
            ctx.cancel();
        }
    }

    pub fn is_poisoned(&self) -> bool {
        matches!(self.state, IndexState::Poisoned(_))
    }

    /// True once a result or error has been cached. False while the first
    /// computation is still running.
    pub fn is_cached(&self) -> bool {
        match &self.state {
            IndexState::Poisoned(_) => false,
            IndexState::Ready { cache, .. } => cache
                .try_lock()
                .map(|cache| cache.is_cached())
                .unwrap_or(false),
        }
    }

    pub fn context(&self) -> Option<&ExecutionContext> {
        match &self.state {
            IndexState::Poisoned(_) => None,
            IndexState::Ready { ctx, .. } => Some(ctx),
        }
    }

    fn ready(&self) -> Result<(&ExecutionContext, &Mutex<CardinalityCache>), Error> {
        match &self.state {
            IndexState::Poisoned(e) => Err(e.clone()),
            IndexState::Ready { ctx, cache } => Ok((ctx, cache)),
        }
    }
}

impl std::fmt::Debug for FlatMapIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatMapIndex")
            .field("input", &self.input)
            .field("poisoned", &self.is_poisoned())
            .field("cached", &self.is_cached())
            .finish()
    }
}

impl Drop for FlatMapIndex {
    fn drop(&mut self) {
        if let IndexState::Ready { cache, .. } = &mut self.state {
            let released = cache.get_mut().release();
            debug!(released, "released sub-sequences");
        }
    }
}
