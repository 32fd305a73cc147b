pub use async_trait::async_trait;
pub use futures;
#[cfg(any(feature = "async-std", feature = "tokio"))]
pub mod async_runtime;
pub mod cache;
pub mod cardinality;
pub mod context;
pub mod error;
pub mod function;
pub mod host;
pub mod index;
pub mod materialize;
pub mod memory;
pub mod sequence;
pub mod value;
pub mod worker_pool;

pub use cache::CardinalityCache;
pub use cardinality::{
    Cardinality, CumulativeCardinalities, InvalidCardinality, INFINITE_CARDINALITY,
    UNKNOWN_CARDINALITY,
};
pub use context::{ExecutionContext, ResourceRegistry};
pub use error::Error;
pub use function::{
    FnMap, FunctionHandleCache, FunctionLibrary, InstantiatedFunction, MapFunction,
    NamedFunction,
};
pub use host::{ContextOptions, Host, HostContext};
pub use index::FlatMapIndex;
pub use materialize::Materializer;
pub use memory::MemorySequence;
pub use sequence::{Sequence, SequenceIterator, SequenceRef};
pub use value::{DType, Element, Value, Variant};
pub use worker_pool::WorkerPool;
