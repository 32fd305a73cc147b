use crate::cardinality::Cardinality;
use crate::context::ExecutionContext;
use crate::error::Error;
use crate::value::Element;
use async_trait::async_trait;
use std::sync::Arc;

/// Shared handle to a sequence. Cloning takes a new reference; the sequence
/// is released when the last handle is dropped.
pub type SequenceRef = Arc<dyn Sequence>;

/// An ordered, possibly infinite stream of elements.
#[async_trait]
pub trait Sequence: Send + Sync + std::fmt::Debug {
    /// Opens a fresh iterator. `prefix` names the iterator for logging and
    /// checkpoint keys; top-level iterators have no parent.
    async fn open(
        &self,
        ctx: &ExecutionContext,
        prefix: &str,
    ) -> Result<Box<dyn SequenceIterator>, Error>;

    /// Number of elements this sequence produces, without iterating it.
    fn cardinality(&self) -> Cardinality;
}

#[async_trait]
pub trait SequenceIterator: Send {
    /// Pulls the next element, or `None` once the sequence is exhausted.
    async fn next(&mut self, ctx: &ExecutionContext) -> Result<Option<Element>, Error>;
}
