//! Flatdex answers "how many elements does `source.flat_map(f)` produce?"
//! without iterating the sub-sequences. The source is drained once, every
//! mapped value is decoded into a sub-sequence handle, and the prefix sums of
//! their cardinalities are cached for the lifetime of the index.
//!
//! ## Example Usage
//!
//! ```rust
//! ##[tokio::main]
//! # async fn main() {
//! use flatdex::prelude::*;
//! use std::sync::Arc;
//!
//! let words = MemorySequence::new(vec![
//!     vec![Value::from("flat")],
//!     vec![Value::from("map")],
//! ]);
//! let letters = FnMap::new(|element: Element| match &element[0] {
//!     Value::Str(word) => Ok(vec![Value::sequence(Arc::new(MemorySequence::new(
//!         word.chars().map(|c| vec![Value::Str(c.to_string())]).collect(),
//!     )))]),
//!     _ => Err(Error::function_invocation("expected a word")),
//! });
//!
//! let index = FlatMapIndex::new(&Host::default(), Arc::new(words), Arc::new(letters));
//! assert_eq!(index.cardinality().await, Ok(Cardinality::Finite(7)));
//! # }
//! ```

pub use flatdex_impl;

pub mod prelude {
    pub use flatdex_impl::{
        async_trait, Cardinality, Element, Error, ExecutionContext, FlatMapIndex, FnMap,
        FunctionLibrary, Host, HostContext, InstantiatedFunction, MapFunction, MemorySequence,
        NamedFunction, Sequence, SequenceIterator, SequenceRef, Value,
    };
}
