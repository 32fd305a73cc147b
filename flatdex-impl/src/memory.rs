use crate::cardinality::Cardinality;
use crate::context::ExecutionContext;
use crate::error::Error;
use crate::sequence::{Sequence, SequenceIterator};
use crate::value::{Element, Value};
use async_trait::async_trait;
use std::sync::Arc;

/// A sequence over elements held in memory.
#[derive(Debug, Clone)]
pub struct MemorySequence {
    elements: Arc<Vec<Element>>,
    declared: Option<Cardinality>,
}

impl MemorySequence {
    pub fn new(elements: Vec<Element>) -> Self {
        MemorySequence {
            elements: Arc::new(elements),
            declared: None,
        }
    }

    /// One single-value element per integer in `start..end`.
    pub fn range(start: i64, end: i64) -> Self {
        Self::new((start..end).map(|i| vec![Value::Int64(i)]).collect())
    }

    /// Reports `cardinality` instead of the number of held elements.
    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.declared = Some(cardinality);
        self
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[async_trait]
impl Sequence for MemorySequence {
    async fn open(
        &self,
        _ctx: &ExecutionContext,
        _prefix: &str,
    ) -> Result<Box<dyn SequenceIterator>, Error> {
        Ok(Box::new(MemoryIterator {
            elements: Arc::clone(&self.elements),
            position: 0,
        }))
    }

    fn cardinality(&self) -> Cardinality {
        self.declared
            .unwrap_or(Cardinality::Finite(self.elements.len() as u64))
    }
}

struct MemoryIterator {
    elements: Arc<Vec<Element>>,
    position: usize,
}

#[async_trait]
impl SequenceIterator for MemoryIterator {
    async fn next(&mut self, ctx: &ExecutionContext) -> Result<Option<Element>, Error> {
        ctx.check_cancelled()?;
        let element = self.elements.get(self.position).cloned();
        if element.is_some() {
            self.position += 1;
        }
        Ok(element)
    }
}
