use crate::cardinality::{Cardinality, CumulativeCardinalities};
use crate::error::Error;
use crate::materialize::Materializer;
use crate::sequence::SequenceRef;
use tracing::{debug, warn};

#[derive(Debug)]
enum CacheState {
    Fresh,
    Cached(Result<CumulativeCardinalities, Error>),
}

/// Computes the cumulative cardinality table once and answers every later
/// query from it.
///
/// The cache also owns every sub-sequence handle acquired while
/// materializing, including the ones acquired by a failed or abandoned pass,
/// until [`CardinalityCache::release`] is called. Only the handles of the pass
/// that completed feed the table.
#[derive(Debug)]
pub struct CardinalityCache {
    subsequences: Vec<SequenceRef>,
    /// Start of the completed pass in `subsequences`.
    completed: Option<usize>,
    state: CacheState,
}

impl Default for CardinalityCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CardinalityCache {
    pub fn new() -> Self {
        CardinalityCache {
            subsequences: Vec::new(),
            completed: None,
            state: CacheState::Fresh,
        }
    }

    /// The cached table or error, computing it on the first call.
    pub async fn table(
        &mut self,
        materializer: &Materializer<'_>,
    ) -> &Result<CumulativeCardinalities, Error> {
        if let CacheState::Fresh = self.state {
            let table = self.compute(materializer).await;
            match &table {
                Ok(table) => debug!(
                    entries = table.len(),
                    total = %table.total(),
                    "cached cumulative cardinalities"
                ),
                Err(e) => warn!(error = %e, "caching cardinality failure"),
            }
            self.state = CacheState::Cached(table);
        }

        match &self.state {
            CacheState::Cached(table) => table,
            CacheState::Fresh => unreachable!("cardinality cache left fresh after computing"),
        }
    }

    /// Total cardinality: the last entry of the table.
    pub async fn cardinality(
        &mut self,
        materializer: &Materializer<'_>,
    ) -> Result<Cardinality, Error> {
        match self.table(materializer).await {
            Ok(table) => Ok(table.total()),
            Err(e) => Err(e.clone()),
        }
    }

    async fn compute(
        &mut self,
        materializer: &Materializer<'_>,
    ) -> Result<CumulativeCardinalities, Error> {
        // A caller may drop an earlier pass partway through. Its handles stay
        // in the arena for teardown but are not part of this pass.
        let start = self.subsequences.len();
        if start > 0 {
            debug!(abandoned = start, "restarting interrupted materialization");
        }
        materializer.materialize_into(&mut self.subsequences).await?;
        self.completed = Some(start);

        Ok(CumulativeCardinalities::from_cardinalities(
            self.subsequences[start..].iter().map(|s| s.cardinality()),
        ))
    }

    pub fn is_cached(&self) -> bool {
        matches!(self.state, CacheState::Cached(_))
    }

    /// Sub-sequences in source order, once materialization has succeeded.
    pub fn subsequences(&self) -> Option<&[SequenceRef]> {
        self.completed.map(|start| &self.subsequences[start..])
    }

    /// Drops every held sub-sequence handle and returns how many there were.
    pub fn release(&mut self) -> usize {
        let released = self.subsequences.len();
        self.subsequences.clear();
        self.completed = self.completed.map(|_| 0);
        released
    }
}
