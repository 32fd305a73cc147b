#[cfg(test)]
mod fixtures {
    use flatdex::prelude::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// A sub-sequence that only reports a cardinality, recording every query.
    #[derive(Debug)]
    pub struct Probe {
        id: usize,
        cardinality: Cardinality,
        queried: Arc<Mutex<Vec<usize>>>,
    }

    pub fn probes(
        cardinalities: &[Cardinality],
    ) -> (Vec<Arc<Probe>>, Arc<Mutex<Vec<usize>>>) {
        let queried = Arc::new(Mutex::new(Vec::new()));
        let probes = cardinalities
            .iter()
            .enumerate()
            .map(|(id, &cardinality)| {
                Arc::new(Probe {
                    id,
                    cardinality,
                    queried: Arc::clone(&queried),
                })
            })
            .collect();
        (probes, queried)
    }

    struct Exhausted;

    #[async_trait]
    impl SequenceIterator for Exhausted {
        async fn next(&mut self, _ctx: &ExecutionContext) -> Result<Option<Element>, Error> {
            Ok(None)
        }
    }

    #[async_trait]
    impl Sequence for Probe {
        async fn open(
            &self,
            _ctx: &ExecutionContext,
            _prefix: &str,
        ) -> Result<Box<dyn SequenceIterator>, Error> {
            Ok(Box::new(Exhausted))
        }

        fn cardinality(&self) -> Cardinality {
            self.queried.lock().push(self.id);
            self.cardinality
        }
    }

    /// Source element `i` maps to `probes[i]`. Counts invocations.
    pub fn select(probes: &[Arc<Probe>], calls: Arc<AtomicUsize>) -> Arc<dyn MapFunction> {
        let probes = probes.to_vec();
        Arc::new(FnMap::new(move |element: Element| {
            calls.fetch_add(1, Ordering::SeqCst);
            let i = element[0].as_i64().unwrap_or_default() as usize;
            let probe: SequenceRef = probes[i].clone();
            Ok(vec![Value::sequence(probe)])
        }))
    }

    /// Wraps a sequence, counting how often it is opened and pulled, and
    /// failing, stalling or waiting for cancellation at chosen positions.
    #[derive(Debug)]
    pub struct Instrumented {
        inner: MemorySequence,
        pub opens: Arc<AtomicUsize>,
        pub pulls: Arc<AtomicUsize>,
        pub fail_at: Option<usize>,
        pub block_at: Option<usize>,
        pub delay_at: Option<(usize, Duration)>,
    }

    impl Instrumented {
        pub fn new(inner: MemorySequence) -> Self {
            Instrumented {
                inner,
                opens: Arc::new(AtomicUsize::new(0)),
                pulls: Arc::new(AtomicUsize::new(0)),
                fail_at: None,
                block_at: None,
                delay_at: None,
            }
        }
    }

    struct InstrumentedIterator {
        inner: Box<dyn SequenceIterator>,
        pulls: Arc<AtomicUsize>,
        position: usize,
        fail_at: Option<usize>,
        block_at: Option<usize>,
        delay_at: Option<(usize, Duration)>,
    }

    #[async_trait]
    impl SequenceIterator for InstrumentedIterator {
        async fn next(&mut self, ctx: &ExecutionContext) -> Result<Option<Element>, Error> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            let position = self.position;
            self.position += 1;
            if self.fail_at == Some(position) {
                return Err(Error::source_iteration(format!("bad record at {}", position)));
            }
            if self.block_at == Some(position) {
                ctx.cancellation_token().cancelled().await;
                return Err(Error::Cancelled);
            }
            if let Some((at, delay)) = self.delay_at {
                if at == position {
                    tokio::time::sleep(delay).await;
                }
            }
            // give concurrent queries a chance to interleave
            tokio::task::yield_now().await;
            self.inner.next(ctx).await
        }
    }

    #[async_trait]
    impl Sequence for Instrumented {
        async fn open(
            &self,
            ctx: &ExecutionContext,
            prefix: &str,
        ) -> Result<Box<dyn SequenceIterator>, Error> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let inner = self.inner.open(ctx, prefix).await?;
            Ok(Box::new(InstrumentedIterator {
                inner,
                pulls: Arc::clone(&self.pulls),
                position: 0,
                fail_at: self.fail_at,
                block_at: self.block_at,
                delay_at: self.delay_at,
            }))
        }

        fn cardinality(&self) -> Cardinality {
            self.inner.cardinality()
        }
    }

    /// Maps `n` to a sequence of `n * 10` elements built on the worker pool,
    /// counting its runs in the `runs` resource.
    pub struct Chunked;

    struct ChunkedInstance;

    #[async_trait]
    impl MapFunction for Chunked {
        async fn instantiate(
            &self,
            _ctx: &ExecutionContext,
        ) -> Result<Arc<dyn InstantiatedFunction>, Error> {
            Ok(Arc::new(ChunkedInstance))
        }
    }

    #[async_trait]
    impl InstantiatedFunction for ChunkedInstance {
        async fn run(&self, ctx: &ExecutionContext, args: Element) -> Result<Vec<Value>, Error> {
            let runs = ctx
                .resources()
                .get_or_insert_with("runs", || AtomicUsize::new(0))
                .ok_or_else(|| Error::function_invocation("`runs` has the wrong type"))?;
            runs.fetch_add(1, Ordering::SeqCst);

            let n = args[0].as_i64().unwrap_or_default();
            let chunk = ctx
                .worker_pool()
                .run(move || MemorySequence::range(0, n * 10))
                .await?;
            Ok(vec![Value::sequence(Arc::new(chunk))])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{probes, select, Chunked, Instrumented, Probe};
    use flatdex::flatdex_impl::materialize::INVALID_SHAPE_MESSAGE;
    use flatdex::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test]
    async fn repeated_queries_run_the_function_once() {
        let (probes, _) = probes(&[Cardinality::Finite(2), Cardinality::Finite(5)]);
        let calls = counter();
        let source = Instrumented::new(MemorySequence::range(0, 2));
        let opens = Arc::clone(&source.opens);
        let index = FlatMapIndex::new(
            &Host::default(),
            Arc::new(source),
            select(&probes, Arc::clone(&calls)),
        );

        for _ in 0..5 {
            assert_eq!(index.cardinality().await, Ok(Cardinality::Finite(7)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_source_has_no_elements() {
        let calls = counter();
        let index = FlatMapIndex::new(
            &Host::default(),
            Arc::new(MemorySequence::new(Vec::new())),
            select(&[], Arc::clone(&calls)),
        );
        assert_eq!(index.cardinality().await, Ok(Cardinality::Finite(0)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn finite_cardinalities_are_summed() {
        let (probes, queried) = probes(&[
            Cardinality::Finite(3),
            Cardinality::Finite(0),
            Cardinality::Finite(5),
        ]);
        let index = FlatMapIndex::new(
            &Host::default(),
            Arc::new(MemorySequence::range(0, 3)),
            select(&probes, counter()),
        );

        assert_eq!(
            index.cumulative_cardinalities().await.unwrap().as_slice(),
            &[
                Cardinality::Finite(3),
                Cardinality::Finite(3),
                Cardinality::Finite(8)
            ]
        );
        assert_eq!(index.cardinality().await, Ok(Cardinality::Finite(8)));
        assert_eq!(*queried.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn infinite_sub_sequence_short_circuits() {
        let (probes, queried) = probes(&[
            Cardinality::Finite(4),
            Cardinality::Infinite,
            Cardinality::Finite(7),
        ]);
        let index = FlatMapIndex::new(
            &Host::default(),
            Arc::new(MemorySequence::range(0, 3)),
            select(&probes, counter()),
        );

        assert_eq!(index.cardinality().await, Ok(Cardinality::Infinite));
        assert_eq!(
            index.cumulative_cardinalities().await.unwrap().as_slice(),
            &[Cardinality::Finite(4), Cardinality::Infinite]
        );
        // the third sub-sequence is materialized but never asked
        assert_eq!(*queried.lock(), vec![0, 1]);
        assert_eq!(index.subsequence_count().await, Some(3));
    }

    #[tokio::test]
    async fn unknown_sub_sequence_short_circuits() {
        let (probes, queried) = probes(&[Cardinality::Unknown, Cardinality::Finite(1)]);
        let index = FlatMapIndex::new(
            &Host::default(),
            Arc::new(MemorySequence::range(0, 2)),
            select(&probes, counter()),
        );
        assert_eq!(index.cardinality().await, Ok(Cardinality::Unknown));
        assert_eq!(*queried.lock(), vec![0]);
    }

    #[tokio::test]
    async fn handles_are_acquired_and_released_once() {
        let (probes, _) = probes(&[
            Cardinality::Finite(1),
            Cardinality::Finite(2),
            Cardinality::Finite(3),
        ]);
        let map = select(&probes, counter());
        let index = FlatMapIndex::new(
            &Host::default(),
            Arc::new(MemorySequence::range(0, 3)),
            Arc::clone(&map),
        );

        // ours and the mapping function's
        assert!(probes.iter().all(|p| Arc::strong_count(p) == 2));
        assert_eq!(index.cardinality().await, Ok(Cardinality::Finite(6)));
        assert_eq!(index.cardinality().await, Ok(Cardinality::Finite(6)));
        assert!(probes.iter().all(|p| Arc::strong_count(p) == 3));

        drop(index);
        assert!(probes.iter().all(|p| Arc::strong_count(p) == 2));
    }

    #[tokio::test]
    async fn shape_violations_are_reported() {
        let single = || -> SequenceRef { Arc::new(MemorySequence::range(0, 1)) };
        let cases: Vec<Vec<Value>> = vec![
            vec![Value::sequence(single()), Value::sequence(single())],
            vec![Value::List(vec![Value::sequence(single())])],
            vec![Value::from(1_i64)],
            vec![],
        ];

        for mapped in cases {
            let index = FlatMapIndex::new(
                &Host::default(),
                Arc::new(MemorySequence::range(0, 2)),
                Arc::new(FnMap::new(move |_: Element| Ok(mapped.clone()))),
            );
            match index.cardinality().await {
                Err(Error::InvalidShape(msg)) => assert!(msg.starts_with(INVALID_SHAPE_MESSAGE)),
                other => panic!("expected an invalid shape error, got {:?}", other),
            }
            assert_eq!(index.subsequence_count().await, None);
        }
    }

    #[tokio::test]
    async fn variant_without_a_sequence_fails_to_decode() {
        let index = FlatMapIndex::new(
            &Host::default(),
            Arc::new(MemorySequence::range(0, 2)),
            Arc::new(FnMap::new(|_: Element| {
                Ok(vec![Value::Variant(flatdex::flatdex_impl::Variant::new(
                    "just a string",
                ))])
            })),
        );
        assert!(matches!(index.cardinality().await, Err(Error::Decode(_))));
    }

    #[tokio::test]
    async fn aborted_materialization_releases_acquired_handles_on_teardown() {
        let (probes, _) = probes(&[
            Cardinality::Finite(1),
            Cardinality::Finite(1),
            Cardinality::Finite(1),
        ]);
        let held = probes.clone();
        let map: Arc<dyn MapFunction> = Arc::new(FnMap::new(move |element: Element| {
            let i = element[0].as_i64().unwrap_or_default() as usize;
            let probe: SequenceRef = held[i].clone();
            if i == 2 {
                // two values instead of one
                Ok(vec![Value::sequence(Arc::clone(&probe)), Value::sequence(probe)])
            } else {
                Ok(vec![Value::sequence(probe)])
            }
        }));
        let index = FlatMapIndex::new(
            &Host::default(),
            Arc::new(MemorySequence::range(0, 3)),
            Arc::clone(&map),
        );

        let first = index.cardinality().await;
        assert!(matches!(first, Err(Error::InvalidShape(_))));
        assert_eq!(index.cardinality().await, first);

        let counts = |probes: &[Arc<Probe>]| probes.iter().map(Arc::strong_count).collect::<Vec<_>>();
        assert_eq!(counts(&probes), vec![3, 3, 2]);
        drop(index);
        assert_eq!(counts(&probes), vec![2, 2, 2]);
    }

    #[tokio::test]
    async fn source_errors_are_propagated_and_memoized() {
        let mut source = Instrumented::new(MemorySequence::range(0, 5));
        source.fail_at = Some(3);
        let opens = Arc::clone(&source.opens);
        let pulls = Arc::clone(&source.pulls);
        let (probes, _) = probes(&[Cardinality::Finite(1); 5]);
        let index = FlatMapIndex::new(&Host::default(), Arc::new(source), select(&probes, counter()));

        let expected = Err(Error::source_iteration("bad record at 3"));
        assert_eq!(index.cardinality().await, expected);
        assert_eq!(index.cardinality().await, expected);
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(pulls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn construction_failure_never_touches_collaborators() {
        struct LockedHost;

        impl HostContext for LockedHost {
            fn clone_function_library(&self) -> Result<FunctionLibrary, Error> {
                Err(Error::EnvironmentClone("library is locked".to_string()))
            }
        }

        let source = Instrumented::new(MemorySequence::range(0, 3));
        let opens = Arc::clone(&source.opens);
        let calls = counter();
        let index = FlatMapIndex::new(&LockedHost, Arc::new(source), select(&[], Arc::clone(&calls)));

        for _ in 0..3 {
            assert_eq!(
                index.cardinality().await,
                Err(Error::EnvironmentClone("library is locked".to_string()))
            );
        }
        assert!(index.cumulative_cardinalities().await.is_err());
        assert_eq!(opens.load(Ordering::SeqCst), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_interrupts_iteration() {
        let mut source = Instrumented::new(MemorySequence::range(0, 5));
        source.block_at = Some(2);
        let pulls = Arc::clone(&source.pulls);
        let (probes, _) = probes(&[Cardinality::Finite(1); 5]);
        let map = select(&probes, counter());
        let index = FlatMapIndex::new(&Host::default(), Arc::new(source), Arc::clone(&map));

        let (result, ()) = tokio::join!(index.cardinality(), async {
            // wait until the source is parked on the third element
            while pulls.load(Ordering::SeqCst) < 3 {
                tokio::task::yield_now().await;
            }
            index.cancel();
        });

        assert_eq!(result, Err(Error::Cancelled));
        assert_eq!(index.cardinality().await, Err(Error::Cancelled));
        assert_eq!(pulls.load(Ordering::SeqCst), 3);
        // sub-sequences decoded before cancelling stay held until teardown
        let counts = probes.iter().map(Arc::strong_count).collect::<Vec<_>>();
        assert_eq!(counts, vec![3, 3, 2, 2, 2]);
        drop(index);
        assert!(probes.iter().all(|p| Arc::strong_count(p) == 2));
    }

    #[tokio::test]
    async fn dropped_query_is_restarted_without_double_counting() {
        let mut source = Instrumented::new(MemorySequence::range(0, 4));
        source.delay_at = Some((2, Duration::from_millis(200)));
        let opens = Arc::clone(&source.opens);
        let (probes, _) = probes(&[
            Cardinality::Finite(0),
            Cardinality::Finite(1),
            Cardinality::Finite(2),
            Cardinality::Finite(3),
        ]);
        let map = select(&probes, counter());
        let index = FlatMapIndex::new(&Host::default(), Arc::new(source), Arc::clone(&map));

        // the first two sub-sequences are decoded before the source stalls
        let first = tokio::time::timeout(Duration::from_millis(20), index.cardinality()).await;
        assert!(first.is_err());
        assert!(!index.is_cached());

        assert_eq!(index.cardinality().await, Ok(Cardinality::Finite(6)));
        assert_eq!(
            index.cumulative_cardinalities().await.unwrap().as_slice(),
            &[
                Cardinality::Finite(0),
                Cardinality::Finite(1),
                Cardinality::Finite(3),
                Cardinality::Finite(6)
            ]
        );
        assert_eq!(index.subsequence_count().await, Some(4));
        assert_eq!(opens.load(Ordering::SeqCst), 2);

        // the abandoned pass's handles are held alongside the completed ones
        let counts = |probes: &[Arc<Probe>]| probes.iter().map(Arc::strong_count).collect::<Vec<_>>();
        assert_eq!(counts(&probes), vec![4, 4, 3, 3]);
        drop(index);
        assert_eq!(counts(&probes), vec![2, 2, 2, 2]);
    }

    #[tokio::test]
    async fn concurrent_queries_share_one_computation() {
        let (probes, _) = probes(&[Cardinality::Finite(2); 4]);
        let calls = counter();
        let source = Instrumented::new(MemorySequence::range(0, 4));
        let opens = Arc::clone(&source.opens);
        let index = FlatMapIndex::new(&Host::default(), Arc::new(source), select(&probes, Arc::clone(&calls)));

        let (a, b, c) = tokio::join!(index.cardinality(), index.cardinality(), index.cardinality());
        assert_eq!(a, Ok(Cardinality::Finite(8)));
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn mapping_function_can_use_the_worker_pool_and_resources() {
        let index = FlatMapIndex::new(
            &Host::default(),
            Arc::new(MemorySequence::range(1, 4)),
            Arc::new(Chunked),
        );
        assert_eq!(index.cardinality().await, Ok(Cardinality::Finite(60)));

        let runs = index
            .context()
            .and_then(|ctx| ctx.resources().get::<AtomicUsize>("runs"))
            .expect("the mapping function registered its counter");
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn blocking_query_outside_a_runtime() {
        let (probes, _) = probes(&[Cardinality::Finite(3), Cardinality::Finite(4)]);
        let index = FlatMapIndex::new(
            &Host::default(),
            Arc::new(MemorySequence::range(0, 2)),
            select(&probes, counter()),
        );
        assert_eq!(index.blocking_cardinality(), Ok(Cardinality::Finite(7)));
        assert!(index.is_cached());
    }

    #[test]
    fn blocking_query_can_use_the_worker_pool() {
        let index = FlatMapIndex::new(
            &Host::default(),
            Arc::new(MemorySequence::range(1, 4)),
            Arc::new(Chunked),
        );
        assert_eq!(index.blocking_cardinality(), Ok(Cardinality::Finite(60)));
    }
}
