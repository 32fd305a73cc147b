use crate::context::ExecutionContext;
use crate::error::Error;
use crate::function::MapFunction;
use crate::sequence::{Sequence, SequenceRef};
use crate::value::Value;
use futures::stream::Stream;
use futures::stream::StreamExt;
use futures::TryStreamExt;
use genawaiter::sync::{Co, Gen};
use tracing::{debug, instrument};

pub const INVALID_SHAPE_MESSAGE: &str =
    "Flat map function must return a single scalar variant value representing a sequence";

/// Drains a source sequence through a mapping function, decoding every
/// result into a sub-sequence.
pub struct Materializer<'a> {
    input: &'a dyn Sequence,
    map_func: &'a dyn MapFunction,
    ctx: &'a ExecutionContext,
}

impl<'a> Materializer<'a> {
    pub fn new(
        input: &'a dyn Sequence,
        map_func: &'a dyn MapFunction,
        ctx: &'a ExecutionContext,
    ) -> Self {
        Materializer {
            input,
            map_func,
            ctx,
        }
    }

    /// Yields one sub-sequence per source element, in source order. The
    /// first error is yielded as the last item.
    pub fn stream(&self) -> impl Stream<Item = Result<SequenceRef, Error>> + 'a {
        let (input, map_func, ctx) = (self.input, self.map_func, self.ctx);
        Gen::new(move |co: Co<Result<SequenceRef, Error>>| async move {
            if let Err(e) = drive(input, map_func, ctx, &co).await {
                co.yield_(Err(e)).await;
            }
        })
    }

    /// Collects every sub-sequence. All or nothing: any error discards the
    /// handles collected so far.
    #[instrument(skip(self))]
    pub async fn materialize(&self) -> Result<Vec<SequenceRef>, Error> {
        let subsequences = self.stream().try_collect::<Vec<_>>().await?;
        debug!(subsequences = subsequences.len(), "materialized");
        Ok(subsequences)
    }

    /// Appends sub-sequences to `arena` as they are decoded and returns how
    /// many were added. On error, handles appended before the failing step
    /// stay in `arena`.
    #[instrument(skip(self, arena))]
    pub async fn materialize_into(&self, arena: &mut Vec<SequenceRef>) -> Result<usize, Error> {
        let before = arena.len();
        let stream = self.stream();
        futures::pin_mut!(stream);
        while let Some(subsequence) = stream.next().await {
            match subsequence {
                Ok(subsequence) => arena.push(subsequence),
                Err(e) => {
                    debug!(acquired = arena.len() - before, error = %e, "materialization aborted");
                    return Err(e);
                }
            }
        }
        debug!(subsequences = arena.len() - before, "materialized");
        Ok(arena.len() - before)
    }
}

async fn drive(
    input: &dyn Sequence,
    map_func: &dyn MapFunction,
    ctx: &ExecutionContext,
    co: &Co<Result<SequenceRef, Error>>,
) -> Result<(), Error> {
    let mut iterator = input.open(ctx, &ctx.options().iterator_prefix).await?;
    let function = map_func.instantiate(ctx).await?;

    loop {
        ctx.check_cancelled()?;
        let element = match iterator.next(ctx).await? {
            Some(element) => element,
            None => return Ok(()),
        };

        ctx.check_cancelled()?;
        let mapped = function.run(ctx, element).await?;
        co.yield_(Ok(decode_subsequence(&mapped)?)).await;
    }
}

/// Decodes the output of a mapping function, which must be exactly one
/// scalar variant holding a sequence.
pub fn decode_subsequence(mapped: &[Value]) -> Result<SequenceRef, Error> {
    match mapped {
        [Value::Variant(variant)] => variant.decode_sequence(),
        [value] => Err(Error::InvalidShape(format!(
            "{}, got a {} value of type {}",
            INVALID_SHAPE_MESSAGE,
            if value.is_scalar() { "scalar" } else { "non-scalar" },
            value
                .dtype()
                .map(|dtype| dtype.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        ))),
        values => Err(Error::InvalidShape(format!(
            "{}, got {} values",
            INVALID_SHAPE_MESSAGE,
            values.len()
        ))),
    }
}
