//! Per-item results of batch operations.

use std::fmt;

use tracing::warn;

use crate::error::DataportError;

/// Result of one item in a batch: a value, an error, or a stream of chunks.
pub enum BatchOutcome<T> {
    Ok(T),
    Err(DataportError),
    Partial(Box<dyn Iterator<Item = T> + Send>),
}

impl<T> BatchOutcome<T> {
    pub fn partial<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        BatchOutcome::Partial(Box::new(chunks.into_iter()))
    }

    pub fn is_err(&self) -> bool {
        matches!(self, BatchOutcome::Err(_))
    }
}

impl<T> From<Result<T, DataportError>> for BatchOutcome<T> {
    fn from(result: Result<T, DataportError>) -> Self {
        match result {
            Ok(value) => BatchOutcome::Ok(value),
            Err(err) => BatchOutcome::Err(err),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for BatchOutcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchOutcome::Ok(value) => f.debug_tuple("Ok").field(value).finish(),
            BatchOutcome::Err(err) => f.debug_tuple("Err").field(err).finish(),
            BatchOutcome::Partial(_) => f.write_str("Partial(..)"),
        }
    }
}

/// One text output per outcome, in order.
///
/// Streams are drained and concatenated. Errors become an empty string and
/// are logged, so the output stays aligned with the input.
pub fn collect_text_outputs<I>(outcomes: I) -> Vec<String>
where
    I: IntoIterator<Item = BatchOutcome<String>>,
{
    outcomes
        .into_iter()
        .enumerate()
        .map(|(index, outcome)| match outcome {
            BatchOutcome::Ok(text) => text,
            BatchOutcome::Partial(chunks) => chunks.collect(),
            BatchOutcome::Err(err) => {
                warn!(index, error = %err, "batch item failed, using empty output");
                String::new()
            }
        })
        .collect()
}
