//! Chunked result streams

use crate::{ColumnMeta, QueryCancelHandle, QueryResult, Result, Row};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::sync::Arc;

pub type RowChunkStream = BoxStream<'static, Result<Vec<Row>>>;

/// Handle over an incrementally consumed result set.
///
/// Cancellation belongs to the stream, not to the session that produced it.
pub struct QueryStream {
    pub columns: Vec<ColumnMeta>,
    /// Total row estimate, when the engine can provide one up front
    pub total_rows: Option<u64>,
    chunks: RowChunkStream,
    cancel: Option<Arc<dyn QueryCancelHandle>>,
}

impl std::fmt::Debug for QueryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryStream")
            .field("columns", &self.columns)
            .field("total_rows", &self.total_rows)
            .field("cancelable", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

impl QueryStream {
    pub fn new(columns: Vec<ColumnMeta>, total_rows: Option<u64>, chunks: RowChunkStream) -> Self {
        Self {
            columns,
            total_rows,
            chunks,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, handle: Arc<dyn QueryCancelHandle>) -> Self {
        self.cancel = Some(handle);
        self
    }

    /// Splits an already materialized result into chunks of `chunk_size` rows
    pub fn from_result(result: QueryResult, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        let mut rows = result.rows;
        let mut chunks = Vec::new();
        while !rows.is_empty() {
            let rest = rows.split_off(rows.len().min(chunk_size));
            chunks.push(Ok(std::mem::replace(&mut rows, rest)));
        }
        Self::new(
            result.columns,
            result.total_rows,
            stream::iter(chunks).boxed(),
        )
    }

    /// Next chunk of rows, `None` once the stream is exhausted
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<Row>>> {
        self.chunks.next().await.transpose()
    }

    /// Requests cancellation of the producing query. Returns `false` when the
    /// stream has no cancel affordance.
    pub fn cancel(&self) -> bool {
        match &self.cancel {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_cancelable(&self) -> bool {
        self.cancel.is_some()
    }

    /// Drains the remaining chunks into one row list
    pub async fn collect_rows(mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            rows.extend(chunk);
        }
        Ok(rows)
    }
}
