#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod chunker;
pub mod extraction;
pub mod indexer;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod test_support;

pub use indexer::{EmbeddingIndexer, IndexReport};
pub use pipeline::{IngestReport, IngestionPipeline};
