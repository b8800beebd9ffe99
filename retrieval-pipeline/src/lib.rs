#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod answer;
pub mod fts;
pub mod hybrid;
pub mod scoring;
pub mod vector;

pub use answer::{AnswerOptions, AnswerResponse, AnswerSynthesizer, Citation};
pub use hybrid::{HybridRetriever, RetrievalItem};
