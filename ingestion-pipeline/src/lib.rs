#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod corpus;
pub mod fetch;
pub mod pipeline;
pub mod splitter;

pub use pipeline::{IngestionConfig, IngestionPipeline, IngestionReport, IngestionTuning};
