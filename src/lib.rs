//! Ferret - query routing and multi-source retrieval for security operations data
//!
//! Classifies a natural-language query, picks the cheapest retrieval strategy,
//! fans it out across alert, incident, asset, indicator and playbook sources,
//! and consolidates the answers into one ranked list. Also provides entity
//! correlation and tool relevance scoring over the same building blocks.

pub mod cache;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod consolidate;
pub mod correlation;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod executor;
pub mod router;
pub mod sources;
pub mod storage;
pub mod tools;

pub use cache::QueryCache;
pub use classifier::{classify, Classification, QueryType};
pub use consolidate::{ConsolidatedResult, RankedResult};
pub use correlation::{CorrelationReport, CorrelationRequest, Depth, EntityKind};
pub use engine::{HybridSearchResponse, Query, SearchEngine};
pub use error::{FerretError, Result};
pub use router::Strategy;
pub use sources::{Record, SourceKind};
pub use tools::{ToolDescriptor, ToolScore};
