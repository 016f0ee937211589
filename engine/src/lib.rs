//! Hierarchical semantic grouping of embedded images.
//!
//! # Architecture
//!
//! The engine sits between the `shoebox-clip` inference pipeline and the
//! `shoebox-cluster` strategies, and owns the two contracts the outer
//! layers (API, storage) build on:
//!
//! - [`Ingest::process`]: raw bytes + declared content type ->
//!   [`IngestedImage`] (dimensions, serialized embedding, subject and
//!   background labels). Runs once per upload.
//! - [`build_clusters`]: the full current [`ImageRecord`] collection ->
//!   ordered [`ClusterGroup`] list, recomputed from scratch on every call
//!   with no persistent cluster state. [`group_by_subject`] nests the flat
//!   list under subject labels.
//!
//! Grouping first partitions records by (subject, background) pair, then
//! runs the configured clustering strategy inside each partition, with
//! explicit branches for singletons, structureless ("all noise")
//! partitions, and outlier members.
//!
//! Model inference and clustering are blocking; the `*_offloaded` wrappers
//! move them onto the tokio blocking pool.

mod codec;
mod error;
mod groups;
mod ingest;
mod types;

pub use codec::{embedding_from_bytes, embedding_to_bytes};
pub use error::EngineError;
pub use groups::{build_clusters, build_clusters_offloaded, group_by_subject, UNKNOWN_BACKGROUND};
pub use ingest::Ingest;
pub use types::{ClusterGroup, ImageRecord, IngestedImage, SubjectGroup};
