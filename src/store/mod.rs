//! Conversion persistence
//!
//! A directed-edge store keyed by normalized `(from_unit, to_unit)` pairs,
//! and the gateway that keeps every stored conversion paired with its
//! inverse.

pub mod gateway;
pub mod graph;

pub use gateway::{InverseOutcome, StoreGateway, StoreReport, INVERSE_OF_KEY};
pub use graph::GraphStore;

use crate::types::{ConversionRelation, UnitPair};
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the persistence backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to access store file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store file {} is malformed: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid conversion edge: {0}")]
    InvalidRelation(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Point lookup and merge-upsert over directed conversion edges.
///
/// Implementations serialize concurrent writers; the last write to an edge wins.
pub trait ConversionStore: Send + Sync {
    /// The edge `pair.from_unit -> pair.to_unit`, if stored
    fn find(&self, pair: &UnitPair) -> Result<Option<ConversionRelation>, StoreError>;

    /// Insert the edge, or replace its formula and merge its provenance
    fn upsert(&self, relation: &ConversionRelation) -> Result<(), StoreError>;

    /// Every stored edge, ordered by `(from_unit, to_unit)`
    fn conversions(&self) -> Result<Vec<ConversionRelation>, StoreError>;
}
