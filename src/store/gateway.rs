//! Store gateway
//!
//! Wraps a [`ConversionStore`] so that storing `A -> B` also stores
//! `B -> A` with the inverted formula. The inverse is best effort: a formula
//! without a closed-form inverse, or a failed inverse write, is logged and
//! reported but never undoes the forward store.

use super::{ConversionStore, StoreError};
use crate::core::formula::{invert_formula, Formula};
use crate::error::KbResult;
use crate::types::{ConversionRelation, UnitPair};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Provenance key linking an inverse edge to the formula it was derived from
pub const INVERSE_OF_KEY: &str = "inverse_of";

/// What happened to the reverse edge after a forward store
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InverseOutcome {
    /// The reverse edge already existed and was left untouched
    AlreadyPresent { formula: String },
    /// The inverted formula was stored
    Stored { formula: String },
    /// No inverse was stored
    Skipped { reason: String },
}

/// Result of a successful forward store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreReport {
    pub pair: UnitPair,
    pub formula: String,
    pub inverse: InverseOutcome,
}

/// Lookup and bidirectional store over a conversion store
#[derive(Clone)]
pub struct StoreGateway {
    store: Arc<dyn ConversionStore>,
}

impl StoreGateway {
    pub fn new(store: Arc<dyn ConversionStore>) -> Self {
        Self { store }
    }

    pub fn store_backend(&self) -> &Arc<dyn ConversionStore> {
        &self.store
    }

    /// The stored formula for `pair`, if any
    pub fn lookup(&self, pair: &UnitPair) -> Result<Option<String>, StoreError> {
        Ok(self.store.find(pair)?.map(|relation| relation.formula))
    }

    /// The full stored edge for `pair`, provenance included
    pub fn lookup_relation(&self, pair: &UnitPair) -> Result<Option<ConversionRelation>, StoreError> {
        self.store.find(pair)
    }

    pub fn conversions(&self) -> Result<Vec<ConversionRelation>, StoreError> {
        self.store.conversions()
    }

    /// Store `relation` and make sure its inverse exists.
    ///
    /// Fails only when the relation itself is invalid or the forward write fails.
    pub fn store(&self, relation: &ConversionRelation) -> KbResult<StoreReport> {
        let pair = relation
            .pair()
            .map_err(|e| StoreError::InvalidRelation(e.to_string()))?;
        Formula::parse(&relation.formula)?;

        self.store.upsert(relation)?;
        info!(pair = %pair, formula = %relation.formula, "Stored conversion");

        let inverse = self.propagate_inverse(&pair, relation);
        Ok(StoreReport {
            pair,
            formula: relation.formula.trim().to_string(),
            inverse,
        })
    }

    fn propagate_inverse(&self, pair: &UnitPair, relation: &ConversionRelation) -> InverseOutcome {
        let reverse = pair.swapped();

        match self.store.find(&reverse) {
            Ok(Some(existing)) => {
                debug!(pair = %reverse, "Inverse already stored");
                return InverseOutcome::AlreadyPresent {
                    formula: existing.formula,
                };
            }
            Ok(None) => {}
            Err(e) => {
                warn!(pair = %reverse, error = %e, "Inverse lookup failed");
                return InverseOutcome::Skipped {
                    reason: e.to_string(),
                };
            }
        }

        let formula = match invert_formula(&relation.formula) {
            Ok(formula) => formula,
            Err(e) => {
                warn!(pair = %pair, error = %e, "Formula has no usable inverse; storing forward edge only");
                return InverseOutcome::Skipped {
                    reason: e.to_string(),
                };
            }
        };

        let mut inverse = ConversionRelation::new(&reverse, formula.clone());
        inverse.provenance = relation.provenance.clone();
        inverse
            .provenance
            .insert(INVERSE_OF_KEY.to_string(), relation.formula.trim().into());

        match self.store.upsert(&inverse) {
            Ok(()) => {
                info!(pair = %reverse, formula = %formula, "Stored inverse conversion");
                InverseOutcome::Stored { formula }
            }
            Err(e) => {
                warn!(pair = %reverse, error = %e, "Failed to store inverse conversion");
                InverseOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KbError;
    use crate::store::GraphStore;
    use pretty_assertions::assert_eq;

    fn gateway() -> StoreGateway {
        StoreGateway::new(Arc::new(GraphStore::in_memory()))
    }

    fn relation(from: &str, to: &str, formula: &str) -> ConversionRelation {
        ConversionRelation::new(&UnitPair::new(from, to).unwrap(), formula)
            .with_provenance("author", "tests")
    }

    #[test]
    fn test_store_propagates_inverse() {
        let gateway = gateway();
        let report = gateway
            .store(&relation("meters", "centimeters", "centimeters = meters * 100"))
            .unwrap();

        assert_eq!(
            report.inverse,
            InverseOutcome::Stored {
                formula: "meters = centimeters / 100".to_string()
            }
        );

        let reverse = UnitPair::new("centimeters", "meters").unwrap();
        let stored = gateway.lookup_relation(&reverse).unwrap().unwrap();
        assert_eq!(stored.formula, "meters = centimeters / 100");
        assert_eq!(stored.provenance["author"], "tests");
        assert_eq!(stored.provenance[INVERSE_OF_KEY], "centimeters = meters * 100");
    }

    #[test]
    fn test_second_store_does_not_recompute_inverse() {
        let gateway = gateway();
        let forward = relation("meters", "centimeters", "centimeters = meters * 100");
        gateway.store(&forward).unwrap();
        let second = gateway.store(&forward).unwrap();

        assert!(matches!(second.inverse, InverseOutcome::AlreadyPresent { .. }));
        assert_eq!(gateway.conversions().unwrap().len(), 2);
    }

    #[test]
    fn test_existing_inverse_is_left_untouched() {
        let gateway = gateway();
        gateway
            .store_backend()
            .upsert(&relation("centimeters", "meters", "meters = centimeters * 0.01"))
            .unwrap();

        gateway
            .store(&relation("meters", "centimeters", "centimeters = meters * 100"))
            .unwrap();

        let reverse = UnitPair::new("centimeters", "meters").unwrap();
        assert_eq!(
            gateway.lookup(&reverse).unwrap().as_deref(),
            Some("meters = centimeters * 0.01")
        );
    }

    #[test]
    fn test_uninvertible_formula_keeps_forward_edge() {
        let gateway = gateway();
        let report = gateway
            .store(&relation("side", "area", "area = side ** 2"))
            .unwrap();

        assert!(matches!(report.inverse, InverseOutcome::Skipped { .. }));
        assert!(gateway
            .lookup(&UnitPair::new("side", "area").unwrap())
            .unwrap()
            .is_some());
        assert!(gateway
            .lookup(&UnitPair::new("area", "side").unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_store_rejects_malformed_formula() {
        let gateway = gateway();
        let result = gateway.store(&relation("a", "b", "b = a * c"));
        assert!(matches!(result, Err(KbError::Formula(_))));
        assert!(gateway.conversions().unwrap().is_empty());
    }

    #[test]
    fn test_lookup_normalizes() {
        let gateway = gateway();
        gateway
            .store(&relation("Kilometers Per Hour", "knots", "knots = kilometers_per_hour / 1.852"))
            .unwrap();
        let pair = UnitPair::new("  kilometers   per hour", "KNOTS").unwrap();
        assert_eq!(
            gateway.lookup(&pair).unwrap().as_deref(),
            Some("knots = kilometers_per_hour / 1.852")
        );
    }
}
