//! Formula acquisition loop
//!
//! Resolves a question to a conversion formula:
//!
//! ```text
//! EXTRACT → LOOKUP → FOUND
//!                  → VALIDATE → NOT MEANINGFUL
//!                             → GENERATE → SCORE → ACCEPT
//!                                                → RETRY (GENERATE) | EXHAUSTED
//! ```
//!
//! A cache hit returns immediately without consulting the oracle again. Each
//! retry receives the feedback of the latest failed attempt only.

use crate::config::AcquisitionConfig;
use crate::core::scorer::{FeedbackReport, Scorer};
use crate::error::KbResult;
use crate::oracle::{CheckedOracle, LanguageOracle};
use crate::store::{InverseOutcome, StoreGateway};
use crate::types::{ConversionRelation, UnitPair};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Terminal state of one acquisition
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Already in the store
    Found { pair: UnitPair, formula: String },
    /// Generated, verified and stored
    Learned {
        pair: UnitPair,
        formula: String,
        score: f64,
        attempts: usize,
        inverse: InverseOutcome,
    },
    /// The oracle judged the conversion meaningless
    NotMeaningful { pair: UnitPair },
    /// No candidate reached the acceptance threshold
    Unresolved {
        pair: UnitPair,
        attempts: usize,
        best_score: f64,
    },
}

impl Outcome {
    pub fn pair(&self) -> &UnitPair {
        match self {
            Outcome::Found { pair, .. }
            | Outcome::Learned { pair, .. }
            | Outcome::NotMeaningful { pair }
            | Outcome::Unresolved { pair, .. } => pair,
        }
    }

    /// The resolved formula, from the store or freshly learned
    pub fn formula(&self) -> Option<&str> {
        match self {
            Outcome::Found { formula, .. } | Outcome::Learned { formula, .. } => Some(formula),
            Outcome::NotMeaningful { .. } | Outcome::Unresolved { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Found { .. } => "found",
            Outcome::Learned { .. } => "learned",
            Outcome::NotMeaningful { .. } => "not_meaningful",
            Outcome::Unresolved { .. } => "unresolved",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Found { formula, .. } => {
                write!(f, "Formula found in the knowledge graph: {}", formula)
            }
            Outcome::Learned {
                formula, attempts, ..
            } => write!(
                f,
                "Learned a new rule after {} attempt{}: {}",
                attempts,
                if *attempts == 1 { "" } else { "s" },
                formula
            ),
            Outcome::NotMeaningful { pair } => write!(
                f,
                "Converting {} to {} is not meaningful",
                pair.from_unit(),
                pair.to_unit()
            ),
            Outcome::Unresolved { pair, attempts, .. } => write!(
                f,
                "Unable to determine a reliable formula for {} after {} attempts",
                pair, attempts
            ),
        }
    }
}

/// Runs the acquisition loop against one oracle and one store
#[derive(Clone)]
pub struct Agent {
    oracle: CheckedOracle,
    gateway: StoreGateway,
    scorer: Scorer,
    config: AcquisitionConfig,
}

impl Agent {
    pub fn new(
        oracle: Arc<dyn LanguageOracle>,
        gateway: StoreGateway,
        config: AcquisitionConfig,
    ) -> Self {
        Self {
            oracle: CheckedOracle::new(oracle),
            gateway,
            scorer: Scorer::new(config.tolerance),
            config,
        }
    }

    pub fn gateway(&self) -> &StoreGateway {
        &self.gateway
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Answer a natural-language conversion question
    pub async fn ask(&self, question: &str) -> KbResult<Outcome> {
        let start = Instant::now();
        let pair = self.oracle.extract_units(question).await?;
        info!(question = %question.trim(), pair = %pair, "Extracted units");

        let outcome = self.resolve(pair).await?;
        info!(
            outcome = outcome.kind(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Question resolved"
        );
        Ok(outcome)
    }

    /// Resolve a unit pair, learning a formula when the store has none
    pub async fn resolve(&self, pair: UnitPair) -> KbResult<Outcome> {
        if let Some(formula) = self.gateway.lookup(&pair)? {
            info!(pair = %pair, formula = %formula, "Found in knowledge graph");
            return Ok(Outcome::Found { pair, formula });
        }

        if !self.oracle.is_convertible(&pair).await? {
            info!(pair = %pair, "Conversion is not meaningful");
            return Ok(Outcome::NotMeaningful { pair });
        }

        let mut feedback = String::new();
        let mut best_score: f64 = 0.0;

        for attempt in 1..=self.config.max_attempts {
            let formula = self.oracle.generate_formula(&pair, &feedback).await?;
            debug!(pair = %pair, attempt, formula = %formula, "Candidate formula");

            let cases = self.oracle.generate_test_cases(&formula).await?;
            let output = self.scorer.score(&formula, cases.cases())?;
            best_score = best_score.max(output.score);
            info!(
                pair = %pair,
                attempt,
                score = output.score,
                failed = output.failures.len(),
                "Scored candidate"
            );

            if output.score >= self.config.acceptance_threshold {
                let relation = ConversionRelation::new(&pair, formula.as_str())
                    .with_provenance("author", self.config.author.as_str())
                    .with_provenance("score", output.score)
                    .with_provenance("learned_at", chrono::Utc::now().to_rfc3339());
                // Store writes rewrite the snapshot file
                let gateway = self.gateway.clone();
                let report =
                    tokio::task::spawn_blocking(move || gateway.store(&relation)).await??;

                return Ok(Outcome::Learned {
                    pair,
                    formula,
                    score: output.score,
                    attempts: attempt,
                    inverse: report.inverse,
                });
            }

            feedback = FeedbackReport::new(formula.as_str(), output).to_string();
        }

        warn!(
            pair = %pair,
            attempts = self.config.max_attempts,
            best_score,
            "No reliable formula found"
        );
        Ok(Outcome::Unresolved {
            pair,
            attempts: self.config.max_attempts,
            best_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::RuleOracle;
    use crate::store::GraphStore;

    fn agent() -> Agent {
        Agent::new(
            Arc::new(RuleOracle::new().unwrap()),
            StoreGateway::new(Arc::new(GraphStore::in_memory())),
            AcquisitionConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_learn_then_find() {
        let agent = agent();

        let first = agent.ask("How do I convert meters to centimeters?").await.unwrap();
        assert_eq!(first.kind(), "learned");
        assert_eq!(first.formula(), Some("centimeters = meters * 100"));

        let second = agent.ask("convert 3 meters to centimeters").await.unwrap();
        assert_eq!(second.kind(), "found");
        assert_eq!(second.formula(), Some("centimeters = meters * 100"));
    }

    #[tokio::test]
    async fn test_learned_inverse_is_found() {
        let agent = agent();
        agent.ask("celsius to fahrenheit").await.unwrap();

        let reverse = agent.ask("fahrenheit to celsius").await.unwrap();
        assert_eq!(reverse.kind(), "found");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_learned_formula_is_written_to_store_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("conversions.yaml");
        let agent = Agent::new(
            Arc::new(RuleOracle::new().unwrap()),
            StoreGateway::new(Arc::new(GraphStore::open(&path).unwrap())),
            AcquisitionConfig::default(),
        );

        let outcome = agent.ask("meters to centimeters").await.unwrap();
        assert_eq!(outcome.kind(), "learned");

        let reopened = StoreGateway::new(Arc::new(GraphStore::open(&path).unwrap()));
        let pair = UnitPair::new("meters", "centimeters").unwrap();
        assert_eq!(
            reopened.lookup(&pair).unwrap().as_deref(),
            Some("centimeters = meters * 100")
        );
        assert!(reopened.lookup(&pair.swapped()).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_not_meaningful() {
        let outcome = agent().ask("convert meters to kilograms").await.unwrap();
        assert!(matches!(outcome, Outcome::NotMeaningful { .. }));
        assert_eq!(outcome.formula(), None);
    }

    #[test]
    fn test_outcome_messages() {
        let pair = UnitPair::new("meters", "feet").unwrap();
        let unresolved = Outcome::Unresolved {
            pair: pair.clone(),
            attempts: 3,
            best_score: 0.5,
        };
        assert_eq!(
            unresolved.to_string(),
            "Unable to determine a reliable formula for meters → feet after 3 attempts"
        );

        let learned = Outcome::Learned {
            pair,
            formula: "feet = meters / 0.3048".to_string(),
            score: 1.0,
            attempts: 1,
            inverse: InverseOutcome::Skipped {
                reason: "n/a".to_string(),
            },
        };
        assert_eq!(
            learned.to_string(),
            "Learned a new rule after 1 attempt: feet = meters / 0.3048"
        );
    }
}
