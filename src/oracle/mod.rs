//! Language oracle interface
//!
//! The natural-language steps of the knowledge base (unit extraction,
//! convertibility judgment, formula generation, test-case synthesis and
//! training-question generation) are delegated to an oracle. Oracles are
//! untrusted: [`CheckedOracle`] validates everything they return before the
//! core uses it.

pub mod catalog;
pub mod checked;
pub mod llm;
pub mod rule;

pub use checked::CheckedOracle;
pub use llm::OpenAiOracle;
pub use rule::RuleOracle;

use crate::config::{OracleBackend, OracleConfig};
use crate::types::{ContractViolation, TestCase, UnitPair};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Failures of an oracle backend
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    #[error("oracle request failed: {0}")]
    RequestFailed(String),

    #[error("unreadable oracle response: {0}")]
    Response(String),

    #[error(transparent)]
    Contract(#[from] ContractViolation),

    #[error("unsupported request: {0}")]
    Unsupported(String),
}

/// Units as named by the extraction oracle, before normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedUnits {
    pub from_unit: String,
    pub to_unit: String,
}

impl ExtractedUnits {
    pub fn new(from_unit: impl Into<String>, to_unit: impl Into<String>) -> Self {
        Self {
            from_unit: from_unit.into(),
            to_unit: to_unit.into(),
        }
    }
}

/// The four capabilities the acquisition loop consults
#[async_trait]
pub trait LanguageOracle: Send + Sync {
    /// Name the source and target units of a question
    async fn extract_units(&self, question: &str) -> Result<ExtractedUnits, OracleError>;

    /// Whether converting between the two units is meaningful
    async fn is_convertible(&self, pair: &UnitPair) -> Result<bool, OracleError>;

    /// Propose `to_unit = <expression of from_unit>`, correcting for `feedback`
    async fn generate_formula(&self, pair: &UnitPair, feedback: &str)
        -> Result<String, OracleError>;

    /// Synthesize test cases for `formula`
    async fn generate_test_cases(&self, formula: &str) -> Result<Vec<TestCase>, OracleError>;
}

/// Produces natural-language training questions
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn generate_questions(
        &self,
        count: usize,
        prompt: &str,
    ) -> Result<Vec<String>, OracleError>;
}

/// The oracle capabilities selected by configuration
#[derive(Clone)]
pub struct OracleSet {
    pub oracle: Arc<dyn LanguageOracle>,
    pub questions: Arc<dyn QuestionSource>,
}

impl OracleSet {
    pub fn from_config(config: &OracleConfig) -> Result<Self, OracleError> {
        match config.backend {
            OracleBackend::Rule => {
                let rule = Arc::new(RuleOracle::new()?);
                Ok(Self {
                    oracle: rule.clone(),
                    questions: rule,
                })
            }
            OracleBackend::OpenAi => {
                let llm = Arc::new(OpenAiOracle::from_config(config)?);
                Ok(Self {
                    oracle: llm.clone(),
                    questions: llm,
                })
            }
        }
    }
}
