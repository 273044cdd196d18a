//! Domain data model for the conversion knowledge base
//!
//! Unit pairs, numeric test oracles, persisted conversion relations and the
//! scorer's output. Anything an oracle hands back passes through the
//! constructors here before the rest of the crate sees it.

use crate::core::formula::Formula;
use crate::error::{KbError, KbResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Number of test cases every synthesized oracle set must contain
pub const TEST_CASE_COUNT: usize = 10;

//==============================================================================
// Contract validation
//==============================================================================

/// An oracle returned data that breaks the shape the core relies on
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{operation} violated its contract: {message}")]
pub struct ContractViolation {
    pub operation: String,
    pub message: String,
}

impl ContractViolation {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Normalize a unit name into the symbol used as graph key and formula variable.
///
/// Lower-cases, trims and joins internal whitespace runs with `_`, so
/// `"Total  Price"` becomes `total_price`.
pub fn normalize_unit_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

//==============================================================================
// Unit pairs
//==============================================================================

/// An ordered (from, to) pair of normalized unit names
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawUnitPair")]
pub struct UnitPair {
    from_unit: String,
    to_unit: String,
}

#[derive(Deserialize)]
struct RawUnitPair {
    from_unit: String,
    to_unit: String,
}

impl TryFrom<RawUnitPair> for UnitPair {
    type Error = ContractViolation;

    fn try_from(raw: RawUnitPair) -> Result<Self, Self::Error> {
        UnitPair::new(&raw.from_unit, &raw.to_unit)
    }
}

impl UnitPair {
    /// Build a pair, normalizing both names. Empty names are rejected.
    pub fn new(from_unit: &str, to_unit: &str) -> Result<Self, ContractViolation> {
        let from_unit = normalize_unit_name(from_unit);
        let to_unit = normalize_unit_name(to_unit);

        if from_unit.is_empty() {
            return Err(ContractViolation::new("unit pair", "from_unit is empty"));
        }
        if to_unit.is_empty() {
            return Err(ContractViolation::new("unit pair", "to_unit is empty"));
        }

        Ok(Self { from_unit, to_unit })
    }

    pub fn from_unit(&self) -> &str {
        &self.from_unit
    }

    pub fn to_unit(&self) -> &str {
        &self.to_unit
    }

    /// The reverse direction
    #[must_use]
    pub fn swapped(&self) -> Self {
        Self {
            from_unit: self.to_unit.clone(),
            to_unit: self.from_unit.clone(),
        }
    }
}

impl fmt::Display for UnitPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.from_unit, self.to_unit)
    }
}

//==============================================================================
// Test oracles
//==============================================================================

/// One numeric oracle: feeding `input_value` to the formula should give `expected_output`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input_value: f64,
    pub expected_output: f64,
}

impl TestCase {
    pub fn new(input_value: f64, expected_output: f64) -> Self {
        Self {
            input_value,
            expected_output,
        }
    }
}

/// Exactly [`TEST_CASE_COUNT`] finite test cases
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TestCaseSet {
    cases: Vec<TestCase>,
}

impl TestCaseSet {
    pub fn new(cases: Vec<TestCase>) -> Result<Self, ContractViolation> {
        if cases.len() != TEST_CASE_COUNT {
            return Err(ContractViolation::new(
                "generate_test_cases",
                format!(
                    "expected exactly {} test cases, got {}",
                    TEST_CASE_COUNT,
                    cases.len()
                ),
            ));
        }

        if let Some((idx, _)) = cases
            .iter()
            .enumerate()
            .find(|(_, c)| !c.input_value.is_finite() || !c.expected_output.is_finite())
        {
            return Err(ContractViolation::new(
                "generate_test_cases",
                format!("test case {} is not a finite number pair", idx + 1),
            ));
        }

        Ok(Self { cases })
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn into_inner(self) -> Vec<TestCase> {
        self.cases
    }
}

//==============================================================================
// Persisted conversions
//==============================================================================

/// A directed conversion edge with an open set of provenance fields (author, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRelation {
    pub from_unit: String,
    pub to_unit: String,
    pub formula: String,
    #[serde(flatten)]
    pub provenance: BTreeMap<String, serde_json::Value>,
}

impl ConversionRelation {
    pub fn new(pair: &UnitPair, formula: impl Into<String>) -> Self {
        Self {
            from_unit: pair.from_unit().to_string(),
            to_unit: pair.to_unit().to_string(),
            formula: formula.into(),
            provenance: BTreeMap::new(),
        }
    }

    /// Attach a provenance field
    #[must_use]
    pub fn with_provenance(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.provenance.insert(key.into(), value.into());
        self
    }

    /// The normalized pair this relation is keyed on
    pub fn pair(&self) -> Result<UnitPair, ContractViolation> {
        UnitPair::new(&self.from_unit, &self.to_unit)
    }

    /// Validate an untyped record (`{from_unit, to_unit, formula, ...}`).
    ///
    /// Unit names are normalized; the formula must parse, reference exactly
    /// one input variable and compute `to_unit` from `from_unit`.
    pub fn from_value(value: serde_json::Value) -> KbResult<Self> {
        let raw: ConversionRelation = serde_json::from_value(value)?;
        let pair = raw
            .pair()
            .map_err(|e| KbError::Validation(e.to_string()))?;
        let formula = Formula::parse(&raw.formula)?;
        if !formula.converts(&pair) {
            return Err(KbError::Validation(format!(
                "'{}' does not compute {} from {}",
                raw.formula.trim(),
                pair.to_unit(),
                pair.from_unit()
            )));
        }

        Ok(Self {
            from_unit: pair.from_unit().to_string(),
            to_unit: pair.to_unit().to_string(),
            formula: raw.formula.trim().to_string(),
            provenance: raw.provenance,
        })
    }
}

//==============================================================================
// Scorer output
//==============================================================================

/// What the formula produced for a failing case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observed {
    /// Evaluated, but outside tolerance
    Mismatch { actual: f64 },
    /// Evaluation itself failed
    Error { message: String },
}

/// A test case the formula did not pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedCase {
    #[serde(flatten)]
    pub case: TestCase,
    pub observed: Observed,
}

impl FailedCase {
    pub fn actual(&self) -> Option<f64> {
        match self.observed {
            Observed::Mismatch { actual } => Some(actual),
            Observed::Error { .. } => None,
        }
    }
}

/// Result of scoring one formula against a set of test cases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunnerOutput {
    /// Fraction of cases passed, in `[0, 1]`
    pub score: f64,
    pub passed: usize,
    pub total: usize,
    /// Failing cases in input order
    pub failures: Vec<FailedCase>,
}

impl TestRunnerOutput {
    /// Every failing case, evaluation errors included
    pub fn failed_test_cases(&self) -> Vec<TestCase> {
        self.failures.iter().map(|f| f.case).collect()
    }

    /// Actual outputs of the mismatched cases only; evaluation errors have no entry
    pub fn actual_outputs_for_failed_test_cases(&self) -> Vec<f64> {
        self.failures.iter().filter_map(FailedCase::actual).collect()
    }

    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unit_name() {
        assert_eq!(normalize_unit_name("  Meters "), "meters");
        assert_eq!(normalize_unit_name("Total  Price"), "total_price");
        assert_eq!(normalize_unit_name("kilometers per\thour"), "kilometers_per_hour");
        assert_eq!(normalize_unit_name("   "), "");
    }

    #[test]
    fn test_unit_pair_normalizes() {
        let pair = UnitPair::new("Meters", " CentiMeters ").unwrap();
        assert_eq!(pair.from_unit(), "meters");
        assert_eq!(pair.to_unit(), "centimeters");
        assert_eq!(pair.to_string(), "meters → centimeters");
    }

    #[test]
    fn test_unit_pair_rejects_empty() {
        let err = UnitPair::new("", "meters").unwrap_err();
        assert!(err.message.contains("from_unit"));
        let err = UnitPair::new("meters", "  ").unwrap_err();
        assert!(err.message.contains("to_unit"));
    }

    #[test]
    fn test_unit_pair_swapped() {
        let pair = UnitPair::new("meters", "feet").unwrap();
        let swapped = pair.swapped();
        assert_eq!(swapped.from_unit(), "feet");
        assert_eq!(swapped.to_unit(), "meters");
        assert_eq!(swapped.swapped(), pair);
    }

    #[test]
    fn test_unit_pair_deserialize_normalizes() {
        let pair: UnitPair =
            serde_json::from_str(r#"{"from_unit": "Miles Per Hour", "to_unit": "knots"}"#)
                .unwrap();
        assert_eq!(pair.from_unit(), "miles_per_hour");

        let bad: Result<UnitPair, _> =
            serde_json::from_str(r#"{"from_unit": "", "to_unit": "knots"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_case_set_requires_ten() {
        let nine = vec![TestCase::new(1.0, 1.0); 9];
        let err = TestCaseSet::new(nine).unwrap_err();
        assert!(err.message.contains("got 9"));

        let ten = vec![TestCase::new(1.0, 1.0); 10];
        assert_eq!(TestCaseSet::new(ten).unwrap().len(), 10);
    }

    #[test]
    fn test_case_set_rejects_non_finite() {
        let mut cases = vec![TestCase::new(1.0, 1.0); 10];
        cases[3].expected_output = f64::NAN;
        let err = TestCaseSet::new(cases).unwrap_err();
        assert!(err.message.contains("test case 4"));
    }

    #[test]
    fn test_relation_from_value_validates() {
        let relation = ConversionRelation::from_value(serde_json::json!({
            "from_unit": " Meters",
            "to_unit": "Centimeters",
            "formula": "centimeters = meters * 100",
            "author": "ops"
        }))
        .unwrap();
        assert_eq!(relation.from_unit, "meters");
        assert_eq!(relation.to_unit, "centimeters");
        assert_eq!(relation.provenance["author"], "ops");
    }

    #[test]
    fn test_relation_from_value_rejects_bad_formula() {
        let result = ConversionRelation::from_value(serde_json::json!({
            "from_unit": "a",
            "to_unit": "b",
            "formula": "b = a * c"
        }));
        assert!(matches!(result, Err(KbError::Formula(_))));

        let result = ConversionRelation::from_value(serde_json::json!({
            "from_unit": "a",
            "formula": "b = a * 2"
        }));
        assert!(matches!(result, Err(KbError::Json(_))));

        let result = ConversionRelation::from_value(serde_json::json!({
            "from_unit": "meters",
            "to_unit": "centimeters",
            "formula": "meters = centimeters / 100"
        }));
        assert!(matches!(result, Err(KbError::Validation(ref m)) if m.contains("does not compute")));
    }

    #[test]
    fn test_runner_output_legacy_views() {
        let output = TestRunnerOutput {
            score: 0.8,
            passed: 8,
            total: 10,
            failures: vec![
                FailedCase {
                    case: TestCase::new(0.0, 50.0),
                    observed: Observed::Mismatch { actual: 0.0 },
                },
                FailedCase {
                    case: TestCase::new(-1.0, 2.0),
                    observed: Observed::Error {
                        message: "Division by zero".to_string(),
                    },
                },
            ],
        };

        assert_eq!(output.failed_test_cases().len(), 2);
        assert_eq!(output.actual_outputs_for_failed_test_cases(), vec![0.0]);
        assert!(!output.all_passed());
    }
}
