//! Oracle boundary validation
//!
//! Every value an oracle returns is checked against the data-model
//! invariants here, so malformed output fails fast as a
//! [`ContractViolation`] instead of reaching the scorer or the store.

use super::{LanguageOracle, OracleError};
use crate::core::formula::Formula;
use crate::types::{ContractViolation, TestCaseSet, UnitPair};
use std::sync::Arc;

/// A language oracle whose outputs are validated before use
#[derive(Clone)]
pub struct CheckedOracle {
    inner: Arc<dyn LanguageOracle>,
}

impl CheckedOracle {
    pub fn new(inner: Arc<dyn LanguageOracle>) -> Self {
        Self { inner }
    }

    /// Extracted units must both be non-empty after normalization
    pub async fn extract_units(&self, question: &str) -> Result<UnitPair, OracleError> {
        let units = self.inner.extract_units(question).await?;
        UnitPair::new(&units.from_unit, &units.to_unit)
            .map_err(|e| ContractViolation::new("extract_units", e.message).into())
    }

    pub async fn is_convertible(&self, pair: &UnitPair) -> Result<bool, OracleError> {
        self.inner.is_convertible(pair).await
    }

    /// Generated formulas must parse, reference exactly one input symbol and
    /// read `to_unit = f(from_unit)`
    pub async fn generate_formula(
        &self,
        pair: &UnitPair,
        feedback: &str,
    ) -> Result<String, OracleError> {
        let text = self.inner.generate_formula(pair, feedback).await?;
        let formula = Formula::parse(&text)
            .map_err(|e| ContractViolation::new("generate_formula", format!("'{}': {}", text.trim(), e)))?;
        if !formula.converts(pair) {
            return Err(ContractViolation::new(
                "generate_formula",
                format!(
                    "'{}' computes {} from {}, expected {} from {}",
                    text.trim(),
                    formula.output(),
                    formula.input(),
                    pair.to_unit(),
                    pair.from_unit()
                ),
            )
            .into());
        }
        Ok(text.trim().to_string())
    }

    /// Test cases must number exactly ten and be finite
    pub async fn generate_test_cases(&self, formula: &str) -> Result<TestCaseSet, OracleError> {
        let cases = self.inner.generate_test_cases(formula).await?;
        Ok(TestCaseSet::new(cases)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::ExtractedUnits;
    use crate::types::TestCase;
    use async_trait::async_trait;

    /// Returns fixed, possibly malformed, values
    struct Fixed {
        units: ExtractedUnits,
        formula: String,
        cases: usize,
    }

    #[async_trait]
    impl LanguageOracle for Fixed {
        async fn extract_units(&self, _question: &str) -> Result<ExtractedUnits, OracleError> {
            Ok(self.units.clone())
        }

        async fn is_convertible(&self, _pair: &UnitPair) -> Result<bool, OracleError> {
            Ok(true)
        }

        async fn generate_formula(
            &self,
            _pair: &UnitPair,
            _feedback: &str,
        ) -> Result<String, OracleError> {
            Ok(self.formula.clone())
        }

        async fn generate_test_cases(&self, _formula: &str) -> Result<Vec<TestCase>, OracleError> {
            Ok(vec![TestCase::new(1.0, 100.0); self.cases])
        }
    }

    fn checked(from: &str, formula: &str, cases: usize) -> CheckedOracle {
        CheckedOracle::new(Arc::new(Fixed {
            units: ExtractedUnits::new(from, "centimeters"),
            formula: formula.to_string(),
            cases,
        }))
    }

    fn pair() -> UnitPair {
        UnitPair::new("meters", "centimeters").unwrap()
    }

    #[tokio::test]
    async fn test_valid_outputs_pass() {
        let oracle = checked(" Meters", " centimeters = meters * 100 ", 10);
        assert_eq!(oracle.extract_units("q").await.unwrap(), pair());
        assert_eq!(
            oracle.generate_formula(&pair(), "").await.unwrap(),
            "centimeters = meters * 100"
        );
        assert_eq!(oracle.generate_test_cases("f").await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_empty_unit_is_contract_violation() {
        let oracle = checked("", "centimeters = meters * 100", 10);
        let err = oracle.extract_units("q").await.unwrap_err();
        assert!(matches!(err, OracleError::Contract(ref v) if v.operation == "extract_units"));
    }

    #[tokio::test]
    async fn test_two_variable_formula_is_contract_violation() {
        let oracle = checked("meters", "centimeters = meters * factor", 10);
        let err = oracle.generate_formula(&pair(), "").await.unwrap_err();
        assert!(matches!(err, OracleError::Contract(ref v) if v.operation == "generate_formula"));
    }

    #[tokio::test]
    async fn test_reversed_formula_is_contract_violation() {
        let oracle = checked("meters", "meters = centimeters / 100", 10);
        let err = oracle.generate_formula(&pair(), "").await.unwrap_err();
        assert!(matches!(
            err,
            OracleError::Contract(ref v)
                if v.operation == "generate_formula" && v.message.contains("expected centimeters from meters")
        ));

        let oracle = checked("meters", "cm = m * 100", 10);
        assert!(oracle.generate_formula(&pair(), "").await.is_err());
    }

    #[tokio::test]
    async fn test_wrong_case_count_is_contract_violation() {
        let oracle = checked("meters", "centimeters = meters * 100", 9);
        let err = oracle.generate_test_cases("f").await.unwrap_err();
        assert!(matches!(err, OracleError::Contract(ref v) if v.message.contains("got 9")));
    }
}
