//! Rule-based oracle
//!
//! An offline, deterministic oracle backed by the unit catalog. Questions are
//! matched against a handful of phrasings, formulas are derived from catalog
//! scale factors, and expected test outputs come from the catalog rather
//! than from the formula under test.

use super::catalog::{self, Conversion, UnitDef};
use super::{ExtractedUnits, LanguageOracle, OracleError, QuestionSource};
use crate::core::formula::solver::simplify;
use crate::core::formula::{BinOp, Expr, Formula};
use crate::types::{TestCase, UnitPair};
use async_trait::async_trait;
use regex::Regex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Stand-in for negative inputs when the source unit cannot be negative
const NON_NEGATIVE_SUBSTITUTE: f64 = 250.0;

/// Step through catalog pairs so consecutive questions cross dimensions
const QUESTION_STRIDE: usize = 37;

const FILLER_WORDS: &[&str] = &[
    "a", "an", "one", "the", "from", "what", "what's", "whats", "is", "are", "how", "much",
    "many", "do", "i", "convert",
];

/// Deterministic [`LanguageOracle`] and [`QuestionSource`] over the unit catalog
pub struct RuleOracle {
    how_many: Regex,
    convert: Regex,
    pair: Regex,
    question_cursor: AtomicUsize,
}

fn compile(pattern: &str) -> Result<Regex, OracleError> {
    Regex::new(pattern).map_err(|e| OracleError::Unavailable(format!("Regex error: {}", e)))
}

impl RuleOracle {
    pub fn new() -> Result<Self, OracleError> {
        Ok(Self {
            how_many: compile(
                r"(?i)how\s+many\s+(.+?)\s+(?:are\s+)?(?:there\s+)?in\s+(.+?)[\s?.!]*$",
            )?,
            convert: compile(r"(?i)convert\s+(.+?)\s+(?:to|into)\s+(.+?)[\s?.!]*$")?,
            pair: compile(r"(?i)^(.+?)\s+(?:to|into|in)\s+(.+?)[\s?.!]*$")?,
            question_cursor: AtomicUsize::new(0),
        })
    }

    /// Pull `(from, to)` phrases out of a question
    fn match_question(&self, question: &str) -> Option<(String, String)> {
        let question = question.trim();
        if let Some(caps) = self.how_many.captures(question) {
            return Some((caps[2].to_string(), caps[1].to_string()));
        }
        let caps = self
            .convert
            .captures(question)
            .or_else(|| self.pair.captures(question))?;
        Some((caps[1].to_string(), caps[2].to_string()))
    }

    fn conversion(pair: &UnitPair) -> Result<Conversion, OracleError> {
        let from = known_unit(pair.from_unit())?;
        let to = known_unit(pair.to_unit())?;
        Conversion::between(from, to).ok_or_else(|| {
            OracleError::Unsupported(format!(
                "{} and {} measure different quantities",
                from.name, to.name
            ))
        })
    }

    /// All ordered pairs of distinct units sharing a dimension
    fn question_pairs() -> Vec<(&'static UnitDef, &'static UnitDef)> {
        let units = catalog::units();
        units
            .iter()
            .flat_map(|from| {
                units
                    .iter()
                    .filter(move |to| to.dimension == from.dimension && to.name != from.name)
                    .map(move |to| (from, to))
            })
            .collect()
    }
}

fn known_unit(name: &str) -> Result<&'static UnitDef, OracleError> {
    catalog::resolve(name)
        .ok_or_else(|| OracleError::Unsupported(format!("unknown unit '{}'", name)))
}

/// Drop leading quantities and filler words: "what is 5 meters" becomes "meters"
fn clean_unit_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .skip_while(|word| {
            let lower = word.to_lowercase();
            lower.parse::<f64>().is_ok() || FILLER_WORDS.contains(&lower.as_str())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical catalog name when known, otherwise the cleaned phrase
fn canonical_unit(phrase: &str) -> String {
    let cleaned = clean_unit_phrase(phrase);
    catalog::resolve(&cleaned)
        .map(|unit| unit.name.to_string())
        .unwrap_or(cleaned)
}

/// `to = from * factor + offset`, printed with a whole divisor when there is one
fn formula_text(conversion: &Conversion) -> String {
    let input = Expr::variable(conversion.from.name);
    let scaled = match conversion.divisor() {
        Some(divisor) => Expr::binary(BinOp::Div, input, Expr::number(divisor)),
        None => Expr::binary(BinOp::Mul, input, Expr::number(conversion.factor)),
    };
    let rhs = simplify(Expr::binary(
        BinOp::Add,
        scaled,
        Expr::number(conversion.offset),
    ));
    format!("{} = {}", conversion.to.name, rhs)
}

/// Inputs for the ten-case plan, in order
fn test_inputs(conversion: &Conversion) -> [f64; 10] {
    let negative = if conversion.from.non_negative {
        NON_NEGATIVE_SUBSTITUTE
    } else {
        -25.0
    };

    let unit_point = conversion.divisor().unwrap_or(1.0 / conversion.factor);
    let edge = if conversion.is_offset() {
        conversion.zero_point()
    } else {
        unit_point
    };
    let edge = if conversion.from.non_negative && edge < 0.0 {
        unit_point
    } else {
        edge
    };

    [
        1.0, // baseline
        100.0,
        0.5,
        0.0,
        12.75,
        0.001,
        3.14159265,
        negative,
        1_000_000.0,
        edge,
    ]
}

#[async_trait]
impl LanguageOracle for RuleOracle {
    async fn extract_units(&self, question: &str) -> Result<ExtractedUnits, OracleError> {
        let (from, to) = self.match_question(question).ok_or_else(|| {
            OracleError::Unsupported(format!("no unit pair found in '{}'", question.trim()))
        })?;
        Ok(ExtractedUnits::new(canonical_unit(&from), canonical_unit(&to)))
    }

    async fn is_convertible(&self, pair: &UnitPair) -> Result<bool, OracleError> {
        Ok(Self::conversion(pair).is_ok())
    }

    async fn generate_formula(
        &self,
        pair: &UnitPair,
        feedback: &str,
    ) -> Result<String, OracleError> {
        if !feedback.is_empty() {
            debug!(pair = %pair, "Rule oracle ignores feedback; formulas come from the catalog");
        }
        Ok(formula_text(&Self::conversion(pair)?))
    }

    async fn generate_test_cases(&self, formula: &str) -> Result<Vec<TestCase>, OracleError> {
        let formula =
            Formula::parse(formula).map_err(|e| OracleError::Unsupported(e.to_string()))?;
        let pair = UnitPair::new(formula.input(), formula.output())?;
        let conversion = Self::conversion(&pair)?;

        Ok(test_inputs(&conversion)
            .iter()
            .map(|&input| TestCase::new(input, conversion.apply(input)))
            .collect())
    }
}

#[async_trait]
impl QuestionSource for RuleOracle {
    async fn generate_questions(
        &self,
        count: usize,
        _prompt: &str,
    ) -> Result<Vec<String>, OracleError> {
        let pairs = Self::question_pairs();
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let start = self.question_cursor.fetch_add(count, Ordering::Relaxed);
        Ok((start..start + count)
            .map(|i| {
                let (from, to) = pairs[(i * QUESTION_STRIDE) % pairs.len()];
                format!(
                    "How do I convert {} to {}?",
                    from.display_name(),
                    to.display_name()
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scorer::Scorer;
    use crate::types::TEST_CASE_COUNT;
    use pretty_assertions::assert_eq;

    fn pair(from: &str, to: &str) -> UnitPair {
        UnitPair::new(from, to).unwrap()
    }

    async fn extract(question: &str) -> (String, String) {
        let units = RuleOracle::new().unwrap().extract_units(question).await.unwrap();
        (units.from_unit, units.to_unit)
    }

    #[tokio::test]
    async fn test_extract_phrasings() {
        let expected = ("meters".to_string(), "centimeters".to_string());
        assert_eq!(extract("Convert 5 meters to centimeters").await, expected);
        assert_eq!(extract("How do I convert meters to centimeters?").await, expected);
        assert_eq!(extract("meters to centimeters").await, expected);
        assert_eq!(extract("from meter into cm").await, expected);
        assert_eq!(extract("What is 3 meters in centimeters?").await, expected);
        assert_eq!(
            extract("How many centimeters are in a meter?").await,
            expected
        );
    }

    #[tokio::test]
    async fn test_extract_multi_word_units() {
        assert_eq!(
            extract("convert 60 kilometers per hour to miles per hour").await,
            (
                "kilometers_per_hour".to_string(),
                "miles_per_hour".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_extract_unknown_units_kept() {
        assert_eq!(
            extract("convert apples to oranges").await,
            ("apples".to_string(), "oranges".to_string())
        );
    }

    #[tokio::test]
    async fn test_extract_unsupported_phrasing() {
        let err = RuleOracle::new().unwrap().extract_units("hello there").await.unwrap_err();
        assert!(matches!(err, OracleError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_is_convertible() {
        let oracle = RuleOracle::new().unwrap();
        assert!(oracle.is_convertible(&pair("meters", "feet")).await.unwrap());
        assert!(!oracle.is_convertible(&pair("meters", "grams")).await.unwrap());
        assert!(!oracle.is_convertible(&pair("apples", "oranges")).await.unwrap());
    }

    #[tokio::test]
    async fn test_generate_formula_forms() {
        let oracle = RuleOracle::new().unwrap();
        assert_eq!(
            oracle.generate_formula(&pair("meters", "centimeters"), "").await.unwrap(),
            "centimeters = meters * 100"
        );
        assert_eq!(
            oracle.generate_formula(&pair("centimeters", "meters"), "").await.unwrap(),
            "meters = centimeters / 100"
        );
        assert_eq!(
            oracle.generate_formula(&pair("celsius", "fahrenheit"), "").await.unwrap(),
            "fahrenheit = celsius * 1.8 + 32"
        );
        assert_eq!(
            oracle.generate_formula(&pair("kelvin", "celsius"), "").await.unwrap(),
            "celsius = kelvin - 273.15"
        );
    }

    #[tokio::test]
    async fn test_generate_formula_rejects_cross_dimension() {
        let err = RuleOracle::new()
            .unwrap()
            .generate_formula(&pair("meters", "grams"), "")
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_cases_plan() {
        let cases = RuleOracle::new()
            .unwrap()
            .generate_test_cases("centimeters = meters * 100")
            .await
            .unwrap();
        assert_eq!(cases.len(), TEST_CASE_COUNT);
        assert_eq!(cases[0], TestCase::new(1.0, 100.0));
        assert_eq!(cases[3], TestCase::new(0.0, 0.0));
        // Length is never negative
        assert!(cases.iter().all(|c| c.input_value >= 0.0));
        assert_eq!(cases[7].input_value, NON_NEGATIVE_SUBSTITUTE);
        // Edge case: the input that yields one
        assert_eq!(cases[9], TestCase::new(0.01, 1.0));
    }

    #[tokio::test]
    async fn test_cases_temperature_edge_is_zero_point() {
        let cases = RuleOracle::new()
            .unwrap()
            .generate_test_cases("fahrenheit = celsius * 1.8 + 32")
            .await
            .unwrap();
        assert_eq!(cases[7].input_value, -25.0);
        assert!(cases[9].expected_output.abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_own_formulas_score_perfectly() {
        let oracle = RuleOracle::new().unwrap();
        let scorer = Scorer::default();
        for (from, to) in [
            ("meters", "feet"),
            ("fahrenheit", "celsius"),
            ("terabytes", "bits"),
            ("knots", "kilometers_per_hour"),
            ("acres", "square_feet"),
        ] {
            let formula = oracle.generate_formula(&pair(from, to), "").await.unwrap();
            let cases = oracle.generate_test_cases(&formula).await.unwrap();
            let output = scorer.score(&formula, &cases).unwrap();
            assert_eq!(output.score, 1.0, "{}", formula);
        }
    }

    #[tokio::test]
    async fn test_wrong_formula_fails_catalog_cases() {
        let cases = RuleOracle::new()
            .unwrap()
            .generate_test_cases("feet = meters * 3")
            .await
            .unwrap();
        let output = Scorer::default().score("feet = meters * 3", &cases).unwrap();
        assert!(output.score < 0.8);
    }

    #[tokio::test]
    async fn test_generate_questions_advances() {
        let oracle = RuleOracle::new().unwrap();
        let first = oracle.generate_questions(3, "").await.unwrap();
        let second = oracle.generate_questions(3, "").await.unwrap();
        assert_eq!(first.len(), 3);
        assert_ne!(first, second);
        assert!(first.iter().all(|q| q.starts_with("How do I convert")));
    }
}
