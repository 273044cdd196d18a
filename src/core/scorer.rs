//! Test oracle scorer
//!
//! Runs a candidate formula against synthesized test cases and reports the
//! fraction that pass, keeping every failure as structured data. Markdown
//! rendering of those failures happens only at the feedback boundary.

use crate::core::formula::{Formula, FormulaError};
use crate::types::{FailedCase, Observed, TestCase, TestRunnerOutput};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric comparison policy, `|a - b| <= max(rel_tol * max(|a|, |b|), abs_tol)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerance {
    pub rel_tol: f64,
    pub abs_tol: f64,
}

impl Default for Tolerance {
    /// Three decimal places, no relative slack
    fn default() -> Self {
        Self {
            rel_tol: 0.0,
            abs_tol: 1e-3,
        }
    }
}

impl Tolerance {
    pub fn is_close(&self, actual: f64, expected: f64) -> bool {
        if actual == expected {
            return true;
        }
        if !actual.is_finite() || !expected.is_finite() {
            return false;
        }
        let diff = (actual - expected).abs();
        let scale = actual.abs().max(expected.abs());
        diff <= (self.rel_tol * scale).max(self.abs_tol)
    }
}

/// Scores formulas under a fixed tolerance
#[derive(Debug, Clone, Copy, Default)]
pub struct Scorer {
    tolerance: Tolerance,
}

impl Scorer {
    pub fn new(tolerance: Tolerance) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    /// Evaluate `formula` at every case input.
    ///
    /// The formula is parsed once; a malformed formula is an error. A case
    /// whose evaluation fails counts as a failure, not an error.
    pub fn score(
        &self,
        formula: &str,
        test_cases: &[TestCase],
    ) -> Result<TestRunnerOutput, FormulaError> {
        let formula = Formula::parse(formula)?;
        let mut failures = Vec::new();

        for case in test_cases {
            let observed = match formula.evaluate(case.input_value) {
                Ok(actual) if self.tolerance.is_close(actual, case.expected_output) => continue,
                Ok(actual) => Observed::Mismatch { actual },
                Err(e) => Observed::Error {
                    message: e.to_string(),
                },
            };
            failures.push(FailedCase {
                case: *case,
                observed,
            });
        }

        let total = test_cases.len();
        let passed = total - failures.len();
        let score = if total == 0 {
            0.0
        } else {
            passed as f64 / total as f64
        };

        Ok(TestRunnerOutput {
            score,
            passed,
            total,
            failures,
        })
    }
}

fn format_value(value: f64) -> String {
    format!("{}", value)
}

/// Render failing cases as a markdown table, empty when nothing failed
pub fn render_failure_report(failures: &[FailedCase], formula: Option<&str>) -> String {
    if failures.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    if let Some(formula) = formula {
        out.push_str(&format!("Failed test cases for `{}`:\n\n", formula));
    }
    out.push_str("| input_value | expected_output | actual_output |\n");
    out.push_str("|---|---|---|\n");

    for failure in failures {
        let actual = match &failure.observed {
            Observed::Mismatch { actual } => format_value(*actual),
            Observed::Error { message } => format!("error: {}", message.replace('|', "\\|")),
        };
        out.push_str(&format!(
            "| {} | {} | {} |\n",
            format_value(failure.case.input_value),
            format_value(failure.case.expected_output),
            actual
        ));
    }

    out
}

/// Correction feedback handed to the next formula-generation attempt
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackReport {
    pub formula: String,
    pub output: TestRunnerOutput,
}

impl FeedbackReport {
    pub fn new(formula: impl Into<String>, output: TestRunnerOutput) -> Self {
        Self {
            formula: formula.into(),
            output,
        }
    }
}

impl fmt::Display for FeedbackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## Formula Evaluation Feedback")?;
        writeln!(f)?;
        writeln!(f, "**Formula:** `{}`", self.formula)?;
        writeln!(f)?;
        writeln!(
            f,
            "**Test Results:** passed **{} / {}** test cases.",
            self.output.passed, self.output.total
        )?;
        writeln!(f)?;
        write!(f, "{}", render_failure_report(&self.output.failures, None))?;
        writeln!(f)?;
        writeln!(f, "### Required Action")?;
        write!(
            f,
            "Correct the formula so that it passes **all** test cases."
        )
    }
}
