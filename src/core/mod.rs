//! Core knowledge-base engine: formula algebra, scoring and the acquisition loop

pub mod acquisition;
pub mod formula;
pub mod scorer;

pub use acquisition::{Agent, Outcome};
pub use formula::{evaluate_formula, invert_formula, parse_formula, Formula, FormulaError};
pub use scorer::{render_failure_report, FeedbackReport, Scorer, Tolerance};
