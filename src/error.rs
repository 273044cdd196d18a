use crate::core::formula::FormulaError;
use crate::oracle::OracleError;
use crate::store::StoreError;
use crate::types::ContractViolation;
use thiserror::Error;

pub type KbResult<T> = Result<T, KbError>;

#[derive(Error, Debug)]
pub enum KbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Formula(#[from] FormulaError),

    #[error("Contract violation: {0}")]
    Contract(#[from] ContractViolation),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// A blocking worker panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl KbError {
    /// Oracle contract failures, whether raised at the boundary or wrapped by an oracle
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            KbError::Contract(_) | KbError::Oracle(OracleError::Contract(_))
        )
    }
}
