//! Typed failures of the crosstalk core.
//!
//! Every failure carries a coarse [`ErrorKind`] so callers can aggregate
//! outcomes ("3 of 10 sequences failed due to missing channel data") without
//! matching on messages.

use std::fmt::Display;

use polars::prelude::PolarsError;
use serde::{
    Deserialize,
    Serialize,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrosstalkError {
    /// Wrong number, names or shape of channels.
    #[error("schema error: {0}")]
    Schema(String),

    /// Missing, non-numeric, non-finite or negative channel values.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// The mixing matrix is singular, non-finite or could not be estimated.
    #[error("model error: {0}")]
    Model(String),

    /// Invalid tuning parameters.
    #[error("parameter error: {0}")]
    Parameter(String),

    #[error("dataframe error: {0}")]
    Polars(#[from] PolarsError),
}

pub type Result<T> = std::result::Result<T, CrosstalkError>;

impl CrosstalkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrosstalkError::Schema(_) => ErrorKind::Schema,
            CrosstalkError::DataIntegrity(_) => ErrorKind::DataIntegrity,
            CrosstalkError::Model(_) => ErrorKind::Model,
            CrosstalkError::Parameter(_) => ErrorKind::Parameter,
            // Tables that polars cannot read as requested are malformed
            // tables as far as the caller is concerned.
            CrosstalkError::Polars(_) => ErrorKind::Schema,
        }
    }

    /// True for failures caused by calibration or configuration rather than
    /// by the instrument data.
    pub fn is_configuration(&self) -> bool {
        matches!(self.kind(), ErrorKind::Model | ErrorKind::Parameter)
    }
}

/// Coarse category of a processing outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    Schema,
    DataIntegrity,
    EmptyInput,
    Model,
    Parameter,
}

impl Display for ErrorKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let str = match self {
            ErrorKind::Schema => "schema",
            ErrorKind::DataIntegrity => "data integrity",
            ErrorKind::EmptyInput => "empty input",
            ErrorKind::Model => "model",
            ErrorKind::Parameter => "parameter",
        };
        write!(f, "{}", str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinguishable() {
        assert_eq!(
            CrosstalkError::Schema("x".into()).kind(),
            ErrorKind::Schema
        );
        assert_eq!(
            CrosstalkError::DataIntegrity("x".into()).kind(),
            ErrorKind::DataIntegrity
        );
        assert!(CrosstalkError::Model("x".into()).is_configuration());
        assert!(!CrosstalkError::DataIntegrity("x".into()).is_configuration());
    }

    #[test]
    fn kind_display() {
        assert_eq!(ErrorKind::DataIntegrity.to_string(), "data integrity");
        assert_eq!(ErrorKind::EmptyInput.to_string(), "empty input");
    }
}
