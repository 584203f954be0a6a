//! Typed root causes for simulation failures.
//!
//! Fallible functions in this crate return [`anyhow::Result`]; when the root
//! cause is one of the variants below it can be recovered with
//! `err.downcast_ref::<SimError>()`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// One or more parameter fields are out of range. Every offending field
    /// is a key of [`validator::ValidationErrors::errors`].
    #[error("invalid parameters: {0}")]
    InvalidParams(#[from] validator::ValidationErrors),
    #[error("invalid drive cycle: {0}")]
    InvalidCycle(String),
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("non-finite {quantity} at step {step}")]
    Numerical { quantity: &'static str, step: usize },
}

impl SimError {
    /// Names of the offending parameter fields, empty for non-parameter errors
    pub fn invalid_fields(&self) -> Vec<&'static str> {
        match self {
            Self::InvalidParams(errs) => {
                let mut fields: Vec<&'static str> = errs.errors().keys().copied().collect();
                fields.sort_unstable();
                fields
            }
            _ => vec![],
        }
    }
}
