//! Error types shared by every cache primitive.

use color_eyre::eyre::Report;
use std::sync::Arc;
use thiserror::Error;

/// Why a load (or a chained update) did not produce a value.
///
/// Loads are shared between every caller waiting on the same key, so the error
/// has to be `Clone`. Upstream reports are kept behind an `Arc` for that reason.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
  /// The loader reported that the requested entity does not exist.
  #[error("{0} not found")]
  NotFound(String),

  /// The network or the server failed.
  #[error("upstream request failed: {0}")]
  Upstream(Arc<Report>),

  /// A batch loader returned a result of the wrong length.
  #[error("batch loader returned {actual} values for {expected} keys")]
  ContractViolation { expected: usize, actual: usize },

  /// The task computing the value went away without sending a result.
  #[error("load was abandoned before it produced a result")]
  Abandoned,
}

impl LoadError {
  /// Wrap any error report as an upstream failure.
  pub fn upstream(report: impl Into<Report>) -> Self {
    LoadError::Upstream(Arc::new(report.into()))
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, LoadError::NotFound(_))
  }
}

/// Errors raised by the repair registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepairError {
  #[error("cache `{0}` is already registered for repair")]
  AlreadyRegistered(String),
}
