//! Engine error taxonomy.

use crate::graph::GraphError;
use crate::model::AssetType;
use thiserror::Error;

/// Errors surfaced by engine components and plugin handlers.
///
/// Handlers return these to the dispatcher, which logs and continues with
/// the remaining handlers; only [`EngineError::Registration`] and graph
/// open failures abort a session.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("handler registration failed: {0}")]
    Registration(String),

    #[error("expected a {expected} asset on the event")]
    WrongAssetType {
        /// The asset type the handler was registered for.
        expected: AssetType,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("plugin error: {0}")]
    Plugin(String),
}

impl EngineError {
    /// Returns true if the error is a cancellation, which the dispatcher
    /// treats as non-fatal termination of the handler.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
