//! Engine error taxonomy.
//!
//! Every operation error is terminal for the current call; the engine never
//! retries. Connector failures are opaque passthroughs so the transport layer
//! can map them to a wire-level response.

use thiserror::Error;

use crate::schema::OperationKind;

/// Errors surfaced by engine operations and engine construction.
#[derive(Debug, Error)]
pub enum Error {
    /// The filter tree is malformed: unknown column, multiple operators on a
    /// predicate, wrong value arity, or an operator the column does not allow.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// The caller's role set does not satisfy the entity's policy for the
    /// operation.
    #[error("{operation} on `{entity}` denied")]
    Authorization {
        entity: String,
        operation: OperationKind,
    },

    /// A storage backend failure, passed through unchanged.
    #[error("connector error: {0}")]
    Connector(#[source] anyhow::Error),

    /// A lifecycle hook rejected the operation or returned a bad payload.
    #[error("hook failed: {0}")]
    Hook(String),

    /// Configuration problem: unknown entity or connector, or an invalid
    /// entity/relation declaration caught at build time.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap an arbitrary backend failure as a connector error.
    pub fn connector<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connector(anyhow::Error::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
