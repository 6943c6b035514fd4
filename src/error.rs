//! Error taxonomy shared by the identifier and query modules.
//!
//! The query tools themselves never fail on user input: unknown sort fields
//! are dropped and malformed pagination is coerced. [`QueryError`] is what
//! strict parsing and the service layer above the readers report.

use thiserror::Error;

/// Errors surfaced by strict parameter parsing and by the readers.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A caller-facing enum or value lookup failed.
    #[error("Invalid value '{value}' for parameter '{name}'. Accepted values: {}", .accepted.join(", "))]
    InvalidParameter {
        name: String,
        value: String,
        accepted: Vec<String>,
    },

    /// A lookup by identifier yielded no entity.
    #[error("{entity} '{id}' was not found")]
    NotFound { entity: String, id: String },

    /// A create would collide with an existing identifier.
    #[error("{entity} '{id}' already exists")]
    AlreadyExists { entity: String, id: String },

    /// The underlying database client failed. Passed through unmodified.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl QueryError {
    /// Creates an [`QueryError::InvalidParameter`] from anything string-like.
    pub fn invalid_parameter<I, S>(name: &str, value: &str, accepted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        QueryError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            accepted: accepted.into_iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Creates a [`QueryError::NotFound`] for the given entity and id.
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        QueryError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// Creates a [`QueryError::AlreadyExists`] for the given entity and id.
    pub fn already_exists(entity: &str, id: impl ToString) -> Self {
        QueryError::AlreadyExists {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// The HTTP status a service layer should answer with.
    pub fn status(&self) -> u16 {
        match self {
            QueryError::InvalidParameter { .. } => 400,
            QueryError::NotFound { .. } => 404,
            QueryError::AlreadyExists { .. } => 409,
            QueryError::Backend(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
