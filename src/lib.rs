//! # Sansho
//!
//! Identifier model and query-specification builders for services that keep
//! the same entities in a relational database, a document store and a search
//! index.
//!
//! Every entity carries an [`identity::EntityIdentity`]: a numeric `pk` and a
//! short human-facing [`identity::SurrogateKey`]. Callers hand a
//! [`query::SearchSpecification`] (id / ids / flags / free text / sort /
//! page) to one of the query tools, which translate it into the backend's
//! own query language:
//!
//! - [`query::relational`] - predicate trees rendered to parameterized SQL,
//!   plus a two-phase paged reader
//! - [`query::mongo`] - filter, projection and sort documents
//! - [`query::elastic`] - criteria trees and native bool queries
//!
//! All three share the identifier rule of [`identity::resolver`] and the
//! field indexes of [`metadata::cache`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sansho::query::SearchSpecification;
//! use sansho::query::mongo::MongoQueryTool;
//!
//! let spec = SearchSpecification::new()
//!     .with_search("jane doe")
//!     .with_sort("name", "desc");
//!
//! let query = MongoQueryTool::default().of_search::<Customer>(&spec);
//! let filter = query.filter_document();
//! ```
//!
//! ## Feature Flags
//!
//! - `pretty_logs` - Colorful console output for development
//! - `open_search` - Executes native queries through the OpenSearch client
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `QUERY_DEFAULT_PAGE_SIZE` | Page size if the request names none | `20` |
//! | `QUERY_MAX_PAGE_SIZE` | Upper bound for requested page sizes | `1000` |
//! | `RUST_LOG` | Console log filter | `info` |
//! | `OPENSEARCH_URL` | OpenSearch cluster URL (`open_search`) | (required) |
//! | `OPENSEARCH_USER` | OpenSearch username (`open_search`) | (empty) |
//! | `OPENSEARCH_PASS` | OpenSearch password (`open_search`) | (empty) |

use std::env;
use std::sync::LazyLock;

/// Error taxonomy for parameter parsing and query execution.
pub mod error;

/// Entity identity: `pk`, `sk` and the rule that tells them apart.
pub mod identity;

/// Logging and tracing infrastructure.
pub mod logging;

/// Static entity descriptors and the field index cache.
pub mod metadata;

/// Search specifications and the per-backend query tools.
pub mod query;

/// Small shared helpers.
pub mod tools;

/// OpenSearch client and index mappings.
#[cfg(feature = "open_search")]
pub mod opensearch;

/// Page size used when a request does not name one, from `QUERY_DEFAULT_PAGE_SIZE`.
pub static DEFAULT_PAGE_SIZE: LazyLock<u32> =
    LazyLock::new(|| read_env_number("QUERY_DEFAULT_PAGE_SIZE", 20));

/// Largest page size honored, from `QUERY_MAX_PAGE_SIZE`.
pub static MAX_PAGE_SIZE: LazyLock<u32> =
    LazyLock::new(|| read_env_number("QUERY_MAX_PAGE_SIZE", 1000));

fn read_env_number(name: &str, default: u32) -> u32 {
    match env::var(name) {
        Ok(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}='{}', using {}", name, value, default);
            default
        }),
        Err(_) => default,
    }
}
