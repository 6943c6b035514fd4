//! Search specifications and their translation into backend queries.
//!
//! Every tool follows the same protocol:
//!
//! 1. start from a filter matching everything
//! 2. `id` → equality on `pk` or `sk` (see [`crate::identity::resolve`])
//! 3. `ids` → `pk IN (..) OR sk IN (..)`, omitting an empty side
//! 4. `deleted` / `archived` → equality on the flag, if set
//! 5. free text → every term must match in at least one candidate field
//! 6. sort fields validated against the entity's field index, unknown ones
//!    dropped, `pk DESC` if none remain
//! 7. 1-based page/size converted into offset/limit
//!
//! The backend modules differ only in the query language they emit.

pub mod elastic;
pub mod mongo;
pub mod page;
pub mod relational;
pub mod sort;
pub mod spec;

pub use page::{Page, Pagination, stream_pages};
pub use sort::{DEFAULT_SORT_FIELD, DEFAULT_SORT_ORDER, SortField, plan_sort};
pub use spec::{MatchMode, SearchSpecification, SortOrder};

/// Name of the soft-delete flag field.
pub const DELETED_FIELD: &str = "deleted";

/// Name of the archive flag field.
pub const ARCHIVED_FIELD: &str = "archived";

/// Fields every projection returns, whatever the caller asked for.
pub const FORCED_FIELDS: [&str; 7] = [
    "id",
    "pk",
    "sk",
    "deleted",
    "archived",
    "createdAt",
    "updatedAt",
];
