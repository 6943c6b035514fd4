//! Relational backend: predicate trees rendered to parameterized SQL.
//!
//! [`RelationalQueryTool`] turns a search specification into a
//! [`RelationalSpecification`], which renders the statements of the
//! two-phase paged read performed by [`RelationalReader`].

mod graph;
mod predicate;
mod reader;
mod tool;

pub use graph::FetchGraph;
pub use predicate::{ColumnRef, Join, Predicate, ROOT_ALIAS, SqlValue, escape_like};
pub use reader::{RelationalOperations, RelationalReader};
pub use tool::{RelationalQueryTool, RelationalSpecification, SqlStatement};
