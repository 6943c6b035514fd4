//! Predicate trees and their rendering into parameterized SQL.
//!
//! Values are never inlined: each one is pushed onto a bind list and
//! referenced as `$n`.

use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Alias of the root table in every generated statement.
pub const ROOT_ALIAS: &str = "e";

/// A value bound to a `$n` placeholder.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Long(i64),
    Bool(bool),
    Text(String),
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Long(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

/// A column qualified by the alias of the table (or join) it lives on.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub alias: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(alias: impl Into<String>, column: impl Into<String>) -> Self {
        ColumnRef {
            alias: alias.into(),
            column: column.into(),
        }
    }

    /// A column of the root table.
    pub fn root(column: impl Into<String>) -> Self {
        Self::new(ROOT_ALIAS, column)
    }
}

impl Display for ColumnRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.alias, self.column)
    }
}

/// A `LEFT JOIN` needed to reach a column of a related entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Join {
    pub table: String,
    pub alias: String,
    /// Column on the joined table.
    pub left: ColumnRef,
    /// Column on the table joined from.
    pub right: ColumnRef,
    /// Whether the join can multiply root rows.
    pub to_many: bool,
}

impl Display for Join {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LEFT JOIN {} {} ON {} = {}",
            self.table, self.alias, self.left, self.right
        )
    }
}

/// A boolean condition over columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Predicate {
    /// All must hold. Empty matches everything.
    And(Vec<Predicate>),
    /// One must hold. Empty matches nothing.
    Or(Vec<Predicate>),
    Equal(ColumnRef, SqlValue),
    In(ColumnRef, Vec<SqlValue>),
    /// Case-insensitive `LIKE`; the pattern is already lowercased and escaped.
    Like(ColumnRef, String),
}

impl Predicate {
    /// The identity conjunction, matching every row.
    pub fn conjunction() -> Self {
        Predicate::And(Vec::new())
    }

    /// Adds a condition to a conjunction, or wraps both into a new one.
    /// Nested conjunctions are flattened.
    pub fn and(self, other: Predicate) -> Self {
        let mut parts = match self {
            Predicate::And(parts) => parts,
            predicate => vec![predicate],
        };
        match other {
            Predicate::And(others) => parts.extend(others),
            other => parts.push(other),
        }
        Predicate::And(parts)
    }

    pub fn equal(column: ColumnRef, value: impl Into<SqlValue>) -> Self {
        Predicate::Equal(column, value.into())
    }

    /// Determines if the predicate applies no restriction.
    pub fn is_match_all(&self) -> bool {
        matches!(self, Predicate::And(parts) if parts.iter().all(Predicate::is_match_all))
    }

    fn is_compound(&self) -> bool {
        matches!(self, Predicate::And(parts) | Predicate::Or(parts) if parts.len() > 1)
    }

    /// Renders the predicate, pushing its values onto `binds`.
    pub fn render(&self, binds: &mut Vec<SqlValue>) -> String {
        match self {
            Predicate::And(parts) => Self::render_all(parts, " AND ", "1 = 1", binds),
            Predicate::Or(parts) if parts.iter().any(Predicate::is_match_all) => "1 = 1".to_owned(),
            Predicate::Or(parts) => Self::render_all(parts, " OR ", "1 = 0", binds),
            Predicate::Equal(column, value) => {
                format!("{} = {}", column, push_bind(binds, value.clone()))
            }
            Predicate::In(_, values) if values.is_empty() => "1 = 0".to_owned(),
            Predicate::In(column, values) => {
                let placeholders = values
                    .iter()
                    .map(|value| push_bind(binds, value.clone()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} IN ({})", column, placeholders)
            }
            Predicate::Like(column, pattern) => format!(
                "LOWER({}) LIKE {} ESCAPE '\\'",
                column,
                push_bind(binds, SqlValue::Text(pattern.clone()))
            ),
        }
    }

    fn render_all(
        parts: &[Predicate],
        separator: &str,
        empty: &str,
        binds: &mut Vec<SqlValue>,
    ) -> String {
        let rendered: Vec<String> = parts
            .iter()
            .filter(|part| !part.is_match_all())
            .map(|part| {
                let sql = part.render(binds);
                if part.is_compound() {
                    format!("({})", sql)
                } else {
                    sql
                }
            })
            .collect();

        if rendered.is_empty() {
            empty.to_owned()
        } else {
            rendered.join(separator)
        }
    }
}

fn push_bind(binds: &mut Vec<SqlValue>, value: SqlValue) -> String {
    binds.push(value);
    format!("${}", binds.len())
}

/// Escapes `LIKE` wildcards so the term matches literally.
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> ColumnRef {
        ColumnRef::root(name)
    }

    #[test]
    fn conjunctions_render_with_numbered_binds() {
        let predicate = Predicate::conjunction()
            .and(Predicate::equal(col("pk"), 42_i64))
            .and(Predicate::equal(col("deleted"), false));

        let mut binds = Vec::new();
        assert_eq!(predicate.render(&mut binds), "e.pk = $1 AND e.deleted = $2");
        assert_eq!(binds, vec![SqlValue::Long(42), SqlValue::Bool(false)]);
    }

    #[test]
    fn nested_groups_are_parenthesized() {
        let predicate = Predicate::And(vec![
            Predicate::Or(vec![
                Predicate::In(col("pk"), vec![7_i64.into()]),
                Predicate::In(col("sk"), vec!["a1b2c-d3e4f".into()]),
            ]),
            Predicate::Like(col("name"), "%jane%".into()),
        ]);

        let mut binds = Vec::new();
        assert_eq!(
            predicate.render(&mut binds),
            "(e.pk IN ($1) OR e.sk IN ($2)) AND LOWER(e.name) LIKE $3 ESCAPE '\\'"
        );
        assert_eq!(binds.len(), 3);
    }

    #[test]
    fn empty_groups_render_as_constants() {
        let mut binds = Vec::new();
        assert_eq!(Predicate::conjunction().render(&mut binds), "1 = 1");
        assert_eq!(Predicate::Or(Vec::new()).render(&mut binds), "1 = 0");
        assert_eq!(Predicate::In(col("pk"), Vec::new()).render(&mut binds), "1 = 0");
        assert!(binds.is_empty());
    }

    #[test]
    fn nested_empty_conjunctions_match_all() {
        let predicate = Predicate::conjunction().and(Predicate::conjunction());
        assert!(predicate.is_match_all());
        assert!(!Predicate::equal(col("pk"), 1_i64).is_match_all());
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn joins_render_as_left_joins() {
        let join = Join {
            table: "customers".into(),
            alias: "customer".into(),
            left: ColumnRef::new("customer", "pk"),
            right: col("customer_pk"),
            to_many: false,
        };
        assert_eq!(
            join.to_string(),
            "LEFT JOIN customers customer ON customer.pk = e.customer_pk"
        );
    }
}
