//! Translates a [`SearchSpecification`] into a [`RelationalSpecification`].

use crate::identity::{IdKind, Identifier, partition, resolve};
use crate::metadata::{
    Backend, Entity, EntityDescriptor, FieldKind, FieldMetadataCache, RelationKind,
};
use crate::query::relational::predicate::{
    ColumnRef, Join, Predicate, ROOT_ALIAS, SqlValue, escape_like,
};
use crate::query::sort::{DEFAULT_SORT_FIELD, DEFAULT_SORT_ORDER, SortField, plan_sort};
use crate::query::spec::{MatchMode, SearchSpecification};
use crate::query::{ARCHIVED_FIELD, DELETED_FIELD, Pagination};

/// A complete SQL statement with its bind values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SqlStatement {
    pub sql: String,
    pub binds: Vec<SqlValue>,
}

/// The relational form of a search: joins, filter, order and page window.
#[derive(Clone, Debug, PartialEq)]
pub struct RelationalSpecification {
    pub table: String,
    pub joins: Vec<Join>,
    pub predicate: Predicate,
    pub order: Vec<SortField<ColumnRef>>,
    pub pagination: Pagination,
    /// The primary key column of the root table.
    pub id_column: ColumnRef,
}

impl RelationalSpecification {
    /// `FROM` plus joins.
    fn from_clause(&self) -> String {
        let mut sql = format!("FROM {} {}", self.table, ROOT_ALIAS);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.to_string());
        }
        sql
    }

    fn where_clause(&self, binds: &mut Vec<SqlValue>) -> String {
        if self.predicate.is_match_all() {
            String::new()
        } else {
            format!(" WHERE {}", self.predicate.render(binds))
        }
    }

    fn order_clause(&self) -> String {
        let order = self
            .order
            .iter()
            .map(|sort| format!("{} {}", sort.field, sort.order))
            .collect::<Vec<_>>()
            .join(", ");
        format!(" ORDER BY {}", order)
    }

    /// Phase one of a paged read: the ids of the requested page in sort
    /// order, each id once.
    ///
    /// Sort columns are selected too, as `DISTINCT` requires. If a to-many
    /// join can repeat a root row, the rows are grouped by id instead and
    /// sorted by the smallest value of a column (ascending) or its largest
    /// (descending), so the page window counts entities.
    pub fn select_ids(&self) -> SqlStatement {
        if self.has_to_many_joins() {
            return self.select_grouped_ids();
        }

        let mut binds = Vec::new();
        let mut columns = vec![self.id_column.to_string()];
        for sort in &self.order {
            let column = sort.field.to_string();
            if !columns.contains(&column) {
                columns.push(column);
            }
        }

        let sql = format!(
            "SELECT DISTINCT {} {}{}{} LIMIT {} OFFSET {}",
            columns.join(", "),
            self.from_clause(),
            self.where_clause(&mut binds),
            self.order_clause(),
            self.pagination.limit(),
            self.pagination.offset()
        );

        SqlStatement { sql, binds }
    }

    fn select_grouped_ids(&self) -> SqlStatement {
        let mut binds = Vec::new();
        let order = self
            .order
            .iter()
            .map(|sort| {
                if sort.field == self.id_column {
                    format!("{} {}", sort.field, sort.order)
                } else if sort.order.is_ascending() {
                    format!("MIN({}) {}", sort.field, sort.order)
                } else {
                    format!("MAX({}) {}", sort.field, sort.order)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "SELECT {} {}{} GROUP BY {} ORDER BY {} LIMIT {} OFFSET {}",
            self.id_column,
            self.from_clause(),
            self.where_clause(&mut binds),
            self.id_column,
            order,
            self.pagination.limit(),
            self.pagination.offset()
        );

        SqlStatement { sql, binds }
    }

    /// Number of distinct root rows matching the filter.
    pub fn count(&self) -> SqlStatement {
        let mut binds = Vec::new();
        let sql = format!(
            "SELECT COUNT(DISTINCT {}) {}{}",
            self.id_column,
            self.from_clause(),
            self.where_clause(&mut binds)
        );

        SqlStatement { sql, binds }
    }

    /// Phase two of a paged read: the full rows for the ids of phase one.
    pub fn select_by_ids(&self, ids: &[i64]) -> SqlStatement {
        let predicate = Predicate::In(
            self.id_column.clone(),
            ids.iter().copied().map(SqlValue::Long).collect(),
        );
        let mut binds = Vec::new();
        let sql = format!(
            "SELECT {}.* FROM {} {} WHERE {}",
            ROOT_ALIAS,
            self.table,
            ROOT_ALIAS,
            predicate.render(&mut binds)
        );

        SqlStatement { sql, binds }
    }

    /// Determines if a joined relation can repeat root rows.
    pub fn has_to_many_joins(&self) -> bool {
        self.joins.iter().any(|join| join.to_many)
    }
}

/// Builds relational specifications for entity types.
#[derive(Clone, Copy)]
pub struct RelationalQueryTool<'a> {
    cache: &'a FieldMetadataCache,
}

impl Default for RelationalQueryTool<'static> {
    fn default() -> Self {
        RelationalQueryTool {
            cache: FieldMetadataCache::global(),
        }
    }
}

impl<'a> RelationalQueryTool<'a> {
    pub fn with_cache(cache: &'a FieldMetadataCache) -> Self {
        RelationalQueryTool { cache }
    }

    /// Applies id, ids, flags, sort and page, but not free text.
    pub fn default_predicates<E: Entity>(&self, spec: &SearchSpecification) -> RelationalSpecification {
        self.build(E::descriptor(), spec, false)
    }

    /// Applies everything including free text over the candidate fields.
    pub fn of_search<E: Entity>(&self, spec: &SearchSpecification) -> RelationalSpecification {
        self.build(E::descriptor(), spec, true)
    }

    /// Restricts a single-table hierarchy to rows of exactly this type.
    /// `None` if the entity declares no discriminator.
    pub fn type_equals<E: Entity>(&self) -> Option<Predicate> {
        E::descriptor()
            .discriminator
            .map(|(column, value)| Predicate::equal(ColumnRef::root(column), value))
    }

    fn build(
        &self,
        descriptor: &'static EntityDescriptor,
        spec: &SearchSpecification,
        with_search: bool,
    ) -> RelationalSpecification {
        let mut paths = PathResolver {
            cache: self.cache,
            descriptor,
            joins: Vec::new(),
        };

        let mut predicate = Predicate::conjunction();

        if let Some(id) = spec.id.as_deref() {
            predicate = predicate.and(id_predicate(&mut paths, resolve(id)));
        }

        if let Some(ids) = spec.ids.as_deref()
            && let Some(ids_predicate) = ids_predicate(&mut paths, ids)
        {
            predicate = predicate.and(ids_predicate);
        }

        for (field, flag) in [(DELETED_FIELD, spec.deleted), (ARCHIVED_FIELD, spec.archived)] {
            if let Some(flag) = flag
                && let Some(column) = paths.column(field)
            {
                predicate = predicate.and(Predicate::equal(column, flag));
            }
        }

        if with_search
            && let Some(search) = search_predicate(&mut paths, spec)
        {
            predicate = predicate.and(search);
        }

        let mut order = plan_sort(spec, |name| paths.column(name));
        if order.is_empty() {
            order.push(SortField {
                field: paths.root_column(DEFAULT_SORT_FIELD),
                order: DEFAULT_SORT_ORDER,
            });
        }

        RelationalSpecification {
            table: descriptor.table_name(),
            id_column: paths.root_column(IdKind::Pk.field_name()),
            joins: paths.joins,
            predicate,
            order,
            pagination: Pagination::of(spec),
        }
    }
}

fn id_predicate(paths: &mut PathResolver<'_>, id: Identifier) -> Predicate {
    let column = paths.root_column(id.kind().field_name());
    match id {
        Identifier::Pk(pk) => Predicate::equal(column, pk),
        Identifier::Sk(sk) => Predicate::equal(column, sk.into_inner()),
    }
}

fn ids_predicate(paths: &mut PathResolver<'_>, ids: &[String]) -> Option<Predicate> {
    let ids = partition(ids);
    let mut alternatives = Vec::new();

    if !ids.pks.is_empty() {
        alternatives.push(Predicate::In(
            paths.root_column(IdKind::Pk.field_name()),
            ids.pks.into_iter().map(SqlValue::Long).collect(),
        ));
    }

    if !ids.sks.is_empty() {
        alternatives.push(Predicate::In(
            paths.root_column(IdKind::Sk.field_name()),
            ids.sks
                .into_iter()
                .map(|sk| SqlValue::Text(sk.into_inner()))
                .collect(),
        ));
    }

    match alternatives.len() {
        0 => None,
        1 => alternatives.pop(),
        _ => Some(Predicate::Or(alternatives)),
    }
}

fn search_predicate(paths: &mut PathResolver<'_>, spec: &SearchSpecification) -> Option<Predicate> {
    let terms = spec.search_terms();
    if terms.is_empty() {
        return None;
    }

    let columns: Vec<ColumnRef> = spec
        .effective_search_fields(paths.descriptor)
        .iter()
        .filter_map(|field| paths.text_column(field))
        .collect();
    if columns.is_empty() {
        tracing::debug!(
            "No searchable columns on '{}', ignoring search '{}'",
            paths.descriptor.name,
            spec.search.as_deref().unwrap_or_default()
        );
        return None;
    }

    let per_term = terms
        .iter()
        .map(|term| {
            let pattern = like_pattern(term, spec.match_mode);
            Predicate::Or(
                columns
                    .iter()
                    .map(|column| Predicate::Like(column.clone(), pattern.clone()))
                    .collect(),
            )
        })
        .collect();

    Some(Predicate::And(per_term))
}

fn like_pattern(term: &str, mode: MatchMode) -> String {
    let term = escape_like(term);
    match mode {
        MatchMode::Exact => term,
        MatchMode::StartsWith => format!("{}%", term),
        MatchMode::EndsWith => format!("%{}", term),
        MatchMode::Contains => format!("%{}%", term),
    }
}

/// Turns field paths into columns, collecting the joins they need.
struct PathResolver<'a> {
    cache: &'a FieldMetadataCache,
    descriptor: &'static EntityDescriptor,
    joins: Vec<Join>,
}

impl PathResolver<'_> {
    /// A column of the root table, mapped through its declared column alias.
    fn root_column(&self, field: &str) -> ColumnRef {
        let index = self.cache.index(self.descriptor, Backend::Relational);
        let column = index
            .get(field)
            .map(|f| f.storage_name(Backend::Relational))
            .unwrap_or(field);
        ColumnRef::root(column)
    }

    /// Resolves a dotted path. Relations become joins, embedded objects
    /// prefix their column names. `None` for unknown paths or paths ending
    /// on a relation.
    fn column(&mut self, path: &str) -> Option<ColumnRef> {
        let chain = self
            .cache
            .resolve_path(self.descriptor, Backend::Relational, path)?;
        let (last, parents) = chain.split_last()?;
        if last.kind.is_relation() || matches!(last.kind, FieldKind::Object(_)) {
            return None;
        }

        let mut alias = ROOT_ALIAS.to_owned();
        let mut prefix = String::new();
        for field in parents {
            match field.kind {
                FieldKind::Relation {
                    kind,
                    target,
                    join_column,
                } => {
                    let join_alias = if alias == ROOT_ALIAS {
                        field.name.to_owned()
                    } else {
                        format!("{}_{}", alias, field.name)
                    };
                    self.add_join(&alias, &join_alias, kind, target(), join_column);
                    alias = join_alias;
                    prefix.clear();
                }
                _ => {
                    prefix.push_str(field.storage_name(Backend::Relational));
                    prefix.push('_');
                }
            }
        }

        Some(ColumnRef::new(
            alias,
            format!("{}{}", prefix, last.storage_name(Backend::Relational)),
        ))
    }

    /// Like [`PathResolver::column`], but only for string columns.
    fn text_column(&mut self, path: &str) -> Option<ColumnRef> {
        let chain = self
            .cache
            .resolve_path(self.descriptor, Backend::Relational, path)?;
        match chain.last()?.kind {
            FieldKind::Text | FieldKind::Keyword => self.column(path),
            _ => {
                tracing::debug!("Skipping non-text search field '{}'", path);
                None
            }
        }
    }

    fn add_join(
        &mut self,
        from_alias: &str,
        alias: &str,
        kind: RelationKind,
        target: &'static EntityDescriptor,
        join_column: &str,
    ) {
        if self.joins.iter().any(|join| join.alias == alias) {
            return;
        }

        let target_pk = self
            .cache
            .index(target, Backend::Relational)
            .get(IdKind::Pk.field_name())
            .map(|f| f.storage_name(Backend::Relational))
            .unwrap_or(IdKind::Pk.field_name());
        let source_pk = if from_alias == ROOT_ALIAS {
            self.root_column(IdKind::Pk.field_name()).column
        } else {
            IdKind::Pk.field_name().to_owned()
        };

        let (left, right) = match kind {
            RelationKind::ToOne => (
                ColumnRef::new(alias, target_pk),
                ColumnRef::new(from_alias, join_column),
            ),
            RelationKind::ToMany => (
                ColumnRef::new(alias, join_column),
                ColumnRef::new(from_alias, source_pk),
            ),
        };

        self.joins.push(Join {
            table: target.table_name(),
            alias: alias.to_owned(),
            left,
            right,
            to_many: kind == RelationKind::ToMany,
        });
    }
}
