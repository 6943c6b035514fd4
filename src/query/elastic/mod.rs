//! Search backend: query DSL documents for Elasticsearch and OpenSearch.
//!
//! Two tools produce the same semantics in different shapes.
//! [`ElasticQueryTool`] builds a [`Criteria`] tree, [`ElasticNativeQueryTool`]
//! builds a [`BoolQuery`] which keeps the exact filters in non-scoring
//! `filter` context. Both are executed by the [`ElasticReader`].

mod criteria;
mod native;
mod reader;

pub use criteria::{Criteria, CriteriaQuery, ElasticQueryTool};
pub use native::{BoolQuery, ElasticNativeQueryTool, NativeQuery};
pub use reader::{ElasticReader, SearchOperations};

use crate::metadata::{Backend, EntityDescriptor, FieldKind, FieldMetadataCache};
use crate::query::SortField;
use crate::query::spec::MatchMode;
use serde_json::{Value, json};

/// Suffix of the keyword sub-field every text field is indexed with.
pub const KEYWORD_SUFFIX: &str = ".keyword";

/// Resolves field paths of one entity into index field names.
#[derive(Clone, Copy)]
pub(crate) struct SearchFields<'a> {
    pub cache: &'a FieldMetadataCache,
    pub descriptor: &'static EntityDescriptor,
}

impl SearchFields<'_> {
    /// The index name of a top-level field, falling back to the name itself.
    pub fn key(&self, field: &str) -> String {
        self.cache
            .index(self.descriptor, Backend::Search)
            .get(field)
            .map(|f| f.storage_name(Backend::Search))
            .unwrap_or(field)
            .to_owned()
    }

    /// Resolves a dotted path one segment at a time, descending into
    /// embedded objects and related entities alike.
    pub fn path(&self, path: &str) -> Option<(String, FieldKind)> {
        let chain = self
            .cache
            .resolve_path(self.descriptor, Backend::Search, path)?;
        let kind = chain.last()?.kind;
        let path = chain
            .iter()
            .map(|field| field.storage_name(Backend::Search))
            .collect::<Vec<_>>()
            .join(".");
        Some((path, kind))
    }

    /// The field to sort by. Text fields are analyzed and sort on their
    /// keyword sub-field, structured fields cannot be sorted on.
    pub fn sort_path(&self, path: &str) -> Option<String> {
        match self.path(path)? {
            (path, FieldKind::Text) => Some(format!("{}{}", path, KEYWORD_SUFFIX)),
            (_, FieldKind::Object(_) | FieldKind::Relation { .. }) => None,
            (path, _) => Some(path),
        }
    }

    /// The field to match free text against, if it holds a string.
    pub fn text_path(&self, path: &str) -> Option<String> {
        match self.path(path)? {
            (path, FieldKind::Text | FieldKind::Keyword) => Some(path),
            _ => {
                tracing::debug!("Skipping non-text search field '{}'", path);
                None
            }
        }
    }
}

/// Resolves a sort field path of an entity as the search tools do: by
/// name or alias per segment, with `.keyword` appended for text fields.
pub fn resolve_sort_field(
    cache: &FieldMetadataCache,
    descriptor: &'static EntityDescriptor,
    path: &str,
) -> Option<String> {
    SearchFields { cache, descriptor }.sort_path(path)
}

/// A case-insensitive wildcard query for a free-text term.
pub(crate) fn wildcard(field: &str, term: &str, mode: MatchMode) -> Value {
    let term = escape_wildcard(term);
    let pattern = match mode {
        MatchMode::Exact => term,
        MatchMode::StartsWith => format!("{}*", term),
        MatchMode::EndsWith => format!("*{}", term),
        MatchMode::Contains => format!("*{}*", term),
    };

    json!({ "wildcard": { field: { "value": pattern, "case_insensitive": true } } })
}

fn escape_wildcard(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '*' | '?') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Renders sort fields as `[{ "field": { "order": "desc" } }]`.
pub(crate) fn sort_json(sort: &[SortField<String>]) -> Value {
    Value::Array(
        sort.iter()
            .map(|sort| json!({ &sort.field: { "order": sort.order.name().to_lowercase() } }))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::fixtures::{customer, order};
    use crate::query::SortOrder;

    #[test]
    fn text_fields_sort_on_their_keyword() {
        let cache = FieldMetadataCache::default();
        assert_eq!(
            resolve_sort_field(&cache, customer(), "name"),
            Some("name.keyword".to_owned())
        );
        assert_eq!(resolve_sort_field(&cache, customer(), "email"), Some("email".to_owned()));
        assert_eq!(resolve_sort_field(&cache, order(), "pk"), Some("pk".to_owned()));
    }

    #[test]
    fn nested_paths_resolve_per_segment() {
        let cache = FieldMetadataCache::default();
        assert_eq!(
            resolve_sort_field(&cache, order(), "shipping.city"),
            Some("shipping.town.keyword".to_owned())
        );
        assert_eq!(
            resolve_sort_field(&cache, order(), "shipping.town"),
            Some("shipping.town.keyword".to_owned())
        );
        assert_eq!(
            resolve_sort_field(&cache, order(), "customer.name"),
            Some("customer.name.keyword".to_owned())
        );
        assert_eq!(resolve_sort_field(&cache, order(), "shipping"), None);
        assert_eq!(resolve_sort_field(&cache, order(), "shipping.nope"), None);
        assert_eq!(resolve_sort_field(&cache, order(), "number.nope"), None);
    }

    #[test]
    fn wildcards_escape_their_metacharacters() {
        assert_eq!(
            wildcard("name", "j*n?", MatchMode::StartsWith),
            json!({ "wildcard": { "name": { "value": "j\\*n\\?*", "case_insensitive": true } } })
        );
    }

    #[test]
    fn sort_renders_lowercase_orders() {
        let sort = vec![SortField {
            field: "pk".to_owned(),
            order: SortOrder::Desc,
        }];
        assert_eq!(sort_json(&sort), json!([{ "pk": { "order": "desc" } }]));
    }
}
