//! Criteria trees, the composable form of a search query.

use crate::identity::{IdKind, Identifier, partition, resolve};
use crate::metadata::{Entity, EntityDescriptor, FieldMetadataCache};
use crate::query::elastic::{SearchFields, sort_json, wildcard};
use crate::query::sort::{DEFAULT_SORT_FIELD, DEFAULT_SORT_ORDER, SortField, plan_sort};
use crate::query::spec::{MatchMode, SearchSpecification};
use crate::query::{ARCHIVED_FIELD, DELETED_FIELD, Pagination};
use serde_json::{Value, json};

/// A condition on indexed fields.
#[derive(Clone, Debug, PartialEq)]
pub enum Criteria {
    /// All must hold. Empty matches everything.
    And(Vec<Criteria>),
    /// One must hold. Empty matches nothing.
    Or(Vec<Criteria>),
    Is(String, Value),
    In(String, Vec<Value>),
    /// Case-insensitive match of a free-text term.
    Matches {
        field: String,
        term: String,
        mode: MatchMode,
    },
}

impl Criteria {
    pub fn match_all() -> Self {
        Criteria::And(Vec::new())
    }

    /// Adds a condition to a conjunction, or wraps both into a new one.
    pub fn and(self, other: Criteria) -> Self {
        match self {
            Criteria::And(mut parts) => {
                parts.push(other);
                Criteria::And(parts)
            }
            criteria => Criteria::And(vec![criteria, other]),
        }
    }

    /// Determines if the criteria apply no restriction.
    pub fn is_match_all(&self) -> bool {
        matches!(self, Criteria::And(parts) if parts.iter().all(Criteria::is_match_all))
    }

    /// Renders the criteria as a query DSL clause.
    pub fn to_query(&self) -> Value {
        match self {
            criteria if criteria.is_match_all() => json!({ "match_all": {} }),
            Criteria::And(parts) => {
                let must: Vec<Value> = parts
                    .iter()
                    .filter(|part| !part.is_match_all())
                    .map(Criteria::to_query)
                    .collect();
                json!({ "bool": { "must": must } })
            }
            Criteria::Or(parts) if parts.is_empty() => json!({ "match_none": {} }),
            Criteria::Or(parts) => {
                let should: Vec<Value> = parts.iter().map(Criteria::to_query).collect();
                json!({ "bool": { "should": should, "minimum_should_match": 1 } })
            }
            Criteria::Is(field, value) => json!({ "term": { field: value } }),
            Criteria::In(field, values) => json!({ "terms": { field: values } }),
            Criteria::Matches { field, term, mode } => wildcard(field, term, *mode),
        }
    }
}

/// A criteria query with sort and page window.
#[derive(Clone, Debug, PartialEq)]
pub struct CriteriaQuery {
    pub index: String,
    pub criteria: Criteria,
    pub sort: Vec<SortField<String>>,
    pub from: u64,
    pub size: u64,
}

impl CriteriaQuery {
    /// The search request body.
    pub fn to_body(&self) -> Value {
        json!({
            "query": self.criteria.to_query(),
            "sort": sort_json(&self.sort),
            "from": self.from,
            "size": self.size,
            "track_total_hits": true,
        })
    }
}

/// Builds [`CriteriaQuery`] values for entity types.
#[derive(Clone, Copy)]
pub struct ElasticQueryTool<'a> {
    cache: &'a FieldMetadataCache,
}

impl Default for ElasticQueryTool<'static> {
    fn default() -> Self {
        ElasticQueryTool {
            cache: FieldMetadataCache::global(),
        }
    }
}

impl<'a> ElasticQueryTool<'a> {
    pub fn with_cache(cache: &'a FieldMetadataCache) -> Self {
        ElasticQueryTool { cache }
    }

    /// Applies id, ids, flags, sort and page, but not free text.
    pub fn default_query<E: Entity>(&self, spec: &SearchSpecification) -> CriteriaQuery {
        self.build(E::descriptor(), spec, false)
    }

    /// Applies everything including free text over the candidate fields.
    pub fn of_search<E: Entity>(&self, spec: &SearchSpecification) -> CriteriaQuery {
        self.build(E::descriptor(), spec, true)
    }

    fn build(
        &self,
        descriptor: &'static EntityDescriptor,
        spec: &SearchSpecification,
        with_search: bool,
    ) -> CriteriaQuery {
        let fields = SearchFields {
            cache: self.cache,
            descriptor,
        };
        let mut criteria = Criteria::match_all();

        if let Some(id) = spec.id.as_deref() {
            let id = resolve(id);
            criteria = criteria.and(Criteria::Is(fields.key(id.kind().field_name()), id.to_json()));
        }

        if let Some(ids) = spec.ids.as_deref()
            && let Some(ids_criteria) = ids_criteria(&fields, ids)
        {
            criteria = criteria.and(ids_criteria);
        }

        for (field, flag) in [(DELETED_FIELD, spec.deleted), (ARCHIVED_FIELD, spec.archived)] {
            if let Some(flag) = flag {
                criteria = criteria.and(Criteria::Is(fields.key(field), json!(flag)));
            }
        }

        if with_search {
            for term_criteria in search_criteria(&fields, spec) {
                criteria = criteria.and(term_criteria);
            }
        }

        let mut sort = plan_sort(spec, |name| fields.sort_path(name));
        if sort.is_empty() {
            sort.push(SortField {
                field: fields.key(DEFAULT_SORT_FIELD),
                order: DEFAULT_SORT_ORDER,
            });
        }

        let pagination = Pagination::of(spec);

        CriteriaQuery {
            index: descriptor.index_name(),
            criteria,
            sort,
            from: pagination.offset(),
            size: pagination.limit(),
        }
    }
}

fn ids_criteria(fields: &SearchFields<'_>, ids: &[String]) -> Option<Criteria> {
    let ids = partition(ids);
    let mut alternatives = Vec::new();

    if !ids.pks.is_empty() {
        alternatives.push(Criteria::In(
            fields.key(IdKind::Pk.field_name()),
            ids.pks.into_iter().map(|pk| Identifier::Pk(pk).to_json()).collect(),
        ));
    }

    if !ids.sks.is_empty() {
        alternatives.push(Criteria::In(
            fields.key(IdKind::Sk.field_name()),
            ids.sks.into_iter().map(|sk| Identifier::Sk(sk).to_json()).collect(),
        ));
    }

    match alternatives.len() {
        0 => None,
        1 => alternatives.pop(),
        _ => Some(Criteria::Or(alternatives)),
    }
}

/// One criteria per term, each an alternative over the candidate fields.
fn search_criteria(fields: &SearchFields<'_>, spec: &SearchSpecification) -> Vec<Criteria> {
    let terms = spec.search_terms();
    if terms.is_empty() {
        return Vec::new();
    }

    let paths: Vec<String> = spec
        .effective_search_fields(fields.descriptor)
        .iter()
        .filter_map(|field| fields.text_path(field))
        .collect();
    if paths.is_empty() {
        tracing::debug!(
            "No searchable fields on '{}', ignoring search",
            fields.descriptor.name
        );
        return Vec::new();
    }

    terms
        .into_iter()
        .map(|term| {
            Criteria::Or(
                paths
                    .iter()
                    .map(|path| Criteria::Matches {
                        field: path.clone(),
                        term: term.clone(),
                        mode: spec.match_mode,
                    })
                    .collect(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::fixtures::{Customer, Order};

    fn tool(cache: &FieldMetadataCache) -> ElasticQueryTool<'_> {
        ElasticQueryTool::with_cache(cache)
    }

    #[test]
    fn an_empty_specification_matches_all_sorted_by_pk() {
        let cache = FieldMetadataCache::default();
        let query = tool(&cache).default_query::<Order>(&SearchSpecification::new());

        assert_eq!(
            query.to_body(),
            json!({
                "query": { "match_all": {} },
                "sort": [{ "pk": { "order": "desc" } }],
                "from": 0,
                "size": *crate::DEFAULT_PAGE_SIZE,
                "track_total_hits": true,
            })
        );
    }

    #[test]
    fn filters_become_terms() {
        let cache = FieldMetadataCache::default();
        let spec = SearchSpecification::new()
            .with_id("42")
            .with_ids(["7", "a1b2c-d3e4f"])
            .with_deleted(false);
        let query = tool(&cache).default_query::<Order>(&spec);

        assert_eq!(
            query.criteria.to_query(),
            json!({ "bool": { "must": [
                { "term": { "pk": 42 } },
                { "bool": {
                    "should": [{ "terms": { "pk": [7] } }, { "terms": { "sk": ["a1b2c-d3e4f"] } }],
                    "minimum_should_match": 1
                } },
                { "term": { "deleted": false } },
            ] } })
        );
    }

    #[test]
    fn search_terms_must_all_match() {
        let cache = FieldMetadataCache::default();
        let spec = SearchSpecification::new()
            .with_search("Jane doe")
            .with_match_mode(MatchMode::StartsWith);
        let query = tool(&cache).of_search::<Customer>(&spec);

        let Criteria::And(terms) = &query.criteria else {
            panic!("expected a conjunction, got {:?}", query.criteria);
        };
        assert_eq!(terms.len(), 2);
        assert_eq!(
            terms[0],
            Criteria::Or(vec![
                Criteria::Matches {
                    field: "name".into(),
                    term: "jane".into(),
                    mode: MatchMode::StartsWith
                },
                Criteria::Matches {
                    field: "email".into(),
                    term: "jane".into(),
                    mode: MatchMode::StartsWith
                },
            ])
        );
    }

    #[test]
    fn sorting_resolves_keyword_fields_and_drops_unknown_ones() {
        let cache = FieldMetadataCache::default();
        let spec = SearchSpecification::new().with_sort("note,nope,status", "asc,desc");
        let query = tool(&cache).default_query::<Order>(&spec);

        assert_eq!(
            sort_json(&query.sort),
            json!([{ "note.keyword": { "order": "asc" } }, { "state": { "order": "desc" } }])
        );
    }

    #[test]
    fn empty_alternatives_match_nothing() {
        assert_eq!(Criteria::Or(Vec::new()).to_query(), json!({ "match_none": {} }));
    }
}
