//! Native bool queries with exact filters in non-scoring context.

use crate::identity::{IdKind, partition, resolve};
use crate::metadata::{Entity, EntityDescriptor, FieldMetadataCache};
use crate::query::elastic::{SearchFields, sort_json, wildcard};
use crate::query::sort::{DEFAULT_SORT_FIELD, DEFAULT_SORT_ORDER, SortField, plan_sort};
use crate::query::spec::SearchSpecification;
use crate::query::{ARCHIVED_FIELD, DELETED_FIELD, FORCED_FIELDS, Pagination};
use serde_json::{Map, Value, json};

/// The clauses of a `bool` query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoolQuery {
    /// Must hold, without affecting the score.
    pub filter: Vec<Value>,
    /// Must hold and contribute to the score.
    pub must: Vec<Value>,
    pub should: Vec<Value>,
    pub minimum_should_match: Option<u32>,
}

impl BoolQuery {
    pub fn is_empty(&self) -> bool {
        self.filter.is_empty() && self.must.is_empty() && self.should.is_empty()
    }

    /// Renders `{ "bool": {..} }`, omitting empty clauses, or `match_all`
    /// if there are none at all.
    pub fn to_query(&self) -> Value {
        if self.is_empty() {
            return json!({ "match_all": {} });
        }

        let mut clauses = Map::new();
        for (name, values) in [
            ("filter", &self.filter),
            ("must", &self.must),
            ("should", &self.should),
        ] {
            if !values.is_empty() {
                clauses.insert(name.to_owned(), json!(values));
            }
        }
        if let Some(minimum) = self.minimum_should_match {
            clauses.insert("minimum_should_match".to_owned(), json!(minimum));
        }

        json!({ "bool": clauses })
    }
}

/// A native search request: query, sort, source filter and window.
#[derive(Clone, Debug, PartialEq)]
pub struct NativeQuery {
    pub index: String,
    pub query: BoolQuery,
    pub sort: Vec<SortField<String>>,
    /// Fields returned in `_source`. `None` returns the whole document.
    pub source: Option<Vec<String>>,
    pub from: u64,
    pub size: u64,
}

impl NativeQuery {
    /// The search request body.
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "query": self.query.to_query(),
            "sort": sort_json(&self.sort),
            "from": self.from,
            "size": self.size,
            "track_total_hits": true,
        });
        if let Some(source) = &self.source {
            body["_source"] = json!({ "includes": source });
        }
        body
    }
}

/// Builds [`NativeQuery`] values for entity types.
#[derive(Clone, Copy)]
pub struct ElasticNativeQueryTool<'a> {
    cache: &'a FieldMetadataCache,
}

impl Default for ElasticNativeQueryTool<'static> {
    fn default() -> Self {
        ElasticNativeQueryTool {
            cache: FieldMetadataCache::global(),
        }
    }
}

impl<'a> ElasticNativeQueryTool<'a> {
    pub fn with_cache(cache: &'a FieldMetadataCache) -> Self {
        ElasticNativeQueryTool { cache }
    }

    /// Applies id, ids, flags, source filter, sort and page, but not free text.
    pub fn default_query<E: Entity>(&self, spec: &SearchSpecification) -> NativeQuery {
        self.build(E::descriptor(), spec, false)
    }

    /// Applies everything including free text, which is scored.
    pub fn of_search<E: Entity>(&self, spec: &SearchSpecification) -> NativeQuery {
        self.build(E::descriptor(), spec, true)
    }

    fn build(
        &self,
        descriptor: &'static EntityDescriptor,
        spec: &SearchSpecification,
        with_search: bool,
    ) -> NativeQuery {
        let fields = SearchFields {
            cache: self.cache,
            descriptor,
        };
        let mut query = BoolQuery::default();

        if let Some(id) = spec.id.as_deref() {
            let id = resolve(id);
            query
                .filter
                .push(json!({ "term": { fields.key(id.kind().field_name()): id.to_json() } }));
        }

        // The id alternatives are the only `should` clauses, so requiring one
        // of them keeps every other clause mandatory.
        if let Some(ids) = spec.ids.as_deref() {
            let ids = partition(ids);
            if !ids.pks.is_empty() {
                query
                    .should
                    .push(json!({ "terms": { fields.key(IdKind::Pk.field_name()): ids.pks } }));
            }
            if !ids.sks.is_empty() {
                query
                    .should
                    .push(json!({ "terms": { fields.key(IdKind::Sk.field_name()): ids.sks } }));
            }
            if !query.should.is_empty() {
                query.minimum_should_match = Some(1);
            }
        }

        for (field, flag) in [(DELETED_FIELD, spec.deleted), (ARCHIVED_FIELD, spec.archived)] {
            if let Some(flag) = flag {
                query.filter.push(json!({ "term": { fields.key(field): flag } }));
            }
        }

        if with_search {
            query.must.extend(search_clauses(&fields, spec));
        }

        let mut sort = plan_sort(spec, |name| fields.sort_path(name));
        if sort.is_empty() {
            sort.push(SortField {
                field: fields.key(DEFAULT_SORT_FIELD),
                order: DEFAULT_SORT_ORDER,
            });
        }

        let pagination = Pagination::of(spec);

        NativeQuery {
            index: descriptor.index_name(),
            query,
            sort,
            source: spec.fields.as_deref().map(|requested| source_fields(&fields, requested)),
            from: pagination.offset(),
            size: pagination.limit(),
        }
    }
}

fn search_clauses(fields: &SearchFields<'_>, spec: &SearchSpecification) -> Vec<Value> {
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
        .iter()
        .map(|term| {
            let should: Vec<Value> = paths
                .iter()
                .map(|path| wildcard(path, term, spec.match_mode))
                .collect();
            json!({ "bool": { "should": should, "minimum_should_match": 1 } })
        })
        .collect()
}

/// The requested fields known to the entity, plus the identity, flag and
/// audit fields.
fn source_fields(fields: &SearchFields<'_>, requested: &[String]) -> Vec<String> {
    let mut source: Vec<String> = Vec::new();
    let forced = FORCED_FIELDS
        .iter()
        .filter(|field| **field != "id")
        .map(|field| fields.key(field));
    let requested = requested.iter().filter_map(|field| match fields.path(field) {
        Some((path, _)) => Some(path),
        None => {
            tracing::debug!("Ignoring unknown source field '{}'", field);
            None
        }
    });

    for field in forced.chain(requested) {
        if !source.contains(&field) {
            source.push(field);
        }
    }
    source
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::fixtures::{Customer, Order};

    fn tool(cache: &FieldMetadataCache) -> ElasticNativeQueryTool<'_> {
        ElasticNativeQueryTool::with_cache(cache)
    }

    #[test]
    fn mixed_ids_require_one_should_clause() {
        let cache = FieldMetadataCache::default();
        let spec = SearchSpecification::new().with_ids(["7", "a1b2c-d3e4f"]);
        let query = tool(&cache).default_query::<Order>(&spec).query;

        assert_eq!(
            query.should,
            vec![
                json!({ "terms": { "pk": [7] } }),
                json!({ "terms": { "sk": ["a1b2c-d3e4f"] } }),
            ]
        );
        assert_eq!(query.minimum_should_match, Some(1));
        assert!(query.filter.is_empty());
    }

    #[test]
    fn empty_ids_match_all() {
        let cache = FieldMetadataCache::default();
        let spec = SearchSpecification::new().with_ids(Vec::<String>::new());
        let query = tool(&cache).default_query::<Order>(&spec);

        assert_eq!(query.query.minimum_should_match, None);
        assert_eq!(query.query.to_query(), json!({ "match_all": {} }));
    }

    #[test]
    fn exact_filters_stay_in_filter_context() {
        let cache = FieldMetadataCache::default();
        let spec = SearchSpecification::new()
            .with_id("a1b2c-d3e4f")
            .with_deleted(false)
            .with_archived(false);
        let query = tool(&cache).default_query::<Order>(&spec);

        assert_eq!(
            query.query.to_query(),
            json!({ "bool": { "filter": [
                { "term": { "sk": "a1b2c-d3e4f" } },
                { "term": { "deleted": false } },
                { "term": { "archived": false } },
            ] } })
        );
    }

    #[test]
    fn search_terms_are_scored() {
        let cache = FieldMetadataCache::default();
        let spec = SearchSpecification::new().with_search("jane").with_deleted(false);
        let query = tool(&cache).of_search::<Customer>(&spec).query;

        assert_eq!(query.filter.len(), 1);
        assert_eq!(query.must.len(), 1);
        assert_eq!(
            query.must[0]["bool"]["should"][0],
            json!({ "wildcard": { "name": { "value": "*jane*", "case_insensitive": true } } })
        );
    }

    #[test]
    fn body_carries_sort_window_and_source() {
        let cache = FieldMetadataCache::default();
        let spec = SearchSpecification::new()
            .with_sort("name", "asc")
            .with_page(2, 5)
            .with_fields(["name", "nope"]);
        let body = tool(&cache).default_query::<Customer>(&spec).to_body();

        assert_eq!(body["sort"], json!([{ "name.keyword": { "order": "asc" } }]));
        assert_eq!(body["from"], json!(5));
        assert_eq!(body["size"], json!(5));
        assert_eq!(
            body["_source"]["includes"],
            json!(["pk", "sk", "deleted", "archived", "created_at", "updated_at", "name"])
        );
    }

    #[test]
    fn default_sort_is_pk_descending() {
        let cache = FieldMetadataCache::default();
        let body = tool(&cache)
            .default_query::<Order>(&SearchSpecification::new().with_sort_by("nope"))
            .to_body();
        assert_eq!(body["sort"], json!([{ "pk": { "order": "desc" } }]));
        assert!(body.get("_source").is_none());
    }
}
