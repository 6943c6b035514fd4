//! Document backend: filter, projection and sort documents in the MongoDB
//! query language.
//!
//! The documents are plain [`serde_json::Value`]s and can be handed to any
//! driver (or converted into BSON) by the [`MongoOperations`] implementation.

mod reader;

pub use reader::{MongoOperations, MongoReader};

use crate::identity::{IdKind, Identifier, partition, resolve};
use crate::metadata::{Backend, Entity, EntityDescriptor, FieldKind, FieldMetadataCache};
use crate::query::sort::{DEFAULT_SORT_FIELD, DEFAULT_SORT_ORDER, SortField, plan_sort};
use crate::query::spec::{MatchMode, SearchSpecification};
use crate::query::{ARCHIVED_FIELD, DELETED_FIELD, FORCED_FIELDS, Pagination};
use serde_json::{Value, json};

/// The document key of the `id` field.
const ID_KEY: &str = "_id";

/// Which fields to return.
///
/// Both lists are computed, but only `include` is rendered: a projection
/// cannot mix inclusion and exclusion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Projection {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Projection {
    pub fn document(&self) -> Value {
        Value::Object(
            self.include
                .iter()
                .map(|field| (field.clone(), json!(1)))
                .collect(),
        )
    }
}

/// A complete find request: filter, projection, sort and window.
#[derive(Clone, Debug, PartialEq)]
pub struct MongoQuery {
    pub collection: String,
    /// Conditions which must all hold.
    pub criteria: Vec<Value>,
    pub projection: Option<Projection>,
    pub sort: Vec<SortField<String>>,
    pub skip: u64,
    pub limit: u64,
}

impl MongoQuery {
    /// The filter document: `{}`, the only criterion, or an `$and` of all.
    pub fn filter_document(&self) -> Value {
        match self.criteria.as_slice() {
            [] => json!({}),
            [single] => single.clone(),
            all => json!({ "$and": all }),
        }
    }

    pub fn projection_document(&self) -> Option<Value> {
        self.projection.as_ref().map(Projection::document)
    }

    /// The sort document, `1` for ascending and `-1` for descending, in
    /// the order of the sort fields.
    pub fn sort_document(&self) -> Value {
        Value::Object(
            self.sort
                .iter()
                .map(|sort| {
                    let direction = if sort.order.is_ascending() { 1 } else { -1 };
                    (sort.field.clone(), json!(direction))
                })
                .collect(),
        )
    }
}

/// Builds [`MongoQuery`] values for entity types.
#[derive(Clone, Copy)]
pub struct MongoQueryTool<'a> {
    cache: &'a FieldMetadataCache,
}

impl Default for MongoQueryTool<'static> {
    fn default() -> Self {
        MongoQueryTool {
            cache: FieldMetadataCache::global(),
        }
    }
}

impl<'a> MongoQueryTool<'a> {
    pub fn with_cache(cache: &'a FieldMetadataCache) -> Self {
        MongoQueryTool { cache }
    }

    /// Applies id, ids, flags, projection, sort and page, but not free text.
    pub fn default_query<E: Entity>(&self, spec: &SearchSpecification) -> MongoQuery {
        self.build(E::descriptor(), spec, false)
    }

    /// Applies everything including free text over the candidate fields.
    pub fn of_search<E: Entity>(&self, spec: &SearchSpecification) -> MongoQuery {
        self.build(E::descriptor(), spec, true)
    }

    /// Computes the projection for a requested allow-list.
    ///
    /// `include` holds the requested fields the entity declares plus the
    /// forced fields, `exclude` every other declared field.
    pub fn projection<E: Entity>(&self, fields: &[String]) -> Projection {
        self.projection_of(E::descriptor(), fields)
    }

    fn build(
        &self,
        descriptor: &'static EntityDescriptor,
        spec: &SearchSpecification,
        with_search: bool,
    ) -> MongoQuery {
        let mut criteria = Vec::new();

        if let Some(id) = spec.id.as_deref() {
            criteria.push(self.id_criterion(descriptor, resolve(id)));
        }

        if let Some(ids) = spec.ids.as_deref()
            && let Some(ids_criterion) = self.ids_criterion(descriptor, ids)
        {
            criteria.push(ids_criterion);
        }

        for (field, flag) in [(DELETED_FIELD, spec.deleted), (ARCHIVED_FIELD, spec.archived)] {
            if let Some(flag) = flag {
                criteria.push(json!({ self.key(descriptor, field): flag }));
            }
        }

        if with_search {
            criteria.extend(self.search_criteria(descriptor, spec));
        }

        let mut sort = plan_sort(spec, |name| self.sort_path(descriptor, name));
        if sort.is_empty() {
            sort.push(SortField {
                field: self.key(descriptor, DEFAULT_SORT_FIELD),
                order: DEFAULT_SORT_ORDER,
            });
        }

        let pagination = Pagination::of(spec);

        MongoQuery {
            collection: descriptor.collection_name(),
            criteria,
            projection: spec
                .fields
                .as_deref()
                .map(|fields| self.projection_of(descriptor, fields)),
            sort,
            skip: pagination.offset(),
            limit: pagination.limit(),
        }
    }

    /// The stored key of a top-level field, falling back to the name itself.
    fn key(&self, descriptor: &'static EntityDescriptor, field: &str) -> String {
        if field == "id" {
            return ID_KEY.to_owned();
        }

        self.cache
            .index(descriptor, Backend::Document)
            .get(field)
            .map(|f| f.storage_name(Backend::Document))
            .unwrap_or(field)
            .to_owned()
    }

    fn id_criterion(&self, descriptor: &'static EntityDescriptor, id: Identifier) -> Value {
        json!({ self.key(descriptor, id.kind().field_name()): id.to_json() })
    }

    fn ids_criterion(&self, descriptor: &'static EntityDescriptor, ids: &[String]) -> Option<Value> {
        let ids = partition(ids);
        let mut alternatives = Vec::new();

        if !ids.pks.is_empty() {
            alternatives.push(json!({
                self.key(descriptor, IdKind::Pk.field_name()): { "$in": ids.pks }
            }));
        }

        if !ids.sks.is_empty() {
            alternatives.push(json!({
                self.key(descriptor, IdKind::Sk.field_name()): { "$in": ids.sks }
            }));
        }

        match alternatives.len() {
            0 => None,
            1 => alternatives.pop(),
            _ => Some(json!({ "$or": alternatives })),
        }
    }

    fn search_criteria(
        &self,
        descriptor: &'static EntityDescriptor,
        spec: &SearchSpecification,
    ) -> Vec<Value> {
        let terms = spec.search_terms();
        if terms.is_empty() {
            return Vec::new();
        }

        let paths: Vec<String> = spec
            .effective_search_fields(descriptor)
            .iter()
            .filter_map(|field| self.text_path(descriptor, field))
            .collect();
        if paths.is_empty() {
            tracing::debug!(
                "No searchable fields on '{}', ignoring search",
                descriptor.name
            );
            return Vec::new();
        }

        terms
            .iter()
            .map(|term| {
                let pattern = regex_pattern(term, spec.match_mode);
                let alternatives: Vec<Value> = paths
                    .iter()
                    .map(|path| json!({ path: { "$regex": pattern, "$options": "i" } }))
                    .collect();
                json!({ "$or": alternatives })
            })
            .collect()
    }

    /// Resolves a dotted path into stored keys. Paths may descend into
    /// embedded objects but not into referenced entities.
    fn storage_path(&self, descriptor: &'static EntityDescriptor, path: &str) -> Option<(String, FieldKind)> {
        let chain = self.cache.resolve_path(descriptor, Backend::Document, path)?;
        let (last, parents) = chain.split_last()?;
        if parents.iter().any(|field| field.kind.is_relation()) {
            return None;
        }

        let path = chain
            .iter()
            .map(|field| field.storage_name(Backend::Document))
            .collect::<Vec<_>>()
            .join(".");
        Some((path, last.kind))
    }

    fn sort_path(&self, descriptor: &'static EntityDescriptor, path: &str) -> Option<String> {
        match self.storage_path(descriptor, path)? {
            (_, FieldKind::Object(_) | FieldKind::Relation { .. }) => None,
            (path, _) => Some(path),
        }
    }

    fn text_path(&self, descriptor: &'static EntityDescriptor, path: &str) -> Option<String> {
        match self.storage_path(descriptor, path)? {
            (path, FieldKind::Text | FieldKind::Keyword) => Some(path),
            _ => {
                tracing::debug!("Skipping non-text search field '{}'", path);
                None
            }
        }
    }

    fn projection_of(&self, descriptor: &'static EntityDescriptor, fields: &[String]) -> Projection {
        let index = self.cache.index(descriptor, Backend::Document);
        let mut include: Vec<String> = Vec::new();
        let mut add = |key: String| {
            if !include.contains(&key) {
                include.push(key);
            }
        };

        for field in FORCED_FIELDS {
            add(self.key(descriptor, field));
        }

        for requested in fields {
            if let Some((path, _)) = self.storage_path(descriptor, requested) {
                add(path);
            } else {
                tracing::debug!(
                    "Ignoring unknown projection field '{}' of '{}'",
                    requested,
                    descriptor.name
                );
            }
        }

        let exclude = index
            .fields()
            .iter()
            .map(|field| field.storage_name(Backend::Document).to_owned())
            .filter(|key| {
                !include
                    .iter()
                    .any(|included| included == key || included.starts_with(&format!("{key}.")))
            })
            .collect();

        Projection { include, exclude }
    }
}

/// A case-insensitive regular expression for the term. The term itself is
/// matched literally.
fn regex_pattern(term: &str, mode: MatchMode) -> String {
    let term = regex::escape(term);
    match mode {
        MatchMode::Exact => format!("^{}$", term),
        MatchMode::StartsWith => format!("^{}.*", term),
        MatchMode::EndsWith => format!(".*{}$", term),
        MatchMode::Contains => format!(".*{}.*", term),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::fixtures::{Customer, Order};

    fn tool(cache: &FieldMetadataCache) -> MongoQueryTool<'_> {
        MongoQueryTool::with_cache(cache)
    }

    #[test]
    fn every_term_must_match_some_field() {
        let cache = FieldMetadataCache::default();
        let spec = SearchSpecification::new()
            .with_search("jane doe")
            .with_sort("name", "desc")
            .with_search_fields(["name", "email"]);
        let query = tool(&cache).of_search::<Customer>(&spec);

        let regex = |pattern: &str| json!({ "$regex": pattern, "$options": "i" });
        assert_eq!(
            query.filter_document(),
            json!({ "$and": [
                { "$or": [{ "name": regex(".*jane.*") }, { "email": regex(".*jane.*") }] },
                { "$or": [{ "name": regex(".*doe.*") }, { "email": regex(".*doe.*") }] },
            ]})
        );
        assert_eq!(query.sort_document(), json!({ "name": -1 }));
    }

    #[test]
    fn match_modes_anchor_patterns() {
        assert_eq!(regex_pattern("ja", MatchMode::Exact), "^ja$");
        assert_eq!(regex_pattern("ja", MatchMode::StartsWith), "^ja.*");
        assert_eq!(regex_pattern("ja", MatchMode::EndsWith), ".*ja$");
        assert_eq!(regex_pattern("a.b", MatchMode::Contains), ".*a\\.b.*");
    }

    #[test]
    fn ids_split_into_pk_and_sk() {
        let cache = FieldMetadataCache::default();
        let spec = SearchSpecification::new().with_ids(["7", "a1b2c-d3e4f"]);
        let query = tool(&cache).default_query::<Order>(&spec);

        assert_eq!(
            query.filter_document(),
            json!({ "$or": [{ "pk": { "$in": [7] } }, { "sk": { "$in": ["a1b2c-d3e4f"] } }] })
        );
    }

    #[test]
    fn id_and_flags_become_equalities() {
        let cache = FieldMetadataCache::default();
        let spec = SearchSpecification::new()
            .with_id("a1b2c-d3e4f")
            .with_archived(true);
        let query = tool(&cache).default_query::<Order>(&spec);

        assert_eq!(
            query.filter_document(),
            json!({ "$and": [{ "sk": "a1b2c-d3e4f" }, { "archived": true }] })
        );
    }

    #[test]
    fn empty_ids_match_everything() {
        let cache = FieldMetadataCache::default();
        let spec = SearchSpecification::new().with_ids(Vec::<String>::new());
        assert_eq!(tool(&cache).default_query::<Order>(&spec).filter_document(), json!({}));
    }

    #[test]
    fn sorting_uses_document_names_and_defaults_to_pk() {
        let cache = FieldMetadataCache::default();
        let spec = SearchSpecification::new().with_sort("status,customer.name,shipping.city", "asc");
        let query = tool(&cache).default_query::<Order>(&spec);
        assert_eq!(query.sort_document(), json!({ "state": 1, "shipping.city": 1 }));

        let query = tool(&cache).default_query::<Order>(&SearchSpecification::new());
        assert_eq!(query.sort_document(), json!({ "pk": -1 }));
    }

    #[test]
    fn pages_become_skip_and_limit() {
        let cache = FieldMetadataCache::default();
        let spec = SearchSpecification::new().with_page(0, 15);
        let query = tool(&cache).default_query::<Order>(&spec);
        assert_eq!((query.skip, query.limit), (0, 15));

        let query = tool(&cache).default_query::<Order>(&spec.with_page(3, 15));
        assert_eq!((query.skip, query.limit), (30, 15));
    }

    #[test]
    fn projections_force_identity_and_audit_fields() {
        let cache = FieldMetadataCache::default();
        let projection = tool(&cache)
            .projection::<Order>(&["number".to_owned(), "status".to_owned(), "nope".to_owned()]);

        assert_eq!(
            projection.include,
            vec!["_id", "pk", "sk", "deleted", "archived", "createdAt", "updatedAt", "number", "state"]
        );
        assert_eq!(
            projection.exclude,
            vec!["note", "total", "customer", "lines", "shipping"]
        );
    }

    #[test]
    fn only_requested_projections_are_rendered() {
        let cache = FieldMetadataCache::default();
        let query = tool(&cache).default_query::<Order>(&SearchSpecification::new());
        assert_eq!(query.projection_document(), None);

        let spec = SearchSpecification::new().with_fields(["shipping.city"]);
        let query = tool(&cache).default_query::<Order>(&spec);
        let projection = query.projection.unwrap();
        assert!(projection.include.contains(&"shipping.city".to_owned()));
        assert!(!projection.exclude.contains(&"shipping".to_owned()));
    }
}
