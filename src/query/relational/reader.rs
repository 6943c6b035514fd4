//! Paged reads over a relational database.
//!
//! A page is fetched in two phases. The first query selects only the ids of
//! the page, sorted and windowed, so joins cannot multiply rows and break
//! the window. The second query loads the full entities for these ids,
//! which are then put back into the order of the first.

use crate::error::{QueryError, Result};
use crate::identity::Identified;
use crate::metadata::{Entity, FieldMetadataCache};
use crate::query::page::{self, Page};
use crate::query::relational::{FetchGraph, RelationalQueryTool, SqlStatement};
use crate::query::spec::SearchSpecification;
use crate::tools::watch::Watch;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::collections::{HashMap, HashSet};

/// Executes generated statements. Implemented on top of the actual
/// database driver.
#[async_trait]
pub trait RelationalOperations<E: Entity>: Send + Sync {
    /// Runs an id statement and returns the `pk` of each row, in order.
    async fn fetch_ids(&self, statement: SqlStatement) -> anyhow::Result<Vec<i64>>;

    /// Runs a count statement.
    async fn count(&self, statement: SqlStatement) -> anyhow::Result<u64>;

    /// Runs an entity statement, eagerly loading the relations of `graph`.
    /// The order of the result is irrelevant.
    async fn fetch_entities(
        &self,
        statement: SqlStatement,
        graph: &FetchGraph,
    ) -> anyhow::Result<Vec<E>>;
}

/// Reads pages of entities through [`RelationalOperations`].
pub struct RelationalReader<O> {
    operations: O,
    cache: &'static FieldMetadataCache,
}

impl<O> RelationalReader<O> {
    pub fn new(operations: O) -> Self {
        Self::with_cache(operations, FieldMetadataCache::global())
    }

    pub fn with_cache(operations: O, cache: &'static FieldMetadataCache) -> Self {
        RelationalReader { operations, cache }
    }

    pub fn operations(&self) -> &O {
        &self.operations
    }

    /// Fetches the page described by `spec`, including free-text search.
    ///
    /// The count query is skipped if the id query already shows where the
    /// result ends.
    pub async fn find_page<E>(&self, spec: &SearchSpecification) -> Result<Page<E>>
    where
        E: Entity,
        O: RelationalOperations<E>,
    {
        let watch = Watch::start();
        let descriptor = E::descriptor();
        let relational = RelationalQueryTool::with_cache(self.cache).of_search::<E>(spec);
        let pagination = relational.pagination;

        let ids = distinct_ids(self.operations.fetch_ids(relational.select_ids()).await?);
        let total = match pagination.known_total(ids.len()) {
            Some(total) => total,
            None => self.operations.count(relational.count()).await?,
        };

        if ids.is_empty() {
            return Ok(Page::new(Vec::new(), pagination, total));
        }

        let graph = spec
            .fields
            .as_deref()
            .map(|fields| FetchGraph::of_fields(self.cache, descriptor, fields))
            .unwrap_or_default();
        let entities = self
            .operations
            .fetch_entities(relational.select_by_ids(&ids), &graph)
            .await?;

        tracing::debug!(
            "Fetched {} of {} '{}' rows in {}ms",
            entities.len(),
            total,
            descriptor.name,
            watch.elapsed_ms()
        );

        Ok(Page::new(order_by_ids(entities, &ids), pagination, total))
    }

    /// Fetches the entity with the given `pk` or `sk`, if present.
    pub async fn find_one<E>(&self, id: &str) -> Result<Option<E>>
    where
        E: Entity,
        O: RelationalOperations<E>,
    {
        let spec = SearchSpecification::new().with_id(id).with_page(1, 1);
        Ok(self.find_page::<E>(&spec).await?.content.into_iter().next())
    }

    /// Like [`RelationalReader::find_one`], but reports an absent entity as
    /// [`QueryError::NotFound`].
    pub async fn fetch_one<E>(&self, id: &str) -> Result<E>
    where
        E: Entity,
        O: RelationalOperations<E>,
    {
        self.find_one::<E>(id)
            .await?
            .ok_or_else(|| QueryError::not_found(E::descriptor().name, id))
    }

    /// Yields the page of `spec` and all following ones.
    pub fn stream_pages<E>(&self, spec: SearchSpecification) -> BoxStream<'_, Result<Page<E>>>
    where
        E: Entity,
        O: RelationalOperations<E>,
    {
        page::stream_pages(spec, move |spec| async move { self.find_page::<E>(&spec).await })
    }
}

/// Keeps the first occurrence of every id.
fn distinct_ids(ids: Vec<i64>) -> Vec<i64> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Restores the order of the id query. Rows without a matching id go last.
fn order_by_ids<E: Identified>(mut entities: Vec<E>, ids: &[i64]) -> Vec<E> {
    let positions: HashMap<i64, usize> = ids
        .iter()
        .enumerate()
        .map(|(position, id)| (*id, position))
        .collect();
    entities.sort_by_key(|entity| positions.get(&entity.pk()).copied().unwrap_or(usize::MAX));
    entities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::fixtures::Order;
    use crate::query::relational::SqlValue;
    use futures_util::TryStreamExt;
    use std::sync::{LazyLock, Mutex};

    static CACHE: LazyLock<FieldMetadataCache> = LazyLock::new(FieldMetadataCache::default);

    /// Answers id queries from a fixed list and records every statement.
    struct FakeDatabase {
        ids: Vec<i64>,
        count: u64,
        statements: Mutex<Vec<String>>,
        graphs: Mutex<Vec<Vec<String>>>,
    }

    impl FakeDatabase {
        fn new(ids: Vec<i64>, count: u64) -> Self {
            FakeDatabase {
                ids,
                count,
                statements: Mutex::new(Vec::new()),
                graphs: Mutex::new(Vec::new()),
            }
        }

        fn statements(&self) -> Vec<String> {
            self.statements.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RelationalOperations<Order> for FakeDatabase {
        async fn fetch_ids(&self, statement: SqlStatement) -> anyhow::Result<Vec<i64>> {
            self.statements.lock().unwrap().push(statement.sql);
            Ok(self.ids.clone())
        }

        async fn count(&self, statement: SqlStatement) -> anyhow::Result<u64> {
            self.statements.lock().unwrap().push(statement.sql);
            Ok(self.count)
        }

        async fn fetch_entities(
            &self,
            statement: SqlStatement,
            graph: &FetchGraph,
        ) -> anyhow::Result<Vec<Order>> {
            self.statements.lock().unwrap().push(statement.sql);
            self.graphs.lock().unwrap().push(graph.paths());

            // Return the rows in reverse to prove they are reordered.
            Ok(statement
                .binds
                .iter()
                .rev()
                .filter_map(|bind| match bind {
                    SqlValue::Long(pk) => Some(Order::new(*pk, &format!("N-{pk}"))),
                    _ => None,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn pages_keep_the_order_of_the_id_query() {
        let reader = RelationalReader::with_cache(FakeDatabase::new(vec![3, 1, 2], 0), &CACHE);
        let page = reader
            .find_page::<Order>(&SearchSpecification::new().with_page(1, 10))
            .await
            .unwrap();

        assert_eq!(page.content.iter().map(|o| o.pk()).collect::<Vec<_>>(), vec![3, 1, 2]);
        assert_eq!(page.total_elements, 3);
        assert_eq!(reader.operations().statements().len(), 2, "count must be skipped");
    }

    #[tokio::test]
    async fn full_pages_are_counted() {
        let reader = RelationalReader::with_cache(FakeDatabase::new(vec![5, 4], 9), &CACHE);
        let page = reader
            .find_page::<Order>(&SearchSpecification::new().with_page(1, 2))
            .await
            .unwrap();

        assert_eq!(page.total_elements, 9);
        assert_eq!(page.total_pages(), 5);
        assert!(reader.operations().statements()[1].starts_with("SELECT COUNT(DISTINCT e.pk)"));
    }

    #[tokio::test]
    async fn repeated_ids_count_once() {
        let reader = RelationalReader::with_cache(FakeDatabase::new(vec![1, 1, 2], 2), &CACHE);
        let spec = SearchSpecification::new().with_sort("lines.sku", "asc").with_page(1, 10);
        let page = reader.find_page::<Order>(&spec).await.unwrap();

        assert_eq!(page.content.iter().map(|o| o.pk()).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(page.total_elements, 2);
        assert!(!page.has_next());

        let statements = reader.operations().statements();
        assert!(statements[0].contains("GROUP BY e.pk ORDER BY MIN(lines.sku) ASC"));
        assert_eq!(statements[1], "SELECT e.* FROM orders e WHERE e.pk IN ($1, $2)");
    }

    #[tokio::test]
    async fn empty_pages_skip_the_entity_query() {
        let reader = RelationalReader::with_cache(FakeDatabase::new(Vec::new(), 0), &CACHE);
        let page = reader
            .find_page::<Order>(&SearchSpecification::new())
            .await
            .unwrap();

        assert!(page.is_empty());
        assert_eq!(reader.operations().statements().len(), 1);
    }

    #[tokio::test]
    async fn projections_load_relations_eagerly() {
        let reader = RelationalReader::with_cache(FakeDatabase::new(vec![1], 0), &CACHE);
        let spec = SearchSpecification::new().with_fields(["number", "customer"]);
        reader.find_page::<Order>(&spec).await.unwrap();

        assert_eq!(
            *reader.operations().graphs.lock().unwrap(),
            vec![vec!["customer".to_owned()]]
        );
    }

    #[tokio::test]
    async fn missing_entities_are_reported() {
        let reader = RelationalReader::with_cache(FakeDatabase::new(Vec::new(), 0), &CACHE);

        assert!(reader.find_one::<Order>("42").await.unwrap().is_none());
        let error = reader.fetch_one::<Order>("42").await.unwrap_err();
        assert_eq!(error.status(), 404);
    }

    #[tokio::test]
    async fn streams_stop_after_a_short_page() {
        let reader = RelationalReader::with_cache(FakeDatabase::new(vec![1, 2], 0), &CACHE);
        let pages: Vec<Page<Order>> = reader
            .stream_pages(SearchSpecification::new().with_page(1, 5))
            .try_collect()
            .await
            .unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].content.len(), 2);
    }
}
