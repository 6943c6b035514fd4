//! Paged reads over a document store.

use crate::error::{QueryError, Result};
use crate::metadata::{Entity, FieldMetadataCache};
use crate::query::mongo::{MongoQuery, MongoQueryTool};
use crate::query::page::{self, Page, Pagination};
use crate::query::spec::SearchSpecification;
use crate::tools::watch::Watch;
use anyhow::Context;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Executes queries against a collection. Implemented on top of the actual
/// driver, which receives the rendered documents of [`MongoQuery`].
#[async_trait]
pub trait MongoOperations: Send + Sync {
    /// Runs the query, honoring filter, projection, sort, skip and limit,
    /// and returns the raw documents.
    async fn find(&self, query: &MongoQuery) -> anyhow::Result<Vec<Value>>;

    /// Counts the documents matching the filter.
    async fn count(&self, collection: &str, filter: Value) -> anyhow::Result<u64>;
}

/// Reads pages of documents through [`MongoOperations`].
pub struct MongoReader<O> {
    operations: O,
    cache: &'static FieldMetadataCache,
}

impl<O: MongoOperations> MongoReader<O> {
    pub fn new(operations: O) -> Self {
        Self::with_cache(operations, FieldMetadataCache::global())
    }

    pub fn with_cache(operations: O, cache: &'static FieldMetadataCache) -> Self {
        MongoReader { operations, cache }
    }

    pub fn operations(&self) -> &O {
        &self.operations
    }

    /// Fetches the page of whole entities described by `spec`. `spec.fields`
    /// is not applied, see [`MongoReader::find_projected`].
    pub async fn find_page<E>(&self, spec: &SearchSpecification) -> Result<Page<E>>
    where
        E: Entity + DeserializeOwned,
    {
        let mut query = MongoQueryTool::with_cache(self.cache).of_search::<E>(spec);
        query.projection = None;
        self.execute(&query, Pagination::of(spec)).await
    }

    /// Fetches the page described by `spec`, restricted to the projection
    /// of `spec.fields`. Documents are read as `P`, which must accept the
    /// partial documents (for example [`serde_json::Value`]).
    pub async fn find_projected<E, P>(&self, spec: &SearchSpecification) -> Result<Page<P>>
    where
        E: Entity,
        P: DeserializeOwned,
    {
        let query = MongoQueryTool::with_cache(self.cache).of_search::<E>(spec);
        self.execute(&query, Pagination::of(spec)).await
    }

    async fn execute<T>(&self, query: &MongoQuery, pagination: Pagination) -> Result<Page<T>>
    where
        T: DeserializeOwned,
    {
        let watch = Watch::start();
        let documents = self.operations.find(query).await?;
        let total = match pagination.known_total(documents.len()) {
            Some(total) => total,
            None => {
                self.operations
                    .count(&query.collection, query.filter_document())
                    .await?
            }
        };

        let content = documents
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<T>, _>>()
            .with_context(|| format!("Failed to deserialize a document of '{}'", query.collection))?;

        tracing::debug!(
            "Fetched {} of {} documents from '{}' in {}ms",
            content.len(),
            total,
            query.collection,
            watch.elapsed_ms()
        );

        Ok(Page::new(content, pagination, total))
    }

    /// Fetches the entity with the given `pk` or `sk`, if present.
    pub async fn find_one<E>(&self, id: &str) -> Result<Option<E>>
    where
        E: Entity + DeserializeOwned,
    {
        let spec = SearchSpecification::new().with_id(id).with_page(1, 1);
        Ok(self.find_page::<E>(&spec).await?.content.into_iter().next())
    }

    /// Like [`MongoReader::find_one`], but reports an absent entity as
    /// [`QueryError::NotFound`].
    pub async fn fetch_one<E>(&self, id: &str) -> Result<E>
    where
        E: Entity + DeserializeOwned,
    {
        self.find_one::<E>(id)
            .await?
            .ok_or_else(|| QueryError::not_found(E::descriptor().name, id))
    }

    /// Yields the page of `spec` and all following ones.
    pub fn stream_pages<E>(&self, spec: SearchSpecification) -> BoxStream<'_, Result<Page<E>>>
    where
        E: Entity + DeserializeOwned,
    {
        page::stream_pages(spec, move |spec| async move { self.find_page::<E>(&spec).await })
    }
}
