//! Paged reads over a search index.

use crate::error::{QueryError, Result};
use crate::metadata::{Entity, FieldMetadataCache};
use crate::query::elastic::{ElasticNativeQueryTool, ElasticQueryTool};
use crate::query::page::{self, Page, Pagination};
use crate::query::spec::SearchSpecification;
use crate::tools::watch::Watch;
use anyhow::Context;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Executes search requests. Implemented by the OpenSearch client, or by
/// anything else speaking the query DSL.
#[async_trait]
pub trait SearchOperations: Send + Sync {
    /// Runs a search request body against the index and returns the raw
    /// response.
    async fn search(&self, index: &str, body: Value) -> anyhow::Result<Value>;
}

/// Reads pages of entities through [`SearchOperations`].
pub struct ElasticReader<O> {
    operations: O,
    cache: &'static FieldMetadataCache,
}

impl<O: SearchOperations> ElasticReader<O> {
    pub fn new(operations: O) -> Self {
        Self::with_cache(operations, FieldMetadataCache::global())
    }

    pub fn with_cache(operations: O, cache: &'static FieldMetadataCache) -> Self {
        ElasticReader { operations, cache }
    }

    pub fn operations(&self) -> &O {
        &self.operations
    }

    /// Fetches the page of whole entities described by `spec` using a
    /// native query. `spec.fields` is not applied, see
    /// [`ElasticReader::find_projected`].
    pub async fn find_page<E>(&self, spec: &SearchSpecification) -> Result<Page<E>>
    where
        E: Entity + DeserializeOwned,
    {
        let mut query = ElasticNativeQueryTool::with_cache(self.cache).of_search::<E>(spec);
        query.source = None;
        self.execute(&query.index, query.to_body(), Pagination::of(spec))
            .await
    }

    /// Fetches the page described by `spec` with `_source` limited to the
    /// fields of `spec.fields` plus the identity and audit fields. Hits are
    /// read as `P`, which must accept the partial documents (for example
    /// [`serde_json::Value`]).
    pub async fn find_projected<E, P>(&self, spec: &SearchSpecification) -> Result<Page<P>>
    where
        E: Entity,
        P: DeserializeOwned,
    {
        let query = ElasticNativeQueryTool::with_cache(self.cache).of_search::<E>(spec);
        self.execute(&query.index, query.to_body(), Pagination::of(spec))
            .await
    }

    /// Fetches the page described by `spec` using a criteria query.
    pub async fn find_page_by_criteria<E>(&self, spec: &SearchSpecification) -> Result<Page<E>>
    where
        E: Entity + DeserializeOwned,
    {
        let query = ElasticQueryTool::with_cache(self.cache).of_search::<E>(spec);
        self.execute(&query.index, query.to_body(), Pagination::of(spec))
            .await
    }

    /// Runs a prepared request body and reads `hits.total` and the
    /// `_source` of each hit.
    pub async fn execute<E>(&self, index: &str, body: Value, pagination: Pagination) -> Result<Page<E>>
    where
        E: DeserializeOwned,
    {
        let watch = Watch::start();
        let response = self.operations.search(index, body).await?;
        let (content, total) = parse_hits(&response)
            .with_context(|| format!("Failed to read the search response of '{}'", index))?;

        tracing::debug!(
            "Fetched {} of {} hits from '{}' in {}ms",
            content.len(),
            total,
            index,
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

    /// Like [`ElasticReader::find_one`], but reports an absent entity as
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

/// Accepts both `"total": { "value": n }` and the older `"total": n`.
fn parse_hits<E: DeserializeOwned>(response: &Value) -> anyhow::Result<(Vec<E>, u64)> {
    let hits = response.get("hits").context("Response has no hits")?;
    let total = match &hits["total"] {
        Value::Number(total) => total.as_u64(),
        total => total["value"].as_u64(),
    }
    .context("Response has no hit total")?;

    let content = hits["hits"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|hit| serde_json::from_value(hit["_source"].clone()))
        .collect::<std::result::Result<Vec<E>, _>>()
        .context("Failed to deserialize a hit")?;

    Ok((content, total))
}
