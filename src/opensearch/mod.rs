//! OpenSearch client for index management and native search execution.
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `OPENSEARCH_URL` | OpenSearch cluster URL (required) |
//! | `OPENSEARCH_USER` | Username for basic auth (optional) |
//! | `OPENSEARCH_PASS` | Password for basic auth (optional) |

use crate::metadata::{
    Backend, EntityDescriptor, FieldKind, FieldMetadataCache, RelationKind,
};
use crate::query::elastic::SearchOperations;
use anyhow::Context;
use async_trait::async_trait;
use opensearch::OpenSearch;
use opensearch::auth::Credentials;
use opensearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::env;

/// Index creation settings and mappings.
#[derive(Serialize)]
pub struct IndexDescription {
    /// Index settings (shards, replicas).
    pub settings: IndexSettings,
    /// Field mappings for the index.
    pub mappings: Mapping,
}

impl IndexDescription {
    /// Derives the mappings of an entity from its descriptor, using the
    /// search aliases as field names.
    ///
    /// Embedded objects and to-one relations map to `object`, to-many
    /// relations to `nested`. A relation back to an entity already being
    /// mapped is left out.
    pub fn for_entity(descriptor: &'static EntityDescriptor, settings: IndexSettings) -> Self {
        let cache = FieldMetadataCache::global();
        let mut path = Vec::new();

        IndexDescription {
            settings,
            mappings: Mapping {
                properties: properties_of(cache, descriptor, &mut path),
            },
        }
    }
}

fn properties_of(
    cache: &FieldMetadataCache,
    descriptor: &'static EntityDescriptor,
    path: &mut Vec<*const EntityDescriptor>,
) -> HashMap<String, FieldMapping> {
    path.push(descriptor);

    let mut properties = HashMap::new();
    for field in cache.index(descriptor, Backend::Search).fields() {
        let mapping = match field.kind {
            FieldKind::Long => FieldMapping::Long,
            FieldKind::Integer => FieldMapping::Integer,
            FieldKind::Float => FieldMapping::Float,
            FieldKind::Boolean => FieldMapping::Boolean,
            FieldKind::Date => FieldMapping::Date,
            FieldKind::Keyword => FieldMapping::Keyword,
            FieldKind::Text => FieldMapping::text(),
            FieldKind::Object(target) => FieldMapping::Object {
                properties: properties_of(cache, target(), path),
            },
            FieldKind::Relation { kind, target, .. } => {
                let target = target();
                if path.contains(&(target as *const EntityDescriptor)) {
                    continue;
                }

                let properties = properties_of(cache, target, path);
                match kind {
                    RelationKind::ToOne => FieldMapping::Object { properties },
                    RelationKind::ToMany => FieldMapping::Nested { properties },
                }
            }
        };
        properties.insert(field.storage_name(Backend::Search).to_owned(), mapping);
    }

    path.pop();
    properties
}

/// Index configuration settings.
#[derive(Serialize)]
pub struct IndexSettings {
    /// Number of primary shards.
    pub number_of_shards: u32,
    /// Number of replica shards.
    pub number_of_replicas: u32,
}

impl Default for IndexSettings {
    fn default() -> Self {
        IndexSettings {
            number_of_shards: 1,
            number_of_replicas: 1,
        }
    }
}

/// Index field mappings container.
#[derive(Serialize)]
pub struct Mapping {
    /// Field name to mapping definition.
    pub properties: HashMap<String, FieldMapping>,
}

/// OpenSearch field type definitions.
#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum FieldMapping {
    /// Full-text searchable field, with a keyword sub-field for sorting.
    #[serde(rename = "text")]
    Text { fields: HashMap<String, FieldMapping> },
    /// Exact-match field for filtering, sorting and aggregations.
    #[serde(rename = "keyword")]
    Keyword,
    /// 64-bit integer.
    #[serde(rename = "long")]
    Long,
    /// 32-bit integer.
    #[serde(rename = "integer")]
    Integer,
    /// Single-precision floating point.
    #[serde(rename = "float")]
    Float,
    /// Date/time field.
    #[serde(rename = "date")]
    Date,
    /// Boolean field.
    #[serde(rename = "boolean")]
    Boolean,
    /// Nested object (fields accessible but not independently searchable).
    #[serde(rename = "object")]
    Object {
        /// Nested field mappings.
        properties: HashMap<String, FieldMapping>,
    },
    /// Nested document (independently searchable).
    #[serde(rename = "nested")]
    Nested {
        /// Nested field mappings.
        properties: HashMap<String, FieldMapping>,
    },
}

impl FieldMapping {
    /// A text field with the `keyword` sub-field the sort resolution expects.
    pub fn text() -> Self {
        FieldMapping::Text {
            fields: HashMap::from([("keyword".to_owned(), FieldMapping::Keyword)]),
        }
    }
}

/// OpenSearch client wrapper.
pub struct OpenSearchClient {
    /// The underlying OpenSearch client.
    pub client: OpenSearch,
}

impl OpenSearchClient {
    /// Creates a client from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let url = env::var("OPENSEARCH_URL").context("Missing OPENSEARCH_URL")?;
        let user = env::var("OPENSEARCH_USER").unwrap_or_default();
        let pass = env::var("OPENSEARCH_PASS").unwrap_or_default();

        let conn_pool =
            SingleNodeConnectionPool::new(url.parse().context("Invalid OpenSearch URL")?);

        let mut builder = TransportBuilder::new(conn_pool);

        if !user.is_empty() {
            builder = builder.auth(Credentials::Basic(user, pass));
        }

        let transport = builder.build()?;
        Ok(Self {
            client: OpenSearch::new(transport),
        })
    }

    /// Creates the index of an entity if it doesn't exist, with the
    /// mappings derived from its descriptor.
    pub async fn ensure_index_exists(
        &self,
        descriptor: &'static EntityDescriptor,
        settings: IndexSettings,
    ) -> anyhow::Result<()> {
        let index_name = descriptor.index_name();
        let exists_response = self
            .client
            .indices()
            .exists(opensearch::indices::IndicesExistsParts::Index(&[
                index_name.as_str(),
            ]))
            .send()
            .await?;

        if exists_response.status_code().is_success() {
            return Ok(());
        }

        let description = IndexDescription::for_entity(descriptor, settings);

        let response = self
            .client
            .indices()
            .create(opensearch::indices::IndicesCreateParts::Index(&index_name))
            .body(description)
            .send()
            .await?;

        if !response.status_code().is_success() {
            return Err(anyhow::anyhow!(
                "Failed to create index {}: {}",
                index_name,
                response.status_code()
            ));
        }

        tracing::info!("Created index '{}'", index_name);
        Ok(())
    }
}

#[async_trait]
impl SearchOperations for OpenSearchClient {
    async fn search(&self, index: &str, body: Value) -> anyhow::Result<Value> {
        let response = self
            .client
            .search(opensearch::SearchParts::Index(&[index]))
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to search index {}", index))?;

        let status = response.status_code();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Search on index {} failed with {}: {}",
                index,
                status,
                text
            ));
        }

        Ok(response.json::<Value>().await?)
    }
}
