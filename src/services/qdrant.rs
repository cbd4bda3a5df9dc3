//! Qdrant-backed vector index.
//!
//! All memories live in a single collection; queries filter on the
//! `namespace` payload field and deletion is global by point id.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    condition::ConditionOneOf, r#match::MatchValue, Condition, CreateCollectionBuilder,
    DeletePointsBuilder, Distance, FieldCondition, Filter, HasIdCondition, Match, PointId,
    PointStruct, ScoredPoint, SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::QdrantConfig;
use crate::error::{Error, Result};

use super::vector::{VectorIndex, VectorMatch, PAYLOAD_NAMESPACE};

/// Vector index backed by a single Qdrant collection.
#[derive(Clone)]
pub struct QdrantIndex {
    inner: Arc<QdrantIndexInner>,
}

struct QdrantIndexInner {
    client: Qdrant,
    collection: String,
}

impl QdrantIndex {
    /// Connect to Qdrant and ensure the collection exists with the given
    /// dimension. An existing collection with a mismatched dimension is
    /// recreated.
    pub async fn new(config: &QdrantConfig, dimension: usize) -> Result<Self> {
        let client = Qdrant::from_url(&config.url)
            .build()
            .map_err(|e| Error::VectorStore(format!("Failed to connect to Qdrant: {}", e)))?;

        let index = Self {
            inner: Arc::new(QdrantIndexInner {
                client,
                collection: config.collection.clone(),
            }),
        };

        index.ensure_collection(dimension).await?;

        info!(url = %config.url, collection = %config.collection, "Qdrant index connected");

        Ok(index)
    }

    /// Create the collection if missing; recreate it on dimension mismatch.
    async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        let collection = &self.inner.collection;

        let exists = self
            .inner
            .client
            .collection_exists(collection)
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to check collection: {}", e)))?;

        if exists {
            let info = self
                .inner
                .client
                .collection_info(collection)
                .await
                .map_err(|e| Error::VectorStore(format!("Failed to get collection info: {}", e)))?;

            let existing_dim = info
                .result
                .as_ref()
                .and_then(|r| r.config.as_ref())
                .and_then(|c| c.params.as_ref())
                .and_then(|p| p.vectors_config.as_ref())
                .and_then(|vc| match vc.config.as_ref() {
                    Some(qdrant_client::qdrant::vectors_config::Config::Params(params)) => {
                        Some(params.size as usize)
                    }
                    _ => None,
                })
                .unwrap_or(0);

            if existing_dim == dimension {
                debug!(collection = %collection, dimension, "Collection already exists");
                return Ok(());
            }

            info!(
                collection = %collection,
                existing_dim,
                new_dim = dimension,
                "Collection dimension mismatch - recreating"
            );

            self.inner
                .client
                .delete_collection(collection)
                .await
                .map_err(|e| {
                    Error::VectorStore(format!("Failed to delete mismatched collection: {}", e))
                })?;
        }

        self.inner
            .client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to create collection: {}", e)))?;

        info!(collection = %collection, dimension, "Created Qdrant collection");

        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        namespace: &str,
        payload: HashMap<String, Value>,
    ) -> Result<()> {
        let mut qdrant_payload: HashMap<String, QdrantValue> = payload
            .into_iter()
            .filter_map(|(k, v)| json_to_qdrant_value(v).map(|qv| (k, qv)))
            .collect();
        qdrant_payload.insert(
            PAYLOAD_NAMESPACE.to_string(),
            QdrantValue::from(namespace.to_string()),
        );

        let point = PointStruct::new(id.to_string(), vector, qdrant_payload);

        self.inner
            .client
            .upsert_points(UpsertPointsBuilder::new(&self.inner.collection, vec![point]))
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to upsert point: {}", e)))?;

        debug!(collection = %self.inner.collection, id, namespace, "Upserted point");

        Ok(())
    }

    async fn query(
        &self,
        vector: Vec<f32>,
        namespace: &str,
        top_k: usize,
        ids: Option<Vec<String>>,
    ) -> Result<Vec<VectorMatch>> {
        let mut conditions = vec![make_match_condition(PAYLOAD_NAMESPACE, namespace)];

        if let Some(ids) = ids {
            conditions.push(Condition {
                condition_one_of: Some(ConditionOneOf::HasId(HasIdCondition {
                    has_id: ids.into_iter().map(PointId::from).collect(),
                })),
            });
        }

        let filter = Filter {
            must: conditions,
            ..Default::default()
        };

        let builder = SearchPointsBuilder::new(&self.inner.collection, vector, top_k as u64)
            .with_payload(true)
            .filter(filter);

        let response = self
            .inner
            .client
            .search_points(builder)
            .await
            .map_err(|e| Error::VectorStore(format!("Search failed: {}", e)))?;

        Ok(response
            .result
            .into_iter()
            .map(scored_point_to_match)
            .collect())
    }

    async fn delete_by_ids(&self, ids: Vec<String>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let point_ids: Vec<PointId> = ids.into_iter().map(PointId::from).collect();

        self.inner
            .client
            .delete_points(DeletePointsBuilder::new(&self.inner.collection).points(point_ids))
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to delete points: {}", e)))?;

        Ok(())
    }
}

/// Create a keyword match condition for a payload field.
fn make_match_condition(key: &str, value: &str) -> Condition {
    Condition {
        condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
            key: key.to_string(),
            r#match: Some(Match {
                match_value: Some(MatchValue::Keyword(value.to_string())),
            }),
            ..Default::default()
        })),
    }
}

/// Convert JSON value to Qdrant value
fn json_to_qdrant_value(value: Value) -> Option<QdrantValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(QdrantValue::from(b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(QdrantValue::from(i))
            } else if let Some(f) = n.as_f64() {
                Some(QdrantValue::from(f))
            } else {
                None
            }
        }
        Value::String(s) => Some(QdrantValue::from(s)),
        Value::Array(arr) => {
            let values: Vec<QdrantValue> =
                arr.into_iter().filter_map(json_to_qdrant_value).collect();
            if values.is_empty() {
                None
            } else {
                Some(QdrantValue::from(values))
            }
        }
        Value::Object(_) => {
            // Qdrant doesn't support nested objects directly, serialize to string
            Some(QdrantValue::from(value.to_string()))
        }
    }
}

/// Convert Qdrant value to JSON value
fn qdrant_value_to_json(value: QdrantValue) -> Option<Value> {
    use qdrant_client::qdrant::value::Kind;

    match value.kind {
        Some(Kind::NullValue(_)) => Some(Value::Null),
        Some(Kind::BoolValue(b)) => Some(Value::Bool(b)),
        Some(Kind::IntegerValue(i)) => Some(Value::Number(i.into())),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d).map(Value::Number),
        Some(Kind::StringValue(s)) => Some(Value::String(s)),
        Some(Kind::ListValue(list)) => {
            let values: Vec<Value> = list
                .values
                .into_iter()
                .filter_map(qdrant_value_to_json)
                .collect();
            Some(Value::Array(values))
        }
        Some(Kind::StructValue(obj)) => {
            let map: serde_json::Map<String, Value> = obj
                .fields
                .into_iter()
                .filter_map(|(k, v)| qdrant_value_to_json(v).map(|jv| (k, jv)))
                .collect();
            Some(Value::Object(map))
        }
        None => None,
    }
}

/// Convert scored point to a vector match
fn scored_point_to_match(point: ScoredPoint) -> VectorMatch {
    let id = match point.id {
        Some(PointId {
            point_id_options: Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(uuid)),
        }) => uuid,
        Some(PointId {
            point_id_options: Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(num)),
        }) => num.to_string(),
        _ => String::new(),
    };

    let payload = point
        .payload
        .into_iter()
        .filter_map(|(k, v)| qdrant_value_to_json(v).map(|jv| (k, jv)))
        .collect();

    VectorMatch {
        id,
        score: point.score,
        payload,
    }
}
