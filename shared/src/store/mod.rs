//! Document store abstraction over the `users`, `guardians` and `alerts`
//! collections.
//!
//! Documents are JSON objects. Every document carries the owning `userId`,
//! and every filter must name it: ownership is part of the lookup, never a
//! check made after the fetch.

pub mod dynamo;
pub mod memory;

pub use dynamo::DynamoStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;

pub type Document = Map<String, Value>;

/// Field holding the owning user's subject id.
pub const OWNER_FIELD: &str = "userId";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Guardians,
    Alerts,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Guardians => "guardians",
            Collection::Alerts => "alerts",
        }
    }

    /// Field holding the document id, `None` for one-per-user documents.
    pub fn id_field(self) -> Option<&'static str> {
        match self {
            Collection::Users => None,
            Collection::Guardians => Some("id"),
            Collection::Alerts => Some("alertId"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("filter on {0} must include userId")]
    MissingOwner(&'static str),
    #[error("document for {0} is missing field {1}")]
    MissingField(&'static str, &'static str),
    #[error("duplicate document id in {0}")]
    Duplicate(&'static str),
    #[error("owner already holds the maximum number of {0}")]
    LimitReached(&'static str),
    #[error("document store error: {0}")]
    Backend(String),
}

/// Conjunction of field equalities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn owner(user_id: &str) -> Self {
        Self::default().eq(OWNER_FIELD, user_id)
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((field.to_string(), value.into()));
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.conditions
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v)
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.get(OWNER_FIELD).and_then(Value::as_str)
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.conditions.iter().map(|(f, v)| (f.as_str(), v))
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| doc.get(field) == Some(value))
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Sort descending by this field
    pub sort_desc: Option<&'static str>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn newest_first(field: &'static str, limit: usize) -> Self {
        Self {
            sort_desc: Some(field),
            limit: Some(limit),
        }
    }

    /// Order and truncate an unordered result set.
    pub fn apply(&self, mut docs: Vec<Document>) -> Vec<Document> {
        if let Some(field) = self.sort_desc {
            docs.sort_by(|a, b| compare_values(b.get(field), a.get(field)));
        }
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Liveness check.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<Document>, StoreError>;

    async fn insert(&self, collection: Collection, doc: Document) -> Result<(), StoreError>;

    /// Insert `doc` unless its owner already holds `max` documents in
    /// `collection`. Check and write are one atomic step; a full collection
    /// yields [`StoreError::LimitReached`].
    async fn insert_capped(
        &self,
        collection: Collection,
        doc: Document,
        max: u64,
    ) -> Result<(), StoreError>;

    /// Set `fields` on the documents matching `filter`; returns how many matched.
    /// With `upsert`, a missing document is created from the filter and fields.
    async fn update(
        &self,
        collection: Collection,
        filter: &Filter,
        fields: Document,
        upsert: bool,
    ) -> Result<u64, StoreError>;

    /// Returns how many documents were removed.
    async fn delete(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError>;

    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        let mut docs = self
            .find(
                collection,
                filter,
                FindOptions {
                    limit: Some(1),
                    ..FindOptions::default()
                },
            )
            .await?;
        Ok(docs.pop())
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError> {
        let docs = self.find(collection, filter, FindOptions::default()).await?;
        Ok(docs.len() as u64)
    }
}

/// Serialize a record into a store document.
pub fn to_document<T: serde::Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(StoreError::Backend("record is not a JSON object".to_string())),
        Err(e) => Err(StoreError::Backend(format!("failed to serialize record: {}", e))),
    }
}

/// Deserialize a store document into a record.
pub fn from_document<T: serde::de::DeserializeOwned>(doc: Document) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(doc))
        .map_err(|e| StoreError::Backend(format!("malformed document: {}", e)))
}
