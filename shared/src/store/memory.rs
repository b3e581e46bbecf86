use super::{Collection, Document, DocumentStore, Filter, FindOptions, StoreError, OWNER_FIELD};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// In-process document store with the same semantics as [`super::DynamoStore`].
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<Collection, Vec<Document>>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: while unavailable every operation fails.
    pub fn set_available(&self, available: bool) {
        self.offline.store(!available, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Collection, Vec<Document>>>, StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("memory store is offline".to_string()));
        }
        self.collections
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

fn require_owner(collection: Collection, filter: &Filter) -> Result<(), StoreError> {
    match filter.owner_id() {
        Some(_) => Ok(()),
        None => Err(StoreError::MissingOwner(collection.name())),
    }
}

fn push_unique(docs: &mut Vec<Document>, collection: Collection, doc: Document) -> Result<(), StoreError> {
    if !doc.contains_key(OWNER_FIELD) {
        return Err(StoreError::MissingField(collection.name(), OWNER_FIELD));
    }

    let duplicate = match collection.id_field() {
        Some(id_field) => {
            let id = doc
                .get(id_field)
                .ok_or(StoreError::MissingField(collection.name(), id_field))?;
            docs.iter().any(|d| d.get(id_field) == Some(id))
        }
        None => docs.iter().any(|d| d.get(OWNER_FIELD) == doc.get(OWNER_FIELD)),
    };
    if duplicate {
        return Err(StoreError::Duplicate(collection.name()));
    }

    docs.push(doc);
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }

    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        require_owner(collection, filter)?;
        let guard = self.lock()?;
        let docs = guard
            .get(&collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default();
        Ok(options.apply(docs))
    }

    async fn insert(&self, collection: Collection, doc: Document) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        push_unique(guard.entry(collection).or_default(), collection, doc)
    }

    async fn insert_capped(
        &self,
        collection: Collection,
        doc: Document,
        max: u64,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let docs = guard.entry(collection).or_default();
        let owned = docs
            .iter()
            .filter(|d| d.get(OWNER_FIELD).is_some() && d.get(OWNER_FIELD) == doc.get(OWNER_FIELD))
            .count() as u64;
        if owned >= max {
            return Err(StoreError::LimitReached(collection.name()));
        }
        push_unique(docs, collection, doc)
    }

    async fn update(
        &self,
        collection: Collection,
        filter: &Filter,
        fields: Document,
        upsert: bool,
    ) -> Result<u64, StoreError> {
        require_owner(collection, filter)?;
        let mut guard = self.lock()?;
        let docs = guard.entry(collection).or_default();

        let mut matched = 0;
        for doc in docs.iter_mut().filter(|d| filter.matches(d)) {
            for (key, value) in &fields {
                doc.insert(key.clone(), value.clone());
            }
            matched += 1;
        }

        if matched == 0 && upsert {
            let mut doc = Document::new();
            for (field, value) in filter.conditions() {
                doc.insert(field.to_string(), value.clone());
            }
            doc.extend(fields);
            docs.push(doc);
        }

        Ok(matched)
    }

    async fn delete(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError> {
        require_owner(collection, filter)?;
        let mut guard = self.lock()?;
        let docs = guard.entry(collection).or_default();
        let before = docs.len();
        docs.retain(|d| !filter.matches(d));
        Ok((before - docs.len()) as u64)
    }
}
