use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    AggregateId, Document, Result, StoreError, Version,
    store::{DocumentStore, Transaction},
};

#[derive(Debug, Default)]
struct Tables {
    documents: HashMap<AggregateId, Document>,
    keys: HashMap<String, AggregateId>,
    indexes: HashMap<String, BTreeSet<AggregateId>>,
    locks: HashMap<AggregateId, Arc<Mutex<()>>>,
}

impl Tables {
    fn remove(&mut self, id: AggregateId) -> Option<Document> {
        let removed = self.documents.remove(&id)?;
        for key in &removed.lookup_keys {
            if self.keys.get(key) == Some(&id) {
                self.keys.remove(key);
            }
        }
        for key in &removed.index_keys {
            if let Some(ids) = self.indexes.get_mut(key) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.indexes.remove(key);
                }
            }
        }
        Some(removed)
    }

    fn insert(&mut self, document: Document) {
        self.remove(document.aggregate_id);
        for key in &document.lookup_keys {
            self.keys.insert(key.clone(), document.aggregate_id);
        }
        for key in &document.index_keys {
            self.indexes
                .entry(key.clone())
                .or_default()
                .insert(document.aggregate_id);
        }
        self.documents.insert(document.aggregate_id, document);
    }

    fn lock_for(&mut self, id: AggregateId) -> Arc<Mutex<()>> {
        self.locks.entry(id).or_default().clone()
    }
}

/// In-memory document store for tests and single-process deployments.
///
/// Every document has its own lock. A transaction takes it on the first
/// load, key lookup, put or delete of that document and keeps it until the
/// transaction is committed or dropped, the same way a `FOR UPDATE` row
/// lock behaves. Transactions touching different orders never wait for
/// each other, even while one of them is waiting on a payment gateway.
/// The shared tables are only locked for the length of a single read or
/// for applying a commit.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed copy of a document, read outside any transaction.
    pub async fn document(&self, id: AggregateId) -> Option<Document> {
        self.tables.lock().await.documents.get(&id).cloned()
    }

    pub async fn document_count(&self) -> usize {
        self.tables.lock().await.documents.len()
    }

    pub async fn clear(&self) {
        let mut tables = self.tables.lock().await;
        tables.documents.clear();
        tables.keys.clear();
        tables.indexes.clear();
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        Ok(InMemoryTransaction {
            tables: self.tables.clone(),
            held: HashMap::new(),
            staged: HashMap::new(),
        })
    }
}

/// Document locks held and writes staged by an open in-memory transaction.
/// A `None` write marks a delete.
pub struct InMemoryTransaction {
    tables: Arc<Mutex<Tables>>,
    held: HashMap<AggregateId, OwnedMutexGuard<()>>,
    staged: HashMap<AggregateId, Option<Document>>,
}

impl InMemoryTransaction {
    async fn lock(&mut self, id: AggregateId) {
        if self.held.contains_key(&id) {
            return;
        }
        // The table lock must be released before waiting on the document.
        let lock = self.tables.lock().await.lock_for(id);
        let guard = lock.lock_owned().await;
        self.held.insert(id, guard);
    }

    async fn current(&self, id: AggregateId) -> Option<Document> {
        match self.staged.get(&id) {
            Some(staged) => staged.clone(),
            None => self.tables.lock().await.documents.get(&id).cloned(),
        }
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn load(&mut self, id: AggregateId) -> Result<Option<Document>> {
        self.lock(id).await;
        Ok(self.current(id).await)
    }

    async fn find_by_key(&mut self, key: &str) -> Result<Option<Document>> {
        let staged = self
            .staged
            .values()
            .flatten()
            .find(|doc| doc.has_key(key))
            .cloned();
        if staged.is_some() {
            return Ok(staged);
        }

        loop {
            let Some(id) = self.tables.lock().await.keys.get(key).copied() else {
                return Ok(None);
            };
            self.lock(id).await;
            // The key may have moved while waiting for the document.
            if self.tables.lock().await.keys.get(key) != Some(&id) {
                continue;
            }
            // A staged write may have dropped the key or the document.
            return Ok(self.current(id).await.filter(|doc| doc.has_key(key)));
        }
    }

    async fn find_all_by_index(&mut self, key: &str) -> Result<Vec<Document>> {
        let mut found: HashMap<AggregateId, Document> = {
            let tables = self.tables.lock().await;
            tables
                .indexes
                .get(key)
                .into_iter()
                .flatten()
                .filter_map(|id| tables.documents.get(id))
                .map(|doc| (doc.aggregate_id, doc.clone()))
                .collect()
        };
        for (id, staged) in &self.staged {
            match staged {
                Some(doc) if doc.has_index(key) => {
                    found.insert(*id, doc.clone());
                }
                _ => {
                    found.remove(id);
                }
            }
        }
        Ok(found.into_values().collect())
    }

    async fn put(&mut self, mut document: Document) -> Result<Version> {
        let id = document.aggregate_id;
        self.lock(id).await;
        let actual = self
            .current(id)
            .await
            .map(|doc| doc.version)
            .unwrap_or(Version::initial());

        if actual != document.version {
            return Err(StoreError::ConcurrencyConflict {
                aggregate_id: id,
                expected: document.version,
                actual,
            });
        }

        let version = actual.next();
        document.version = version;
        document.updated_at = Utc::now();
        self.staged.insert(id, Some(document));
        Ok(version)
    }

    async fn delete(&mut self, id: AggregateId) -> Result<()> {
        self.lock(id).await;
        if self.current(id).await.is_none() {
            return Err(StoreError::NotFound(id));
        }
        self.staged.insert(id, None);
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        let writes = staged.len();
        {
            let mut tables = self.tables.lock().await;
            for (id, document) in staged {
                match document {
                    Some(document) => tables.insert(document),
                    None => {
                        tables.remove(id);
                    }
                }
            }
        }
        tracing::debug!(writes, "in-memory transaction committed");
        Ok(())
    }
}
