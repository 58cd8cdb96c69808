use async_trait::async_trait;

use crate::{AggregateId, Document, Result, Version};

/// Storage engine holding aggregate documents.
///
/// All reads and writes go through a [`Transaction`]; nothing becomes
/// visible to other transactions before `commit`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    type Tx: Transaction;

    async fn begin(&self) -> Result<Self::Tx>;
}

/// A scoped unit of work against a [`DocumentStore`].
///
/// Dropping a transaction without calling [`Transaction::commit`] rolls back
/// every staged write. Documents loaded, found by key or written through a
/// transaction stay locked against other transactions until it ends.
#[async_trait]
pub trait Transaction: Send {
    async fn load(&mut self, id: AggregateId) -> Result<Option<Document>>;

    /// Finds the document currently registered under a lookup key.
    async fn find_by_key(&mut self, key: &str) -> Result<Option<Document>>;

    /// Lists every document carrying an index key.
    ///
    /// Listed documents are a snapshot and are not locked.
    async fn find_all_by_index(&mut self, key: &str) -> Result<Vec<Document>>;

    /// Writes `document`, replacing its lookup and index keys.
    ///
    /// Fails with `ConcurrencyConflict` unless the stored revision equals
    /// `document.version`. Returns the new revision.
    async fn put(&mut self, document: Document) -> Result<Version>;

    async fn delete(&mut self, id: AggregateId) -> Result<()>;

    async fn commit(self) -> Result<()>;
}
