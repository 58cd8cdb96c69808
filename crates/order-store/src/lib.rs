pub mod document;
pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::AggregateId;
pub use document::Document;
pub use error::{Result, StoreError};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, MissingField, Version};
pub use memory::{InMemoryDocumentStore, InMemoryTransaction};
pub use postgres::{PostgresDocumentStore, PostgresTransaction};
pub use store::{DocumentStore, Transaction};
