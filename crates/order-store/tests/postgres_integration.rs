//! PostgreSQL document store tests.
//!
//! They start a shared PostgreSQL container and need a Docker daemon:
//!
//! ```bash
//! cargo test -p order-store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use order_store::{
    AggregateId, Document, DocumentStore, PostgresDocumentStore, StoreError, Transaction, Version,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_order_documents.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/002_create_order_index_entries.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresDocumentStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_index_entries, order_lookup_keys, order_documents")
        .execute(&pool)
        .await
        .unwrap();

    PostgresDocumentStore::new(pool)
}

fn order_doc(id: AggregateId, version: Version, keys: &[&str]) -> Document {
    Document::from_state(
        id,
        "Order",
        version,
        &serde_json::json!({"status": "DRAFT", "subTotal": 45000}),
    )
    .unwrap()
    .with_lookup_keys(keys.iter().map(|k| k.to_string()))
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
#[serial]
async fn put_and_load_document() {
    let store = get_test_store().await;
    let id = AggregateId::new();

    let mut tx = store.begin().await.unwrap();
    let version = tx
        .put(order_doc(id, Version::initial(), &["draft:c1:r1"]))
        .await
        .unwrap();
    assert_eq!(version, Version::new(1));
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let loaded = tx.load(id).await.unwrap().unwrap();
    assert_eq!(loaded.version, Version::new(1));
    assert_eq!(loaded.state["subTotal"], 45000);
    assert_eq!(loaded.lookup_keys, vec!["draft:c1:r1".to_string()]);

    let by_key = tx.find_by_key("draft:c1:r1").await.unwrap().unwrap();
    assert_eq!(by_key.aggregate_id, id);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
#[serial]
async fn uncommitted_transaction_is_rolled_back() {
    let store = get_test_store().await;
    let id = AggregateId::new();

    {
        let mut tx = store.begin().await.unwrap();
        tx.put(order_doc(id, Version::initial(), &[])).await.unwrap();
    }

    let mut tx = store.begin().await.unwrap();
    assert!(tx.load(id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
#[serial]
async fn stale_write_is_a_conflict() {
    let store = get_test_store().await;
    let id = AggregateId::new();

    let mut tx = store.begin().await.unwrap();
    tx.put(order_doc(id, Version::initial(), &[])).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let result = tx.put(order_doc(id, Version::initial(), &[])).await;
    assert!(matches!(
        result,
        Err(StoreError::ConcurrencyConflict { actual, .. }) if actual == Version::new(1)
    ));
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
#[serial]
async fn save_replaces_lookup_keys_and_delete_cascades() {
    let store = get_test_store().await;
    let id = AggregateId::new();

    let mut tx = store.begin().await.unwrap();
    tx.put(order_doc(id, Version::initial(), &["draft:c1:r1"]))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    tx.put(order_doc(id, Version::new(1), &["paypal-order:PO-1"]))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert!(tx.find_by_key("draft:c1:r1").await.unwrap().is_none());
    assert!(tx.find_by_key("paypal-order:PO-1").await.unwrap().is_some());
    tx.delete(id).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert!(tx.find_by_key("paypal-order:PO-1").await.unwrap().is_none());
    assert!(matches!(tx.delete(id).await, Err(StoreError::NotFound(_))));
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
#[serial]
async fn index_lists_documents_and_follows_rewrites() {
    let store = get_test_store().await;
    let first = AggregateId::new();
    let second = AggregateId::new();

    let mut tx = store.begin().await.unwrap();
    for id in [first, second] {
        let doc = order_doc(id, Version::initial(), &[]).with_index_keys([
            "restaurant:r1".to_string(),
            format!("customer:{id}"),
        ]);
        tx.put(doc).await.unwrap();
    }
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let listed = tx.find_all_by_index("restaurant:r1").await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|doc| doc.has_index("restaurant:r1")));

    tx.put(order_doc(first, Version::new(1), &[])).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let listed = tx.find_all_by_index("restaurant:r1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].aggregate_id, second);
    assert!(
        tx.find_all_by_index(&format!("customer:{first}"))
            .await
            .unwrap()
            .is_empty()
    );
}
