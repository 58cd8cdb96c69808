use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, Document, Result, StoreError, Version,
    store::{DocumentStore, Transaction},
};

/// PostgreSQL-backed document store.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        Ok(PostgresTransaction {
            tx: self.pool.begin().await?,
        })
    }
}

/// Open database transaction. Rows read through it are locked with
/// `FOR UPDATE`; dropping it rolls back.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    async fn row_to_document(&mut self, row: PgRow) -> Result<Document> {
        let aggregate_id: Uuid = row.try_get("aggregate_id")?;
        let lookup_keys: Vec<String> = sqlx::query_scalar(
            "SELECT lookup_key FROM order_lookup_keys WHERE aggregate_id = $1 ORDER BY lookup_key",
        )
        .bind(aggregate_id)
        .fetch_all(&mut *self.tx)
        .await?;
        let index_keys: Vec<String> = sqlx::query_scalar(
            "SELECT index_key FROM order_index_entries WHERE aggregate_id = $1 ORDER BY index_key",
        )
        .bind(aggregate_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(Document {
            aggregate_id: AggregateId::from_uuid(aggregate_id),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            updated_at: row.try_get("updated_at")?,
            state: row.try_get("state")?,
            lookup_keys,
            index_keys,
        })
    }

    async fn stored_version(&mut self, id: AggregateId) -> Result<Version> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM order_documents WHERE aggregate_id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(version.map(Version::new).unwrap_or(Version::initial()))
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn load(&mut self, id: AggregateId) -> Result<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT aggregate_id, aggregate_type, version, updated_at, state
            FROM order_documents
            WHERE aggregate_id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_document(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_key(&mut self, key: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT d.aggregate_id, d.aggregate_type, d.version, d.updated_at, d.state
            FROM order_documents d
            JOIN order_lookup_keys k ON k.aggregate_id = d.aggregate_id
            WHERE k.lookup_key = $1
            FOR UPDATE OF d
            "#,
        )
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_document(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_all_by_index(&mut self, key: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT d.aggregate_id, d.aggregate_type, d.version, d.updated_at, d.state
            FROM order_documents d
            JOIN order_index_entries i ON i.aggregate_id = d.aggregate_id
            WHERE i.index_key = $1
            "#,
        )
        .bind(key)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            documents.push(self.row_to_document(row).await?);
        }
        Ok(documents)
    }

    async fn put(&mut self, document: Document) -> Result<Version> {
        let id = document.aggregate_id;
        let expected = document.version;
        let version = expected.next();

        let written = if expected == Version::initial() {
            sqlx::query(
                r#"
                INSERT INTO order_documents (aggregate_id, aggregate_type, version, updated_at, state)
                VALUES ($1, $2, $3, NOW(), $4)
                ON CONFLICT (aggregate_id) DO NOTHING
                "#,
            )
            .bind(id.as_uuid())
            .bind(&document.aggregate_type)
            .bind(version.as_i64())
            .bind(&document.state)
            .execute(&mut *self.tx)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE order_documents
                SET version = $3, updated_at = NOW(), state = $4
                WHERE aggregate_id = $1 AND version = $2
                "#,
            )
            .bind(id.as_uuid())
            .bind(expected.as_i64())
            .bind(version.as_i64())
            .bind(&document.state)
            .execute(&mut *self.tx)
            .await?
        };

        if written.rows_affected() == 0 {
            let actual = self.stored_version(id).await?;
            metrics::counter!("store_conflicts_total").increment(1);
            return Err(StoreError::ConcurrencyConflict {
                aggregate_id: id,
                expected,
                actual,
            });
        }

        sqlx::query("DELETE FROM order_lookup_keys WHERE aggregate_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        for key in &document.lookup_keys {
            sqlx::query(
                r#"
                INSERT INTO order_lookup_keys (lookup_key, aggregate_id)
                VALUES ($1, $2)
                ON CONFLICT (lookup_key) DO UPDATE SET aggregate_id = EXCLUDED.aggregate_id
                "#,
            )
            .bind(key)
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        }

        sqlx::query("DELETE FROM order_index_entries WHERE aggregate_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        for key in &document.index_keys {
            sqlx::query("INSERT INTO order_index_entries (index_key, aggregate_id) VALUES ($1, $2)")
                .bind(key)
                .bind(id.as_uuid())
                .execute(&mut *self.tx)
                .await?;
        }

        Ok(version)
    }

    async fn delete(&mut self, id: AggregateId) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM order_documents WHERE aggregate_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
