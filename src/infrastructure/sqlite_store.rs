use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::listeners::ListenerHub;
use crate::domain::document::{Document, Fields};
use crate::domain::store::{DocumentStore, Query, StoreError, Subscription};

/// Document store persisted in one SQLite table. Field maps are stored as
/// JSON; `seq` keeps insertion order for query ties.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: Arc<Pool<Sqlite>>,
    hub: Arc<ListenerHub>,
    // Serializes write + publish so listeners observe commit order.
    writes: Arc<Mutex<()>>,
}

impl SqliteDocumentStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url).map_err(backend)?.create_if_missing(true);
        let pool = if database_url.contains(":memory:") {
            // Every connection to :memory: is a separate database.
            SqlitePoolOptions::new().max_connections(1).idle_timeout(None::<Duration>).max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        }
        .connect_with(options)
        .await
        .map_err(backend)?;
        Ok(Self { pool: Arc::new(pool), hub: Arc::default(), writes: Arc::default() })
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                fields TEXT NOT NULL,
                UNIQUE (collection, id)
            )",
        )
        .execute(&*self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    pub fn active_listeners(&self) -> usize { self.hub.active() }

    async fn load(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query("SELECT id, fields FROM documents WHERE collection = ?1 ORDER BY seq")
            .bind(collection)
            .fetch_all(&*self.pool)
            .await
            .map_err(backend)?;
        Ok(rows.into_iter().filter_map(row_to_document).collect())
    }

    async fn fetch_fields(&self, collection: &str, id: &str) -> Result<Option<Fields>, StoreError> {
        let row = sqlx::query("SELECT id, fields FROM documents WHERE collection = ?1 AND id = ?2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(backend)?;
        Ok(row.and_then(row_to_document).map(|d| d.fields))
    }

    // The write is already committed; a failed reload surfaces on the listeners, not the writer.
    async fn publish(&self, collection: &str) {
        if !self.hub.watches(collection) { return; }
        match self.load(collection).await {
            Ok(docs) => self.hub.publish(collection, &docs),
            Err(e) => self.hub.fail(Some(collection), e),
        }
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let _guard = self.writes.lock().await;
        let id = Uuid::new_v4().simple().to_string();
        sqlx::query("INSERT INTO documents (collection, id, fields) VALUES (?1, ?2, ?3)")
            .bind(collection)
            .bind(&id)
            .bind(serde_json::to_string(&fields).map_err(backend)?)
            .execute(&*self.pool)
            .await
            .map_err(backend)?;
        debug!(collection, id = %id, "document added");
        self.publish(collection).await;
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.fetch_fields(collection, id).await?.map(|fields| Document::new(id, fields)))
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        let _guard = self.writes.lock().await;
        let Some(mut merged) = self.fetch_fields(collection, id).await? else {
            return Err(StoreError::NotFound { collection: collection.to_string(), id: id.to_string() });
        };
        merged.extend(fields);
        sqlx::query("UPDATE documents SET fields = ?3 WHERE collection = ?1 AND id = ?2")
            .bind(collection)
            .bind(id)
            .bind(serde_json::to_string(&merged).map_err(backend)?)
            .execute(&*self.pool)
            .await
            .map_err(backend)?;
        debug!(collection, id, "document updated");
        self.publish(collection).await;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let _guard = self.writes.lock().await;
        let result = sqlx::query("DELETE FROM documents WHERE collection = ?1 AND id = ?2")
            .bind(collection)
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(backend)?;
        let removed = result.rows_affected() > 0;
        if removed { self.publish(collection).await; }
        Ok(removed)
    }

    async fn listen(&self, query: Query) -> Result<Subscription, StoreError> {
        let _guard = self.writes.lock().await;
        let docs = self.load(&query.collection).await?;
        Ok(self.hub.register(query, docs))
    }
}

fn row_to_document(row: SqliteRow) -> Option<Document> {
    let id: String = row.get("id");
    let raw: String = row.get("fields");
    match serde_json::from_str::<Fields>(&raw) {
        Ok(fields) => Some(Document::new(id, fields)),
        Err(e) => {
            warn!(id = %id, error = %e, "skipping row with unreadable fields");
            None
        }
    }
}

fn backend<E: std::fmt::Display>(e: E) -> StoreError { StoreError::Backend(e.to_string()) }
