use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tokio::sync::broadcast;

use super::{
    server_timestamp, BatchOp, CollectionPath, DocPath, Document, DocumentStore, Fields, Query,
    StoreError, WriteBatch,
};
use crate::state::DbPool;

const CHANGE_CAPACITY: usize = 256;

/// SQLite implementation. One row per document, fields kept as JSON text.
pub struct SqliteDocumentStore {
    pool: DbPool,
    changes: broadcast::Sender<CollectionPath>,
}

impl SqliteDocumentStore {
    pub fn new(pool: DbPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self { pool, changes }
    }
}

fn load(conn: &Connection, path: &DocPath) -> Result<Option<Fields>, StoreError> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
            params![path.collection().as_str(), path.id()],
            |row| row.get(0),
        )
        .optional()?;

    match data {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

fn save(conn: &Connection, path: &DocPath, fields: &Fields) -> Result<(), StoreError> {
    let data = serde_json::to_string(fields)?;
    conn.execute(
        "INSERT INTO documents (collection, id, data)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(collection, id) DO UPDATE SET
           data = excluded.data,
           updated_at = datetime('now')",
        params![path.collection().as_str(), path.id(), data],
    )?;
    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let conn = self.pool.get()?;
        Ok(load(&conn, path)?.map(|fields| Document {
            id: path.id().to_string(),
            fields,
        }))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare("SELECT id, data FROM documents WHERE collection = ?1")?;
        let rows: Vec<(String, String)> = stmt
            .query_map(params![query.collection.as_str()], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut docs = Vec::with_capacity(rows.len());
        for (id, data) in rows {
            match serde_json::from_str::<Fields>(&data) {
                Ok(fields) => docs.push(Document { id, fields }),
                Err(e) => {
                    tracing::warn!(collection = %query.collection, %id, "Skipping corrupt document: {}", e)
                }
            }
        }

        Ok(query.apply(docs))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut conn = self.pool.get()?;
        let now = server_timestamp();
        let mut touched: Vec<CollectionPath> = Vec::new();

        // ATOMIC TRANSACTION - an early return drops `tx` and rolls back
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for op in batch.into_ops() {
            let collection = op.path().collection().clone();
            match op {
                BatchOp::Set(path, writes) => {
                    let mut fields = Fields::new();
                    writes.apply(&mut fields, &now);
                    save(&tx, &path, &fields)?;
                }
                BatchOp::Create(path, writes) => {
                    if load(&tx, &path)?.is_some() {
                        return Err(StoreError::AlreadyExists(path.to_string()));
                    }
                    let mut fields = Fields::new();
                    writes.apply(&mut fields, &now);
                    save(&tx, &path, &fields)?;
                }
                BatchOp::Update(path, writes) => {
                    let mut fields =
                        load(&tx, &path)?.ok_or_else(|| StoreError::NotFound(path.to_string()))?;
                    writes.apply(&mut fields, &now);
                    save(&tx, &path, &fields)?;
                }
                BatchOp::Delete(path) => {
                    tx.execute(
                        "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                        params![path.collection().as_str(), path.id()],
                    )?;
                }
            }
            if !touched.contains(&collection) {
                touched.push(collection);
            }
        }

        tx.commit()?;

        for collection in touched {
            // No receivers just means nobody is listening
            let _ = self.changes.send(collection);
        }
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<CollectionPath> {
        self.changes.subscribe()
    }
}
