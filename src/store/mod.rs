// Document store - JSON documents grouped by collection path, with
// snapshot subscriptions and all-or-nothing batched writes.
mod sqlite;
mod subscription;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

pub use self::sqlite::SqliteDocumentStore;
pub use self::subscription::{
    decode_all, subscribe, Subscription, SubscriptionSlot, TypedSubscription,
};

pub type Fields = serde_json::Map<String, Value>;

pub type SharedStore = Arc<dyn DocumentStore>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid document: {0}")]
    Invalid(String),
}

/// Generate a document id. UUID v7 keeps ids roughly time ordered.
pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Timestamp written for `FieldOp::ServerTimestamp`. Microsecond RFC 3339 in
/// UTC, so string order matches time order.
pub fn server_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

// --- Paths ---

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn doc(&self, id: impl Into<String>) -> DocPath {
        DocPath {
            collection: self.clone(),
            id: id.into(),
        }
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath {
    collection: CollectionPath,
    id: String,
}

impl DocPath {
    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Nested collection under this document, e.g. `posts/{id}/comments`.
    pub fn subcollection(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}/{}", self.collection, self.id, name))
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

// --- Documents ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Deserialize the document, exposing its id as an `id` field.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

// --- Field writes ---

#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Value(Value),
    ServerTimestamp,
    ArrayUnion(Vec<Value>),
    ArrayRemove(Vec<Value>),
    Increment(i64),
    Delete,
}

/// Ordered list of field writes applied to one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Writes(Vec<(String, FieldOp)>);

impl Writes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.op(field, FieldOp::Value(value.into()))
    }

    pub fn server_timestamp(self, field: impl Into<String>) -> Self {
        self.op(field, FieldOp::ServerTimestamp)
    }

    pub fn array_union(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.op(field, FieldOp::ArrayUnion(vec![value.into()]))
    }

    pub fn array_remove(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.op(field, FieldOp::ArrayRemove(vec![value.into()]))
    }

    pub fn increment(self, field: impl Into<String>, by: i64) -> Self {
        self.op(field, FieldOp::Increment(by))
    }

    pub fn delete_field(self, field: impl Into<String>) -> Self {
        self.op(field, FieldOp::Delete)
    }

    /// Plain writes for every field of a serializable struct. An `id` field
    /// is skipped since ids live in the path.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, StoreError> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(map
                .into_iter()
                .filter(|(k, _)| k != "id")
                .fold(Self::new(), |w, (k, v)| w.set(k, v))),
            other => Err(StoreError::Invalid(format!(
                "expected an object, got {}",
                other
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn op(mut self, field: impl Into<String>, op: FieldOp) -> Self {
        self.0.push((field.into(), op));
        self
    }

    pub(crate) fn apply(&self, fields: &mut Fields, now: &str) {
        for (name, op) in &self.0 {
            match op {
                FieldOp::Value(v) => {
                    fields.insert(name.clone(), v.clone());
                }
                FieldOp::ServerTimestamp => {
                    fields.insert(name.clone(), Value::String(now.to_string()));
                }
                FieldOp::ArrayUnion(values) => {
                    let mut items = take_array(fields, name);
                    for v in values {
                        if !items.contains(v) {
                            items.push(v.clone());
                        }
                    }
                    fields.insert(name.clone(), Value::Array(items));
                }
                FieldOp::ArrayRemove(values) => {
                    let mut items = take_array(fields, name);
                    items.retain(|item| !values.contains(item));
                    fields.insert(name.clone(), Value::Array(items));
                }
                FieldOp::Increment(by) => {
                    let current = fields.get(name).and_then(Value::as_i64).unwrap_or(0);
                    fields.insert(name.clone(), Value::from(current + by));
                }
                FieldOp::Delete => {
                    fields.remove(name);
                }
            }
        }
    }
}

// A non-array value is replaced, same as a missing field.
fn take_array(fields: &mut Fields, name: &str) -> Vec<Value> {
    match fields.remove(name) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

// --- Queries ---

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    NotEq(String, Value),
    ArrayContains(String, Value),
}

impl Filter {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Eq(field, value) => doc.get(field) == Some(value),
            Filter::NotEq(field, value) => doc.get(field).is_some_and(|v| v != value),
            Filter::ArrayContains(field, value) => doc
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: CollectionPath,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.into(), value.into()));
        self
    }

    pub fn where_not_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::NotEq(field.into(), value.into()));
        self
    }

    pub fn where_array_contains(
        mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.filters
            .push(Filter::ArrayContains(field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Filter, order and truncate the documents of the queried collection.
    /// Documents without the order-by field are left out. Ties fall back to
    /// id order.
    pub fn apply(&self, docs: Vec<Document>) -> Vec<Document> {
        let mut docs: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();

        if let Some((field, direction)) = &self.order_by {
            docs.retain(|d| d.get(field).is_some_and(|v| !v.is_null()));
            docs.sort_by(|a, b| {
                let ord = compare_values(&a.fields[field.as_str()], &b.fields[field.as_str()])
                    .then_with(|| a.id.cmp(&b.id));
                match direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

// --- Batches ---

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Set(DocPath, Writes),
    Create(DocPath, Writes),
    Update(DocPath, Writes),
    Delete(DocPath),
}

impl BatchOp {
    pub fn path(&self) -> &DocPath {
        match self {
            BatchOp::Set(p, _) | BatchOp::Create(p, _) | BatchOp::Update(p, _) => p,
            BatchOp::Delete(p) => p,
        }
    }
}

/// Writes applied by `DocumentStore::commit` as a single unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: DocPath, writes: Writes) -> &mut Self {
        self.ops.push(BatchOp::Set(path, writes));
        self
    }

    pub fn create(&mut self, path: DocPath, writes: Writes) -> &mut Self {
        self.ops.push(BatchOp::Create(path, writes));
        self
    }

    pub fn update(&mut self, path: DocPath, writes: Writes) -> &mut Self {
        self.ops.push(BatchOp::Update(path, writes));
        self
    }

    pub fn delete(&mut self, path: DocPath) -> &mut Self {
        self.ops.push(BatchOp::Delete(path));
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

impl From<BatchOp> for WriteBatch {
    fn from(op: BatchOp) -> Self {
        Self { ops: vec![op] }
    }
}

/// Store trait - everything the app needs from the document backend.
///
/// Single-document writes are one-operation batches, so every write goes
/// through `commit` and shows up on `changes`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load one document
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError>;

    /// Run a query against one collection
    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Apply every operation of the batch, or none of them
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Collection paths touched by each committed batch
    fn changes(&self) -> broadcast::Receiver<CollectionPath>;

    /// Replace the document with the given fields
    async fn set(&self, path: &DocPath, writes: Writes) -> Result<(), StoreError> {
        self.commit(BatchOp::Set(path.clone(), writes).into()).await
    }

    /// Insert the document; fails with `AlreadyExists` if present
    async fn create(&self, path: &DocPath, writes: Writes) -> Result<(), StoreError> {
        self.commit(BatchOp::Create(path.clone(), writes).into())
            .await
    }

    /// Insert a document under a generated id
    async fn add(&self, collection: &CollectionPath, writes: Writes) -> Result<DocPath, StoreError> {
        let path = collection.doc(new_id());
        self.create(&path, writes).await?;
        Ok(path)
    }

    /// Merge writes into an existing document; fails with `NotFound` if absent
    async fn update(&self, path: &DocPath, writes: Writes) -> Result<(), StoreError> {
        self.commit(BatchOp::Update(path.clone(), writes).into())
            .await
    }

    /// Remove the document (no-op when absent)
    async fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        self.commit(BatchOp::Delete(path.clone()).into()).await
    }
}
