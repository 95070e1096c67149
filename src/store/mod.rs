//! Document store abstraction.
//!
//! Every handler talks to the database through [`Store`], a cheaply clonable
//! handle around a [`DocumentStore`] implementation. Production uses
//! [`mongo::MongoStore`]; tests and local runs use [`memory::MemoryStore`].
//!
//! Documents carry their id in an `id` field. Implementations generate the id
//! on insert and are responsible for mapping it onto their native key.

use std::cmp::Ordering;
use std::ops::Deref;
use std::sync::Arc;

use bson::{Bson, Document};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub mod memory;
pub mod mongo;

pub static ID_FIELD: &str = "id";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store failure: {0}")]
    Backend(String),

    #[error(transparent)]
    Decode(#[from] bson::de::Error),
    #[error(transparent)]
    Encode(#[from] bson::ser::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Bson),
    Ne(Bson),
    Gte(Bson),
    Lte(Bson),
    In(Vec<Bson>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<(String, Condition)>,
    pub order: Option<(String, Direction)>,
    /// Id of the document the result starts after, in `order`. Unknown ids are ignored.
    pub start_after: Option<String>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Query {
        Query::default()
    }

    pub fn eq(mut self, field: impl ToString, value: impl Into<Bson>) -> Query {
        self.filters
            .push((field.to_string(), Condition::Eq(value.into())));
        self
    }

    pub fn ne(mut self, field: impl ToString, value: impl Into<Bson>) -> Query {
        self.filters
            .push((field.to_string(), Condition::Ne(value.into())));
        self
    }

    pub fn gte(mut self, field: impl ToString, value: impl Into<Bson>) -> Query {
        self.filters
            .push((field.to_string(), Condition::Gte(value.into())));
        self
    }

    pub fn lte(mut self, field: impl ToString, value: impl Into<Bson>) -> Query {
        self.filters
            .push((field.to_string(), Condition::Lte(value.into())));
        self
    }

    /// Matches documents whose `field` equals any of `values`.
    pub fn any_of(mut self, field: impl ToString, values: Vec<Bson>) -> Query {
        self.filters
            .push((field.to_string(), Condition::In(values)));
        self
    }

    pub fn order_by(mut self, field: impl ToString, direction: Direction) -> Query {
        self.order = Some((field.to_string(), direction));
        self
    }

    pub fn start_after(mut self, id: Option<String>) -> Query {
        self.start_after = id;
        self
    }

    pub fn limit(mut self, limit: usize) -> Query {
        self.limit = Some(limit);
        self
    }
}

/// Minimal document database surface used by the back office.
#[rocket::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stores a new document and returns its generated id. Any `id` field in
    /// `document` is replaced.
    async fn insert(&self, collection: &str, document: Document) -> Result<String, StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Merges `patch` into an existing document. Returns `false` when there is
    /// no document with `id`.
    async fn update(&self, collection: &str, id: &str, patch: Document)
        -> Result<bool, StoreError>;

    /// Applies the same patch to every listed document as one batched write.
    async fn update_many(
        &self,
        collection: &str,
        ids: &[String],
        patch: Document,
    ) -> Result<u64, StoreError>;

    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;
}

#[derive(Clone)]
pub struct Store(Arc<dyn DocumentStore>);

impl Store {
    pub fn new(inner: impl DocumentStore + 'static) -> Store {
        Store(Arc::new(inner))
    }

    pub fn memory() -> Store {
        Store::new(memory::MemoryStore::default())
    }

    pub async fn insert_as<T: Serialize>(
        &self,
        collection: &str,
        value: &T,
    ) -> Result<String, StoreError> {
        self.0.insert(collection, bson::to_document(value)?).await
    }

    pub async fn get_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.0.get(collection, id).await? {
            Some(document) => Ok(Some(bson::from_document(document)?)),
            None => Ok(None),
        }
    }

    pub async fn find_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<T>, StoreError> {
        let documents = self.0.find(collection, query).await?;
        let mut result = Vec::with_capacity(documents.len());
        for document in documents {
            result.push(bson::from_document(document)?);
        }
        Ok(result)
    }

    pub async fn find_one_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        query: Query,
    ) -> Result<Option<T>, StoreError> {
        Ok(self
            .find_as(collection, &query.limit(1))
            .await?
            .into_iter()
            .next())
    }

    /// Serializes `patch` and merges it into the document.
    pub async fn update_with<T: Serialize>(
        &self,
        collection: &str,
        id: &str,
        patch: &T,
    ) -> Result<bool, StoreError> {
        self.0
            .update(collection, id, bson::to_document(patch)?)
            .await
    }
}

impl Deref for Store {
    type Target = dyn DocumentStore;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Store")
    }
}

fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::Null | Bson::Undefined => 0,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 1,
        Bson::String(_) | Bson::Symbol(_) => 2,
        Bson::Document(_) => 3,
        Bson::Array(_) => 4,
        Bson::Binary(_) => 5,
        Bson::ObjectId(_) => 6,
        Bson::Boolean(_) => 7,
        Bson::DateTime(_) => 8,
        Bson::Timestamp(_) => 9,
        _ => 10,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(it) => Some(*it as f64),
        Bson::Int64(it) => Some(*it as f64),
        Bson::Double(it) => Some(*it),
        _ => None,
    }
}

/// Total order over BSON values close to MongoDB's comparison order.
pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }

    match (a, b) {
        (Bson::String(a), Bson::String(b)) => a.cmp(b),
        (Bson::Boolean(a), Bson::Boolean(b)) => a.cmp(b),
        (Bson::DateTime(a), Bson::DateTime(b)) => a.cmp(b),
        (Bson::ObjectId(a), Bson::ObjectId(b)) => a.bytes().cmp(&b.bytes()),
        _ => match (as_f64(a), as_f64(b)) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}
