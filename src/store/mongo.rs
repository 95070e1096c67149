use bson::{doc, Bson, Document};
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};
use rocket::futures::TryStreamExt;
use uuid::Uuid;

use super::{Condition, Direction, DocumentStore, Query, StoreError, ID_FIELD};

static MONGO_ID: &str = "_id";

/// [`DocumentStore`] backed by a MongoDB database. Document ids are stored as
/// string `_id` values.
#[derive(Debug, Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> MongoStore {
        MongoStore { db }
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }
}

fn field_name(field: &str) -> &str {
    if field == ID_FIELD {
        MONGO_ID
    } else {
        field
    }
}

fn by_id(id: &str) -> Document {
    doc! { MONGO_ID: id }
}

fn from_mongo(mut document: Document) -> Document {
    if let Some(id) = document.remove(MONGO_ID) {
        let id = match id {
            Bson::String(it) => it,
            Bson::ObjectId(it) => it.to_hex(),
            other => other.to_string(),
        };
        document.insert(ID_FIELD, id);
    }
    document
}

fn to_patch(mut patch: Document) -> Document {
    patch.remove(ID_FIELD);
    patch.remove(MONGO_ID);
    doc! { "$set": patch }
}

fn filter_document(filters: &[(String, Condition)]) -> Document {
    let mut filter = Document::new();
    for (field, condition) in filters {
        let field = field_name(field).to_string();
        let (operator, value) = match condition {
            Condition::Eq(value) => {
                filter.insert(field, value.clone());
                continue;
            }
            Condition::In(values) => {
                filter.insert(field, doc! { "$in": values.clone() });
                continue;
            }
            Condition::Ne(value) => ("$ne", value),
            Condition::Gte(value) => ("$gte", value),
            Condition::Lte(value) => ("$lte", value),
        };

        match filter.get_mut(&field) {
            Some(Bson::Document(existing)) => {
                existing.insert(operator, value.clone());
            }
            _ => {
                filter.insert(field, doc! { operator: value.clone() });
            }
        }
    }
    filter
}

impl MongoStore {
    /// Restricts `filter` to documents ordered after the cursor document.
    async fn apply_cursor(
        &self,
        collection: &str,
        query: &Query,
        filter: &mut Document,
    ) -> Result<(), StoreError> {
        let (id, (field, direction)) = match (&query.start_after, &query.order) {
            (Some(id), Some(order)) => (id, order),
            _ => return Ok(()),
        };

        let cursor = match self.collection(collection).find_one(by_id(id), None).await? {
            Some(it) => it,
            None => {
                tracing::debug!("cursor document {} not found, ignoring", id);
                return Ok(());
            }
        };

        let field = field_name(field);
        let value = cursor.get(field).cloned().unwrap_or(Bson::Null);
        let operator = match direction {
            Direction::Ascending => "$gt",
            Direction::Descending => "$lt",
        };

        let after = doc! {
            "$or": [
                { field: { operator: value.clone() } },
                { field: value, MONGO_ID: { operator: id.as_str() } },
            ]
        };

        let existing = std::mem::take(filter);
        *filter = if existing.is_empty() {
            after
        } else {
            doc! { "$and": [existing, after] }
        };
        Ok(())
    }
}

#[rocket::async_trait]
impl DocumentStore for MongoStore {
    async fn insert(&self, collection: &str, mut document: Document) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        document.remove(ID_FIELD);
        document.insert(MONGO_ID, id.clone());

        self.collection(collection).insert_one(document, None).await?;
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .collection(collection)
            .find_one(by_id(id), None)
            .await?
            .map(from_mongo))
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut filter = filter_document(&query.filters);
        self.apply_cursor(collection, query, &mut filter).await?;

        let mut options = FindOptions::default();
        if let Some((field, direction)) = &query.order {
            let order = match direction {
                Direction::Ascending => 1,
                Direction::Descending => -1,
            };
            options.sort = Some(doc! { field_name(field): order, MONGO_ID: order });
        }
        options.limit = query.limit.map(|it| it as i64);

        let documents: Vec<Document> = self
            .collection(collection)
            .find(filter, options)
            .await?
            .try_collect()
            .await?;

        Ok(documents.into_iter().map(from_mongo).collect())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Document,
    ) -> Result<bool, StoreError> {
        let result = self
            .collection(collection)
            .update_one(by_id(id), to_patch(patch), None)
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn update_many(
        &self,
        collection: &str,
        ids: &[String],
        patch: Document,
    ) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = self
            .collection(collection)
            .update_many(doc! { MONGO_ID: { "$in": ids.to_vec() } }, to_patch(patch), None)
            .await?;
        Ok(result.modified_count)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let result = self
            .collection(collection)
            .delete_one(by_id(id), None)
            .await?;
        Ok(result.deleted_count > 0)
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(e: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        let message = e.to_string();
        match e.kind.as_ref() {
            ErrorKind::Authentication { .. } => StoreError::PermissionDenied(message),
            ErrorKind::Command(command) if command.code == 13 => {
                StoreError::PermissionDenied(message)
            }
            ErrorKind::DnsResolve { .. }
            | ErrorKind::ServerSelection { .. }
            | ErrorKind::ConnectionPoolCleared { .. }
            | ErrorKind::Io(_) => StoreError::Unavailable(message),
            _ => StoreError::Backend(message),
        }
    }
}
