use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

use bson::{Bson, Document};
use uuid::Uuid;

use super::{compare_bson, Condition, Direction, DocumentStore, Query, StoreError, ID_FIELD};

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    document: Document,
}

impl Entry {
    fn id(&self) -> Option<&str> {
        self.document.get_str(ID_FIELD).ok()
    }

    fn field(&self, name: &str) -> Bson {
        self.document.get(name).cloned().unwrap_or(Bson::Null)
    }
}

#[derive(Debug, Default)]
struct Collections {
    next_seq: u64,
    collections: HashMap<String, Vec<Entry>>,
}

/// Process local store keeping every collection in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

fn matches(entry: &Entry, filters: &[(String, Condition)]) -> bool {
    filters.iter().all(|(field, condition)| {
        let value = entry.field(field);
        match condition {
            Condition::Eq(expected) => compare_bson(&value, expected) == Ordering::Equal,
            Condition::Ne(expected) => compare_bson(&value, expected) != Ordering::Equal,
            Condition::In(values) => values
                .iter()
                .any(|it| compare_bson(&value, it) == Ordering::Equal),
            Condition::Gte(bound) => {
                same_kind(&value, bound) && compare_bson(&value, bound) != Ordering::Less
            }
            Condition::Lte(bound) => {
                same_kind(&value, bound) && compare_bson(&value, bound) != Ordering::Greater
            }
        }
    })
}

// Range conditions only match values of the bound's type, like MongoDB.
fn same_kind(a: &Bson, b: &Bson) -> bool {
    compare_bson(a, &Bson::Null) != Ordering::Equal
        && std::mem::discriminant(a) == std::mem::discriminant(b)
        || matches!(
            (a, b),
            (
                Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_),
                Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)
            )
        )
}

fn order_key(entry: &Entry, field: &str, other: &Entry) -> Ordering {
    compare_bson(&entry.field(field), &other.field(field)).then(entry.seq.cmp(&other.seq))
}

#[rocket::async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, mut document: Document) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        document.insert(ID_FIELD, id.clone());

        let mut inner = self.inner.lock().map_err(poisoned)?;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(Entry { seq, document });

        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let inner = self.inner.lock().map_err(poisoned)?;
        Ok(inner.collections.get(collection).and_then(|entries| {
            entries
                .iter()
                .find(|it| it.id() == Some(id))
                .map(|it| it.document.clone())
        }))
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let inner = self.inner.lock().map_err(poisoned)?;
        let entries = match inner.collections.get(collection) {
            Some(it) => it,
            None => return Ok(vec![]),
        };

        let mut selected: Vec<&Entry> = entries
            .iter()
            .filter(|it| matches(it, &query.filters))
            .collect();

        if let Some((field, direction)) = &query.order {
            selected.sort_by(|a, b| match direction {
                Direction::Ascending => order_key(a, field, b),
                Direction::Descending => order_key(b, field, a),
            });

            let cursor = query
                .start_after
                .as_deref()
                .and_then(|id| entries.iter().find(|it| it.id() == Some(id)));
            if let Some(cursor) = cursor {
                selected.retain(|it| match direction {
                    Direction::Ascending => order_key(it, field, cursor) == Ordering::Greater,
                    Direction::Descending => order_key(it, field, cursor) == Ordering::Less,
                });
            }
        } else if let Some(id) = &query.start_after {
            if let Some(position) = selected.iter().position(|it| it.id() == Some(id)) {
                selected.drain(..=position);
            }
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(selected
            .into_iter()
            .take(limit)
            .map(|it| it.document.clone())
            .collect())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Document,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().map_err(poisoned)?;
        let entry = inner
            .collections
            .get_mut(collection)
            .and_then(|entries| entries.iter_mut().find(|it| it.id() == Some(id)));

        match entry {
            Some(entry) => {
                for (key, value) in patch {
                    if key != ID_FIELD {
                        entry.document.insert(key, value);
                    }
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_many(
        &self,
        collection: &str,
        ids: &[String],
        patch: Document,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().map_err(poisoned)?;
        let mut updated = 0;
        if let Some(entries) = inner.collections.get_mut(collection) {
            for entry in entries.iter_mut() {
                let listed = entry
                    .id()
                    .map(|id| ids.iter().any(|it| it == id))
                    .unwrap_or(false);
                if listed {
                    for (key, value) in patch.iter() {
                        if key != ID_FIELD {
                            entry.document.insert(key.clone(), value.clone());
                        }
                    }
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().map_err(poisoned)?;
        Ok(match inner.collections.get_mut(collection) {
            Some(entries) => {
                let before = entries.len();
                entries.retain(|it| it.id() != Some(id));
                entries.len() != before
            }
            None => false,
        })
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Backend("in-memory store lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    async fn seeded() -> (MemoryStore, Vec<String>) {
        let store = MemoryStore::default();
        let mut ids = vec![];
        for (n, status) in ["new", "ongoing", "new", "new"].iter().enumerate() {
            let id = store
                .insert(
                    "requests",
                    doc! { "n": (n as i32), "status": (*status), "created_at": format!("2024-01-0{}", n + 1) },
                )
                .await
                .unwrap();
            ids.push(id);
        }
        (store, ids)
    }

    #[rocket::async_test]
    async fn find_filters_orders_and_limits() {
        let (store, ids) = seeded().await;

        let query = Query::new()
            .eq("status", "new")
            .order_by("created_at", Direction::Descending)
            .limit(2);
        let found = store.find("requests", &query).await.unwrap();

        let found_ids: Vec<&str> = found.iter().map(|it| it.get_str("id").unwrap()).collect();
        assert_eq!(found_ids, vec![ids[3].as_str(), ids[2].as_str()]);
    }

    #[rocket::async_test]
    async fn find_continues_after_cursor() {
        let (store, ids) = seeded().await;

        let query = Query::new()
            .order_by("created_at", Direction::Descending)
            .start_after(Some(ids[2].clone()));
        let found = store.find("requests", &query).await.unwrap();

        let found_ids: Vec<&str> = found.iter().map(|it| it.get_str("id").unwrap()).collect();
        assert_eq!(found_ids, vec![ids[1].as_str(), ids[0].as_str()]);
    }

    #[rocket::async_test]
    async fn unknown_cursor_is_ignored() {
        let (store, _) = seeded().await;

        let query = Query::new()
            .order_by("created_at", Direction::Ascending)
            .start_after(Some("missing".to_string()));
        assert_eq!(store.find("requests", &query).await.unwrap().len(), 4);
    }

    #[rocket::async_test]
    async fn update_merges_and_reports_missing() {
        let (store, ids) = seeded().await;

        assert!(store
            .update("requests", &ids[0], doc! { "status": "completed", "extra": 1 })
            .await
            .unwrap());
        assert!(!store
            .update("requests", "missing", doc! { "status": "x" })
            .await
            .unwrap());

        let updated = store.get("requests", &ids[0]).await.unwrap().unwrap();
        assert_eq!(updated.get_str("status").unwrap(), "completed");
        assert_eq!(updated.get_i32("n").unwrap(), 0);
        assert_eq!(updated.get_i32("extra").unwrap(), 1);
    }

    #[rocket::async_test]
    async fn update_many_touches_only_listed() {
        let (store, ids) = seeded().await;

        let updated = store
            .update_many("requests", &ids[1..3], doc! { "seen": true })
            .await
            .unwrap();
        assert_eq!(updated, 2);

        let seen = store
            .find("requests", &Query::new().eq("seen", true))
            .await
            .unwrap();
        assert_eq!(seen.len(), 2);
    }

    #[rocket::async_test]
    async fn range_filters_do_prefix_search() {
        let store = MemoryStore::default();
        for email in ["anna@x.com", "andy@x.com", "bob@x.com"] {
            store.insert("tutors", doc! { "email": email }).await.unwrap();
        }

        let query = Query::new()
            .gte("email", "an")
            .lte("email", "an\u{f8ff}");
        assert_eq!(store.find("tutors", &query).await.unwrap().len(), 2);
    }

    #[rocket::async_test]
    async fn any_of_matches_mixed_representations() {
        let store = MemoryStore::default();
        for seen in [Bson::Boolean(false), Bson::Int32(0), Bson::Int32(1), Bson::Boolean(true)] {
            store.insert("messages", doc! { "seen": seen }).await.unwrap();
        }
        store.insert("messages", doc! { "text": "no flag" }).await.unwrap();

        let query = Query::new().any_of(
            "seen",
            vec![Bson::Boolean(false), Bson::Int32(0), Bson::Null],
        );
        assert_eq!(store.find("messages", &query).await.unwrap().len(), 3);
    }

    #[rocket::async_test]
    async fn delete_removes_document() {
        let (store, ids) = seeded().await;
        assert!(store.delete("requests", &ids[0]).await.unwrap());
        assert!(!store.delete("requests", &ids[0]).await.unwrap());
        assert!(store.get("requests", &ids[0]).await.unwrap().is_none());
    }
}
