use bson::doc;

use super::{AdminNotification, NotificationUpdateData, NOTIFICATION_COLLECTION_NAME};
use crate::store::{Direction, Query, Store, StoreError};
use crate::util;

pub trait NotificationDbExt {
    /// Newest first, optionally only seen or unseen entries.
    async fn list_notifications(
        &self,
        limit: usize,
        seen: Option<bool>,
    ) -> Result<Vec<AdminNotification>, StoreError>;

    async fn create_notification(
        &self,
        notification: &AdminNotification,
    ) -> Result<String, StoreError>;

    async fn update_notification(
        &self,
        id: &str,
        update: &NotificationUpdateData,
    ) -> Result<bool, StoreError>;

    async fn delete_notification(&self, id: &str) -> Result<bool, StoreError>;

    /// Marks every unseen notification seen in one batched write.
    async fn mark_all_notifications_seen(&self) -> Result<u64, StoreError>;
}

impl NotificationDbExt for Store {
    async fn list_notifications(
        &self,
        limit: usize,
        seen: Option<bool>,
    ) -> Result<Vec<AdminNotification>, StoreError> {
        let mut query = Query::new();
        if let Some(seen) = seen {
            let values = if seen {
                util::set_flag_values()
            } else {
                util::unset_flag_values()
            };
            query = query.any_of("seen", values);
        }
        let query = query
            .order_by("createdAt", Direction::Descending)
            .limit(limit);

        self.find_as(NOTIFICATION_COLLECTION_NAME, &query).await
    }

    async fn create_notification(
        &self,
        notification: &AdminNotification,
    ) -> Result<String, StoreError> {
        let id = self
            .insert_as(NOTIFICATION_COLLECTION_NAME, notification)
            .await?;
        tracing::debug!("created {} notification {}", notification.kind, id);
        Ok(id)
    }

    async fn update_notification(
        &self,
        id: &str,
        update: &NotificationUpdateData,
    ) -> Result<bool, StoreError> {
        let mut patch = bson::to_document(update)?;
        patch.insert("updatedAt", util::now_string());
        self.update(NOTIFICATION_COLLECTION_NAME, id, patch).await
    }

    async fn delete_notification(&self, id: &str) -> Result<bool, StoreError> {
        self.delete(NOTIFICATION_COLLECTION_NAME, id).await
    }

    async fn mark_all_notifications_seen(&self) -> Result<u64, StoreError> {
        let unseen: Vec<AdminNotification> = self
            .find_as(
                NOTIFICATION_COLLECTION_NAME,
                &Query::new().any_of("seen", util::unset_flag_values()),
            )
            .await?;
        let ids: Vec<String> = unseen.into_iter().map(|it| it.id).collect();

        self.update_many(
            NOTIFICATION_COLLECTION_NAME,
            &ids,
            doc! { "seen": true, "updatedAt": util::now_string() },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::data::notification::NotificationCreateData;

    async fn seed(store: &Store, count: usize) -> Vec<String> {
        let start = Utc::now() - Duration::hours(1);
        let mut ids = vec![];
        for n in 0..count {
            let notification = NotificationCreateData {
                kind: Some("chat_message".to_string()),
                request_id: Some(format!("r{}", n)),
                sender_type: Some("tutor".to_string()),
                sender_id: Some("t1".to_string()),
                message: Some(format!("m{}", n)),
                ..Default::default()
            }
            .into_notification(start + Duration::minutes(n as i64))
            .unwrap();
            ids.push(store.create_notification(&notification).await.unwrap());
        }
        ids
    }

    #[rocket::async_test]
    async fn feed_is_newest_first_and_filters_seen() {
        let store = Store::memory();
        let ids = seed(&store, 3).await;

        let feed = store.list_notifications(2, None).await.unwrap();
        let messages: Vec<&str> = feed.iter().map(|it| it.message.as_str()).collect();
        assert_eq!(messages, vec!["m2", "m1"]);

        let update = NotificationUpdateData {
            seen: Some(true),
            ..Default::default()
        };
        assert!(store.update_notification(&ids[0], &update).await.unwrap());
        assert!(!store.update_notification("missing", &update).await.unwrap());

        let seen = store.list_notifications(50, Some(true)).await.unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, ids[0]);
        assert_eq!(store.list_notifications(50, Some(false)).await.unwrap().len(), 2);
    }

    #[rocket::async_test]
    async fn mark_all_seen_counts_only_unseen() {
        let store = Store::memory();
        let ids = seed(&store, 3).await;
        store
            .update_notification(
                &ids[1],
                &NotificationUpdateData {
                    seen: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(store.mark_all_notifications_seen().await.unwrap(), 2);
        assert!(store
            .list_notifications(50, Some(false))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.mark_all_notifications_seen().await.unwrap(), 0);
    }

    #[rocket::async_test]
    async fn integer_seen_flags_are_filtered() {
        let store = Store::memory();
        for (message, seen) in [("read", 1), ("unread", 0)] {
            store
                .insert(
                    NOTIFICATION_COLLECTION_NAME,
                    doc! {
                        "type": "chat_message",
                        "message": message,
                        "seen": seen,
                        "createdAt": util::now_string(),
                        "updatedAt": util::now_string(),
                    },
                )
                .await
                .unwrap();
        }

        let unseen = store.list_notifications(50, Some(false)).await.unwrap();
        assert_eq!(unseen.len(), 1);
        assert_eq!(unseen[0].message, "unread");
        assert_eq!(store.list_notifications(50, Some(true)).await.unwrap().len(), 1);
        assert_eq!(store.mark_all_notifications_seen().await.unwrap(), 1);
    }
}
