use bson::doc;
use chrono::Utc;

use super::{
    RoomView, SupportMessage, SupportRoom, ROOM_COLLECTION_NAME, SUPPORT_MESSAGE_COLLECTION_NAME,
};
use crate::data::account::db::AccountDbExt;
use crate::data::account::{Account, AccountResponse};
use crate::data::chat::MessageType;
use crate::role::Role;
use crate::store::{Direction, Query, Store, StoreError};
use crate::util;

pub trait SupportDbExt {
    async fn get_room(&self, id: &str) -> Result<Option<SupportRoom>, StoreError>;

    /// Room of the account with its latest message. The room is created on
    /// first contact; two concurrent first contacts can create two rooms.
    async fn get_or_create_room(
        &self,
        account: &Account,
        user_type: Role,
    ) -> Result<RoomView, StoreError>;

    /// Every room, most recently active first, with latest message and count
    /// of unread student or tutor messages.
    async fn list_rooms(&self) -> Result<Vec<RoomView>, StoreError>;

    /// Marks the room's messages seen, then returns it with its account and
    /// every message. `None` when the room doesn't exist.
    async fn open_room(&self, id: &str) -> Result<Option<RoomView>, StoreError>;

    async fn join_room(&self, id: &str, admin_id: &str) -> Result<Option<RoomView>, StoreError>;

    /// Student or tutor owning the room.
    async fn room_account(&self, room: &SupportRoom) -> Result<Option<Account>, StoreError>;

    async fn latest_support_message(
        &self,
        room_id: &str,
    ) -> Result<Option<SupportMessage>, StoreError>;

    /// Unseen messages not written by the back office.
    async fn unread_support_count(&self, room_id: &str) -> Result<usize, StoreError>;

    async fn add_support_message(
        &self,
        room: &SupportRoom,
        message: SupportMessage,
    ) -> Result<SupportMessage, StoreError>;

    async fn get_support_message(&self, id: &str) -> Result<Option<SupportMessage>, StoreError>;

    async fn edit_support_message(
        &self,
        id: &str,
        message: &str,
        message_type: MessageType,
    ) -> Result<Option<SupportMessage>, StoreError>;

    async fn delete_support_message(&self, id: &str) -> Result<bool, StoreError>;
}

impl Store {
    async fn room_view(&self, room: SupportRoom) -> Result<RoomView, StoreError> {
        let latest_message = self.latest_support_message(&room.id).await?;
        Ok(RoomView {
            latest_message,
            ..RoomView::from(room)
        })
    }

    async fn with_account(&self, mut view: RoomView) -> Result<RoomView, StoreError> {
        if let Some(account) = self.room_account(&view.room).await? {
            let account = AccountResponse::from(account);
            match view.room.user_type {
                Role::Tutor => view.tutor = Some(account),
                _ => view.student = Some(account),
            }
        }
        Ok(view)
    }
}

impl SupportDbExt for Store {
    async fn get_room(&self, id: &str) -> Result<Option<SupportRoom>, StoreError> {
        self.get_as(ROOM_COLLECTION_NAME, id).await
    }

    async fn get_or_create_room(
        &self,
        account: &Account,
        user_type: Role,
    ) -> Result<RoomView, StoreError> {
        let existing: Option<SupportRoom> = self
            .find_one_as(ROOM_COLLECTION_NAME, Query::new().eq("user_id", account.id.as_str()))
            .await?;

        match existing {
            Some(room) => self.room_view(room).await,
            None => {
                let mut room = SupportRoom::new(&account.id, user_type, Utc::now());
                room.id = self.insert_as(ROOM_COLLECTION_NAME, &room).await?;
                tracing::info!("opened support room {} for {} {}", room.id, user_type, account.id);
                Ok(RoomView::from(room))
            }
        }
    }

    async fn list_rooms(&self) -> Result<Vec<RoomView>, StoreError> {
        let rooms: Vec<SupportRoom> = self
            .find_as(
                ROOM_COLLECTION_NAME,
                &Query::new().order_by("updated_at", Direction::Descending),
            )
            .await?;

        let mut views = Vec::with_capacity(rooms.len());
        for room in rooms {
            let unread = self.unread_support_count(&room.id).await?;
            let mut view = self.room_view(room).await?;
            view.unread_count = Some(unread);
            views.push(view);
        }
        Ok(views)
    }

    async fn open_room(&self, id: &str) -> Result<Option<RoomView>, StoreError> {
        let room = match self.get_room(id).await? {
            Some(it) => it,
            None => return Ok(None),
        };

        let unseen: Vec<SupportMessage> = self
            .find_as(
                SUPPORT_MESSAGE_COLLECTION_NAME,
                &Query::new()
                    .eq("room_id", id)
                    .any_of("seen", util::unset_flag_values()),
            )
            .await?;
        let unseen: Vec<String> = unseen.into_iter().map(|it| it.id).collect();
        let marked = self
            .update_many(SUPPORT_MESSAGE_COLLECTION_NAME, &unseen, doc! { "seen": true })
            .await?;
        tracing::debug!("marked {} messages of room {} seen", marked, id);

        let messages: Vec<SupportMessage> = self
            .find_as(
                SUPPORT_MESSAGE_COLLECTION_NAME,
                &Query::new()
                    .eq("room_id", id)
                    .order_by("created_at", Direction::Ascending),
            )
            .await?;

        let mut view = self.with_account(RoomView::from(room)).await?;
        view.latest_message = messages.last().cloned();
        view.messages = Some(messages);
        Ok(Some(view))
    }

    async fn join_room(&self, id: &str, admin_id: &str) -> Result<Option<RoomView>, StoreError> {
        let updated = self
            .update(
                ROOM_COLLECTION_NAME,
                id,
                doc! { "admin_id": admin_id, "updated_at": util::now_string() },
            )
            .await?;
        if !updated {
            return Ok(None);
        }

        match self.get_room(id).await? {
            Some(room) => {
                let view = self.room_view(room).await?;
                Ok(Some(self.with_account(view).await?))
            }
            None => Ok(None),
        }
    }

    async fn room_account(&self, room: &SupportRoom) -> Result<Option<Account>, StoreError> {
        match room.user_type.account_collection() {
            Some(collection) if !room.user_id.is_empty() => {
                self.get_account(collection, &room.user_id).await
            }
            _ => Ok(None),
        }
    }

    async fn latest_support_message(
        &self,
        room_id: &str,
    ) -> Result<Option<SupportMessage>, StoreError> {
        let query = Query::new()
            .eq("room_id", room_id)
            .order_by("created_at", Direction::Descending);
        self.find_one_as(SUPPORT_MESSAGE_COLLECTION_NAME, query)
            .await
    }

    async fn unread_support_count(&self, room_id: &str) -> Result<usize, StoreError> {
        let query = Query::new()
            .eq("room_id", room_id)
            .any_of("seen", util::unset_flag_values())
            .ne("user_type", Role::Admin.to_string());
        Ok(self.find(SUPPORT_MESSAGE_COLLECTION_NAME, &query).await?.len())
    }

    async fn add_support_message(
        &self,
        room: &SupportRoom,
        mut message: SupportMessage,
    ) -> Result<SupportMessage, StoreError> {
        message.id = self
            .insert_as(SUPPORT_MESSAGE_COLLECTION_NAME, &message)
            .await?;
        self.update(
            ROOM_COLLECTION_NAME,
            &room.id,
            doc! { "updated_at": util::timestamp_string(&message.created_at) },
        )
        .await?;
        Ok(message)
    }

    async fn get_support_message(&self, id: &str) -> Result<Option<SupportMessage>, StoreError> {
        self.get_as(SUPPORT_MESSAGE_COLLECTION_NAME, id).await
    }

    async fn edit_support_message(
        &self,
        id: &str,
        message: &str,
        message_type: MessageType,
    ) -> Result<Option<SupportMessage>, StoreError> {
        let updated = self
            .update(
                SUPPORT_MESSAGE_COLLECTION_NAME,
                id,
                doc! {
                    "message": message,
                    "message_type": message_type.as_str(),
                    "updated_at": util::now_string(),
                },
            )
            .await?;
        if !updated {
            return Ok(None);
        }
        self.get_support_message(id).await
    }

    async fn delete_support_message(&self, id: &str) -> Result<bool, StoreError> {
        self.delete(SUPPORT_MESSAGE_COLLECTION_NAME, id).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::data::account::db::AccountCreateData;

    async fn student(store: &Store) -> Account {
        let id = store
            .create_account(
                crate::data::account::STUDENT_COLLECTION_NAME,
                AccountCreateData {
                    email: Some("sam@example.com".to_string()),
                    password: Some("secret".to_string()),
                    nickname: Some("sam".to_string()),
                    ..Default::default()
                },
                4,
            )
            .await
            .unwrap();
        store
            .get_account(crate::data::account::STUDENT_COLLECTION_NAME, &id)
            .await
            .unwrap()
            .unwrap()
    }

    async fn post(store: &Store, room: &SupportRoom, sender: Role, text: &str, minutes: i64) {
        let message = SupportMessage::new(
            &room.id,
            "x",
            sender,
            text,
            MessageType::Text,
            Utc::now() - Duration::minutes(60 - minutes),
        );
        store.add_support_message(room, message).await.unwrap();
    }

    #[rocket::async_test]
    async fn room_is_created_once_per_account() {
        let store = Store::memory();
        let account = student(&store).await;

        let first = store
            .get_or_create_room(&account, Role::Student)
            .await
            .unwrap();
        assert!(first.latest_message.is_none());

        post(&store, &first.room, Role::Student, "hi", 1).await;

        let second = store
            .get_or_create_room(&account, Role::Student)
            .await
            .unwrap();
        assert_eq!(second.room.id, first.room.id);
        assert_eq!(second.latest_message.unwrap().message, "hi");
    }

    #[rocket::async_test]
    async fn opening_a_room_marks_everything_seen() {
        let store = Store::memory();
        let account = student(&store).await;
        let room = store
            .get_or_create_room(&account, Role::Student)
            .await
            .unwrap()
            .room;

        post(&store, &room, Role::Student, "first", 1).await;
        post(&store, &room, Role::Admin, "second", 2).await;
        post(&store, &room, Role::Student, "third", 3).await;
        assert_eq!(store.unread_support_count(&room.id).await.unwrap(), 2);

        let view = store.open_room(&room.id).await.unwrap().unwrap();
        let texts: Vec<String> = view
            .messages
            .unwrap()
            .into_iter()
            .map(|it| it.message)
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(view.latest_message.unwrap().message, "third");
        assert_eq!(view.student.unwrap().id, account.id);
        assert!(view.tutor.is_none());

        assert_eq!(store.unread_support_count(&room.id).await.unwrap(), 0);
        assert!(store.open_room("missing").await.unwrap().is_none());
    }

    #[rocket::async_test]
    async fn rooms_are_listed_by_activity_with_unread_counts() {
        let store = Store::memory();
        let quiet = SupportRoom::new("s1", Role::Student, Utc::now() - Duration::hours(3));
        let quiet = SupportRoom {
            id: store.insert_as(ROOM_COLLECTION_NAME, &quiet).await.unwrap(),
            ..quiet
        };
        let busy = SupportRoom::new("t1", Role::Tutor, Utc::now() - Duration::hours(2));
        let busy = SupportRoom {
            id: store.insert_as(ROOM_COLLECTION_NAME, &busy).await.unwrap(),
            ..busy
        };
        post(&store, &busy, Role::Tutor, "question", 5).await;

        let rooms = store.list_rooms().await.unwrap();
        assert_eq!(rooms[0].room.id, busy.id);
        assert_eq!(rooms[0].unread_count, Some(1));
        assert_eq!(rooms[1].room.id, quiet.id);
        assert_eq!(rooms[1].unread_count, Some(0));
    }

    #[rocket::async_test]
    async fn integer_seen_flags_are_read() {
        let store = Store::memory();
        let account = student(&store).await;
        let room = store
            .get_or_create_room(&account, Role::Student)
            .await
            .unwrap()
            .room;

        for (text, seen) in [("old", 1), ("new", 0)] {
            store
                .insert(
                    SUPPORT_MESSAGE_COLLECTION_NAME,
                    doc! {
                        "room_id": room.id.clone(),
                        "sender_id": account.id.clone(),
                        "user_type": "student",
                        "message": text,
                        "message_type": "text",
                        "seen": seen,
                        "created_at": util::now_string(),
                        "updated_at": util::now_string(),
                    },
                )
                .await
                .unwrap();
        }

        assert_eq!(store.unread_support_count(&room.id).await.unwrap(), 1);
        let rooms = store.list_rooms().await.expect("integer flags decode");
        assert_eq!(rooms[0].unread_count, Some(1));

        let view = store.open_room(&room.id).await.expect("integer flags decode").unwrap();
        assert!(view.messages.unwrap().iter().all(|it| it.seen));
        assert_eq!(store.unread_support_count(&room.id).await.unwrap(), 0);
    }

    #[rocket::async_test]
    async fn join_edit_and_delete() {
        let store = Store::memory();
        let account = student(&store).await;
        let room = store
            .get_or_create_room(&account, Role::Student)
            .await
            .unwrap()
            .room;

        let joined = store.join_room(&room.id, "admin-7").await.unwrap().unwrap();
        assert_eq!(joined.room.admin_id.as_deref(), Some("admin-7"));
        assert!(store.join_room("missing", "admin-7").await.unwrap().is_none());

        let sent = store
            .add_support_message(
                &room,
                SupportMessage::new(&room.id, "s", Role::Student, "typo", MessageType::Text, Utc::now()),
            )
            .await
            .unwrap();
        let edited = store
            .edit_support_message(&sent.id, "fixed", MessageType::Text)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(edited.message, "fixed");
        assert!(store
            .edit_support_message("missing", "x", MessageType::Text)
            .await
            .unwrap()
            .is_none());

        assert!(store.delete_support_message(&sent.id).await.unwrap());
        assert!(store.get_support_message(&sent.id).await.unwrap().is_none());
    }
}
