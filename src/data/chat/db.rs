use bson::doc;
use chrono::Utc;

use super::{
    Chat, ChatListing, ChatMessage, MessageType, ADMIN_SENDER, CHAT_COLLECTION_NAME,
    MESSAGE_COLLECTION_NAME,
};
use crate::store::{Direction, Query, Store, StoreError};
use crate::util;

pub static CHAT_NOT_FOUND: &str = "Chat not found";

pub trait ChatDbExt {
    async fn create_chat(&self, chat: &Chat) -> Result<String, StoreError>;

    /// Chats of a request, oldest first.
    async fn list_chats(&self, request_id: &str) -> Result<Vec<Chat>, StoreError>;

    /// The chat named by `chat_id`, or the first chat of the request when no
    /// id is given. `None` when there is no such chat for this request.
    async fn resolve_chat(
        &self,
        request_id: &str,
        chat_id: Option<&str>,
    ) -> Result<Option<Chat>, StoreError>;

    /// Chats of a request plus one page of messages of `chat_id`.
    ///
    /// Messages are fetched newest first after `last_message_id` (ignored
    /// when unknown) and returned oldest first. `has_more` is set whenever a
    /// full page was fetched.
    async fn chat_listing(
        &self,
        request_id: &str,
        chat_id: Option<&str>,
        limit: usize,
        last_message_id: Option<String>,
    ) -> Result<ChatListing, StoreError>;

    async fn send_message(
        &self,
        chat: &Chat,
        message: &str,
        message_type: MessageType,
    ) -> Result<ChatMessage, StoreError>;

    async fn get_message(
        &self,
        chat: &Chat,
        message_id: &str,
    ) -> Result<Option<ChatMessage>, StoreError>;

    async fn edit_message(
        &self,
        chat: &Chat,
        message_id: &str,
        message: &str,
        message_type: MessageType,
    ) -> Result<Option<ChatMessage>, StoreError>;

    async fn delete_message(&self, chat: &Chat, message_id: &str) -> Result<bool, StoreError>;
}

impl Store {
    async fn touch_chat(&self, chat_id: &str) -> Result<bool, StoreError> {
        self.update(
            CHAT_COLLECTION_NAME,
            chat_id,
            doc! { "updated_at": util::now_string() },
        )
        .await
    }
}

impl ChatDbExt for Store {
    async fn create_chat(&self, chat: &Chat) -> Result<String, StoreError> {
        self.insert_as(CHAT_COLLECTION_NAME, chat).await
    }

    async fn list_chats(&self, request_id: &str) -> Result<Vec<Chat>, StoreError> {
        let query = Query::new()
            .eq("request_id", request_id)
            .order_by("created_at", Direction::Ascending);
        self.find_as(CHAT_COLLECTION_NAME, &query).await
    }

    async fn resolve_chat(
        &self,
        request_id: &str,
        chat_id: Option<&str>,
    ) -> Result<Option<Chat>, StoreError> {
        match chat_id.filter(|it| !it.is_empty()) {
            Some(chat_id) => Ok(self
                .get_as::<Chat>(CHAT_COLLECTION_NAME, chat_id)
                .await?
                .filter(|it| it.request_id == request_id)),
            None => {
                let query = Query::new()
                    .eq("request_id", request_id)
                    .order_by("created_at", Direction::Ascending);
                self.find_one_as(CHAT_COLLECTION_NAME, query).await
            }
        }
    }

    async fn chat_listing(
        &self,
        request_id: &str,
        chat_id: Option<&str>,
        limit: usize,
        last_message_id: Option<String>,
    ) -> Result<ChatListing, StoreError> {
        let chats = self.list_chats(request_id).await?;

        let chat_id = match chat_id.filter(|it| !it.is_empty()) {
            Some(it) => it,
            None => {
                return Ok(ChatListing {
                    chats,
                    ..Default::default()
                })
            }
        };

        if !chats.iter().any(|it| it.id == chat_id) {
            tracing::debug!("chat {} is not part of request {}", chat_id, request_id);
            return Ok(ChatListing {
                chats,
                error: Some(CHAT_NOT_FOUND.to_string()),
                ..Default::default()
            });
        }

        // A cursor from another chat would skip messages of this one.
        let cursor = match last_message_id {
            Some(id) => self
                .get_as::<ChatMessage>(MESSAGE_COLLECTION_NAME, &id)
                .await?
                .filter(|it| it.chat_id == chat_id)
                .map(|it| it.id),
            None => None,
        };

        let query = Query::new()
            .eq("chat_id", chat_id)
            .order_by("created_at", Direction::Descending)
            .start_after(cursor)
            .limit(limit);
        let mut messages: Vec<ChatMessage> = self.find_as(MESSAGE_COLLECTION_NAME, &query).await?;

        let has_more = messages.len() == limit;
        messages.reverse();

        Ok(ChatListing {
            chats,
            total_messages: messages.len(),
            messages,
            has_more,
            chat_id: Some(chat_id.to_string()),
            error: None,
        })
    }

    async fn send_message(
        &self,
        chat: &Chat,
        message: &str,
        message_type: MessageType,
    ) -> Result<ChatMessage, StoreError> {
        let now = Utc::now();
        let mut sent = ChatMessage::from_admin(&chat.id, message, message_type, now);
        sent.id = self.insert_as(MESSAGE_COLLECTION_NAME, &sent).await?;

        let timestamp = util::timestamp_string(&now);
        self.update(
            CHAT_COLLECTION_NAME,
            &chat.id,
            doc! {
                "last_message": message,
                "last_message_type": message_type.as_str(),
                "last_message_at": timestamp.clone(),
                "updated_at": timestamp,
            },
        )
        .await?;

        tracing::debug!("sent message {} in chat {}", sent.id, chat.id);
        Ok(sent)
    }

    async fn get_message(
        &self,
        chat: &Chat,
        message_id: &str,
    ) -> Result<Option<ChatMessage>, StoreError> {
        Ok(self
            .get_as::<ChatMessage>(MESSAGE_COLLECTION_NAME, message_id)
            .await?
            .filter(|it| it.chat_id == chat.id))
    }

    async fn edit_message(
        &self,
        chat: &Chat,
        message_id: &str,
        message: &str,
        message_type: MessageType,
    ) -> Result<Option<ChatMessage>, StoreError> {
        let mut edited = match self.get_message(chat, message_id).await? {
            Some(it) => it,
            None => return Ok(None),
        };

        edited.message = message.to_string();
        edited.message_type = message_type;
        edited.edited = true;
        edited.edited_by = Some(ADMIN_SENDER.to_string());
        edited.updated_at = Utc::now();

        self.update(
            MESSAGE_COLLECTION_NAME,
            message_id,
            doc! {
                "message": message,
                "message_type": message_type.as_str(),
                "edited": true,
                "edited_by": ADMIN_SENDER,
                "updated_at": util::timestamp_string(&edited.updated_at),
            },
        )
        .await?;
        self.touch_chat(&chat.id).await?;

        Ok(Some(edited))
    }

    async fn delete_message(&self, chat: &Chat, message_id: &str) -> Result<bool, StoreError> {
        if self.get_message(chat, message_id).await?.is_none() {
            return Ok(false);
        }

        self.delete(MESSAGE_COLLECTION_NAME, message_id).await?;
        self.touch_chat(&chat.id).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    async fn chat_with_messages(store: &Store, request_id: &str, count: usize) -> Chat {
        let mut chat = Chat::new(request_id, "s1", "t1", Utc::now());
        chat.id = store.create_chat(&chat).await.unwrap();

        let start = Utc::now() - Duration::minutes(10);
        for n in 0..count {
            let message = ChatMessage::from_admin(
                &chat.id,
                format!("m{}", n),
                MessageType::Text,
                start + Duration::seconds(n as i64),
            );
            store
                .insert_as(MESSAGE_COLLECTION_NAME, &message)
                .await
                .unwrap();
        }
        chat
    }

    #[rocket::async_test]
    async fn listing_pages_backwards_and_returns_oldest_first() {
        let store = Store::memory();
        let chat = chat_with_messages(&store, "r1", 5).await;

        let first = store
            .chat_listing("r1", Some(&chat.id), 2, None)
            .await
            .unwrap();
        let texts: Vec<&str> = first.messages.iter().map(|it| it.message.as_str()).collect();
        assert_eq!(texts, vec!["m3", "m4"]);
        assert!(first.has_more);
        assert_eq!(first.chat_id.as_deref(), Some(chat.id.as_str()));

        let cursor = first.messages[0].id.clone();
        let next = store
            .chat_listing("r1", Some(&chat.id), 10, Some(cursor))
            .await
            .unwrap();
        let texts: Vec<&str> = next.messages.iter().map(|it| it.message.as_str()).collect();
        assert_eq!(texts, vec!["m0", "m1", "m2"]);
        assert!(!next.has_more);
    }

    #[rocket::async_test]
    async fn integer_flags_in_messages_are_read() {
        let store = Store::memory();
        let chat = chat_with_messages(&store, "r1", 0).await;
        store
            .insert(
                MESSAGE_COLLECTION_NAME,
                doc! {
                    "chat_id": chat.id.clone(),
                    "message": "hello",
                    "message_type": "text",
                    "sender_type": "student",
                    "sender_id": "s1",
                    "seen": 1,
                    "edited": 0,
                    "created_at": util::now_string(),
                    "updated_at": util::now_string(),
                },
            )
            .await
            .unwrap();

        let listing = store
            .chat_listing("r1", Some(&chat.id), 10, None)
            .await
            .expect("integer flags decode");
        assert_eq!(listing.messages.len(), 1);
        assert!(listing.messages[0].seen);
        assert!(!listing.messages[0].edited);
    }

    #[rocket::async_test]
    async fn listing_without_or_with_unknown_chat() {
        let store = Store::memory();
        chat_with_messages(&store, "r1", 3).await;

        let listing = store.chat_listing("r1", None, 10, None).await.unwrap();
        assert_eq!(listing.chats.len(), 1);
        assert!(listing.messages.is_empty());
        assert!(!listing.has_more);

        let listing = store
            .chat_listing("r1", Some("nope"), 10, None)
            .await
            .unwrap();
        assert_eq!(listing.error.as_deref(), Some(CHAT_NOT_FOUND));
        assert!(listing.messages.is_empty());
    }

    #[rocket::async_test]
    async fn resolution_prefers_explicit_then_first_chat() {
        let store = Store::memory();
        let first = chat_with_messages(&store, "r1", 0).await;
        let second = chat_with_messages(&store, "r1", 0).await;

        let resolved = store.resolve_chat("r1", None).await.unwrap().unwrap();
        assert_eq!(resolved.id, first.id);

        let resolved = store
            .resolve_chat("r1", Some(&second.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.id, second.id);

        assert!(store.resolve_chat("r1", Some("nope")).await.unwrap().is_none());
        assert!(store.resolve_chat("r2", Some(&first.id)).await.unwrap().is_none());
        assert!(store.resolve_chat("r2", None).await.unwrap().is_none());
    }

    #[rocket::async_test]
    async fn send_edit_delete_touch_the_chat() {
        let store = Store::memory();
        let chat = chat_with_messages(&store, "r1", 0).await;

        let sent = store
            .send_message(&chat, "hello", MessageType::Text)
            .await
            .unwrap();
        assert_eq!(sent.sender_type, "admin");
        assert!(!sent.seen);

        let stored: Chat = store
            .get_as(CHAT_COLLECTION_NAME, &chat.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.last_message.as_deref(), Some("hello"));
        assert_eq!(stored.last_message_type.as_deref(), Some("text"));
        assert!(stored.last_message_at.is_some());

        let edited = store
            .edit_message(&chat, &sent.id, "hello again", MessageType::Image)
            .await
            .unwrap()
            .unwrap();
        assert!(edited.edited);
        assert_eq!(edited.edited_by.as_deref(), Some("admin"));

        let stored = store.get_message(&chat, &sent.id).await.unwrap().unwrap();
        assert_eq!(stored.message, "hello again");
        assert_eq!(stored.message_type, MessageType::Image);

        assert!(store
            .edit_message(&chat, "missing", "x", MessageType::Text)
            .await
            .unwrap()
            .is_none());

        assert!(store.delete_message(&chat, &sent.id).await.unwrap());
        assert!(!store.delete_message(&chat, &sent.id).await.unwrap());
    }
}
