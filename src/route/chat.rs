use rocket::serde::json::Json;
use rocket::State;

use crate::data::chat::db::ChatDbExt;
use crate::data::chat::{clamp_limit, Chat, ChatListing, ChatMessage, MessageType};
use crate::resp::payload::Payload;
use crate::resp::problem::{problems, Problem};
use crate::route::Message;
use crate::store::Store;

pub mod problem {
    use crate::resp::problem::{problems, Problem};

    #[inline]
    pub fn chat_not_found() -> Problem {
        problems::not_found("Chat not found. Please select a valid chat.")
    }

    #[inline]
    pub fn message_not_found(id: impl ToString) -> Problem {
        problems::not_found("Message not found")
            .insert_str("messageId", id)
            .clone()
    }
}

/// Body of chat message writes. `chatId` is only read from the body when
/// sending; edits and deletes take it from the query.
#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageData {
    pub message: Option<String>,
    /// Defaults to `text`.
    pub message_type: Option<String>,
    pub chat_id: Option<String>,
}

impl ChatMessageData {
    fn validate(&self) -> Result<(&str, MessageType), Problem> {
        let message = self
            .message
            .as_deref()
            .filter(|it| !it.is_empty())
            .ok_or_else(|| problems::bad_request("Message content is required"))?;

        let message_type = match self.message_type.as_deref() {
            None => MessageType::Text,
            Some(it) => it
                .parse()
                .map_err(|_| problems::bad_request("Invalid message type"))?,
        };

        Ok((message, message_type))
    }
}

#[derive(Debug, Clone, Default, FromForm, utoipa::IntoParams)]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct ChatQuery {
    /// Chat to load messages of.
    #[field(name = "chatId")]
    pub chat_id: Option<String>,
    /// Page size, 1 to 50.
    pub limit: Option<i64>,
    /// Oldest message already shown.
    #[field(name = "lastMessageId")]
    pub last_message_id: Option<String>,
}

#[derive(Debug, Clone, Default, FromForm, utoipa::IntoParams)]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct ChatRef {
    /// Chat holding the message. The first chat of the request when absent.
    #[field(name = "chatId")]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ChatMessageResponse {
    pub message: ChatMessage,
}

async fn chat_of(store: &Store, request_id: &str, chat_id: Option<&str>) -> Result<Chat, Problem> {
    let chat_id = chat_id.filter(|it| !it.is_empty());
    store
        .resolve_chat(request_id, chat_id)
        .await?
        .ok_or_else(problem::chat_not_found)
}

#[utoipa::path(
    params(ChatQuery),
    responses((status = 200, body = ChatListing), (status = 500, body = Problem))
)]
#[get("/requests/<id>/chat?<query..>")]
#[tracing::instrument(skip(store))]
pub async fn chat_list(
    id: &str,
    query: ChatQuery,
    store: &State<Store>,
) -> Result<Json<ChatListing>, Problem> {
    let last_message_id = query.last_message_id.filter(|it| !it.is_empty());
    let listing = store
        .chat_listing(
            id,
            query.chat_id.as_deref(),
            clamp_limit(query.limit),
            last_message_id,
        )
        .await?;

    tracing::debug!(
        "loaded {} messages, has more: {}",
        listing.messages.len(),
        listing.has_more
    );
    Ok(Json(listing))
}

#[utoipa::path(
    request_body = ChatMessageData,
    responses(
        (status = 200, body = ChatMessageResponse),
        (status = 400, body = Problem),
        (status = 404, body = Problem)
    )
)]
#[post("/requests/<id>/chat", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn chat_send(
    id: &str,
    data: Payload<ChatMessageData>,
    store: &State<Store>,
) -> Result<Json<ChatMessageResponse>, Problem> {
    let (message, message_type) = data.validate()?;
    let chat = chat_of(store, id, data.chat_id.as_deref()).await?;

    let message = store.send_message(&chat, message, message_type).await?;
    tracing::info!("admin posted message {} to chat {}", message.id, chat.id);

    Ok(Json(ChatMessageResponse { message }))
}

#[utoipa::path(
    params(ChatRef),
    request_body = ChatMessageData,
    responses(
        (status = 200, body = ChatMessageResponse),
        (status = 400, body = Problem),
        (status = 404, body = Problem)
    )
)]
#[put("/requests/<id>/chat/<message_id>?<chat..>", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn chat_edit(
    id: &str,
    message_id: &str,
    chat: ChatRef,
    data: Payload<ChatMessageData>,
    store: &State<Store>,
) -> Result<Json<ChatMessageResponse>, Problem> {
    let (message, message_type) = data.validate()?;
    let chat = chat_of(store, id, chat.chat_id.as_deref()).await?;

    let message = store
        .edit_message(&chat, message_id, message, message_type)
        .await?
        .ok_or_else(|| problem::message_not_found(message_id))?;

    Ok(Json(ChatMessageResponse { message }))
}

#[utoipa::path(
    params(ChatRef),
    responses((status = 200, body = Message), (status = 404, body = Problem))
)]
#[delete("/requests/<id>/chat/<message_id>?<chat..>")]
#[tracing::instrument(skip(store))]
pub async fn chat_delete(
    id: &str,
    message_id: &str,
    chat: ChatRef,
    store: &State<Store>,
) -> Result<Json<Message>, Problem> {
    let chat = chat_of(store, id, chat.chat_id.as_deref()).await?;

    if !store.delete_message(&chat, message_id).await? {
        return Err(problem::message_not_found(message_id));
    }
    Ok(Json(Message::new("Message deleted successfully")))
}
