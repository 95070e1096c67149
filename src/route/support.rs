use chrono::Utc;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;

use crate::chatbot::Chatbot;
use crate::data::account::db::AccountDbExt;
use crate::data::notification::db::NotificationDbExt;
use crate::data::notification::{default_content, AdminNotification, SUPPORT_MESSAGE_KIND};
use crate::data::support::db::SupportDbExt;
use crate::data::support::problem as support_problem;
use crate::data::support::{
    ChatbotData, JoinRoomData, RoomView, SupportEditData, SupportMessage, SupportMessageData,
    SupportRoom,
};
use crate::notify;
use crate::resp::payload::Payload;
use crate::resp::problem::{problems, Problem};
use crate::resp::token::{missing_token_problem, AccountToken};
use crate::role::Role;
use crate::route::Message;
use crate::store::Store;

static SUPPORT_TITLE: &str = "Customer Support";
static CUSTOMER_CHAT_KIND: &str = "customer_chat";
static EDIT_KIND: &str = "edit_message_support";
static DELETE_KIND: &str = "delete_message_support";

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct RoomResponse {
    pub room: RoomView,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct RoomListResponse {
    pub rooms: Vec<RoomView>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct RoomMessagesResponse {
    pub messages: RoomView,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SupportMessageResponse {
    pub message: SupportMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCount {
    pub count: usize,
    pub room_id: String,
}

#[derive(Debug, Clone, Default, FromForm, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeleteMessageQuery {
    pub room_id: Option<String>,
    pub user_type: Option<String>,
    /// Text of the removed message, used in the notification.
    pub message: Option<String>,
}

async fn room_of(store: &Store, id: &str) -> Result<SupportRoom, Problem> {
    store
        .get_room(id)
        .await?
        .ok_or_else(|| support_problem::room_not_found(id))
}

/// Tells the other side of the room about a change made by `sender`.
async fn notify_other_side(
    store: &Store,
    room: &SupportRoom,
    sender: Role,
    sender_id: &str,
    title: &str,
    body: &str,
    kind: &str,
) -> Result<(), Problem> {
    if sender.is_admin() {
        if let Some(account) = store.room_account(room).await? {
            notify::push_to_account(&account, SUPPORT_TITLE, body, kind);
        }
    } else {
        notify::push_to_admins(title, body, kind, &room.id, sender_id, sender);
    }
    Ok(())
}

#[utoipa::path(
    params(("user_type" = String, Query, description = "`student` or `tutor`")),
    responses(
        (status = 200, body = RoomResponse),
        (status = 400, body = Problem),
        (status = 404, body = Problem)
    )
)]
#[get("/support/room?<user_type>")]
#[tracing::instrument(skip(store, token))]
pub async fn support_room(
    user_type: Option<&str>,
    token: AccountToken,
    store: &State<Store>,
) -> Result<Json<RoomResponse>, Problem> {
    let user_type = user_type
        .filter(|it| !it.is_empty())
        .ok_or_else(missing_token_problem)?;

    let role = match user_type.parse::<Role>() {
        Ok(role) if !role.is_admin() => role,
        _ => return Err(support_problem::invalid_user_type()),
    };
    let collection = role
        .account_collection()
        .ok_or_else(support_problem::invalid_user_type)?;

    let account = store
        .find_account_by_token(collection, &token.0)
        .await?
        .ok_or_else(|| problems::not_found("User not found"))?;

    let room = store.get_or_create_room(&account, role).await?;
    Ok(Json(RoomResponse { room }))
}

#[utoipa::path(responses((status = 200, body = RoomListResponse)))]
#[get("/support/rooms")]
#[tracing::instrument(skip(store))]
pub async fn support_rooms(store: &State<Store>) -> Result<Json<RoomListResponse>, Problem> {
    Ok(Json(RoomListResponse {
        rooms: store.list_rooms().await?,
    }))
}

#[utoipa::path(responses((status = 200, body = RoomMessagesResponse), (status = 404, body = Problem)))]
#[get("/support/rooms/<id>/messages")]
#[tracing::instrument(skip(store))]
pub async fn support_room_messages(
    id: &str,
    store: &State<Store>,
) -> Result<Json<RoomMessagesResponse>, Problem> {
    let messages = store
        .open_room(id)
        .await?
        .ok_or_else(|| support_problem::room_not_found(id))?;
    Ok(Json(RoomMessagesResponse { messages }))
}

#[utoipa::path(
    request_body = SupportMessageData,
    responses(
        (status = 201, body = SupportMessageResponse),
        (status = 400, body = Problem),
        (status = 404, body = Problem)
    )
)]
#[post("/support/messages", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn support_send(
    data: Payload<SupportMessageData>,
    store: &State<Store>,
) -> Result<(Status, Json<SupportMessageResponse>), Problem> {
    let outgoing = data.validate()?;
    let room = room_of(store, &outgoing.room_id).await?;

    let now = Utc::now();
    let message = store
        .add_support_message(
            &room,
            SupportMessage::new(
                &room.id,
                &outgoing.sender_id,
                outgoing.user_type,
                &outgoing.content,
                outgoing.message_type,
                now,
            ),
        )
        .await?;

    let account = store.room_account(&room).await?;
    if outgoing.user_type.is_admin() {
        if let Some(account) = &account {
            notify::push_to_account(account, SUPPORT_TITLE, &message.message, CUSTOMER_CHAT_KIND);
        }
    } else {
        let sender_name = account
            .as_ref()
            .and_then(|it| it.full_name.clone())
            .unwrap_or_default();
        let sender_nickname = account
            .as_ref()
            .and_then(|it| it.nickname.clone())
            .unwrap_or_default();

        let notification = AdminNotification {
            id: String::new(),
            kind: SUPPORT_MESSAGE_KIND.to_string(),
            request_id: room.id.clone(),
            chat_id: room.id.clone(),
            sender_type: outgoing.user_type.to_string(),
            sender_id: outgoing.sender_id.clone(),
            content: default_content(&sender_nickname, &sender_name, &message.message),
            sender_name,
            sender_nickname,
            message: message.message.clone(),
            seen: false,
            created_at: now,
            updated_at: now,
        };
        store.create_notification(&notification).await?;

        let title = account
            .as_ref()
            .map(|it| it.display_name().to_string())
            .unwrap_or_else(|| outgoing.user_type.to_string());
        notify::push_to_admins(
            &title,
            &message.message,
            CUSTOMER_CHAT_KIND,
            &room.id,
            &outgoing.sender_id,
            outgoing.user_type,
        );

        if let Some(account) = account.as_ref().filter(|_| room.user_type == Role::Student) {
            let body = if message.message_type.is_text() {
                message.message.as_str()
            } else {
                "File"
            };
            notify::email_account(account, body);
        }
    }

    tracing::info!("support message {} posted to room {}", message.id, room.id);
    Ok((Status::Created, Json(SupportMessageResponse { message })))
}

#[utoipa::path(
    request_body = SupportEditData,
    responses(
        (status = 201, body = SupportMessageResponse),
        (status = 400, body = Problem),
        (status = 404, body = Problem)
    )
)]
#[put("/support/messages/<id>", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn support_edit(
    id: &str,
    data: Payload<SupportEditData>,
    store: &State<Store>,
) -> Result<(Status, Json<SupportMessageResponse>), Problem> {
    let edit = data.validate()?;

    if store.get_support_message(id).await?.is_none() {
        return Err(support_problem::message_not_found(id));
    }
    let room = room_of(store, &edit.room_id).await?;

    let message = store
        .edit_support_message(id, &edit.message, edit.message_type)
        .await?
        .ok_or_else(|| support_problem::message_not_found(id))?;

    notify_other_side(
        store,
        &room,
        edit.user_type,
        &message.sender_id,
        "Message Edited",
        &edit.message,
        EDIT_KIND,
    )
    .await?;

    Ok((Status::Created, Json(SupportMessageResponse { message })))
}

#[utoipa::path(
    params(DeleteMessageQuery),
    responses(
        (status = 200, body = Message),
        (status = 400, body = Problem),
        (status = 404, body = Problem)
    )
)]
#[delete("/support/messages/<id>?<query..>")]
#[tracing::instrument(skip(store))]
pub async fn support_delete(
    id: &str,
    query: DeleteMessageQuery,
    store: &State<Store>,
) -> Result<Json<Message>, Problem> {
    let (room_id, user_type) = match (query.room_id.as_deref(), query.user_type.as_deref()) {
        (Some(room_id), Some(user_type)) if !room_id.is_empty() => (room_id, user_type),
        _ => return Err(problems::missing_fields()),
    };
    let sender: Role = user_type
        .parse()
        .map_err(|_| problems::bad_request("Invalid user type"))?;

    let message = store
        .get_support_message(id)
        .await?
        .ok_or_else(|| support_problem::message_not_found(id))?;
    let room = room_of(store, room_id).await?;

    let body = query.message.as_deref().unwrap_or("Message deleted");
    notify_other_side(
        store,
        &room,
        sender,
        &message.sender_id,
        "Message Deleted",
        body,
        DELETE_KIND,
    )
    .await?;

    store.delete_support_message(id).await?;
    Ok(Json(Message::new("Message deleted successfully")))
}

#[utoipa::path(
    params(("roomId" = String, Query, description = "Room to count unread messages of")),
    responses((status = 200, body = UnreadCount), (status = 400, body = Problem))
)]
#[get("/support/unread-messages?<roomId>")]
#[tracing::instrument(skip(store))]
#[allow(non_snake_case)]
pub async fn support_unread(
    roomId: Option<&str>,
    store: &State<Store>,
) -> Result<Json<UnreadCount>, Problem> {
    let room_id = roomId
        .filter(|it| !it.is_empty())
        .ok_or_else(|| problems::bad_request("Room ID is required"))?;

    Ok(Json(UnreadCount {
        count: store.unread_support_count(room_id).await?,
        room_id: room_id.to_string(),
    }))
}

#[utoipa::path(
    request_body = JoinRoomData,
    responses(
        (status = 200, body = RoomResponse),
        (status = 400, body = Problem),
        (status = 404, body = Problem)
    )
)]
#[post("/support/admin/join-room", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn support_join_room(
    data: Payload<JoinRoomData>,
    store: &State<Store>,
) -> Result<Json<RoomResponse>, Problem> {
    let (room_id, admin_id) = match (data.room_id.as_deref(), data.admin_id.as_deref()) {
        (Some(room_id), Some(admin_id)) if !room_id.is_empty() && !admin_id.is_empty() => {
            (room_id, admin_id)
        }
        _ => return Err(problems::missing_fields()),
    };

    let room = store
        .join_room(room_id, admin_id)
        .await?
        .ok_or_else(|| support_problem::room_not_found(room_id))?;
    tracing::info!("admin {} joined support room {}", admin_id, room_id);

    Ok(Json(RoomResponse { room }))
}

#[utoipa::path(
    request_body = ChatbotData,
    responses(
        (status = 201, body = SupportMessageResponse),
        (status = 400, body = Problem),
        (status = 404, body = Problem),
        (status = 500, body = Problem)
    )
)]
#[post("/support/chatbot-response", data = "<data>")]
#[tracing::instrument(skip(store, chatbot))]
pub async fn support_chatbot(
    data: Payload<ChatbotData>,
    store: &State<Store>,
    chatbot: &State<Chatbot>,
) -> Result<(Status, Json<SupportMessageResponse>), Problem> {
    let prompt = data.validate()?;
    if !chatbot.is_enabled() {
        return Err(crate::chatbot::ChatbotError::NotConfigured.into());
    }
    let room = room_of(store, &prompt.room_id).await?;

    let reply = chatbot.reply(&prompt.message).await?;
    let message = store
        .add_support_message(
            &room,
            SupportMessage::new(
                &room.id,
                &prompt.sender_id,
                Role::Admin,
                &reply,
                Default::default(),
                Utc::now(),
            ),
        )
        .await?;

    if let Some(account) = store.room_account(&room).await? {
        notify::push_to_account(&account, SUPPORT_TITLE, &reply, CUSTOMER_CHAT_KIND);
    }

    Ok((Status::Created, Json(SupportMessageResponse { message })))
}
