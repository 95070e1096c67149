use std::collections::BTreeMap;

use rocket::http::Status;
use rocket::{Build, Request, Rocket, Route};

pub mod accounts;
pub mod chat;
pub mod files;
pub mod notifications;
pub mod offers;
pub mod promo;
pub mod requests;
pub mod support;
pub mod users;

use accounts::*;
use chat::*;
use files::*;
use notifications::*;
use offers::*;
use promo::*;
use requests::*;
use support::*;
use users::*;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    data::{
        account::{
            db::{AccountCreateData, AccountUpdateData},
            AccountResponse,
        },
        chat as cd,
        notification as nd,
        offer as od,
        promo as pd,
        request::{
            self as rd,
            action::RequestAction,
            db::{Pagination, RequestPage},
        },
        staff::db::{StaffCreateData, StaffDeleteData, StaffUpdateData},
        support as sd,
        user_notification::{self as und, db::UserNotificationPage},
    },
    resp::problem::{GuardProblem, Problem},
    role::Role,
    storage::UploadedFile,
};

/// Id of a created document.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Created {
    pub id: String,
    pub message: String,
}

impl Created {
    pub fn new(id: impl ToString, message: impl ToString) -> Created {
        Created {
            id: id.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl ToString) -> Message {
        Message {
            message: message.to_string(),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        request_list,
        request_create,
        request_get,
        request_update,
        request_delete,
        request_action,
        request_tutor_paid,
        offer_list,
        offer_create,
        offer_action,
        offer_delete,
        chat_list,
        chat_send,
        chat_edit,
        chat_delete,
        support_room,
        support_rooms,
        support_room_messages,
        support_send,
        support_edit,
        support_delete,
        support_unread,
        support_join_room,
        support_chatbot,
        notification_list,
        notification_create,
        notification_update,
        notification_delete,
        notification_mark_all_seen,
        user_notification_list,
        user_notification_create,
        user_notification_get,
        user_notification_update,
        user_notification_delete,
        student_create,
        tutor_create,
        student_update,
        tutor_update,
        student_get,
        tutor_get,
        tutor_search,
        validate_email,
        validate_phone,
        user_create,
        user_update,
        user_delete,
        promo_list,
        promo_create,
        promo_update,
        promo_delete,
        promo_redeem,
        upload_file,
        delete_file,
        request_file_delete
    ),
    components(schemas(
        Role,
        Created,
        Message,
        Problem,
        Pagination,
        rd::Request,
        rd::RequestCreateData,
        rd::RequestUpdateData,
        rd::AssistanceType,
        rd::RequestStatus,
        RequestAction,
        RequestPage,
        RequestResponse,
        TutorPaidData,
        TutorPaidResponse,
        od::TutorOffer,
        od::OfferStatus,
        od::OfferCreateData,
        od::OfferAction,
        OfferList,
        cd::Chat,
        cd::ChatMessage,
        cd::ChatListing,
        cd::MessageType,
        ChatMessageData,
        ChatMessageResponse,
        sd::SupportRoom,
        sd::SupportMessage,
        sd::RoomView,
        sd::SupportMessageData,
        sd::SupportEditData,
        sd::JoinRoomData,
        sd::ChatbotData,
        RoomResponse,
        RoomListResponse,
        RoomMessagesResponse,
        SupportMessageResponse,
        UnreadCount,
        nd::AdminNotification,
        nd::NotificationCreateData,
        nd::NotificationUpdateData,
        NotificationList,
        NotificationResponse,
        MarkedSeen,
        und::UserNotification,
        und::UserType,
        und::RequestType,
        und::NotificationType,
        und::UserNotificationCreateData,
        und::UserNotificationUpdateData,
        UserNotificationPage,
        AccountResponse,
        AccountCreateData,
        AccountUpdateData,
        StudentResponse,
        TutorResponse,
        TutorSearchResponse,
        EmailCheckData,
        EmailCheck,
        PhoneCheckData,
        PhoneCheck,
        StaffCreateData,
        StaffUpdateData,
        StaffDeleteData,
        UserChanged,
        pd::PromoCode,
        pd::PromoType,
        pd::PromoUsage,
        pd::PromoCreateData,
        pd::PromoUpdateData,
        pd::PromoRedeemData,
        PromoList,
        PromoResponse,
        UploadedFile,
        StoragePathData,
        FileDeleted,
        RequestFileDeleted
    )),
    modifiers(&API_PREFIX)
)]
pub struct ApiDoc;

pub struct PathPrefix(pub &'static str);
static API_PREFIX: PathPrefix = PathPrefix("/api");

impl utoipa::Modify for PathPrefix {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut new_paths = BTreeMap::new();

        for (path, item) in std::mem::take(&mut openapi.paths.paths) {
            new_paths.insert(self.0.to_string() + path.as_ref(), item);
        }

        openapi.paths.paths = new_paths;
    }
}

pub fn api() -> Vec<Route> {
    routes![
        request_list,
        request_create,
        request_get,
        request_update,
        request_delete,
        request_action,
        request_tutor_paid,
        offer_list,
        offer_create,
        offer_action,
        offer_delete,
        chat_list,
        chat_send,
        chat_edit,
        chat_delete,
        support_room,
        support_rooms,
        support_room_messages,
        support_send,
        support_edit,
        support_delete,
        support_unread,
        support_join_room,
        support_chatbot,
        notification_list,
        notification_create,
        notification_update,
        notification_delete,
        notification_mark_all_seen,
        user_notification_list,
        user_notification_create,
        user_notification_get,
        user_notification_update,
        user_notification_delete,
        student_create,
        tutor_create,
        student_update,
        tutor_update,
        student_get,
        tutor_get,
        tutor_search,
        validate_email,
        validate_phone,
        user_create,
        user_update,
        user_delete,
        promo_list,
        promo_create,
        promo_update,
        promo_delete,
        promo_redeem,
        upload_file,
        delete_file,
        request_file_delete
    ]
}

/// Renders every error without a handler response as a [`Problem`]. Guards
/// leave the problem they failed with in the request cache.
#[catch(default)]
pub fn problem_catcher(status: Status, req: &Request<'_>) -> Problem {
    let cached = req.local_cache(|| GuardProblem(None));
    match &cached.0 {
        Some(problem) if problem.status == status => problem.clone(),
        _ => Problem::new_untyped(status, status.reason().unwrap_or("Error")),
    }
}

pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/api", api())
        .register("/", catchers![problem_catcher])
        .mount(
            "/",
            SwaggerUi::new("/swagger/<_..>").url("/api/openapi.json", ApiDoc::openapi()),
        )
}
