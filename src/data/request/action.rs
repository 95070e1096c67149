use bson::{doc, Document};
use chrono::{DateTime, Utc};
use utoipa::ToSchema;

use super::RequestStatus;
use crate::util::{self, serde_helpers::text};

static CANCELLED_BY_ADMIN: &str = "Cancelled by admin";

/// Administrative operation on a request, selected by the `action` tag.
#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RequestAction {
    ChangeStatus {
        status: RequestStatus,
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    AssignTutor {
        tutor_id: String,
        #[serde(deserialize_with = "text::deserialize")]
        #[schema(value_type = String)]
        tutor_price: String,
    },
    #[serde(rename_all = "camelCase")]
    AssignStudent {
        student_id: String,
        #[serde(deserialize_with = "text::deserialize")]
        #[schema(value_type = String)]
        student_price: String,
    },
    #[serde(rename_all = "camelCase")]
    SetTutorPrice {
        #[serde(deserialize_with = "text::deserialize")]
        #[schema(value_type = String)]
        tutor_price: String,
    },
    #[serde(rename_all = "camelCase")]
    SetStudentPrice {
        #[serde(deserialize_with = "text::deserialize")]
        #[schema(value_type = String)]
        student_price: String,
    },
    Cancel {
        reason: String,
    },
    Complete {
        #[serde(default)]
        feedback: Option<String>,
    },
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|it| !it.is_empty())
}

impl RequestAction {
    pub fn name(&self) -> &'static str {
        match self {
            RequestAction::ChangeStatus { .. } => "change_status",
            RequestAction::AssignTutor { .. } => "assign_tutor",
            RequestAction::AssignStudent { .. } => "assign_student",
            RequestAction::SetTutorPrice { .. } => "set_tutor_price",
            RequestAction::SetStudentPrice { .. } => "set_student_price",
            RequestAction::Cancel { .. } => "cancel",
            RequestAction::Complete { .. } => "complete",
        }
    }

    /// Fields written to the request. Every action stamps `updated_at`.
    pub fn patch(&self, now: &DateTime<Utc>) -> Document {
        let mut patch = doc! { "updated_at": util::timestamp_string(now) };

        match self {
            RequestAction::ChangeStatus { status, reason } => {
                patch.insert("request_status", status.as_str());
                if let Some(reason) = present(reason) {
                    patch.insert("cancel_reason", reason);
                }

                match status {
                    RequestStatus::Cancelled => {
                        patch.insert("cancelled", "1");
                        patch.insert(
                            "cancel_reason",
                            present(reason).unwrap_or(CANCELLED_BY_ADMIN),
                        );
                    }
                    RequestStatus::Completed => {
                        patch.insert("completed", "1");
                        patch.insert("accepted", "1");
                    }
                    RequestStatus::Ongoing => {
                        patch.insert("accepted", "1");
                    }
                    _ => {}
                }
            }
            RequestAction::AssignTutor {
                tutor_id,
                tutor_price,
            } => {
                patch.insert("tutor_id", tutor_id.as_str());
                patch.insert("tutor_price", tutor_price.as_str());
                patch.insert("tutor_accepted", "1");
                patch.insert("request_status", RequestStatus::Ongoing.as_str());
            }
            RequestAction::AssignStudent {
                student_id,
                student_price,
            } => {
                patch.insert("student_id", student_id.as_str());
                patch.insert("student_price", student_price.as_str());
            }
            RequestAction::SetTutorPrice { tutor_price } => {
                patch.insert("tutor_price", tutor_price.as_str());
            }
            RequestAction::SetStudentPrice { student_price } => {
                patch.insert("student_price", student_price.as_str());
            }
            RequestAction::Cancel { reason } => {
                patch.insert("request_status", RequestStatus::Cancelled.as_str());
                patch.insert("cancelled", "1");
                patch.insert("cancel_reason", reason.as_str());
            }
            RequestAction::Complete { feedback } => {
                patch.insert("request_status", RequestStatus::Completed.as_str());
                patch.insert("completed", "1");
                patch.insert("accepted", "1");
                if let Some(feedback) = present(feedback) {
                    patch.insert("feedback", feedback);
                }
            }
        }

        patch
    }
}
