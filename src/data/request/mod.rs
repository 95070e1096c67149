use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use utoipa::ToSchema;

use crate::util::{
    self,
    serde_helpers::{flag, flag_opt, json_list, json_list_opt, text, timestamp, timestamp_opt},
};

pub mod action;
pub mod db;

pub static REQUEST_COLLECTION_NAME: &str = "requests";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
pub enum AssistanceType {
    #[schema(rename = "homework")]
    Homework,
    #[schema(rename = "exam")]
    Exam,
    #[schema(rename = "project")]
    Project,
    #[schema(rename = "thesis")]
    Thesis,
    #[schema(rename = "online")]
    Online,
    #[schema(rename = "sos")]
    Sos,
    #[schema(rename = "one-on-one")]
    OneOnOne,
}

impl AssistanceType {
    pub fn as_str(self) -> &'static str {
        match self {
            AssistanceType::Homework => "homework",
            AssistanceType::Exam => "exam",
            AssistanceType::Project => "project",
            AssistanceType::Thesis => "thesis",
            AssistanceType::Online => "online",
            AssistanceType::Sos => "sos",
            AssistanceType::OneOnOne => "one-on-one",
        }
    }
}

impl FromStr for AssistanceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "homework" => AssistanceType::Homework,
            "exam" => AssistanceType::Exam,
            "project" => AssistanceType::Project,
            "thesis" => AssistanceType::Thesis,
            "online" => AssistanceType::Online,
            "sos" => AssistanceType::Sos,
            "one-on-one" | "one_on_one" => AssistanceType::OneOnOne,
            other => return Err(format!("unknown assistance type '{}'", other)),
        })
    }
}

impl TryFrom<String> for AssistanceType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AssistanceType> for String {
    fn from(value: AssistanceType) -> Self {
        value.as_str().to_string()
    }
}

impl Display for AssistanceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a request. Input is matched case-insensitively and
/// always written lower-cased.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
pub enum RequestStatus {
    #[default]
    #[schema(rename = "new")]
    New,
    #[schema(rename = "pending")]
    Pending,
    #[schema(rename = "pending_payment")]
    PendingPayment,
    #[schema(rename = "ongoing")]
    Ongoing,
    #[schema(rename = "tutor_completed")]
    TutorCompleted,
    #[schema(rename = "completed")]
    Completed,
    #[schema(rename = "cancelled")]
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::New => "new",
            RequestStatus::Pending => "pending",
            RequestStatus::PendingPayment => "pending_payment",
            RequestStatus::Ongoing => "ongoing",
            RequestStatus::TutorCompleted => "tutor_completed",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "new" => RequestStatus::New,
            "pending" => RequestStatus::Pending,
            "pending_payment" => RequestStatus::PendingPayment,
            "ongoing" => RequestStatus::Ongoing,
            "tutor_completed" => RequestStatus::TutorCompleted,
            "completed" => RequestStatus::Completed,
            "cancelled" => RequestStatus::Cancelled,
            other => return Err(format!("unknown request status '{}'", other)),
        })
    }
}

impl TryFrom<String> for RequestStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RequestStatus> for String {
    fn from(value: RequestStatus) -> Self {
        value.as_str().to_string()
    }
}

impl Display for RequestStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tutoring job posted by a student.
///
/// Flags and file lists keep their stored text representation on the wire:
/// flags are `"0"`/`"1"` and file lists are JSON encoded strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Request {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub description: Option<String>,
    pub description_type: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default, deserialize_with = "text::deserialize")]
    pub subject_id: String,
    pub sub_subject: Option<String>,
    pub field: Option<String>,
    pub field_id: Option<String>,
    pub syllabus_link: Option<String>,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub country: String,
    pub timezone: Option<String>,
    pub assistance_type: Option<AssistanceType>,
    #[serde(default)]
    pub exam_type: String,
    #[serde(default)]
    pub request_status: RequestStatus,
    pub state: Option<String>,
    /// `"0"` or a JSON document.
    #[serde(default = "unset_attributes")]
    pub cms_attributes: String,
    pub saved_by: Option<String>,

    /// Date and time of day the student asked for, as sent.
    pub date: Option<String>,
    pub time: Option<String>,
    /// Minutes.
    pub duration: Option<u32>,

    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub tutor_id: String,
    pub student_nickname: Option<String>,
    pub tutor_nickname: Option<String>,

    #[serde(default)]
    pub student_price: String,
    #[serde(default)]
    pub tutor_price: String,
    pub min_price: Option<String>,
    #[serde(default)]
    pub discount: String,
    #[serde(default)]
    pub promo_id: String,

    #[serde(default, with = "flag")]
    #[schema(value_type = String, example = "0")]
    pub accepted: bool,
    #[serde(default, with = "flag")]
    #[schema(value_type = String, example = "0")]
    pub cancelled: bool,
    #[serde(default, with = "flag")]
    #[schema(value_type = String, example = "0")]
    pub completed: bool,
    #[serde(default, with = "flag")]
    #[schema(value_type = String, example = "0")]
    pub tutor_accepted: bool,
    #[serde(default, with = "flag")]
    #[schema(value_type = String, example = "0")]
    pub paid: bool,
    #[serde(default, with = "flag")]
    #[schema(value_type = String, example = "0")]
    pub tutor_paid: bool,
    #[serde(default, with = "flag")]
    #[schema(value_type = String, example = "0")]
    pub is_paid: bool,
    #[serde(default, with = "flag")]
    #[schema(value_type = String, example = "0")]
    pub issue_reported: bool,
    #[serde(default, with = "flag")]
    #[schema(value_type = String, example = "0")]
    pub locked: bool,
    #[serde(default, with = "flag")]
    #[schema(value_type = String, example = "0")]
    pub receipt_submitted: bool,

    pub cancel_reason: Option<String>,
    pub feedback: Option<String>,
    pub answer_text: Option<String>,
    /// Files uploaded by the tutor. Older documents hold a JSON encoded string.
    #[serde(default, deserialize_with = "json_list_opt::deserialize")]
    pub answer_files: Option<Vec<String>>,
    pub comments: Option<String>,
    #[serde(default)]
    pub notes: String,
    pub rating: Option<String>,
    pub grade: Option<String>,
    #[serde(default)]
    pub version: String,

    pub meeting_id: Option<String>,
    pub meeting_password: Option<String>,
    pub meeting_record_url: Option<String>,
    pub student_meeting_url: Option<String>,
    pub tutor_meeting_url: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub zoom_information: Option<serde_json::Value>,
    pub zoom_user_id: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub omt_info: Option<serde_json::Value>,

    #[serde(default, with = "json_list")]
    #[schema(value_type = String, example = "[\"/storage/uploads/image1234567-1700000000000.pdf\"]")]
    pub file_links: Vec<String>,
    #[serde(default, with = "json_list")]
    #[schema(value_type = String, example = "[\"notes.pdf\"]")]
    pub file_names: Vec<String>,

    #[serde(default = "Utc::now", with = "timestamp")]
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", with = "timestamp")]
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "timestamp_opt")]
    #[schema(value_type = Option<String>)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp_opt")]
    #[schema(value_type = Option<String>)]
    pub deleted_at: Option<DateTime<Utc>>,
}

fn unset_attributes() -> String {
    "0".to_string()
}

/// Caller supplied fields of a new request. Everything else is defaulted.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RequestCreateData {
    pub label: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "text::opt::deserialize")]
    #[schema(value_type = Option<String>)]
    pub subject_id: Option<String>,
    pub sub_subject: Option<String>,
    pub syllabus_link: Option<String>,
    /// Minutes.
    pub duration: Option<u32>,
    pub language: Option<String>,
    pub country: Option<String>,
    pub timezone: Option<String>,
    pub assistance_type: Option<AssistanceType>,
    pub student_id: Option<String>,
    #[serde(default, deserialize_with = "text::opt::deserialize")]
    #[schema(value_type = Option<String>)]
    pub student_price: Option<String>,

    #[serde(default, with = "json_list_opt")]
    pub file_links: Option<Vec<String>>,
    #[serde(default, with = "json_list_opt")]
    pub file_names: Option<Vec<String>>,

    /// Deadline as RFC 3339 or `YYYY-MM-DD`. Ignored when `date` and `time` are given.
    pub deadline: Option<String>,
    /// `YYYY-MM-DD`.
    pub date: Option<String>,
    /// `HH:MM`.
    pub time: Option<String>,
}

/// Parses deadlines and date filters. Accepts RFC 3339, a naive date-time
/// (taken as UTC) or a bare date (midnight UTC).
pub fn parse_deadline(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Some(it) = util::parse_timestamp(value) {
        return Some(it);
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(it) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&it));
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|it| it.and_hms_opt(0, 0, 0))
        .map(|it| Utc.from_utc_datetime(&it))
}

/// Combines a date with an `HH:MM` time of day.
pub fn combine_date_and_time(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let day = parse_deadline(date)?.date_naive();

    let mut parts = time.trim().split(':');
    let (hours, minutes) = match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(m), None) => (h.parse::<u32>().ok()?, m.parse::<u32>().ok()?),
        _ => return None,
    };
    if hours > 23 || minutes > 59 {
        return None;
    }

    day.and_hms_opt(hours, minutes, 0)
        .map(|it| Utc.from_utc_datetime(&it))
}

impl RequestCreateData {
    pub fn deadline(&self) -> Result<Option<DateTime<Utc>>, String> {
        if let (Some(date), Some(time)) = (&self.date, &self.time) {
            match combine_date_and_time(date, time) {
                Some(it) => return Ok(Some(it)),
                None => tracing::warn!(
                    "unable to combine date '{}' and time '{}', using supplied deadline",
                    date,
                    time
                ),
            }
        }

        match self.deadline.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => parse_deadline(raw)
                .map(Some)
                .ok_or_else(|| format!("invalid deadline '{}'", raw)),
        }
    }
}

impl Request {
    /// Builds a new request in the `new` state from caller data.
    pub fn create(
        data: RequestCreateData,
        now: DateTime<Utc>,
    ) -> Result<Request, String> {
        let deadline = data.deadline()?;

        Ok(Request {
            id: String::new(),
            label: data.label.unwrap_or_default(),
            description: data.description,
            description_type: None,
            subject: data.subject.unwrap_or_default(),
            subject_id: data.subject_id.unwrap_or_default(),
            sub_subject: data.sub_subject,
            field: None,
            field_id: None,
            syllabus_link: data.syllabus_link,
            language: data.language.unwrap_or_default(),
            country: data.country.unwrap_or_default(),
            timezone: data.timezone,
            assistance_type: data.assistance_type,
            exam_type: String::new(),
            request_status: RequestStatus::New,
            state: None,
            cms_attributes: unset_attributes(),
            saved_by: None,
            date: data.date,
            time: data.time,
            duration: data.duration,
            student_id: data.student_id.unwrap_or_default(),
            tutor_id: String::new(),
            student_nickname: None,
            tutor_nickname: None,
            student_price: data.student_price.unwrap_or_else(|| "0".to_string()),
            tutor_price: "0".to_string(),
            min_price: None,
            discount: "0".to_string(),
            promo_id: "0".to_string(),
            accepted: false,
            cancelled: false,
            completed: false,
            tutor_accepted: false,
            paid: false,
            tutor_paid: false,
            is_paid: false,
            issue_reported: false,
            locked: false,
            receipt_submitted: false,
            cancel_reason: None,
            feedback: None,
            answer_text: None,
            answer_files: None,
            comments: None,
            notes: String::new(),
            rating: None,
            grade: None,
            version: "1".to_string(),
            meeting_id: None,
            meeting_password: None,
            meeting_record_url: None,
            student_meeting_url: None,
            tutor_meeting_url: None,
            zoom_information: None,
            zoom_user_id: None,
            omt_info: None,
            file_links: data.file_links.unwrap_or_default(),
            file_names: data.file_names.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            deadline,
            deleted_at: None,
        })
    }

    /// Case-insensitive substring match over label, description, subject and language.
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        [
            Some(self.label.as_str()),
            self.description.as_deref(),
            Some(self.subject.as_str()),
            Some(self.language.as_str()),
        ]
        .into_iter()
        .flatten()
        .any(|it| it.to_lowercase().contains(&term))
    }
}

/// Partial update of a request. Only present fields are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RequestUpdateData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::opt::deserialize"
    )]
    #[schema(value_type = Option<String>)]
    pub subject_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syllabus_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistance_type: Option<AssistanceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_status: Option<RequestStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tutor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tutor_nickname: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::opt::deserialize"
    )]
    #[schema(value_type = Option<String>)]
    pub student_price: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::opt::deserialize"
    )]
    #[schema(value_type = Option<String>)]
    pub tutor_price: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::opt::deserialize"
    )]
    #[schema(value_type = Option<String>)]
    pub min_price: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::opt::deserialize"
    )]
    #[schema(value_type = Option<String>)]
    pub discount: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "flag_opt")]
    #[schema(value_type = Option<String>)]
    pub accepted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "flag_opt")]
    #[schema(value_type = Option<String>)]
    pub cancelled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "flag_opt")]
    #[schema(value_type = Option<String>)]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "flag_opt")]
    #[schema(value_type = Option<String>)]
    pub tutor_accepted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "flag_opt")]
    #[schema(value_type = Option<String>)]
    pub paid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "flag_opt")]
    #[schema(value_type = Option<String>)]
    pub is_paid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "flag_opt")]
    #[schema(value_type = Option<String>)]
    pub issue_reported: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "flag_opt")]
    #[schema(value_type = Option<String>)]
    pub locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "flag_opt")]
    #[schema(value_type = Option<String>)]
    pub receipt_submitted: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_text: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "json_list_opt::deserialize"
    )]
    pub answer_files: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_meeting_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tutor_meeting_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "json_list_opt")]
    pub file_links: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "json_list_opt")]
    pub file_names: Option<Vec<String>>,

    /// Written normalized, see [`parse_deadline`].
    #[serde(default, skip_serializing)]
    pub deadline: Option<String>,
}


impl RequestUpdateData {
    /// Store patch for this update, stamped with `now`.
    pub fn to_patch(&self, now: &DateTime<Utc>) -> Result<bson::Document, String> {
        let mut patch = bson::to_document(self).map_err(|e| e.to_string())?;

        if let Some(raw) = self.deadline.as_deref() {
            let deadline =
                parse_deadline(raw).ok_or_else(|| format!("invalid deadline '{}'", raw))?;
            patch.insert("deadline", util::timestamp_string(&deadline));
        }
        patch.insert("updated_at", util::timestamp_string(now));

        Ok(patch)
    }
}
