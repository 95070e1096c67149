use utoipa::{IntoParams, ToSchema};

use super::{
    UserNotification, UserNotificationUpdateData, DEFAULT_PAGE_LIMIT,
    USER_NOTIFICATION_COLLECTION_NAME,
};
use crate::data::request::parse_deadline;
use crate::resp::problem::{problems, Problem};
use crate::store::{Direction, Query, Store, StoreError};
use crate::util;

/// Filters and page of the user notification list. Equality and date filters
/// run in the store, `search` is applied to the fetched page.
#[derive(Debug, Clone, Default, FromForm, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserNotificationFilter {
    /// 1-based, defaults to 1.
    pub page: Option<usize>,
    /// Defaults to 10.
    pub limit: Option<usize>,
    /// `STUDENT` or `TUTOR`.
    #[field(name = "userType")]
    #[param(rename = "userType")]
    pub user_type: Option<String>,
    #[field(name = "type")]
    #[param(rename = "type")]
    pub kind: Option<String>,
    #[field(name = "requestType")]
    #[param(rename = "requestType")]
    pub request_type: Option<String>,
    /// Case-insensitive substring of title or body.
    pub search: Option<String>,
    /// Earliest creation date, inclusive.
    #[field(name = "startDate")]
    #[param(rename = "startDate")]
    pub start_date: Option<String>,
    /// Latest creation date, inclusive.
    #[field(name = "endDate")]
    #[param(rename = "endDate")]
    pub end_date: Option<String>,
}

fn given(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|it| !it.is_empty())
}

fn date_bound(raw: &str) -> Result<String, Problem> {
    parse_deadline(raw)
        .map(|it| util::timestamp_string(&it))
        .ok_or_else(|| {
            problems::bad_request("Invalid date")
                .insert_str("date", raw)
                .clone()
        })
}

impl UserNotificationFilter {
    pub fn page(&self) -> usize {
        self.page.filter(|it| *it > 0).unwrap_or(1)
    }

    pub fn limit(&self) -> usize {
        self.limit.filter(|it| *it > 0).unwrap_or(DEFAULT_PAGE_LIMIT)
    }

    fn store_query(&self) -> Result<Query, Problem> {
        let mut query = Query::new();
        let equalities = [
            ("userType", given(&self.user_type)),
            ("type", given(&self.kind)),
            ("requestType", given(&self.request_type)),
        ];
        for (field, value) in equalities {
            if let Some(value) = value {
                query = query.eq(field, value);
            }
        }

        if let Some(start) = given(&self.start_date) {
            query = query.gte("createdAt", date_bound(start)?);
        }
        if let Some(end) = given(&self.end_date) {
            query = query.lte("createdAt", date_bound(end)?);
        }

        Ok(query.order_by("createdAt", Direction::Descending))
    }
}

/// One page of user notifications. `total` counts every match of the store
/// filters, before `search`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserNotificationPage {
    pub notifications: Vec<UserNotification>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

pub trait UserNotificationDbExt {
    async fn list_user_notifications(
        &self,
        filter: &UserNotificationFilter,
    ) -> Result<UserNotificationPage, Problem>;

    async fn create_user_notification(
        &self,
        notification: &UserNotification,
    ) -> Result<String, StoreError>;

    async fn get_user_notification(
        &self,
        id: &str,
    ) -> Result<Option<UserNotification>, StoreError>;

    async fn update_user_notification(
        &self,
        id: &str,
        update: &UserNotificationUpdateData,
    ) -> Result<bool, StoreError>;

    async fn delete_user_notification(&self, id: &str) -> Result<bool, StoreError>;
}

impl UserNotificationDbExt for Store {
    async fn list_user_notifications(
        &self,
        filter: &UserNotificationFilter,
    ) -> Result<UserNotificationPage, Problem> {
        let matches: Vec<UserNotification> = self
            .find_as(USER_NOTIFICATION_COLLECTION_NAME, &filter.store_query()?)
            .await?;

        let total = matches.len();
        let (page, limit) = (filter.page(), filter.limit());
        let search = given(&filter.search);
        let notifications = matches
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .filter(|it| search.map_or(true, |term| it.matches_search(term)))
            .collect();

        Ok(UserNotificationPage {
            notifications,
            total,
            page,
            limit,
        })
    }

    async fn create_user_notification(
        &self,
        notification: &UserNotification,
    ) -> Result<String, StoreError> {
        let id = self
            .insert_as(USER_NOTIFICATION_COLLECTION_NAME, notification)
            .await?;
        tracing::info!("created user notification {}", id);
        Ok(id)
    }

    async fn get_user_notification(
        &self,
        id: &str,
    ) -> Result<Option<UserNotification>, StoreError> {
        self.get_as(USER_NOTIFICATION_COLLECTION_NAME, id).await
    }

    async fn update_user_notification(
        &self,
        id: &str,
        update: &UserNotificationUpdateData,
    ) -> Result<bool, StoreError> {
        let mut patch = bson::to_document(update)?;
        patch.insert("updatedAt", util::now_string());
        self.update(USER_NOTIFICATION_COLLECTION_NAME, id, patch)
            .await
    }

    async fn delete_user_notification(&self, id: &str) -> Result<bool, StoreError> {
        self.delete(USER_NOTIFICATION_COLLECTION_NAME, id).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::data::user_notification::{NotificationType, RequestType, UserType};

    fn template(title: &str, user_type: UserType, days_ago: i64) -> UserNotification {
        let created =
            Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap() - Duration::days(days_ago);
        UserNotification {
            id: String::new(),
            title: title.to_string(),
            body: format!("{} body", title),
            kind: NotificationType::StudentCreateRequest,
            user_type,
            request_type: RequestType::Exam,
            created_at: created,
            updated_at: created,
        }
    }

    async fn seeded() -> Store {
        let store = Store::memory();
        let templates = [
            template("Exam booked", UserType::Student, 0),
            template("New exam", UserType::Tutor, 1),
            template("Exam reminder", UserType::Student, 2),
            template("Homework due", UserType::Student, 10),
        ];
        for it in &templates {
            store.create_user_notification(it).await.unwrap();
        }
        store
    }

    #[rocket::async_test]
    async fn filters_run_before_paging() {
        let store = seeded().await;

        let filter = UserNotificationFilter {
            user_type: Some("STUDENT".to_string()),
            limit: Some(2),
            ..Default::default()
        };
        let page = store.list_user_notifications(&filter).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.notifications.len(), 2);
        assert_eq!(page.notifications[0].title, "Exam booked");

        let second = UserNotificationFilter {
            page: Some(2),
            ..filter
        };
        let page = store.list_user_notifications(&second).await.unwrap();
        assert_eq!(page.page, 2);
        assert_eq!(page.notifications.len(), 1);
        assert_eq!(page.notifications[0].title, "Homework due");
    }

    #[rocket::async_test]
    async fn date_range_and_search() {
        let store = seeded().await;

        let filter = UserNotificationFilter {
            start_date: Some("2024-03-17".to_string()),
            end_date: Some("2024-03-19T23:59:59Z".to_string()),
            ..Default::default()
        };
        let page = store.list_user_notifications(&filter).await.unwrap();
        assert_eq!(page.total, 2);

        let filter = UserNotificationFilter {
            search: Some("REMINDER".to_string()),
            ..Default::default()
        };
        let page = store.list_user_notifications(&filter).await.unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.notifications.len(), 1);

        let filter = UserNotificationFilter {
            start_date: Some("last week".to_string()),
            ..Default::default()
        };
        assert!(store.list_user_notifications(&filter).await.is_err());
    }
}
