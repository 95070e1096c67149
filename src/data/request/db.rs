use bson::doc;
use chrono::{DateTime, Utc};
use utoipa::{IntoParams, ToSchema};

use super::action::RequestAction;
use super::{parse_deadline, Request, REQUEST_COLLECTION_NAME};
use crate::middleware::paging::PageState;
use crate::store::{Direction, Query, Store, StoreError};
use crate::util;

/// Filters of the request list. Equality filters run in the store, `search`
/// and the date range are applied to the fetched page.
#[derive(Debug, Clone, Default, FromForm, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RequestFilter {
    pub assistance_type: Option<String>,
    /// Matched lower-cased.
    pub request_status: Option<String>,
    pub country: Option<String>,
    pub language: Option<String>,
    pub subject: Option<String>,
    pub student_id: Option<String>,
    pub tutor_id: Option<String>,
    /// Case-insensitive substring of label, description, subject or language.
    pub search: Option<String>,
    /// Earliest deadline, inclusive.
    pub date_from: Option<String>,
    /// Latest deadline, inclusive.
    pub date_to: Option<String>,
}

fn given(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|it| !it.is_empty())
}

impl RequestFilter {
    fn store_query(&self) -> Query {
        let mut query = Query::new();
        let equalities = [
            ("assistance_type", given(&self.assistance_type).map(str::to_string)),
            (
                "request_status",
                given(&self.request_status).map(str::to_lowercase),
            ),
            ("country", given(&self.country).map(str::to_string)),
            ("language", given(&self.language).map(str::to_string)),
            ("subject", given(&self.subject).map(str::to_string)),
            ("student_id", given(&self.student_id).map(str::to_string)),
            ("tutor_id", given(&self.tutor_id).map(str::to_string)),
        ];
        for (field, value) in equalities {
            if let Some(value) = value {
                query = query.eq(field, value);
            }
        }
        query
    }

    fn keeps(&self, request: &Request) -> bool {
        if let Some(term) = given(&self.search) {
            if !request.matches_search(term) {
                return false;
            }
        }

        let bounds = [
            (given(&self.date_from), true),
            (given(&self.date_to), false),
        ];
        for (bound, is_lower) in bounds {
            let bound: Option<DateTime<Utc>> = match bound {
                Some(raw) => match parse_deadline(raw) {
                    Some(it) => Some(it),
                    // An unparsable bound matches nothing.
                    None => return false,
                },
                None => None,
            };
            if let Some(bound) = bound {
                let within = match request.deadline {
                    Some(deadline) if is_lower => deadline >= bound,
                    Some(deadline) => deadline <= bound,
                    None => false,
                };
                if !within {
                    return false;
                }
            }
        }

        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub page_size: u32,
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub last_visible_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RequestPage {
    pub requests: Vec<Request>,
    pub pagination: Pagination,
}

pub trait RequestDbExt {
    async fn create_request(&self, request: &Request) -> Result<String, StoreError>;

    /// One page of requests, newest first.
    ///
    /// `hasNextPage` and `lastVisibleId` describe the page as fetched, before
    /// `search` and the date range are applied, so a filtered page can hold
    /// fewer than `pageSize` requests while more pages remain.
    async fn list_requests(
        &self,
        filter: &RequestFilter,
        page: &PageState,
    ) -> Result<RequestPage, StoreError>;

    async fn get_request(&self, id: &str) -> Result<Option<Request>, StoreError>;

    /// Returns `false` when the request doesn't exist.
    async fn update_request(&self, id: &str, patch: bson::Document) -> Result<bool, StoreError>;

    async fn delete_request(&self, id: &str) -> Result<bool, StoreError>;

    async fn apply_request_action(
        &self,
        id: &str,
        action: &RequestAction,
    ) -> Result<bool, StoreError>;

    async fn set_tutor_paid(&self, id: &str, tutor_paid: bool) -> Result<bool, StoreError>;

    /// Drops `storage_path` from `file_links` together with the `file_names`
    /// entry at the same position.
    async fn remove_request_file(
        &self,
        id: &str,
        storage_path: &str,
    ) -> Result<Option<Request>, StoreError>;
}

impl RequestDbExt for Store {
    async fn create_request(&self, request: &Request) -> Result<String, StoreError> {
        let id = self.insert_as(REQUEST_COLLECTION_NAME, request).await?;
        tracing::info!("created request {}", id);
        Ok(id)
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
        page: &PageState,
    ) -> Result<RequestPage, StoreError> {
        let page_size = page.page_size as usize;
        let query = filter
            .store_query()
            .order_by("created_at", Direction::Descending)
            .start_after(page.last_visible_id.clone())
            .limit(page_size + 1);

        let mut requests: Vec<Request> = self.find_as(REQUEST_COLLECTION_NAME, &query).await?;
        let has_next_page = requests.len() > page_size;
        requests.truncate(page_size);

        let last_visible_id = requests.last().map(|it| it.id.clone());
        let fetched = requests.len();
        requests.retain(|it| filter.keeps(it));
        tracing::debug!(
            "listed {} requests, {} after page filters",
            fetched,
            requests.len()
        );

        Ok(RequestPage {
            requests,
            pagination: Pagination {
                current_page: page.page,
                page_size: page.page_size,
                has_next_page,
                has_previous_page: page.has_previous_page(),
                last_visible_id,
            },
        })
    }

    async fn get_request(&self, id: &str) -> Result<Option<Request>, StoreError> {
        self.get_as(REQUEST_COLLECTION_NAME, id).await
    }

    async fn update_request(&self, id: &str, patch: bson::Document) -> Result<bool, StoreError> {
        self.update(REQUEST_COLLECTION_NAME, id, patch).await
    }

    async fn delete_request(&self, id: &str) -> Result<bool, StoreError> {
        self.delete(REQUEST_COLLECTION_NAME, id).await
    }

    async fn apply_request_action(
        &self,
        id: &str,
        action: &RequestAction,
    ) -> Result<bool, StoreError> {
        tracing::debug!("applying {} to request {}", action.name(), id);
        self.update(REQUEST_COLLECTION_NAME, id, action.patch(&Utc::now()))
            .await
    }

    async fn set_tutor_paid(&self, id: &str, tutor_paid: bool) -> Result<bool, StoreError> {
        let patch = doc! {
            "tutor_paid": if tutor_paid { "1" } else { "0" },
            "updated_at": util::now_string(),
        };
        self.update(REQUEST_COLLECTION_NAME, id, patch).await
    }

    async fn remove_request_file(
        &self,
        id: &str,
        storage_path: &str,
    ) -> Result<Option<Request>, StoreError> {
        let mut request = match self.get_request(id).await? {
            Some(it) => it,
            None => return Ok(None),
        };

        if let Some(position) = request.file_links.iter().position(|it| it == storage_path) {
            request.file_links.remove(position);
            if position < request.file_names.len() {
                request.file_names.remove(position);
            }
        }
        request.updated_at = Utc::now();

        let patch = doc! {
            "file_links": serde_json::to_string(&request.file_links)
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            "file_names": serde_json::to_string(&request.file_names)
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            "updated_at": util::timestamp_string(&request.updated_at),
        };
        self.update(REQUEST_COLLECTION_NAME, id, patch).await?;

        Ok(Some(request))
    }
}
