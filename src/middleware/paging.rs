use std::convert::Infallible;

use rocket::request::{FromRequest, Outcome, Request};

pub static DEFAULT_PAGE_SIZE: u32 = 20;

/// Cursor pagination read from the `page`, `pageSize` and `lastVisibleId`
/// query parameters. Malformed values fall back to the defaults.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct PageState {
    pub page: u32,
    pub page_size: u32,
    pub last_visible_id: Option<String>,
}

impl Default for PageState {
    fn default() -> Self {
        PageState {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            last_visible_id: None,
        }
    }
}

impl PageState {
    pub fn has_previous_page(&self) -> bool {
        self.page > 1
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PageState {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let page: Option<u32> = request
            .query_value("page")
            .and_then(|it| it.ok())
            .filter(|it| *it > 0);

        let page_size: Option<u32> = request
            .query_value("pageSize")
            .and_then(|it| it.ok())
            .filter(|it| *it > 0);

        let last_visible_id: Option<String> = request
            .query_value::<String>("lastVisibleId")
            .and_then(|it| it.ok())
            .filter(|it| !it.is_empty());

        Outcome::Success(PageState {
            page: page.unwrap_or(1),
            page_size: page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            last_visible_id,
        })
    }
}
