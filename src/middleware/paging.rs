use std::convert::Infallible;

use rocket::request::{FromRequest, Outcome};
use rocket::Request;

use crate::data::Page;

pub const DEFAULT_PAGE_LENGTH: u32 = 20;
pub const MAX_PAGE_LENGTH: u32 = 100;

/// Paging requested through the `page`/`p` and `len`/`l` query parameters.
///
/// Listings are unpaged unless a page number is given.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PageState {
    pub page_length: u32,
    pub page: Option<u32>,
}

impl Default for PageState {
    fn default() -> Self {
        PageState {
            page_length: DEFAULT_PAGE_LENGTH,
            page: None,
        }
    }
}

impl PageState {
    pub fn to_page(self) -> Option<Page> {
        let page = self.page?;
        let limit = self.page_length.clamp(1, MAX_PAGE_LENGTH) as u64;
        Some(Page {
            skip: page as u64 * limit,
            limit,
        })
    }
}

fn query_u32(request: &Request<'_>, names: &[&str]) -> Option<u32> {
    names
        .iter()
        .find_map(|name| request.query_value::<u32>(name).and_then(|it| it.ok()))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PageState {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let length = query_u32(request, &["len", "l"]);
        let page = query_u32(request, &["page", "p"]);

        Outcome::Success(PageState {
            page_length: length.unwrap_or(DEFAULT_PAGE_LENGTH),
            page,
        })
    }
}
