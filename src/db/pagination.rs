//! Offset pagination on top of [`QueryBuilder`].

use serde::Serialize;
use url::form_urlencoded;

use super::query::{FromRow, QueryBuilder};
use crate::error::Result;
use crate::request::Request;

/// Pages shown on each side of the current one in [`Paginated::links`].
const WINDOW: u64 = 3;

/// Which page to fetch, and the URL context used to build page links.
#[derive(Clone, Debug)]
pub struct PageRequest {
    page: u64,
    page_name: String,
    path: String,
    query: Vec<(String, String)>,
}

impl PageRequest {
    /// An explicit page number. Values below 1 become 1.
    pub fn new(page: u64) -> Self {
        Self { page: page.max(1), page_name: "page".to_owned(), path: "/".to_owned(), query: Vec::new() }
    }

    /// Reads `?page=` from the request, defaulting to 1. Links keep the
    /// request's path and other query parameters.
    pub fn from_request(req: &Request) -> Self {
        Self::named(req, "page")
    }

    /// Like [`from_request`](Self::from_request) with a custom query key.
    pub fn named(req: &Request, page_name: &str) -> Self {
        let page = req
            .query(page_name)
            .and_then(|p| p.trim().parse::<i64>().ok())
            .map_or(1, |p| u64::try_from(p.max(1)).unwrap_or(1));
        Self {
            page,
            page_name: page_name.to_owned(),
            path: req.path().to_owned(),
            query: req.query_pairs().to_vec(),
        }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    /// URL of `page`, replacing the page parameter in place or appending it.
    fn url_for(&self, page: u64) -> String {
        let mut pairs = self.query.clone();
        let value = page.to_string();
        match pairs.iter_mut().find(|(k, _)| *k == self.page_name) {
            Some(pair) => pair.1 = value,
            None => pairs.push((self.page_name.clone(), value)),
        }
        let query = form_urlencoded::Serializer::new(String::new()).extend_pairs(&pairs).finish();
        format!("{}?{query}", self.path)
    }
}

/// One entry of the pager. `url` is `None` for the `...` gap marker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PageLink {
    pub url: Option<String>,
    pub label: String,
    pub active: bool,
}

impl PageLink {
    fn page(page_req: &PageRequest, page: u64, label: impl Into<String>, active: bool) -> Self {
        Self { url: Some(page_req.url_for(page)), label: label.into(), active }
    }

    fn gap() -> Self {
        Self { url: None, label: "...".to_owned(), active: false }
    }
}

/// A page of results with totals and navigation links.
#[derive(Clone, Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub current_page: u64,
    pub per_page: u64,
    pub total: u64,
    pub last_page: u64,
    pub from: u64,
    pub to: u64,
    pub has_more_pages: bool,
    pub prev_page: Option<u64>,
    pub next_page: Option<u64>,
    pub path: String,
    pub links: Vec<PageLink>,
}

/// A page of results without a total count.
#[derive(Clone, Debug, Serialize)]
pub struct SimplePaginated<T> {
    pub data: Vec<T>,
    pub current_page: u64,
    pub per_page: u64,
    pub from: u64,
    pub to: u64,
    pub has_more_pages: bool,
    pub prev_page: Option<u64>,
    pub next_page: Option<u64>,
    pub path: String,
}

/// Rows to skip before `page`. Saturates at the largest OFFSET SQLite
/// accepts, so an absurd page number reads as past the end.
fn page_offset(page: u64, per_page: u64) -> u64 {
    page.saturating_sub(1).saturating_mul(per_page).min(i64::MAX as u64)
}

fn links(req: &PageRequest, current: u64, last: u64) -> Vec<PageLink> {
    let mut links = Vec::new();
    if current > 1 {
        links.push(PageLink::page(req, current - 1, "&laquo; Previous", false));
    }
    if current > WINDOW + 1 {
        links.push(PageLink::page(req, 1, "1", false));
        if current > WINDOW + 2 {
            links.push(PageLink::gap());
        }
    }

    let start = current.saturating_sub(WINDOW).max(1);
    let end = last.min(current + WINDOW);
    for page in start..=end {
        links.push(PageLink::page(req, page, page.to_string(), page == current));
    }

    if current + WINDOW < last {
        if current + WINDOW + 1 < last {
            links.push(PageLink::gap());
        }
        links.push(PageLink::page(req, last, last.to_string(), false));
    }
    if current < last {
        links.push(PageLink::page(req, current + 1, "Next &raquo;", false));
    }
    links
}

impl<T: FromRow> QueryBuilder<T> {
    /// Runs a COUNT with the same WHERE, then fetches one page.
    ///
    /// `per_page` below 1 is treated as 1. A page past the end yields no
    /// data and `from`/`to` of 0.
    pub async fn paginate(self, per_page: u64, page: &PageRequest) -> Result<Paginated<T>> {
        let per_page = per_page.max(1);
        let current = page.page;
        let offset = page_offset(current, per_page);

        let total = self.count().await?;
        let data = self.limit(per_page).offset(offset).get().await?;

        let last_page = total.div_ceil(per_page);
        let (from, to) = if offset < total { (offset + 1, (offset + per_page).min(total)) } else { (0, 0) };

        Ok(Paginated {
            data,
            current_page: current,
            per_page,
            total,
            last_page,
            from,
            to,
            has_more_pages: current < last_page,
            prev_page: (current > 1).then(|| current - 1),
            next_page: (current < last_page).then(|| current + 1),
            path: page.path.clone(),
            links: links(page, current, last_page),
        })
    }

    /// Fetches `per_page + 1` rows to learn whether another page exists,
    /// without counting.
    pub async fn simple_paginate(self, per_page: u64, page: &PageRequest) -> Result<SimplePaginated<T>> {
        let per_page = per_page.max(1);
        let current = page.page;
        let offset = page_offset(current, per_page);

        let mut data = self.limit(per_page + 1).offset(offset).get().await?;
        let has_more_pages = data.len() as u64 > per_page;
        data.truncate(per_page as usize);

        let fetched = data.len() as u64;
        Ok(SimplePaginated {
            data,
            current_page: current,
            per_page,
            from: if fetched > 0 { offset + 1 } else { 0 },
            to: if fetched > 0 { offset.saturating_add(fetched) } else { 0 },
            has_more_pages,
            prev_page: (current > 1).then(|| current - 1),
            next_page: has_more_pages.then(|| current + 1),
            path: page.path.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::RecordingDatabase;
    use crate::db::{attrs, Attributes};
    use crate::method::Method;

    fn labels(links: &[PageLink]) -> Vec<&str> {
        links.iter().map(|l| l.label.as_str()).collect()
    }

    #[test]
    fn page_comes_from_the_query_string() {
        let req = Request::new(Method::Get, "/blog?page=3&sort=new");
        assert_eq!(PageRequest::from_request(&req).page(), 3);

        for target in ["/blog", "/blog?page=-2", "/blog?page=abc", "/blog?page=0"] {
            assert_eq!(PageRequest::from_request(&Request::new(Method::Get, target)).page(), 1, "{target}");
        }
    }

    #[test]
    fn links_replace_the_page_parameter_in_place() {
        let req = Request::new(Method::Get, "/blog?page=2&sort=new");
        let page = PageRequest::from_request(&req);
        assert_eq!(page.url_for(3), "/blog?page=3&sort=new");

        let req = Request::new(Method::Get, "/blog?sort=new");
        assert_eq!(PageRequest::from_request(&req).url_for(2), "/blog?sort=new&page=2");
    }

    #[test]
    fn window_with_gaps_on_both_sides() {
        let links = links(&PageRequest::new(10), 10, 20);
        assert_eq!(
            labels(&links),
            ["&laquo; Previous", "1", "...", "7", "8", "9", "10", "11", "12", "13", "...", "20", "Next &raquo;"]
        );
        assert!(links[6].active);
        assert_eq!(links[2].url, None);
    }

    #[test]
    fn single_page_has_one_link() {
        let links = links(&PageRequest::new(1), 1, 1);
        assert_eq!(labels(&links), ["1"]);
        assert!(links[0].active);
    }

    #[tokio::test]
    async fn forty_seven_rows_page_five() {
        let fake = RecordingDatabase::new();
        fake.push_rows(vec![attrs([("count", 47)])]);
        fake.push_rows((41..=47).map(|id| attrs([("id", id)])).collect());

        let page = QueryBuilder::table(fake.clone(), "tags")
            .paginate(10, &PageRequest::new(5))
            .await
            .unwrap();

        assert_eq!(page.data.len(), 7);
        assert_eq!((page.total, page.last_page, page.from, page.to), (47, 5, 41, 47));
        assert!(!page.has_more_pages);
        assert_eq!((page.prev_page, page.next_page), (Some(4), None));
        assert_eq!(labels(&page.links), ["&laquo; Previous", "1", "2", "3", "4", "5"]);
        assert_eq!(fake.sql()[1], "SELECT * FROM `tags` LIMIT 10 OFFSET 40");
    }

    #[tokio::test]
    async fn huge_page_numbers_saturate_the_offset() {
        let req = Request::new(Method::Get, "/tags?page=9223372036854775807");
        let page = PageRequest::from_request(&req);
        assert_eq!(page.page(), i64::MAX as u64);

        let fake = RecordingDatabase::new();
        fake.push_rows(vec![attrs([("count", 3)])]);
        let result = QueryBuilder::table(fake.clone(), "tags").paginate(15, &page).await.unwrap();

        assert!(result.data.is_empty());
        assert_eq!((result.from, result.to, result.last_page), (0, 0, 1));
        assert_eq!(result.next_page, None);
        assert_eq!(fake.sql()[1], format!("SELECT * FROM `tags` LIMIT 15 OFFSET {}", i64::MAX));

        let fake = RecordingDatabase::new();
        let result = QueryBuilder::table(fake.clone(), "tags").simple_paginate(15, &page).await.unwrap();
        assert_eq!((result.from, result.to), (0, 0));
        assert_eq!(fake.sql(), [format!("SELECT * FROM `tags` LIMIT 16 OFFSET {}", i64::MAX)]);
    }

    #[tokio::test]
    async fn empty_table_has_zero_bounds() {
        let fake = RecordingDatabase::new();
        fake.push_rows(vec![attrs([("count", 0)])]);
        let page = QueryBuilder::table(fake.clone(), "tags").paginate(15, &PageRequest::new(1)).await.unwrap();
        assert_eq!((page.total, page.last_page, page.from, page.to), (0, 0, 0, 0));
        assert!(page.links.is_empty());
    }

    #[tokio::test]
    async fn simple_paginate_fetches_one_extra_row() {
        let fake = RecordingDatabase::new();
        fake.push_rows((1..=4).map(|id| attrs([("id", id)])).collect::<Vec<Attributes>>());

        let page = QueryBuilder::table(fake.clone(), "tags")
            .simple_paginate(3, &PageRequest::new(1))
            .await
            .unwrap();

        assert_eq!(page.data.len(), 3);
        assert!(page.has_more_pages);
        assert_eq!((page.from, page.to, page.next_page), (1, 3, Some(2)));
        assert_eq!(fake.sql(), ["SELECT * FROM `tags` LIMIT 4 OFFSET 0"]);
    }
}
