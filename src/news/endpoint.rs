use chrono::{DateTime, SecondsFormat, Utc};
use url::Url;

pub const DEFAULT_COUNTRY: &str = "us";
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Ordering for full-text search results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    /// Most recent first
    #[default]
    PublishedAt,
    Relevancy,
    Popularity,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::PublishedAt => "publishedAt",
            SortBy::Relevancy => "relevancy",
            SortBy::Popularity => "popularity",
        }
    }
}

/// Parameters for the paged headline feed (`/v2/top-headlines`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlineParams {
    pub country: String,
    pub page_size: u32,
    pub page: u32,
    /// Optional free-text filter, dropped when empty
    pub query: Option<String>,
}

impl Default for HeadlineParams {
    fn default() -> Self {
        Self {
            country: DEFAULT_COUNTRY.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            page: 1,
            query: None,
        }
    }
}

/// Parameters for full-text search (`/v2/everything`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub query: String,
    pub page_size: u32,
    pub page: u32,
    pub sort_by: SortBy,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl SearchParams {
    pub fn new(query: impl Into<String>, page: u32) -> Self {
        Self {
            query: query.into(),
            page_size: DEFAULT_PAGE_SIZE,
            page,
            sort_by: SortBy::default(),
            from: None,
            to: None,
        }
    }
}

/// A request path plus its query parameters, independent of the API host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub path: &'static str,
    pub query: Vec<(&'static str, String)>,
}

impl Endpoint {
    pub fn top_headlines(params: &HeadlineParams) -> Self {
        let mut query = vec![
            ("country", params.country.clone()),
            ("pageSize", params.page_size.to_string()),
            ("page", params.page.max(1).to_string()),
        ];
        if let Some(q) = params.query.as_deref().filter(|q| !q.is_empty()) {
            query.push(("q", q.to_string()));
        }
        Self {
            path: "/v2/top-headlines",
            query,
        }
    }

    pub fn everything(params: &SearchParams) -> Self {
        let mut query = vec![
            ("q", params.query.clone()),
            ("pageSize", params.page_size.to_string()),
            ("page", params.page.max(1).to_string()),
            ("sortBy", params.sort_by.as_str().to_string()),
        ];
        if let Some(from) = params.from {
            query.push(("from", iso8601(from)));
        }
        if let Some(to) = params.to {
            query.push(("to", iso8601(to)));
        }
        Self {
            path: "/v2/everything",
            query,
        }
    }

    /// Look up a query parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Resolve against an API host such as `https://newsapi.org`.
    pub fn url(&self, base: &str) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(base)?.join(self.path)?;
        url.query_pairs_mut()
            .extend_pairs(self.query.iter().map(|(k, v)| (*k, v.as_str())));
        Ok(url)
    }
}

fn iso8601(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}
