//! Remote news API access.
//!
//! - [`endpoint`] builds the two request shapes (headline feed, full-text search)
//! - [`client`] performs the request, classifies the status and decodes the body
//! - [`types`] holds the wire format and its conversion into storable articles
//!
//! The sync layer depends only on the [`ArticleSource`] trait, so any transport
//! that yields an [`ArticlesResponse`] can be plugged in.

mod client;
mod endpoint;
mod types;

pub use client::{classify_status, ArticleSource, FetchError, NewsClient};
pub use endpoint::{
    Endpoint, HeadlineParams, SearchParams, SortBy, DEFAULT_COUNTRY, DEFAULT_PAGE_SIZE,
};
pub use types::{ArticlesResponse, RemoteArticle, RemoteSource};
