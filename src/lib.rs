//! Local cache of news articles fetched from a NewsAPI-compatible service.
//!
//! - [`budget`] caps remote requests per local calendar day
//! - [`news`] talks to the remote API
//! - [`storage`] keeps articles and favorites in SQLite
//! - [`sync`] decides between cache and network for every feed or search call

pub mod budget;
pub mod config;
pub mod news;
pub mod storage;
pub mod sync;
