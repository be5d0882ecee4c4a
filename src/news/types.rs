use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

use crate::storage::NewArticle;

/// Top-level response body of both search endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlesResponse {
    pub status: String,
    pub total_results: u64,
    pub articles: Vec<RemoteArticle>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteSource {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// One article as delivered by the API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteArticle {
    #[serde(default)]
    pub source: RemoteSource,
    pub author: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub url: Url,
    pub url_to_image: Option<String>,
    pub published_at: DateTime<Utc>,
    pub content: Option<String>,
}

impl RemoteArticle {
    /// Identity key: the canonical serialization of the article URL.
    pub fn id(&self) -> &str {
        self.url.as_str()
    }

    /// Convert into a storable article. Returns `None` for blank titles.
    pub fn into_new_article(self) -> Option<NewArticle> {
        let title = self.title.trim();
        if title.is_empty() {
            return None;
        }
        let image_url = self
            .url_to_image
            .as_deref()
            .and_then(|raw| Url::parse(raw).ok())
            .map(String::from);
        Some(NewArticle {
            id: self.url.as_str().to_string(),
            title: title.to_string(),
            summary: self.description.filter(|d| !d.trim().is_empty()),
            image_url,
            source: self.source.name,
            published_at: self.published_at.timestamp(),
            url: self.url.into(),
        })
    }
}

impl ArticlesResponse {
    /// Storable articles in response order. Unusable entries are dropped.
    pub fn into_articles(self) -> Vec<NewArticle> {
        let offered = self.articles.len();
        let articles: Vec<NewArticle> = self
            .articles
            .into_iter()
            .filter_map(RemoteArticle::into_new_article)
            .collect();

        let skipped = offered - articles.len();
        if skipped > 0 {
            tracing::warn!(skipped = skipped, "Articles with blank titles skipped");
        }
        articles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "status": "ok",
        "totalResults": 2,
        "articles": [
            {
                "source": {"id": "bbc-news", "name": "BBC News"},
                "author": "Jane Doe",
                "title": "Rust 2.0 announced",
                "description": "A summary",
                "url": "https://example.com/rust",
                "urlToImage": "https://example.com/rust.png",
                "publishedAt": "2024-01-02T03:04:05Z",
                "content": "Body"
            },
            {
                "source": {"id": null, "name": null},
                "author": null,
                "title": "  ",
                "description": null,
                "url": "https://example.com/removed",
                "urlToImage": null,
                "publishedAt": "2024-01-01T00:00:00Z",
                "content": null
            }
        ]
    }"#;

    #[test]
    fn test_decode_sample_response() {
        let response: ArticlesResponse = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(response.status, "ok");
        assert_eq!(response.total_results, 2);
        assert_eq!(response.articles.len(), 2);
        assert_eq!(response.articles[0].source.name.as_deref(), Some("BBC News"));
        assert_eq!(response.articles[0].id(), "https://example.com/rust");
    }

    #[test]
    fn test_into_articles_skips_blank_titles() {
        let response: ArticlesResponse = serde_json::from_str(SAMPLE).unwrap();
        let articles = response.into_articles();
        assert_eq!(articles.len(), 1);

        let article = &articles[0];
        assert_eq!(article.id, "https://example.com/rust");
        assert_eq!(article.url, "https://example.com/rust");
        assert_eq!(article.title, "Rust 2.0 announced");
        assert_eq!(article.summary.as_deref(), Some("A summary"));
        assert_eq!(article.image_url.as_deref(), Some("https://example.com/rust.png"));
        assert_eq!(article.source.as_deref(), Some("BBC News"));
        assert_eq!(article.published_at, 1704164645);
    }

    #[test]
    fn test_id_is_canonical_url() {
        let json = r#"{
            "source": {"id": null, "name": "X"},
            "author": null,
            "title": "T",
            "description": null,
            "url": "HTTPS://Example.COM:443/a",
            "urlToImage": "not a url",
            "publishedAt": "2024-01-01T00:00:00+02:00",
            "content": null
        }"#;
        let remote: RemoteArticle = serde_json::from_str(json).unwrap();
        let article = remote.into_new_article().unwrap();
        assert_eq!(article.id, "https://example.com/a");
        assert_eq!(article.image_url, None);
        assert_eq!(article.published_at, 1704060000);
    }

    #[test]
    fn test_bad_date_fails_decoding() {
        let json = SAMPLE.replace("2024-01-02T03:04:05Z", "yesterday");
        assert!(serde_json::from_str::<ArticlesResponse>(&json).is_err());
    }

    #[test]
    fn test_bad_url_fails_decoding() {
        let json = SAMPLE.replace("https://example.com/rust\"", "not a url\"");
        assert!(serde_json::from_str::<ArticlesResponse>(&json).is_err());
    }
}
