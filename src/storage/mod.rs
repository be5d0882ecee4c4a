mod articles;
mod preferences;
mod schema;
mod store;
mod types;

pub use schema::Database;
pub use store::{ArticleStore, PreferenceStore};
pub use types::{Article, DatabaseError, NewArticle};
