use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use newscache::budget::BudgetTracker;
use newscache::config::Config;
use newscache::news::NewsClient;
use newscache::storage::{Article, Database, DatabaseError};
use newscache::sync::{ArticleSync, SyncError, SyncSettings};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Get the config directory path (~/.config/newscache/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("newscache"))
}

/// Create the directory if needed and restrict it to the current user.
fn prepare_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(dir, perms) {
                    tracing::warn!(
                        path = %dir.display(),
                        error = %e,
                        "Failed to set directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %dir.display(),
                    error = %e,
                    "Failed to read directory metadata"
                );
            }
        }
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(
    name = "newscache",
    about = "Cached news headlines with favorites and a daily request budget"
)]
struct Args {
    /// Config file (default: ~/.config/newscache/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Database file (default: ~/.config/newscache/articles.db)
    #[arg(long, value_name = "FILE", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show top headlines (page 1 is served from cache while fresh)
    Feed {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Search all articles
    Search {
        query: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// List favorite articles
    Favorites,
    /// Mark an article as favorite
    Favorite { id: String },
    /// Remove an article from favorites
    Unfavorite { id: String },
    /// Remove every favorite mark, keeping the articles
    ClearFavorites,
    /// Show today's request budget
    Budget,
    /// Reset today's request count
    ResetBudget,
    /// Delete every cached article, favorites included
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = match &args.db {
        Some(path) => path.clone(),
        None => {
            prepare_dir(&config_dir)?;
            config_dir.join("articles.db")
        }
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of newscache appears to be using the database. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    let sync = build_sync(&config, db)?;
    match args.command {
        Command::Feed { page } => report(sync.load_feed(page).await)?,
        Command::Search { query, page } => report(sync.search(&query, page).await)?,
        Command::Favorites => print_articles(&sync.favorites().await?),
        Command::Favorite { id } => set_favorite(&sync, &id, true).await?,
        Command::Unfavorite { id } => set_favorite(&sync, &id, false).await?,
        Command::ClearFavorites => {
            let cleared = sync.clear_favorites().await?;
            println!("Removed {cleared} favorites.");
        }
        Command::Budget => {
            let budget = sync.budget();
            let state = budget.state().await?;
            println!(
                "Requests today: {}/{} ({} remaining)",
                state.count,
                budget.max_daily(),
                state.remaining(budget.max_daily())
            );
            if let Some(last) = state.last_request {
                println!("Last request: {}", last.format("%Y-%m-%d %H:%M:%S"));
            }
        }
        Command::ResetBudget => {
            sync.reset_rate_limit().await?;
            println!("Request count reset.");
        }
        Command::Clear => {
            let removed = sync.clear_cache().await?;
            println!("Removed {removed} cached articles.");
        }
    }
    Ok(())
}

type NewsSync = ArticleSync<Database, Option<NewsClient>, Database>;

/// Wire the orchestrator. Without an API key only cached data is reachable.
fn build_sync(config: &Config, db: Database) -> Result<NewsSync> {
    let client = match config.api_key() {
        Some(api_key) => {
            let http = reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .user_agent(concat!("newscache/", env!("CARGO_PKG_VERSION")))
                .build()
                .context("Failed to build HTTP client")?;
            let client = NewsClient::new(http, &config.api_host, &api_key)
                .context("Failed to configure API client")?;
            Some(client)
        }
        None => {
            tracing::debug!("No API key configured, running cache-only");
            None
        }
    };
    let budget = BudgetTracker::new(db.clone(), config.max_daily_requests);
    Ok(ArticleSync::new(
        db,
        client,
        budget,
        SyncSettings::from_config(config),
    ))
}

/// Print a feed or search result. A rate limit exits with status 2.
fn report(result: Result<Vec<Article>, SyncError>) -> Result<()> {
    match result {
        Ok(articles) => {
            print_articles(&articles);
            Ok(())
        }
        Err(e @ SyncError::RateLimited(_)) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}

async fn set_favorite(sync: &NewsSync, id: &str, value: bool) -> Result<()> {
    if !sync.set_favorite(id, value).await? {
        anyhow::bail!("No cached article with id {id}");
    }
    println!("{} {id}", if value { "Favorited" } else { "Unfavorited" });
    Ok(())
}

fn print_articles(articles: &[Article]) {
    if articles.is_empty() {
        println!("No articles.");
        return;
    }
    for article in articles {
        let marker = if article.is_favorite { "*" } else { " " };
        let published = article
            .published()
            .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let source = article.source.as_deref().unwrap_or("unknown");
        println!("{marker} {published}  [{source}] {}", article.title);
        println!("    {}", article.id);
    }
}
