use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tokio::sync::Mutex;

use crate::cache::FeedCache;
use crate::config::Config;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub feed_cache: Arc<Mutex<FeedCache>>,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        let ttl = Duration::from_secs(config.feed.cache_ttl_secs);
        Self {
            db,
            config,
            feed_cache: Arc::new(Mutex::new(FeedCache::new(ttl))),
        }
    }
}
