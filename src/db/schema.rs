/// Schema for the cache and limiter tables.
pub const SCHEMA: &str = r#"
-- Append-only log of raw API responses
CREATE TABLE IF NOT EXISTS response_cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cache_key TEXT NOT NULL,
    url TEXT NOT NULL,
    identity TEXT NOT NULL,
    payload TEXT NOT NULL,
    fetched_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_response_cache_key
    ON response_cache(cache_key, fetched_at);

CREATE INDEX IF NOT EXISTS idx_response_cache_fetched
    ON response_cache(fetched_at);

-- Sliding log of granted requests per rate-limit realm
CREATE TABLE IF NOT EXISTS rate_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    realm TEXT NOT NULL,
    cost INTEGER NOT NULL,
    at_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_rate_events_realm
    ON rate_events(realm, at_ms);
"#;
