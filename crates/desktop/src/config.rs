//! Offline client configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

/// Where the cache and the mutation queue live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// Lost on drop. Tests and throwaway sessions.
    InMemory,
    File(PathBuf),
}

impl DatabaseLocation {
    /// `{data_dir}/turboshop/offline.db`, falling back to `~/.local/share`.
    pub fn default_file() -> anyhow::Result<Self> {
        let base = dirs::data_dir()
            .or_else(|| {
                dirs::home_dir().map(|mut h| {
                    h.push(".local");
                    h.push("share");
                    h
                })
            })
            .context("failed to resolve OS app data directory")?;
        Ok(Self::File(base.join("turboshop").join("offline.db")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineConfig {
    /// Backend base URL, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Bound on every network attempt before falling back to cache or queue.
    pub request_timeout: Duration,
    /// Cache generation tag. Entries from any other generation are purged on open.
    pub cache_generation: String,
    /// Failed replay attempts after which a queued mutation is expired.
    pub max_replay_attempts: u32,
    /// Age after which a queued mutation is expired instead of replayed.
    pub max_mutation_age: Option<chrono::Duration>,
    /// Periodic connectivity probe interval of the replay worker.
    pub probe_interval: Duration,
    /// Backoff after a failed replay window; doubles up to `max_backoff`.
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub database: DatabaseLocation,
}

impl OfflineConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(5),
            cache_generation: concat!("turboshop-cache-v", env!("CARGO_PKG_VERSION")).to_string(),
            max_replay_attempts: 20,
            max_mutation_age: Some(chrono::Duration::days(30)),
            probe_interval: Duration::from_secs(30),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
            database: DatabaseLocation::InMemory,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_cache_generation(mut self, generation: impl Into<String>) -> Self {
        self.cache_generation = generation.into();
        self
    }

    pub fn with_database(mut self, database: DatabaseLocation) -> Self {
        self.database = database;
        self
    }

    pub fn with_max_replay_attempts(mut self, attempts: u32) -> Self {
        self.max_replay_attempts = attempts;
        self
    }

    pub fn with_max_mutation_age(mut self, age: Option<chrono::Duration>) -> Self {
        self.max_mutation_age = age;
        self
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads `TURBOSHOP_API_URL`, `TURBOSHOP_REQUEST_TIMEOUT_MS`,
    /// `TURBOSHOP_CACHE_GENERATION`, `TURBOSHOP_MAX_REPLAY_ATTEMPTS` and
    /// `TURBOSHOP_OFFLINE_DB` (a path, or `:memory:`).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let base_url = lookup("TURBOSHOP_API_URL").unwrap_or_else(|| "http://localhost:8080".into());
        let mut config = Self::new(base_url.trim_end_matches('/'));

        if let Some(ms) = lookup("TURBOSHOP_REQUEST_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .with_context(|| format!("TURBOSHOP_REQUEST_TIMEOUT_MS is not a number: {ms}"))?;
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(generation) = lookup("TURBOSHOP_CACHE_GENERATION") {
            config.cache_generation = generation;
        }
        if let Some(attempts) = lookup("TURBOSHOP_MAX_REPLAY_ATTEMPTS") {
            config.max_replay_attempts = attempts
                .parse()
                .with_context(|| format!("TURBOSHOP_MAX_REPLAY_ATTEMPTS is not a number: {attempts}"))?;
        }
        config.database = match lookup("TURBOSHOP_OFFLINE_DB").as_deref() {
            Some(":memory:") => DatabaseLocation::InMemory,
            Some(path) => DatabaseLocation::File(PathBuf::from(path)),
            None => DatabaseLocation::default_file()?,
        };

        Ok(config)
    }
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self::new("http://localhost:8080")
    }
}
