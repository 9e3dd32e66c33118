//! Server configuration, read from `TURBOSHOP_*` environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;

use turboshop_inventory::NegativeStockPolicy;
use turboshop_observability::{LogFormat, ObservabilityConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub negative_stock: NegativeStockPolicy,
    /// Insert the reference inventory on startup.
    pub seed_defaults: bool,
    /// How long a replayed `Idempotency-Key` keeps returning the first response.
    pub idempotency_ttl: Duration,
    pub observability: ObservabilityConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            negative_stock: NegativeStockPolicy::Permit,
            seed_defaults: false,
            idempotency_ttl: Duration::from_secs(24 * 60 * 60),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = lookup("TURBOSHOP_BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .with_context(|| format!("TURBOSHOP_BIND_ADDR is not a socket address: {addr}"))?;
        }
        if let Some(policy) = lookup("TURBOSHOP_NEGATIVE_STOCK") {
            config.negative_stock = policy
                .parse()
                .map_err(|e| anyhow::anyhow!("TURBOSHOP_NEGATIVE_STOCK: {e}"))?;
        }
        if let Some(seed) = lookup("TURBOSHOP_SEED_DEFAULTS") {
            config.seed_defaults = matches!(seed.trim(), "1" | "true" | "yes");
        }
        if let Some(secs) = lookup("TURBOSHOP_IDEMPOTENCY_TTL_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .context("TURBOSHOP_IDEMPOTENCY_TTL_SECS must be a number of seconds")?;
            config.idempotency_ttl = Duration::from_secs(secs);
        }
        if let Some(format) = lookup("TURBOSHOP_LOG_FORMAT") {
            config.observability.format = format
                .parse::<LogFormat>()
                .context("TURBOSHOP_LOG_FORMAT")?;
        }

        Ok(config)
    }
}
