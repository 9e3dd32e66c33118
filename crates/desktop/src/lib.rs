//! `turboshop-desktop`
//!
//! Offline support for the workshop client:
//!
//! - an interception layer in front of the backend (read cache, offline
//!   defaults, provisional writes)
//! - a durable FIFO of writes made while offline
//! - reconciliation that replays them in order, remapping provisional identities
//! - a background worker that triggers replay when connectivity returns

pub mod cache;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod interceptor;
pub mod mutation_queue;
pub mod offline;
pub mod reconcile;
pub mod replay_worker;
pub mod routes;
pub mod settings;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use cache::{CachedEntry, ReadCache};
pub use client::OfflineClient;
pub use config::{DatabaseLocation, OfflineConfig};
pub use error::{OfflineError, OfflineResult};
pub use interceptor::OfflineInterceptor;
pub use mutation_queue::MutationQueue;
pub use offline::{Connectivity, ConnectivityState};
pub use reconcile::{IdentityRemap, Reconciler, ReplayError, ReplayPolicy, ReplayReport};
pub use replay_worker::{Backoff, ReplayWorker};
pub use routes::{OfflineDefaults, Route};
pub use settings::{InMemorySettingsStore, JsonFileSettingsStore, SettingsStore, ShopSettings};
pub use transport::{HttpTransport, Transport, TransportError, TransportResponse};
pub use types::{ApiRequest, ApiResponse, HttpMethod, PendingMutation, ResponseSource, WriteOutcome};
