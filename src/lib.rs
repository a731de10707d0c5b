//! # CoinWatch Ticker Sync SDK
//!
//! Keeps a normalized snapshot of exchange tickers available to presentation
//! code, whatever the network is doing.
//!
//! ## Architecture
//!
//! ```text
//! PollingController (timer + refresh_now)
//!     ↓
//! ResilientClient ── Endpoint resolver (dev path / prod origin)
//!     ↓          └── ProxyChain (ordered CORS relays)
//! Transport (reqwest)
//!     ↓
//! normalize → SnapshotCache (durable) + SnapshotStore (watch/broadcast)
//!     ↓
//! Your Code (state, changed, events)
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use coinwatch_sdk::{PollingController, SyncConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::from_env();
//! let controller = PollingController::from_config(&config)?;
//! let mut subscription = controller.start(config.refresh_interval);
//!
//! if let Some(state) = subscription.changed().await {
//!     if let Some(error) = &state.error {
//!         eprintln!("{}", error);
//!     }
//!     for coin in state.data.iter() {
//!         println!("{}: {} ({}%)", coin.display_pair(), coin.ticker.last, coin.ticker.percent_change);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Network failures never reach consumers as errors once a snapshot exists:
//! the previous data stays published and `error` stays `None`. Only a failed
//! first fetch with nothing cached sets `error`.

pub mod cache;
pub mod client;
pub mod config;
pub mod constants;
pub mod controller;
pub mod endpoint;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod preferences;
pub mod proxy;
pub mod store;
pub mod transport;
pub mod transports;
pub mod types;

// Re-export commonly used types
pub use cache::{FileStorage, MemoryStorage, SnapshotCache, Storage};
pub use client::{RequestOptions, ResilientClient};
pub use config::SyncConfig;
pub use controller::{PollingController, Subscription};
pub use endpoint::{Environment, Service};
pub use error::{CacheError, FetchError, SyncError};
pub use metrics::{RefreshMetrics, RouteStats};
pub use normalize::normalize;
pub use preferences::{Preferences, PreferencesStore, PrefsAction};
pub use proxy::ProxyChain;
pub use transport::{Transport, TransportRequest, TransportResponse};
pub use transports::HttpTransport;
pub use types::{
    CoinInfo, ComponentHealth, HealthStatus, MarketSnapshot, SyncEvent, SyncPhase, SyncState,
    TickerRecord,
};
