//! # Lima Connect dashboard
//!
//! Live view synchronization engine for the shop-floor office dashboard:
//! keeps a local, typed view of the non-archived record collection in step
//! with the store, resolves submitter profiles once per session, and raises
//! one alert per genuinely new pending record.
//!
//! Data flow for each delivery from the store:
//! `store` snapshot -> `normalizer` -> `profiles` -> `classifier` ->
//! `notifier`, with `filter` re-deriving the displayed subset on demand.
//! `subscription` owns the per-session wiring; `api` exposes it over HTTP.

pub mod api;
pub mod classifier;
pub mod display;
pub mod error;
pub mod filter;
pub mod model;
pub mod normalizer;
pub mod notifier;
pub mod profiles;
pub mod store;
pub mod subscription;

pub use api::{build_router, AppState};
pub use error::{Result, SyncError};
pub use subscription::{DashboardEngine, EngineSettings, EngineStatus, SessionSignal, SubscriptionManager};
