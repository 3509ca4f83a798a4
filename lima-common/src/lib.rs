//! # Lima Connect Common Library
//!
//! Shared code for the Lima Connect shop-floor services:
//! - Error types
//! - Dashboard event types and the EventBus
//! - Configuration loading
//! - Timestamp coercion and display

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use config::DashboardConfig;
pub use error::{Error, Result};
pub use time::Timestamp;
