//! Offer watch: polls a trade-offer stream, groups offers per member and
//! raises alerts for bundles worth acting on.

pub mod aggregator;
pub mod alerts;
pub mod api;
pub mod bundle;
pub mod config;
pub mod error;
pub mod feed;
pub mod filter;
pub mod models;
pub mod poll;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod settings;

pub use error::{MonitorError, Result};
pub use runtime::{Monitor, MonitorHandle};
pub use settings::Settings;
