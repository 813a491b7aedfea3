//! Background Jobs for Marquee API
//!
//! - `sweeper`: purges expired cache pages and stale rate-limit state
//!
//! # Usage
//!
//! ```ignore
//! use marquee_api::jobs::{sweeper_task, SweeperConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(sweeper_task(state.clone(), SweeperConfig::from_env(), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod sweeper;

pub use sweeper::{sweeper_task, SweeperConfig, SweeperMetrics, SweeperSnapshot};
