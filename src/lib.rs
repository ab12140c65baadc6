//! Cached, throttled, retrying gateway to a spreadsheet-backed order store
//!
//! The storefront keeps its catalog and orders in a spreadsheet behind a
//! rate-limited remote API. This crate mediates every read and write:
//!
//! - [`cache`]: bounded TTL/LRU caches, one per resource class
//! - [`throttle`]: per-operation-class minimum-interval pacing
//! - [`retry`]: exponential backoff with jitter for transient failures
//! - [`gateway`]: the pipeline tying them together: cache check, throttle,
//!   retried backend call, write-through, and degraded fallbacks for reads
//! - [`client`]: the [`SheetsBackend`] seam and its HTTP implementation
//!
//! # Example
//!
//! ```no_run
//! use sheetgate::{GatewayConfig, HttpSheetsBackend, SheetsGateway};
//!
//! # async fn run() -> sheetgate::Result<()> {
//! let config = GatewayConfig::load()?;
//! let backend = HttpSheetsBackend::new(&config.backend)?;
//! let gateway = SheetsGateway::new(backend, &config);
//!
//! let inventory = gateway.fetch_inventory().await?;
//! println!("{} products on the shelf", inventory.all.len());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod retry;
pub mod throttle;

pub use client::{HttpSheetsBackend, SheetsBackend};
pub use config::GatewayConfig;
pub use error::{ApiError, Error, ErrorKind, Result};
pub use gateway::{GatewayCacheStats, SheetsGateway};
pub use models::{Inventory, Order, Product};
pub use retry::RetryPolicy;
pub use throttle::{OperationClass, Throttler};
