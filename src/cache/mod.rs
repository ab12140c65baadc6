//! In-process caching for backend responses
//!
//! One bounded TTL/LRU cache instance per logical resource class shields the
//! rate-limited backend from repeat reads. Entries expire lazily at lookup
//! time; there is no background sweeper.

pub mod lru;

use std::time::Duration;

pub use lru::{CacheStats, TtlLruCache};

/// Cache TTL configuration per resource class
///
/// Freshness windows follow each resource's volatility: the catalog changes
/// rarely, order status is expected to be polled and must surface updates
/// promptly.
pub struct CacheTtl;

impl CacheTtl {
    /// Full inventory snapshot
    pub const INVENTORY: Duration = Duration::from_secs(300); // 5 min
    /// Inventory fallback written after exhausted retries; short so recovery
    /// from an outage is prompt
    pub const INVENTORY_FALLBACK: Duration = Duration::from_secs(30);

    /// Single order looked up by id
    pub const ORDER_DETAIL: Duration = Duration::from_secs(30);
    /// Known-missing order id (negative cache)
    pub const ORDER_NEGATIVE: Duration = Duration::from_secs(30);
    /// Default for anything else in the orders cache
    pub const ORDERS: Duration = Duration::from_secs(60);

    /// Spreadsheet metadata (tab names, header row)
    pub const SHEET_METADATA: Duration = Duration::from_secs(120); // 2 min

    /// File-storage metadata
    pub const DRIVE: Duration = Duration::from_secs(600); // 10 min
}

/// Resident-entry bounds per resource class
pub struct CacheCapacity;

impl CacheCapacity {
    pub const INVENTORY: usize = 20;
    pub const ORDERS: usize = 100;
    pub const SHEETS: usize = 50;
    pub const DRIVE: usize = 30;
}
