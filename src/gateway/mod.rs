//! Spreadsheet gateway: cache, throttle, retry, backend
//!
//! Every read and write to the remote row store goes through here. The
//! gateway is the policy boundary deciding, per resource, whether an
//! exhausted retry becomes an error (writes) or a degraded fallback (reads):
//! catalog browsing favors availability, order status and payment uploads
//! must surface failures.

mod flight;

use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::cache::{CacheStats, CacheTtl, TtlLruCache};
use crate::client::SheetsBackend;
use crate::config::GatewayConfig;
use crate::error::{ApiError, Result};
use crate::models::{Inventory, ORDER_HEADERS, Order, OrderColumn, SheetMetadata};
use crate::retry::RetryPolicy;
use crate::throttle::{OperationClass, Throttler};
use flight::FlightGroup;

/// Key under which the single inventory snapshot lives
const INVENTORY_KEY: &str = "inventory_data";

/// Key under which the spreadsheet metadata lives
const METADATA_KEY: &str = "sheet_metadata";

fn order_cache_key(order_id: &str) -> String {
    format!("order_{}", order_id)
}

type Cache<V> = StdMutex<TtlLruCache<String, V>>;

fn lock<V>(cache: &Cache<V>) -> MutexGuard<'_, TtlLruCache<String, V>> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counters rolled up across every cache instance
#[derive(Debug, Clone, Serialize)]
pub struct AggregateCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub total_requests: u64,
    pub cache_count: usize,
}

/// Per-resource and aggregate cache counters, for the health collector
#[derive(Debug, Clone, Serialize)]
pub struct GatewayCacheStats {
    pub inventory: CacheStats,
    pub orders: CacheStats,
    pub sheets: CacheStats,
    pub drive: CacheStats,
    pub total: AggregateCacheStats,
}

/// Gateway mediating all access to the spreadsheet backend
pub struct SheetsGateway<B> {
    backend: Arc<B>,
    inventory_cache: Cache<Inventory>,
    /// `Some(order)` is a found order, `None` a negative-cached miss
    orders_cache: Cache<Option<Order>>,
    sheets_cache: Cache<SheetMetadata>,
    /// File-storage resource class; uploads are write-once so nothing
    /// populates this today, but the health report covers it
    drive_cache: Cache<String>,
    throttler: Throttler,
    retry: RetryPolicy,
    flight: FlightGroup,
}

impl<B: SheetsBackend + 'static> SheetsGateway<B> {
    pub fn new(backend: B, config: &GatewayConfig) -> Self {
        Self::with_arc(Arc::new(backend), config)
    }

    pub fn with_arc(backend: Arc<B>, config: &GatewayConfig) -> Self {
        let caches = &config.caches;
        Self {
            backend,
            inventory_cache: StdMutex::new(TtlLruCache::new(
                caches.inventory.capacity,
                caches.inventory.ttl(),
            )),
            orders_cache: StdMutex::new(TtlLruCache::new(
                caches.orders.capacity,
                caches.orders.ttl(),
            )),
            sheets_cache: StdMutex::new(TtlLruCache::new(
                caches.sheets.capacity,
                caches.sheets.ttl(),
            )),
            drive_cache: StdMutex::new(TtlLruCache::new(
                caches.drive.capacity,
                caches.drive.ttl(),
            )),
            throttler: Throttler::new(config.throttle.intervals()),
            retry: config.retry.policy(),
            flight: FlightGroup::new(),
        }
    }

    /// The wrapped backend, for operations outside the gateway's scope.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Fetch the categorized inventory snapshot.
    ///
    /// Served from cache within its freshness window. When the backend stays
    /// unreachable through every retry, callers get the static fallback
    /// catalog instead of an error, so the storefront remains browsable.
    pub async fn fetch_inventory(&self) -> Result<Inventory> {
        if let Some(hit) = lock(&self.inventory_cache).get(&INVENTORY_KEY.to_string()) {
            debug!("Cache hit: inventory");
            return Ok(hit);
        }

        let guard = self.flight.acquire(INVENTORY_KEY).await;
        let result = self.fetch_inventory_fresh().await;
        drop(guard);
        self.flight.forget(INVENTORY_KEY);
        result
    }

    async fn fetch_inventory_fresh(&self) -> Result<Inventory> {
        // A predecessor may have filled the cache while we held the line
        if let Some(hit) = lock(&self.inventory_cache).peek(&INVENTORY_KEY.to_string()) {
            debug!("Cache hit: inventory (filled in flight)");
            return Ok(hit);
        }

        self.throttler.wait(OperationClass::Inventory).await;

        let backend = self.backend.clone();
        let outcome = self
            .retry
            .run("fetch_inventory", move || {
                let backend = backend.clone();
                async move { backend.fetch_inventory_rows().await }
            })
            .await;

        match outcome {
            Ok(rows) => {
                let inventory = Inventory::from_rows(&rows);
                lock(&self.inventory_cache)
                    .insert(INVENTORY_KEY.to_string(), inventory.clone());
                Ok(inventory)
            }
            Err(err) => {
                warn!(
                    "Inventory fetch failed ({}); serving the static fallback catalog",
                    err
                );
                let fallback = Inventory::fallback();
                lock(&self.inventory_cache).insert_with_ttl(
                    INVENTORY_KEY.to_string(),
                    fallback.clone(),
                    CacheTtl::INVENTORY_FALLBACK,
                );
                Ok(fallback)
            }
        }
    }

    /// Look up one order by id.
    ///
    /// `Ok(None)` means the order does not exist (negative-cached briefly to
    /// suppress hot-looping on a known-bad id); a transport failure after
    /// retries is an error.
    pub async fn get_order_details(&self, order_id: &str) -> Result<Option<Order>> {
        let key = order_cache_key(order_id);
        if let Some(hit) = lock(&self.orders_cache).get(&key) {
            debug!("Cache hit: order {}", order_id);
            return Ok(hit);
        }

        let guard = self.flight.acquire(&key).await;
        let result = self.lookup_order_fresh(order_id, &key).await;
        drop(guard);
        self.flight.forget(&key);
        result
    }

    async fn lookup_order_fresh(&self, order_id: &str, key: &str) -> Result<Option<Order>> {
        if let Some(hit) = lock(&self.orders_cache).peek(&key.to_string()) {
            debug!("Cache hit: order {} (filled in flight)", order_id);
            return Ok(hit);
        }

        self.throttler.wait(OperationClass::SheetsRead).await;

        let backend = self.backend.clone();
        let rows = self
            .retry
            .run("get_order_details", move || {
                let backend = backend.clone();
                async move { backend.fetch_order_rows().await }
            })
            .await
            .inspect_err(|err| {
                error!("Failed to get order details for {}: {}", order_id, err);
            })?;

        let found = rows
            .iter()
            .filter(|row| row.is_summary())
            .find(|row| row.order_id.as_deref() == Some(order_id))
            .and_then(Order::from_row);

        match found {
            Some(order) => {
                lock(&self.orders_cache).insert_with_ttl(
                    key.to_string(),
                    Some(order.clone()),
                    CacheTtl::ORDER_DETAIL,
                );
                Ok(Some(order))
            }
            None => {
                debug!("Order {} not found; negative-caching the miss", order_id);
                lock(&self.orders_cache).insert_with_ttl(
                    key.to_string(),
                    None,
                    CacheTtl::ORDER_NEGATIVE,
                );
                Ok(None)
            }
        }
    }

    /// Append a new order row.
    ///
    /// The row is padded or truncated to the sheet's header width. On
    /// success the whole orders cache is dropped, since appends shift row
    /// offsets for everything after them.
    pub async fn add_order(&self, mut values: Vec<String>) -> Result<()> {
        let metadata = self.ensure_metadata().await?;
        let width = if metadata.order_headers.is_empty() {
            ORDER_HEADERS.len()
        } else {
            metadata.order_headers.len()
        };
        values.resize(width, String::new());

        self.throttler.wait(OperationClass::SheetsWrite).await;

        let backend = self.backend.clone();
        let row = Arc::new(values);
        self.retry
            .run("add_order", move || {
                let backend = backend.clone();
                let row = row.clone();
                async move { backend.append_order_row(&row).await }
            })
            .await?;

        lock(&self.orders_cache).clear();
        info!("Order row appended; orders cache invalidated");
        Ok(())
    }

    /// Update an order's status (and optionally its tracking link).
    ///
    /// Returns the customer chat id from the order's summary row so the
    /// caller can notify them. Unknown order ids are an error, not a silent
    /// no-op.
    pub async fn update_order_status(
        &self,
        order_id: &str,
        new_status: &str,
        tracking_link: Option<&str>,
    ) -> Result<Option<i64>> {
        self.ensure_metadata().await?;

        self.throttler.wait(OperationClass::SheetsWrite).await;

        let rows = self.backend.fetch_order_rows().await?;
        let position = rows
            .iter()
            .position(|row| row.is_summary() && row.order_id.as_deref() == Some(order_id));
        let Some(index) = position else {
            error!("Order {} not found for status update", order_id);
            return Err(ApiError::NotFound(format!("order {}", order_id)).into());
        };

        let customer_id = rows[index].customer_id;
        // Sheet rows are 1-based and the header occupies row 1
        let row_number = index as u32 + 2;

        let mut updates = vec![(OrderColumn::Status, new_status.to_string())];
        if let Some(link) = tracking_link {
            updates.push((OrderColumn::TrackingLink, link.to_string()));
        }

        // The order id rides along in the retry name for log correlation;
        // the throttle class above stays SheetsWrite
        let operation = format!("update_order_status:{}", order_id);
        let backend = self.backend.clone();
        let updates = Arc::new(updates);
        self.retry
            .run(&operation, move || {
                let backend = backend.clone();
                let updates = updates.clone();
                async move { backend.update_order_cells(row_number, &updates).await }
            })
            .await?;

        lock(&self.orders_cache).remove(&order_cache_key(order_id));
        info!(
            "Updated order {} status to '{}'{}",
            order_id,
            new_status,
            if tracking_link.is_some() {
                " with tracking"
            } else {
                ""
            }
        );
        Ok(customer_id)
    }

    /// Upload a payment attachment, returning its shareable link.
    ///
    /// Write-once: never cached. An empty payload is rejected before any
    /// network activity.
    pub async fn upload_attachment(&self, bytes: Vec<u8>, filename: &str) -> Result<String> {
        if bytes.is_empty() {
            error!("Refusing to upload an empty attachment");
            return Err(ApiError::BadRequest("Empty attachment payload".to_string()).into());
        }

        let filename = if filename.trim().is_empty() {
            format!("payment_{}.jpg", Utc::now().format("%Y%m%d%H%M%S"))
        } else {
            filename.to_string()
        };

        self.throttler.wait(OperationClass::Drive).await;

        let backend = self.backend.clone();
        let bytes = Arc::new(bytes);
        let link = self
            .retry
            .run("upload_attachment", move || {
                let backend = backend.clone();
                let bytes = bytes.clone();
                let filename = filename.clone();
                async move { backend.upload_attachment((*bytes).clone(), &filename).await }
            })
            .await?;

        Ok(link)
    }

    /// Fetch (and cache) the spreadsheet's structure.
    ///
    /// Write paths call this before mutating so a renamed or reshuffled
    /// header row is noticed rather than silently written past.
    pub async fn ensure_metadata(&self) -> Result<SheetMetadata> {
        if let Some(hit) = lock(&self.sheets_cache).get(&METADATA_KEY.to_string()) {
            debug!("Cache hit: sheet metadata");
            return Ok(hit);
        }

        self.throttler.wait(OperationClass::Sheets).await;

        let backend = self.backend.clone();
        let metadata = self
            .retry
            .run("sheet_metadata", move || {
                let backend = backend.clone();
                async move { backend.sheet_metadata().await }
            })
            .await?;

        if !metadata.has_expected_headers() {
            warn!("Orders tab header row does not match the expected layout");
        }

        lock(&self.sheets_cache).insert(METADATA_KEY.to_string(), metadata.clone());
        Ok(metadata)
    }

    /// Snapshot per-resource and aggregate cache counters.
    pub fn cache_stats(&self) -> GatewayCacheStats {
        let inventory = lock(&self.inventory_cache).stats();
        let orders = lock(&self.orders_cache).stats();
        let sheets = lock(&self.sheets_cache).stats();
        let drive = lock(&self.drive_cache).stats();

        let hits = inventory.hits + orders.hits + sheets.hits + drive.hits;
        let misses = inventory.misses + orders.misses + sheets.misses + drive.misses;
        let total_requests = hits + misses;
        let hit_ratio = if total_requests == 0 {
            0.0
        } else {
            hits as f64 / total_requests as f64
        };

        GatewayCacheStats {
            inventory,
            orders,
            sheets,
            drive,
            total: AggregateCacheStats {
                hits,
                misses,
                hit_ratio,
                total_requests,
                cache_count: 4,
            },
        }
    }
}
