//! Mock spreadsheet backend for testing
//!
//! Seeded with rows via builder methods; tracks per-method call counts and
//! can inject a bounded number of failures of a given kind, plus artificial
//! latency for concurrency tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::SheetsBackend;
use crate::error::{ApiError, Error, ErrorKind, Result};
use crate::models::{InventoryRow, ORDER_HEADERS, OrderColumn, OrderRow, SheetMetadata};

/// Tracks backend call counts for test verification
#[derive(Default, Debug, Clone)]
pub struct CallCounts {
    pub fetch_inventory_rows: usize,
    pub fetch_order_rows: usize,
    pub append_order_row: usize,
    pub update_order_cells: usize,
    pub upload_attachment: usize,
    pub sheet_metadata: usize,
}

impl CallCounts {
    /// Total number of backend calls made.
    pub fn total(&self) -> usize {
        self.fetch_inventory_rows
            + self.fetch_order_rows
            + self.append_order_row
            + self.update_order_cells
            + self.upload_attachment
            + self.sheet_metadata
    }
}

fn error_for(kind: ErrorKind) -> Error {
    let api = match kind {
        ErrorKind::Network => ApiError::Network("injected connection failure".to_string()),
        ErrorKind::Timeout => ApiError::Timeout("injected timeout".to_string()),
        ErrorKind::RateLimited => ApiError::RateLimit(Duration::from_secs(60)),
        ErrorKind::Server => ApiError::ServerError("injected server error".to_string()),
        ErrorKind::Auth => ApiError::Unauthorized,
        ErrorKind::NotFound => ApiError::NotFound("injected not found".to_string()),
        ErrorKind::InvalidInput => ApiError::BadRequest("injected bad request".to_string()),
        ErrorKind::InvalidResponse => {
            ApiError::InvalidResponse("injected invalid response".to_string())
        }
    };
    api.into()
}

/// Build an order row from positional append values, header order.
fn row_from_values(values: &[String]) -> OrderRow {
    let cell = |idx: usize| -> Option<String> {
        values
            .get(idx)
            .filter(|v| !v.is_empty())
            .cloned()
    };

    OrderRow {
        order_id: cell(0),
        customer_id: cell(1).and_then(|v| v.parse().ok()),
        name: cell(2),
        address: cell(3),
        contact: cell(4),
        product: cell(5),
        quantity: cell(6).and_then(|v| v.parse().ok()),
        price: cell(7).and_then(|v| v.parse().ok()),
        status: cell(8),
        payment_url: cell(9),
        order_date: cell(10),
        notes: cell(11),
        tracking_link: cell(12),
    }
}

/// Configurable mock backend.
///
/// # Example
/// ```ignore
/// let mock = MockSheetsBackend::new()
///     .with_orders(vec![summary_row("OID-1")])
///     .fail("fetch_order_rows", 2, ErrorKind::Network);
/// ```
pub struct MockSheetsBackend {
    inventory_rows: Mutex<Vec<InventoryRow>>,
    order_rows: Mutex<Vec<OrderRow>>,
    appended: Mutex<Vec<Vec<String>>>,
    cell_updates: Mutex<Vec<(u32, Vec<(OrderColumn, String)>)>>,
    metadata: SheetMetadata,
    latency: Option<Duration>,
    /// method name -> (remaining failures, kind to inject)
    failures: Mutex<HashMap<&'static str, (u32, ErrorKind)>>,
    call_counts: Mutex<CallCounts>,
}

impl Default for MockSheetsBackend {
    fn default() -> Self {
        Self {
            inventory_rows: Mutex::new(Vec::new()),
            order_rows: Mutex::new(Vec::new()),
            appended: Mutex::new(Vec::new()),
            cell_updates: Mutex::new(Vec::new()),
            metadata: SheetMetadata {
                tabs: vec!["Orders".to_string(), "Inventory".to_string()],
                order_headers: ORDER_HEADERS.iter().map(|h| h.to_string()).collect(),
            },
            latency: None,
            failures: Mutex::new(HashMap::new()),
            call_counts: Mutex::new(CallCounts::default()),
        }
    }
}

impl MockSheetsBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inventory(self, rows: Vec<InventoryRow>) -> Self {
        Self {
            inventory_rows: Mutex::new(rows),
            ..self
        }
    }

    pub fn with_orders(self, rows: Vec<OrderRow>) -> Self {
        Self {
            order_rows: Mutex::new(rows),
            ..self
        }
    }

    pub fn with_metadata(self, metadata: SheetMetadata) -> Self {
        Self { metadata, ..self }
    }

    /// Delay every backend call, for single-flight and pacing tests.
    pub fn with_latency(self, latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..self
        }
    }

    /// Inject `times` failures of `kind` into the named method before it
    /// starts succeeding again.
    pub fn fail(self, method: &'static str, times: u32, kind: ErrorKind) -> Self {
        if let Ok(mut failures) = self.failures.try_lock() {
            failures.insert(method, (times, kind));
        }
        self
    }

    /// Make the named method fail forever.
    pub fn always_fail(self, method: &'static str, kind: ErrorKind) -> Self {
        self.fail(method, u32::MAX, kind)
    }

    pub async fn call_counts(&self) -> CallCounts {
        self.call_counts.lock().await.clone()
    }

    pub async fn appended_rows(&self) -> Vec<Vec<String>> {
        self.appended.lock().await.clone()
    }

    pub async fn cell_updates(&self) -> Vec<(u32, Vec<(OrderColumn, String)>)> {
        self.cell_updates.lock().await.clone()
    }

    /// Shared entry path: count, simulate latency, maybe inject a failure.
    async fn begin(
        &self,
        method: &'static str,
        bump: fn(&mut CallCounts),
    ) -> Result<()> {
        bump(&mut *self.call_counts.lock().await);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut failures = self.failures.lock().await;
        if let Some((remaining, kind)) = failures.get_mut(method)
            && *remaining > 0
        {
            *remaining = remaining.saturating_sub(1);
            return Err(error_for(*kind));
        }

        Ok(())
    }
}

#[async_trait]
impl SheetsBackend for MockSheetsBackend {
    async fn fetch_inventory_rows(&self) -> Result<Vec<InventoryRow>> {
        self.begin("fetch_inventory_rows", |c| c.fetch_inventory_rows += 1)
            .await?;
        Ok(self.inventory_rows.lock().await.clone())
    }

    async fn fetch_order_rows(&self) -> Result<Vec<OrderRow>> {
        self.begin("fetch_order_rows", |c| c.fetch_order_rows += 1)
            .await?;
        Ok(self.order_rows.lock().await.clone())
    }

    async fn append_order_row(&self, values: &[String]) -> Result<()> {
        self.begin("append_order_row", |c| c.append_order_row += 1)
            .await?;
        self.appended.lock().await.push(values.to_vec());
        self.order_rows.lock().await.push(row_from_values(values));
        Ok(())
    }

    async fn update_order_cells(
        &self,
        row_number: u32,
        updates: &[(OrderColumn, String)],
    ) -> Result<()> {
        self.begin("update_order_cells", |c| c.update_order_cells += 1)
            .await?;

        self.cell_updates
            .lock()
            .await
            .push((row_number, updates.to_vec()));

        // Apply to stored rows so later fetches observe the change.
        // Row 1 is the header, so sheet row N maps to index N - 2.
        let mut rows = self.order_rows.lock().await;
        if let Some(row) = (row_number as usize)
            .checked_sub(2)
            .and_then(|idx| rows.get_mut(idx))
        {
            for (column, value) in updates {
                match column {
                    OrderColumn::Status => row.status = Some(value.clone()),
                    OrderColumn::TrackingLink => row.tracking_link = Some(value.clone()),
                    _ => {}
                }
            }
        }

        Ok(())
    }

    async fn upload_attachment(&self, _bytes: Vec<u8>, filename: &str) -> Result<String> {
        self.begin("upload_attachment", |c| c.upload_attachment += 1)
            .await?;
        Ok(format!("https://files.example/{}", filename))
    }

    async fn sheet_metadata(&self) -> Result<SheetMetadata> {
        self.begin("sheet_metadata", |c| c.sheet_metadata += 1)
            .await?;
        Ok(self.metadata.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let mock = MockSheetsBackend::new().fail("fetch_order_rows", 2, ErrorKind::Network);

        assert!(mock.fetch_order_rows().await.is_err());
        assert!(mock.fetch_order_rows().await.is_err());
        assert!(mock.fetch_order_rows().await.is_ok());
        assert_eq!(mock.call_counts().await.fetch_order_rows, 3);
    }

    #[tokio::test]
    async fn test_append_makes_order_visible_to_fetch() {
        let mock = MockSheetsBackend::new();

        let mut values = vec![String::new(); ORDER_HEADERS.len()];
        values[0] = "OID-9".to_string();
        values[1] = "555".to_string();
        values[5] = "COMPLETE ORDER".to_string();
        mock.append_order_row(&values).await.unwrap();

        let rows = mock.fetch_order_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].order_id.as_deref(), Some("OID-9"));
        assert_eq!(rows[0].customer_id, Some(555));
        assert!(rows[0].is_summary());
    }

    #[tokio::test]
    async fn test_cell_updates_apply_to_stored_rows() {
        let mock = MockSheetsBackend::new().with_orders(vec![OrderRow {
            order_id: Some("OID-1".to_string()),
            product: Some("COMPLETE ORDER".to_string()),
            status: Some("Pending".to_string()),
            ..Default::default()
        }]);

        mock.update_order_cells(2, &[(OrderColumn::Status, "Shipped".to_string())])
            .await
            .unwrap();

        let rows = mock.fetch_order_rows().await.unwrap();
        assert_eq!(rows[0].status.as_deref(), Some("Shipped"));
    }
}
