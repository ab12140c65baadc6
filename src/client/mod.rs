//! Backend client for the spreadsheet/file-storage service
//!
//! The gateway talks to the remote row store exclusively through the
//! [`SheetsBackend`] trait; the HTTP implementation lives in [`http`], a
//! configurable mock for tests in [`mock`].

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{InventoryRow, OrderColumn, OrderRow, SheetMetadata};

pub mod http;
#[cfg(test)]
pub mod mock;

pub use http::HttpSheetsBackend;
#[cfg(test)]
#[allow(unused_imports)]
pub use mock::MockSheetsBackend;

/// Remote row/record-store operations the gateway needs
#[async_trait]
pub trait SheetsBackend: Send + Sync {
    /// Read every row of the inventory tab
    async fn fetch_inventory_rows(&self) -> Result<Vec<InventoryRow>>;

    /// Read every row of the orders tab
    async fn fetch_order_rows(&self) -> Result<Vec<OrderRow>>;

    /// Append one row to the orders tab
    async fn append_order_row(&self, values: &[String]) -> Result<()>;

    /// Update specific cells of one order row.
    ///
    /// `row_number` is the 1-based sheet row (header row included).
    async fn update_order_cells(
        &self,
        row_number: u32,
        updates: &[(OrderColumn, String)],
    ) -> Result<()>;

    /// Upload an attachment to the configured folder, returning its
    /// shareable link
    async fn upload_attachment(&self, bytes: Vec<u8>, filename: &str) -> Result<String>;

    /// Describe the spreadsheet's tabs and order header row
    async fn sheet_metadata(&self) -> Result<SheetMetadata>;
}
