//! Record types flowing through the cache and gateway
//!
//! Sheet rows arrive loosely shaped, so the wire types ([`InventoryRow`],
//! [`OrderRow`]) carry every maybe-present field as an `Option`. The domain
//! types ([`Product`], [`Order`], [`Inventory`]) are what callers see.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Marker in the Product column identifying an order's summary row.
///
/// Orders span several item rows plus one summary row; lookups and status
/// updates address the summary row only.
pub const ORDER_SUMMARY_MARKER: &str = "COMPLETE ORDER";

/// Canonical order-sheet header row, in column order.
pub const ORDER_HEADERS: [&str; 13] = [
    "Order ID",
    "Customer ID",
    "Name",
    "Address",
    "Contact",
    "Product",
    "Quantity",
    "Price",
    "Status",
    "Payment URL",
    "Order Date",
    "Notes",
    "Tracking Link",
];

/// Product shelf category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductTag {
    Buds,
    Local,
    Carts,
    Edibs,
}

impl ProductTag {
    /// All shelf categories.
    pub const ALL: [ProductTag; 4] = [
        ProductTag::Buds,
        ProductTag::Local,
        ProductTag::Carts,
        ProductTag::Edibs,
    ];

    /// Parse free-form cell text; unknown tags are `None`.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "buds" => Some(ProductTag::Buds),
            "local" => Some(ProductTag::Local),
            "carts" => Some(ProductTag::Carts),
            "edibs" => Some(ProductTag::Edibs),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProductTag::Buds => "buds",
            ProductTag::Local => "local",
            ProductTag::Carts => "carts",
            ProductTag::Edibs => "edibs",
        }
    }
}

/// Strain classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrainKind {
    Indica,
    Sativa,
    Hybrid,
}

impl StrainKind {
    pub const ALL: [StrainKind; 3] = [StrainKind::Indica, StrainKind::Sativa, StrainKind::Hybrid];

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "indica" => Some(StrainKind::Indica),
            "sativa" => Some(StrainKind::Sativa),
            "hybrid" => Some(StrainKind::Hybrid),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StrainKind::Indica => "indica",
            StrainKind::Sativa => "sativa",
            StrainKind::Hybrid => "hybrid",
        }
    }
}

/// One inventory row as the backend returns it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryRow {
    #[serde(rename = "Name")]
    pub name: Option<String>,

    #[serde(rename = "Strain")]
    pub strain: Option<String>,

    #[serde(rename = "Type")]
    pub kind: Option<String>,

    #[serde(rename = "Tag")]
    pub tag: Option<String>,

    #[serde(rename = "Price")]
    pub price: Option<u32>,

    #[serde(rename = "Stock")]
    pub stock: Option<i64>,

    #[serde(rename = "Weight")]
    pub weight: Option<String>,

    #[serde(rename = "Brand")]
    pub brand: Option<String>,

    #[serde(rename = "Description")]
    pub description: Option<String>,

    #[serde(rename = "Image_URL")]
    pub image_url: Option<String>,
}

/// A sellable product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Display name
    pub name: String,

    /// Lowercased, underscore-joined name used as a stable key
    pub key: String,

    /// Unit price
    pub price: u32,

    /// Units in stock
    pub stock: u32,

    /// Shelf category, if the row carried a recognized tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<ProductTag>,

    /// Strain classification, if recognized
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strain: Option<StrainKind>,

    /// Cartridge weight (carts only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,

    /// Brand (carts only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Product {
    /// Build a product from a sheet row. Rows with no usable name fall back
    /// to the strain cell, then to "Unknown".
    pub fn from_row(row: &InventoryRow) -> Self {
        let name = row
            .name
            .clone()
            .or_else(|| row.strain.clone())
            .unwrap_or_else(|| "Unknown".to_string());
        let key = name.to_lowercase().replace(' ', "_");

        Product {
            key,
            name,
            price: row.price.unwrap_or(0),
            stock: row.stock.unwrap_or(0).max(0) as u32,
            tag: row.tag.as_deref().and_then(ProductTag::parse),
            strain: row.kind.as_deref().and_then(StrainKind::parse),
            weight: row.weight.clone(),
            brand: row.brand.clone(),
            description: row.description.clone(),
            image_url: row.image_url.clone(),
        }
    }
}

/// Inventory snapshot categorized for menu navigation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    /// Products per shelf category; every category key is always present
    pub by_tag: HashMap<ProductTag, Vec<Product>>,

    /// Products per strain; every strain key is always present
    pub by_strain: HashMap<StrainKind, Vec<Product>>,

    /// Every in-stock product, uncategorized rows included
    pub all: Vec<Product>,
}

impl Inventory {
    fn empty() -> Self {
        let by_tag = ProductTag::ALL.iter().map(|t| (*t, Vec::new())).collect();
        let by_strain = StrainKind::ALL.iter().map(|s| (*s, Vec::new())).collect();
        Inventory {
            by_tag,
            by_strain,
            all: Vec::new(),
        }
    }

    /// Categorize sheet rows into an inventory snapshot.
    ///
    /// Rows without stock are skipped entirely; rows with an unrecognized
    /// tag or strain still appear in `all`.
    pub fn from_rows(rows: &[InventoryRow]) -> Self {
        let mut inventory = Inventory::empty();

        for row in rows {
            if row.stock.unwrap_or(0) <= 0 {
                continue;
            }
            let product = Product::from_row(row);

            if let Some(tag) = product.tag
                && let Some(bucket) = inventory.by_tag.get_mut(&tag)
            {
                bucket.push(product.clone());
            }
            if let Some(strain) = product.strain
                && let Some(bucket) = inventory.by_strain.get_mut(&strain)
            {
                bucket.push(product.clone());
            }
            inventory.all.push(product);
        }

        inventory
    }

    /// Static catalog substituted when the backend is unreachable, so the
    /// storefront stays minimally browsable.
    pub fn fallback() -> Self {
        let rows = vec![
            InventoryRow {
                name: Some("Unknown Indica".to_string()),
                kind: Some("indica".to_string()),
                tag: Some("buds".to_string()),
                price: Some(2000),
                stock: Some(5),
                ..Default::default()
            },
            InventoryRow {
                name: Some("Unknown Sativa".to_string()),
                kind: Some("sativa".to_string()),
                tag: Some("buds".to_string()),
                price: Some(2000),
                stock: Some(5),
                ..Default::default()
            },
            InventoryRow {
                name: Some("Unknown Hybrid".to_string()),
                kind: Some("hybrid".to_string()),
                tag: Some("buds".to_string()),
                price: Some(2000),
                stock: Some(5),
                ..Default::default()
            },
            InventoryRow {
                name: Some("Local BG".to_string()),
                tag: Some("local".to_string()),
                price: Some(1000),
                stock: Some(10),
                ..Default::default()
            },
            InventoryRow {
                name: Some("Basic Cart".to_string()),
                tag: Some("carts".to_string()),
                brand: Some("Generic".to_string()),
                weight: Some("1g".to_string()),
                price: Some(1500),
                stock: Some(3),
                ..Default::default()
            },
            InventoryRow {
                name: Some("Basic Edible".to_string()),
                kind: Some("hybrid".to_string()),
                tag: Some("edibs".to_string()),
                price: Some(500),
                stock: Some(5),
                ..Default::default()
            },
        ];

        Inventory::from_rows(&rows)
    }
}

/// Order-sheet columns, in sheet order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderColumn {
    OrderId,
    CustomerId,
    Name,
    Address,
    Contact,
    Product,
    Quantity,
    Price,
    Status,
    PaymentUrl,
    OrderDate,
    Notes,
    TrackingLink,
}

impl OrderColumn {
    /// 1-based sheet column index.
    pub fn index(&self) -> u32 {
        match self {
            OrderColumn::OrderId => 1,
            OrderColumn::CustomerId => 2,
            OrderColumn::Name => 3,
            OrderColumn::Address => 4,
            OrderColumn::Contact => 5,
            OrderColumn::Product => 6,
            OrderColumn::Quantity => 7,
            OrderColumn::Price => 8,
            OrderColumn::Status => 9,
            OrderColumn::PaymentUrl => 10,
            OrderColumn::OrderDate => 11,
            OrderColumn::Notes => 12,
            OrderColumn::TrackingLink => 13,
        }
    }

    /// Canonical header text for this column.
    pub fn header(&self) -> &'static str {
        ORDER_HEADERS[self.index() as usize - 1]
    }
}

/// One order row as the backend returns it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderRow {
    #[serde(rename = "Order ID")]
    pub order_id: Option<String>,

    #[serde(rename = "Customer ID")]
    pub customer_id: Option<i64>,

    #[serde(rename = "Name")]
    pub name: Option<String>,

    #[serde(rename = "Address")]
    pub address: Option<String>,

    #[serde(rename = "Contact")]
    pub contact: Option<String>,

    #[serde(rename = "Product")]
    pub product: Option<String>,

    #[serde(rename = "Quantity")]
    pub quantity: Option<u32>,

    #[serde(rename = "Price")]
    pub price: Option<u32>,

    #[serde(rename = "Status")]
    pub status: Option<String>,

    #[serde(rename = "Payment URL")]
    pub payment_url: Option<String>,

    #[serde(rename = "Order Date")]
    pub order_date: Option<String>,

    #[serde(rename = "Notes")]
    pub notes: Option<String>,

    #[serde(rename = "Tracking Link")]
    pub tracking_link: Option<String>,
}

impl OrderRow {
    /// Whether this is an order's summary row (as opposed to an item row).
    pub fn is_summary(&self) -> bool {
        self.product.as_deref() == Some(ORDER_SUMMARY_MARKER)
    }
}

/// A customer order as surfaced to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,

    /// Chat id used for customer notifications, when the sheet holds one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,

    /// Order total
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_link: Option<String>,
}

impl Order {
    /// Build an order from its summary row. `None` when the row has no id.
    pub fn from_row(row: &OrderRow) -> Option<Self> {
        let order_id = row.order_id.clone()?;
        Some(Order {
            order_id,
            customer_id: row.customer_id,
            customer_name: row.name.clone(),
            address: row.address.clone(),
            contact: row.contact.clone(),
            quantity: row.quantity,
            total: row.price,
            status: row.status.clone(),
            payment_url: row.payment_url.clone(),
            order_date: row.order_date.clone(),
            notes: row.notes.clone(),
            tracking_link: row.tracking_link.clone(),
        })
    }
}

/// Spreadsheet structure as reported by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetMetadata {
    /// Tab names present in the spreadsheet
    pub tabs: Vec<String>,

    /// Header row of the orders tab, in column order
    pub order_headers: Vec<String>,
}

impl SheetMetadata {
    /// Whether the orders tab starts with the canonical header columns.
    pub fn has_expected_headers(&self) -> bool {
        self.order_headers.len() >= ORDER_HEADERS.len()
            && self
                .order_headers
                .iter()
                .zip(ORDER_HEADERS.iter())
                .all(|(actual, expected)| actual == expected)
    }
}
