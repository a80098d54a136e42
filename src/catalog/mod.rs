pub mod woo;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::retry::{ClientError, RetryPolicy};

pub use woo::WooCommerceClient;

/// Platform-assigned product id, stable across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The three product fields the refiner reads.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    pub id: ItemId,
    pub title: String,
    /// SEO description; empty when the product has none.
    pub description: String,
}

impl CatalogItem {
    pub fn new(id: u64, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: ItemId(id),
            title: title.into(),
            description: description.into(),
        }
    }

    /// Read a product from the platform's JSON. Returns `None` without an id.
    pub fn from_product(product: &Value) -> Option<Self> {
        let id = product.get("id")?.as_u64()?;
        let title = product
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Some(Self::new(id, title, og_description(product)))
    }
}

/// `yoast_head_json.og_description`, or empty if any level is missing or mistyped.
fn og_description(product: &Value) -> &str {
    product
        .get("yoast_head_json")
        .and_then(|meta| meta.get("og_description"))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaEntry {
    pub key: String,
    pub value: String,
}

impl MetaEntry {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// Partial product update body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductPatch {
    pub name: String,
    pub slug: String,
    pub meta_data: Vec<MetaEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    Failed,
}

#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Every product in the catalog, pagination already resolved.
    async fn list_all(&self) -> anyhow::Result<Vec<CatalogItem>>;

    /// Write `patch` to product `id`, retrying transient failures.
    async fn apply_update(&self, id: ItemId, patch: &ProductPatch) -> UpdateOutcome;
}

/// One page of a paginated listing.
#[derive(Debug, Default)]
pub struct CatalogPage {
    pub items: Vec<CatalogItem>,
    /// Products on the raw page, including any dropped while parsing.
    pub fetched: usize,
    pub has_more: bool,
}

#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch a 1-based page.
    async fn fetch_page(&self, page: u32) -> Result<CatalogPage, ClientError>;
}

/// Walk pages until the source reports the last one or returns nothing.
pub async fn collect_pages<S>(
    source: &S,
    retry: &RetryPolicy,
    page_delay: Duration,
) -> Result<Vec<CatalogItem>, ClientError>
where
    S: PageSource + ?Sized,
{
    let mut items = Vec::new();
    let mut page = 1;
    loop {
        let label = format!("catalog page {}", page);
        let batch = retry.run(&label, || source.fetch_page(page)).await?;
        if batch.fetched == 0 {
            debug!("Page {} is empty, listing complete", page);
            break;
        }
        items.extend(batch.items);
        info!("Page {}: {} products so far", page, items.len());
        if !batch.has_more {
            break;
        }
        tokio::time::sleep(page_delay).await;
        page += 1;
    }
    Ok(items)
}

/// Parse a JSON array of products, skipping entries without an id.
pub fn parse_products(products: &[Value]) -> Vec<CatalogItem> {
    products
        .iter()
        .filter_map(|p| {
            let item = CatalogItem::from_product(p);
            if item.is_none() {
                warn!("Skipping product without numeric id: {}", truncate_json(p));
            }
            item
        })
        .collect()
}

fn truncate_json(v: &Value) -> String {
    let s = v.to_string();
    if s.chars().count() <= 120 {
        s
    } else {
        format!("{}...", s.chars().take(120).collect::<String>())
    }
}
