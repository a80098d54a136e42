use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::{error, info};

use super::{
    collect_pages, parse_products, CatalogClient, CatalogItem, CatalogPage, ItemId, PageSource,
    ProductPatch, UpdateOutcome,
};
use crate::config::CatalogSettings;
use crate::retry::{ClientError, RetryPolicy};

const TOTAL_PAGES_HEADER: &str = "x-wp-totalpages";

/// WooCommerce REST client (`/wp-json/wc/v3`).
pub struct WooCommerceClient {
    client: Client,
    base_url: String,
    per_page: u32,
    paginate: bool,
    page_delay: Duration,
    list_timeout: Duration,
    update_timeout: Duration,
    retry: RetryPolicy,
}

impl WooCommerceClient {
    pub fn new(settings: &CatalogSettings, paginate: bool, retry: RetryPolicy) -> Result<Self> {
        let auth = settings
            .auth
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .context("missing WooCommerce credentials (set WOOCOMMERCE_AUTH)")?;
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", auth))
                .context("invalid WooCommerce credentials")?,
        );
        let builder = Client::builder().default_headers(headers);
        // Tests talk to a loopback stub.
        #[cfg(test)]
        let builder = builder.no_proxy();
        let client = builder
            .build()
            .context("failed to build WooCommerce HTTP client")?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            per_page: settings.per_page,
            paginate,
            page_delay: Duration::from_millis(settings.page_delay_ms),
            list_timeout: Duration::from_secs(settings.list_timeout_secs),
            update_timeout: Duration::from_secs(settings.update_timeout_secs),
            retry,
        })
    }

    fn products_url(&self) -> String {
        format!("{}/products", self.base_url)
    }

    async fn fetch_unpaginated(&self) -> Result<Vec<CatalogItem>, ClientError> {
        let resp = self
            .client
            .get(self.products_url())
            .timeout(self.list_timeout)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let products: Vec<Value> = resp.json().await?;
        Ok(parse_products(&products))
    }

    async fn put_product(&self, id: ItemId, patch: &ProductPatch) -> Result<(), ClientError> {
        let resp = self
            .client
            .put(format!("{}/{}", self.products_url(), id))
            .timeout(self.update_timeout)
            .json(patch)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}

async fn check_status(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(ClientError::Status { status, body })
}

fn total_pages(resp: &Response) -> Option<u32> {
    resp.headers()
        .get(TOTAL_PAGES_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[async_trait]
impl PageSource for WooCommerceClient {
    async fn fetch_page(&self, page: u32) -> Result<CatalogPage, ClientError> {
        let resp = self
            .client
            .get(self.products_url())
            .query(&[("per_page", self.per_page), ("page", page)])
            .timeout(self.list_timeout)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        // Without the header, keep going until an empty page comes back.
        let has_more = total_pages(&resp).map_or(true, |total| page < total);
        let products: Vec<Value> = resp.json().await?;
        Ok(CatalogPage {
            items: parse_products(&products),
            fetched: products.len(),
            has_more,
        })
    }
}

#[async_trait]
impl CatalogClient for WooCommerceClient {
    async fn list_all(&self) -> Result<Vec<CatalogItem>> {
        info!("Fetching products from {}", self.products_url());
        let listing = if self.paginate {
            collect_pages(self, &self.retry, self.page_delay).await
        } else {
            self.retry
                .run("catalog listing", || self.fetch_unpaginated())
                .await
        };
        let items = listing.context("failed to fetch products")?;
        info!("Total products fetched: {}", items.len());
        Ok(items)
    }

    async fn apply_update(&self, id: ItemId, patch: &ProductPatch) -> UpdateOutcome {
        let label = format!("update of product {}", id);
        match self.retry.run(&label, || self.put_product(id, patch)).await {
            Ok(()) => UpdateOutcome::Applied,
            Err(e) => {
                error!(item_id = %id, "Failed to update product: {}", e);
                UpdateOutcome::Failed
            }
        }
    }
}
