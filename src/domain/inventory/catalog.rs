use serde::{Deserialize, Serialize};

use super::availability::{AvailabilityCheckItem, AvailabilityCheckResult, UnavailableItem};

// ============================================================================
// Product Catalog - fixed lookup table backing the availability oracle
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub stock_quantity: u32,
}

const DEFAULT_PRODUCTS: &[(&str, &str, u32)] = &[
    ("product-1", "Laptop Computer", 50),
    ("product-2", "Wireless Mouse", 200),
    ("product-3", "Mechanical Keyboard", 75),
    ("product-4", "Monitor 27\"", 30),
    ("product-5", "USB-C Hub", 150),
    ("product-6", "Webcam HD", 100),
    ("product-7", "Desk Chair", 25),
    ("product-8", "Standing Desk", 15),
    ("product-9", "Noise Cancelling Headphones", 60),
    ("product-10", "External SSD 1TB", 80),
    ("out-of-stock-product", "Discontinued Item", 0),
];

#[derive(Debug, Clone)]
pub struct ProductCatalog {
    products: Vec<Product>,
}

impl Default for ProductCatalog {
    fn default() -> Self {
        Self::new(
            DEFAULT_PRODUCTS
                .iter()
                .map(|(id, name, stock)| Product {
                    id: (*id).to_string(),
                    name: (*name).to_string(),
                    stock_quantity: *stock,
                })
                .collect(),
        )
    }
}

impl ProductCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    pub fn get(&self, product_id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == product_id)
    }

    pub fn all(&self) -> &[Product] {
        &self.products
    }

    /// Reports every requested item that is unknown or short-stocked.
    /// Stock is only read, never reserved.
    pub fn check_availability(&self, items: &[AvailabilityCheckItem]) -> AvailabilityCheckResult {
        tracing::info!(item_count = items.len(), "Checking availability for items");

        let mut unavailable = Vec::new();

        for item in items {
            match self.get(&item.product_id) {
                None => {
                    tracing::warn!(product_id = %item.product_id, "Product not found");
                    unavailable.push(UnavailableItem {
                        product_id: item.product_id.clone(),
                        requested_quantity: item.quantity,
                        available_quantity: 0,
                    });
                }
                Some(product) if product.stock_quantity < item.quantity => {
                    tracing::warn!(
                        product_id = %item.product_id,
                        requested = item.quantity,
                        available = product.stock_quantity,
                        "Insufficient stock"
                    );
                    unavailable.push(UnavailableItem {
                        product_id: item.product_id.clone(),
                        requested_quantity: item.quantity,
                        available_quantity: product.stock_quantity,
                    });
                }
                Some(_) => {}
            }
        }

        let result = AvailabilityCheckResult::from_unavailable(unavailable);

        tracing::info!(
            available = result.available,
            unavailable_count = result.unavailable_items.as_ref().map_or(0, Vec::len),
            "Availability check completed"
        );

        result
    }
}
