//! Default catalog seeding.

use tracing::info;

use stockroom_core::Price;

use super::{ProductStore, RepositoryError};
use crate::models::NewProduct;

/// `(name, price in cents, quantity)` for the default catalog.
const DEFAULT_CATALOG: [(&str, u32, i32); 10] = [
    ("Product 1", 1999, 50),
    ("Product 2", 2999, 30),
    ("Product 3", 999, 100),
    ("Product 4", 3999, 20),
    ("Product 5", 4999, 60),
    ("Product 6", 1599, 75),
    ("Product 7", 2499, 45),
    ("Product 8", 1299, 90),
    ("Product 9", 3499, 55),
    ("Product 10", 899, 70),
];

/// The products inserted into an empty store.
#[must_use]
pub fn default_catalog() -> Vec<NewProduct> {
    DEFAULT_CATALOG
        .iter()
        .map(|&(name, cents, quantity)| NewProduct {
            name: name.to_string(),
            price: Price::from_cents(cents),
            available_quantity: quantity,
        })
        .collect()
}

/// Insert the default catalog if the store has no products.
///
/// Returns the number of products inserted (zero when the catalog already
/// existed).
///
/// # Errors
///
/// Returns `RepositoryError` if the store cannot be read or written.
pub async fn seed_if_empty(store: &dyn ProductStore) -> Result<usize, RepositoryError> {
    let existing = store.list_products().await?;
    if !existing.is_empty() {
        info!(products = existing.len(), "Catalog already seeded");
        return Ok(0);
    }

    let inserted = store.insert_products(default_catalog()).await?;
    info!(products = inserted.len(), "Seeded default catalog");
    Ok(inserted.len())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;

    #[tokio::test]
    async fn test_seed_only_once() {
        let store = InMemoryStore::new();
        assert_eq!(seed_if_empty(&store).await.unwrap(), 10);
        assert_eq!(seed_if_empty(&store).await.unwrap(), 0);

        let products = store.list_products().await.unwrap();
        assert_eq!(products.len(), 10);
        assert_eq!(products[2].name, "Product 3");
        assert_eq!(products[2].price, Price::from_cents(999));
        assert_eq!(products[2].available_quantity, 100);
    }
}
