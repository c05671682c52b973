//! Write-through product cache.
//!
//! The cache mirrors the whole catalog in memory and serves every product
//! read. Stock changes are written to the store first and only reach the
//! cache once the store has confirmed them, so a reader never observes a
//! quantity the store does not hold.
//!
//! # Concurrency
//!
//! Every mutation of one product runs inside moka's per-key
//! `and_compute_with`, which serializes writers of the same key while
//! leaving other products untouched. The store update itself is a
//! compare-and-set on the quantity the cache holds; a lost race (another
//! process changed the row) triggers a re-read and a retry.
//!
//! # Failure handling
//!
//! When a store write fails or times out its outcome is unknown. The entry is
//! then marked [`Slot::Unknown`] and the next access re-reads the product
//! from the store before using it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use moka::Entry;
use moka::future::Cache;
use moka::ops::compute::Op;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use stockroom_core::ProductId;

use super::InventoryError;
use crate::db::{ProductStore, QuantityUpdate, RepositoryError, bounded};
use crate::models::Product;

/// Store round-trips attempted after a compare-and-set conflict.
const MAX_CONFLICT_RETRIES: usize = 3;

/// Lifecycle of the bulk load that populates the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationState {
    /// Nothing loaded yet, or the last load failed or found no products.
    Empty,
    /// A load is in flight; other callers wait for it.
    Hydrating,
    /// The catalog is mirrored.
    Ready,
}

impl HydrationState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Hydrating => "hydrating",
            Self::Ready => "ready",
        }
    }
}

#[derive(Debug, Clone)]
enum Slot {
    /// Matches the store as of the last confirmed write or read.
    Synced(Product),
    /// A store write failed with an unknown outcome.
    Unknown,
}

/// In-memory, write-through view of the product catalog.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct ProductCache {
    inner: Arc<ProductCacheInner>,
}

struct ProductCacheInner {
    entries: Cache<ProductId, Slot>,
    state: watch::Sender<HydrationState>,
    store: Arc<dyn ProductStore>,
    store_timeout: Duration,
}

/// Resets the hydration state if a load is abandoned midway.
struct HydrationGuard<'a> {
    state: &'a watch::Sender<HydrationState>,
    armed: bool,
}

impl HydrationGuard<'_> {
    fn finish(mut self, outcome: HydrationState) {
        self.armed = false;
        self.state.send_replace(outcome);
    }
}

impl Drop for HydrationGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_replace(HydrationState::Empty);
        }
    }
}

impl ProductCache {
    /// Create an empty cache over `store`. Nothing is loaded until first use.
    #[must_use]
    pub fn new(store: Arc<dyn ProductStore>, store_timeout: Duration) -> Self {
        // Unbounded and without expiry: the whole catalog stays resident.
        let entries = Cache::builder().name("products").build();
        let (state, _) = watch::channel(HydrationState::Empty);

        Self {
            inner: Arc::new(ProductCacheInner {
                entries,
                state,
                store,
                store_timeout,
            }),
        }
    }

    /// Current hydration state.
    #[must_use]
    pub fn state(&self) -> HydrationState {
        *self.inner.state.borrow()
    }

    // =========================================================================
    // Hydration
    // =========================================================================

    /// Load the full catalog if it has not been loaded yet.
    ///
    /// Concurrent callers share a single load; if it fails, the next caller
    /// starts a fresh one. A load that finds no products leaves the cache
    /// [`HydrationState::Empty`] so that a catalog seeded later is picked up.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::Store` if the store cannot be read.
    pub async fn hydrate(&self) -> Result<(), InventoryError> {
        loop {
            let mut claimed = false;
            self.inner.state.send_if_modified(|state| {
                if *state == HydrationState::Empty {
                    *state = HydrationState::Hydrating;
                    claimed = true;
                    return true;
                }
                false
            });

            if claimed {
                return self.load_all().await;
            }

            let mut rx = self.inner.state.subscribe();
            let observed = rx
                .wait_for(|state| *state != HydrationState::Hydrating)
                .await
                .map_or(HydrationState::Empty, |state| *state);
            if observed == HydrationState::Ready {
                return Ok(());
            }
        }
    }

    #[instrument(skip(self))]
    async fn load_all(&self) -> Result<(), InventoryError> {
        let guard = HydrationGuard {
            state: &self.inner.state,
            armed: true,
        };

        let products =
            match bounded(self.inner.store_timeout, self.inner.store.list_products()).await {
                Ok(products) => products,
                Err(e) => {
                    warn!(error = %e, "Product cache hydration failed");
                    guard.finish(HydrationState::Empty);
                    return Err(e.into());
                }
            };

        if products.is_empty() {
            info!("Catalog is empty; cache left unhydrated");
            guard.finish(HydrationState::Empty);
            return Ok(());
        }

        let count = products.len();
        for product in products {
            // Entries written by a concurrent read-through are at least as fresh
            let _ = self
                .inner
                .entries
                .entry(product.id)
                .or_insert(Slot::Synced(product))
                .await;
        }

        guard.finish(HydrationState::Ready);
        info!(products = count, "Product cache hydrated");
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Look up one product, reading through to the store on a miss.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::ProductNotFound` if the product does not
    /// exist, or `InventoryError::Store` if the store cannot be read.
    pub async fn get(&self, id: ProductId) -> Result<Product, InventoryError> {
        self.hydrate().await?;

        if let Some(Slot::Synced(product)) = self.inner.entries.get(&id).await {
            return Ok(product);
        }

        self.with_entry(id, |current| async move {
            match current {
                Some(product) => (Op::Nop, Ok(product)),
                None => match self.fetch(id).await {
                    Ok(Some(product)) => (Op::Put(Slot::Synced(product.clone())), Ok(product)),
                    Ok(None) => (Op::Remove, Err(InventoryError::ProductNotFound(id))),
                    Err(e) => (Op::Nop, Err(e)),
                },
            }
        })
        .await
    }

    /// Every product, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::Store` if hydration or a resync read fails.
    pub async fn all(&self) -> Result<Vec<Product>, InventoryError> {
        self.hydrate().await?;

        let mut products = Vec::new();
        let mut unknown = Vec::new();
        for (id, slot) in self.inner.entries.iter() {
            match slot {
                Slot::Synced(product) => products.push(product),
                Slot::Unknown => unknown.push(*id),
            }
        }

        for id in unknown {
            match self.get(id).await {
                Ok(product) => products.push(product),
                Err(InventoryError::ProductNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        products.sort_by_key(|product| product.id);
        Ok(products)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Remove `quantity` units of stock, failing if fewer are available.
    ///
    /// Returns the product as stored after the deduction.
    ///
    /// # Errors
    ///
    /// - `InventoryError::InsufficientStock` if the store holds fewer units
    /// - `InventoryError::ProductNotFound` if the product does not exist
    /// - `InventoryError::Store` if the write fails or times out
    #[instrument(skip(self))]
    pub async fn try_deduct(&self, id: ProductId, quantity: i32) -> Result<Product, InventoryError> {
        if quantity <= 0 {
            return Err(InventoryError::InvalidInput(format!(
                "deduction for product {id} must be positive, got {quantity}"
            )));
        }
        self.hydrate().await?;

        self.with_entry(id, |current| {
            self.write_through(id, current, move |product| {
                if !product.can_supply(quantity) {
                    return Err(InventoryError::InsufficientStock {
                        product_id: id,
                        requested: i64::from(quantity),
                        available: i64::from(product.available_quantity),
                    });
                }
                Ok(product.available_quantity - quantity)
            })
        })
        .await
    }

    /// Add `quantity` units back, undoing an earlier deduction.
    ///
    /// Skips hydration: a rollback must only depend on the product it touches.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::ProductNotFound` if the product vanished, or
    /// `InventoryError::Store` if the write fails or times out.
    #[instrument(skip(self))]
    pub async fn restore(&self, id: ProductId, quantity: i32) -> Result<Product, InventoryError> {
        if quantity <= 0 {
            return Err(InventoryError::InvalidInput(format!(
                "restock for product {id} must be positive, got {quantity}"
            )));
        }

        self.with_entry(id, |current| {
            self.write_through(id, current, move |product| {
                product.available_quantity.checked_add(quantity).ok_or_else(|| {
                    InventoryError::InvalidInput(format!("stock overflow for product {id}"))
                })
            })
        })
        .await
    }

    /// Overwrite the stock level of a product.
    ///
    /// # Errors
    ///
    /// - `InventoryError::InvalidInput` if `quantity` is negative
    /// - `InventoryError::ProductNotFound` if the product does not exist
    /// - `InventoryError::Store` if the write fails or times out
    #[instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        id: ProductId,
        quantity: i32,
    ) -> Result<Product, InventoryError> {
        if quantity < 0 {
            return Err(InventoryError::InvalidInput(format!(
                "quantity must not be negative, got {quantity}"
            )));
        }
        self.hydrate().await?;

        self.with_entry(id, |_current| async move {
            let write = bounded(
                self.inner.store_timeout,
                self.inner.store.set_quantity(id, quantity),
            )
            .await;
            match write {
                Ok(Some(product)) => {
                    info!(quantity, "Stock level set");
                    (Op::Put(Slot::Synced(product.clone())), Ok(product))
                }
                Ok(None) => (Op::Remove, Err(InventoryError::ProductNotFound(id))),
                Err(e) => {
                    error!(error = %e, "Stock write failed; entry marked for resync");
                    (Op::Put(Slot::Unknown), Err(e.into()))
                }
            }
        })
        .await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Run `f` while holding the per-key lock for `id`.
    ///
    /// `f` receives the cached product (`None` on a miss or an unknown entry)
    /// and returns the cache operation to apply along with the caller's result.
    async fn with_entry<F, Fut>(&self, id: ProductId, f: F) -> Result<Product, InventoryError>
    where
        F: FnOnce(Option<Product>) -> Fut,
        Fut: Future<Output = (Op<Slot>, Result<Product, InventoryError>)>,
    {
        let mut outcome = None;
        let slot = &mut outcome;

        let _ = self
            .inner
            .entries
            .entry(id)
            .and_compute_with(move |entry| async move {
                let current = match entry.map(Entry::into_value) {
                    Some(Slot::Synced(product)) => Some(product),
                    Some(Slot::Unknown) | None => None,
                };
                let (op, result) = f(current).await;
                *slot = Some(result);
                op
            })
            .await;

        outcome.unwrap_or(Err(InventoryError::ProductNotFound(id)))
    }

    /// Compare-and-set the stock of `id` to `next(product)` and mirror the
    /// confirmed row. Must run under the per-key lock.
    async fn write_through<G>(
        &self,
        id: ProductId,
        current: Option<Product>,
        next: G,
    ) -> (Op<Slot>, Result<Product, InventoryError>)
    where
        G: Fn(&Product) -> Result<i32, InventoryError>,
    {
        let (mut product, mut refreshed) = match current {
            Some(product) => (product, false),
            None => match self.fetch(id).await {
                Ok(Some(product)) => (product, true),
                Ok(None) => return (Op::Remove, Err(InventoryError::ProductNotFound(id))),
                Err(e) => return (Op::Nop, Err(e)),
            },
        };

        for _ in 0..=MAX_CONFLICT_RETRIES {
            let new_quantity = match next(&product) {
                Ok(quantity) => quantity,
                Err(e) => return (keep(product, refreshed), Err(e)),
            };

            let write = bounded(
                self.inner.store_timeout,
                self.inner
                    .store
                    .update_quantity(id, product.available_quantity, new_quantity),
            )
            .await;

            match write {
                Ok(QuantityUpdate::Updated(stored)) => {
                    debug!(
                        from = product.available_quantity,
                        to = stored.available_quantity,
                        "Stock updated"
                    );
                    return (Op::Put(Slot::Synced(stored.clone())), Ok(stored));
                }
                Ok(QuantityUpdate::Conflict) => {
                    warn!(
                        cached = product.available_quantity,
                        "Stored quantity diverged from cache; re-reading"
                    );
                    match self.fetch(id).await {
                        Ok(Some(fresh)) => {
                            product = fresh;
                            refreshed = true;
                        }
                        Ok(None) => return (Op::Remove, Err(InventoryError::ProductNotFound(id))),
                        Err(e) => return (Op::Put(Slot::Unknown), Err(e)),
                    }
                }
                Ok(QuantityUpdate::Missing) => {
                    return (Op::Remove, Err(InventoryError::ProductNotFound(id)));
                }
                Err(e) => {
                    error!(error = %e, "Stock write failed; entry marked for resync");
                    return (Op::Put(Slot::Unknown), Err(e.into()));
                }
            }
        }

        (
            keep(product, refreshed),
            Err(InventoryError::Store(RepositoryError::Conflict(format!(
                "product {id}: stock kept changing under concurrent writers"
            )))),
        )
    }

    async fn fetch(&self, id: ProductId) -> Result<Option<Product>, InventoryError> {
        Ok(bounded(self.inner.store_timeout, self.inner.store.find_product(id)).await?)
    }
}

/// Cache a product that was freshly read from the store; otherwise leave the
/// entry alone.
fn keep(product: Product, refreshed: bool) -> Op<Slot> {
    if refreshed {
        Op::Put(Slot::Synced(product))
    } else {
        Op::Nop
    }
}
