//! Test harness for the Marigold storefront.
//!
//! Provides an in-memory implementation of the storage traits and a stub
//! payment authority so service and route tests run without `PostgreSQL` or
//! network access.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p marigold-integration-tests
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;

use marigold_core::{
    CartId, NewOrder, Order, OrderId, OrderItemId, Price, ProductId, Quantity, UserId,
};
use marigold_storefront::config::{PaymentConfig, SentryConfig, StorefrontConfig};
use marigold_storefront::db::{CartStore, CatalogStore, OrderFilter, OrderStore, RepositoryError};
use marigold_storefront::models::{CartClaim, CartLine, Product};
use marigold_storefront::payments::{
    AuthorityError, AuthorityOrder, AuthorityOrderRequest, PaymentAuthority, SignatureVerifier,
};
use marigold_storefront::services::PaymentCallback;
use marigold_storefront::state::{AppState, StateParts};
use url::Url;

/// Signing secret shared by [`signer`] and [`test_config`].
pub const TEST_PAYMENT_SECRET: &str = "whsec_test_9f3b7c1e5a2d4c8b";

/// Key id reported by [`StubAuthority`].
pub const TEST_KEY_ID: &str = "rzp_test_marigold";

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    carts: HashMap<UserId, CartId>,
    cart_lines: HashMap<CartId, Vec<CartLine>>,
    orders: BTreeMap<OrderId, Order>,
    next_product: i32,
    next_cart: i32,
    next_order: i32,
    next_item: i32,
}

/// In-memory catalog, cart and order storage.
///
/// Semantics follow the `PostgreSQL` repositories: one cart per user, one
/// line per product, versioned order saves and cart-claim checks on create.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    stale_writes: AtomicU32,
    unavailable: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a product priced in minor units (paise).
    pub fn add_product(&self, name: &str, price_minor: i64) -> ProductId {
        let mut tables = self.tables();
        tables.next_product += 1;
        let id = ProductId::new(tables.next_product);
        let price = Price::from_minor_units(price_minor).unwrap_or(Price::ZERO);
        tables.products.insert(
            id,
            Product {
                id,
                name: name.to_string(),
                price,
                in_stock: true,
            },
        );
        id
    }

    /// Change a product's catalog price.
    pub fn set_price(&self, id: ProductId, price_minor: i64) {
        let Ok(price) = Price::from_minor_units(price_minor) else {
            return;
        };
        if let Some(product) = self.tables().products.get_mut(&id) {
            product.price = price;
        }
    }

    /// Write a cart line directly, bypassing the service layer.
    pub fn put_cart_line(&self, user_id: UserId, product_id: ProductId, quantity: Quantity) {
        let mut tables = self.tables();
        let cart_id = cart_for(&mut tables, user_id);
        let lines = tables.cart_lines.entry(cart_id).or_default();
        match lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => line.quantity = quantity,
            None => lines.push(CartLine {
                product_id,
                quantity,
            }),
        }
    }

    /// Current cart lines of a user, empty if they have no cart.
    #[must_use]
    pub fn cart_of(&self, user_id: UserId) -> Vec<CartLine> {
        let tables = self.tables();
        tables
            .carts
            .get(&user_id)
            .and_then(|cart_id| tables.cart_lines.get(cart_id))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of stored orders.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.tables().orders.len()
    }

    /// Stored copy of an order.
    #[must_use]
    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.tables().orders.get(&id).cloned()
    }

    /// Make the next `count` order saves fail as if another writer won.
    pub fn inject_stale_writes(&self, count: u32) {
        self.stale_writes.store(count, Ordering::SeqCst);
    }

    /// Make readiness pings fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

fn cart_for(tables: &mut Tables, user_id: UserId) -> CartId {
    if let Some(id) = tables.carts.get(&user_id) {
        return *id;
    }
    tables.next_cart += 1;
    let id = CartId::new(tables.next_cart);
    tables.carts.insert(user_id, id);
    id
}

fn newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.tables().products.get(&id).cloned())
    }

    async fn products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let tables = self.tables();
        Ok(ids
            .iter()
            .filter_map(|id| tables.products.get(id).cloned())
            .collect())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::DataCorruption(
                "store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn ensure_cart(&self, user_id: UserId) -> Result<CartId, RepositoryError> {
        Ok(cart_for(&mut self.tables(), user_id))
    }

    async fn lines(&self, cart_id: CartId) -> Result<Vec<CartLine>, RepositoryError> {
        Ok(self
            .tables()
            .cart_lines
            .get(&cart_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<Option<Quantity>, RepositoryError> {
        let mut tables = self.tables();
        let lines = tables.cart_lines.entry(cart_id).or_default();
        match lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => match line.quantity.checked_add(quantity) {
                Ok(sum) => {
                    line.quantity = sum;
                    Ok(Some(sum))
                }
                Err(_) => Ok(None),
            },
            None => {
                lines.push(CartLine {
                    product_id,
                    quantity,
                });
                Ok(Some(quantity))
            }
        }
    }

    async fn set_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables();
        let line = tables
            .cart_lines
            .get_mut(&cart_id)
            .and_then(|lines| lines.iter_mut().find(|l| l.product_id == product_id));
        Ok(line.map(|line| line.quantity = quantity).is_some())
    }

    async fn remove(
        &self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables();
        let Some(lines) = tables.cart_lines.get_mut(&cart_id) else {
            return Ok(false);
        };
        let before = lines.len();
        lines.retain(|l| l.product_id != product_id);
        Ok(lines.len() != before)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create(
        &self,
        order: NewOrder,
        cart: Option<&CartClaim>,
    ) -> Result<Order, RepositoryError> {
        let mut tables = self.tables();

        if let Some(claim) = cart {
            let current = tables
                .cart_lines
                .get(&claim.cart_id)
                .cloned()
                .unwrap_or_default();
            if !claim.matches(&current) {
                return Err(RepositoryError::Conflict(format!(
                    "cart {} changed during checkout",
                    claim.cart_id
                )));
            }
        }

        tables.next_order += 1;
        let id = OrderId::new(tables.next_order);
        let first_item = tables.next_item + 1;
        let item_count = i32::try_from(order.items.len())
            .map_err(|_| RepositoryError::DataCorruption("too many order items".to_string()))?;
        tables.next_item += item_count;
        let item_ids = (first_item..=tables.next_item).map(OrderItemId::new);

        let stored = order.into_order(id, item_ids, Utc::now());
        tables.orders.insert(id, stored.clone());

        if let Some(claim) = cart {
            tables.cart_lines.remove(&claim.cart_id);
        }
        Ok(stored)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.tables().orders.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .tables()
            .orders
            .values()
            .filter(|o| o.is_owned_by(user_id))
            .cloned()
            .collect();
        newest_first(&mut orders);
        Ok(orders)
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .tables()
            .orders
            .values()
            .filter(|o| filter.accepts(o))
            .cloned()
            .collect();
        newest_first(&mut orders);

        let offset = usize::try_from(filter.offset()).unwrap_or(0);
        let limit = usize::try_from(filter.limit()).unwrap_or(0);
        Ok(orders.into_iter().skip(offset).take(limit).collect())
    }

    async fn save(&self, order: &Order) -> Result<i32, RepositoryError> {
        let injected = self
            .stale_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(RepositoryError::StaleWrite(order.id));
        }

        let mut tables = self.tables();
        let stored = tables
            .orders
            .get_mut(&order.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != order.version {
            return Err(RepositoryError::StaleWrite(order.id));
        }

        let version = order.version + 1;
        *stored = Order {
            version,
            updated_at: Utc::now(),
            ..order.clone()
        };
        Ok(version)
    }
}

// =============================================================================
// Stub payment authority
// =============================================================================

type CreateHook = Box<dyn Fn() + Send + Sync>;

/// Authority order ids are unique across every stub in the process.
static NEXT_AUTHORITY_ORDER: AtomicU32 = AtomicU32::new(1);

/// Payment authority that answers locally and records what it was asked.
pub struct StubAuthority {
    fail: bool,
    requests: Mutex<Vec<AuthorityOrderRequest>>,
    on_create: Option<CreateHook>,
}

impl StubAuthority {
    /// An authority that accepts every order.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(false, None))
    }

    /// An authority that is unreachable.
    #[must_use]
    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self::build(true, None))
    }

    /// An authority that runs `hook` while handling each request, standing
    /// in for whatever else happens during the network round trip.
    #[must_use]
    pub fn with_hook(hook: impl Fn() + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self::build(false, Some(Box::new(hook))))
    }

    fn build(fail: bool, on_create: Option<CreateHook>) -> Self {
        Self {
            fail,
            requests: Mutex::new(Vec::new()),
            on_create,
        }
    }

    /// Requests received so far, successful or not.
    #[must_use]
    pub fn requests(&self) -> Vec<AuthorityOrderRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PaymentAuthority for StubAuthority {
    async fn create_order(
        &self,
        request: &AuthorityOrderRequest,
    ) -> Result<AuthorityOrder, AuthorityError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(hook) = &self.on_create {
            hook();
        }
        if self.fail {
            return Err(AuthorityError::Request("connection refused".to_string()));
        }

        let n = NEXT_AUTHORITY_ORDER.fetch_add(1, Ordering::SeqCst);
        Ok(AuthorityOrder {
            id: format!("order_stub_{n}"),
            amount: request.amount,
            currency: request.currency.code().to_string(),
        })
    }

    fn key_id(&self) -> &str {
        TEST_KEY_ID
    }
}

// =============================================================================
// Payment helpers
// =============================================================================

/// A verifier holding [`TEST_PAYMENT_SECRET`].
#[must_use]
pub fn signer() -> SignatureVerifier {
    SignatureVerifier::new(SecretString::from(TEST_PAYMENT_SECRET))
}

/// A correctly signed completion callback for `order`.
#[must_use]
pub fn signed_callback(order: &Order, payment_id: &str) -> PaymentCallback {
    PaymentCallback {
        payment_authority_order_id: order.payment_authority_order_id.clone(),
        payment_id: payment_id.to_string(),
        signature: signer().sign(&order.payment_authority_order_id, payment_id),
        order_id: order.id,
    }
}

// =============================================================================
// Application state
// =============================================================================

/// Configuration pointing at nothing real; only the payment secret matters.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://localhost/marigold_test"),
        host: std::net::IpAddr::from([127, 0, 0, 1]),
        port: 3000,
        base_url: "http://localhost:3000".to_string(),
        session_secret: SecretString::from("k7Qm2xV9pL4wR8nT1yB6cF3hJ5sD0gZa"),
        payment: PaymentConfig {
            key_id: TEST_KEY_ID.to_string(),
            key_secret: SecretString::from(TEST_PAYMENT_SECRET),
            api_base: Url::parse("http://127.0.0.1:9/v1").expect("static test URL is valid"),
            timeout: Duration::from_secs(1),
        },
        sentry: SentryConfig::default(),
    }
}

/// Application state backed by `store` and `authority`.
#[must_use]
pub fn test_state(store: &Arc<MemoryStore>, authority: Arc<StubAuthority>) -> AppState {
    AppState::from_parts(
        test_config(),
        StateParts {
            catalog: store.clone(),
            carts: store.clone(),
            orders: store.clone(),
            authority,
        },
    )
}
