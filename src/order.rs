//! Order line items and the order-lookup collaborator.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::DossierError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductCategory {
    Turbine,
    Inverter,
    Accessory,
    Administrative,
    Installation,
}

impl ProductCategory {
    /// Physical goods move through logistics and share one shipping dossier.
    pub fn is_physical(self) -> bool {
        matches!(
            self,
            ProductCategory::Turbine | ProductCategory::Inverter | ProductCategory::Accessory
        )
    }
}

#[derive(Debug, Clone)]
pub struct OrderItem {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    // integer cents
    pub price: u64,
    pub category: Option<ProductCategory>,
}

/// What the order collaborator exposes to this crate: who owns the order and
/// what is in it. The full order record lives elsewhere.
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub order_id: String,
    pub owner_id: String,
    pub items: Vec<OrderItem>,
}

/// Order-lookup collaborator. Backs both derivation at order time and the
/// ownership check on every dossier operation.
pub trait OrderDirectory {
    fn find_order(&self, order_id: &str) -> Result<Option<OrderRecord>, DossierError>;
}

impl<T: OrderDirectory + ?Sized> OrderDirectory for std::sync::Arc<T> {
    fn find_order(&self, order_id: &str) -> Result<Option<OrderRecord>, DossierError> {
        (**self).find_order(order_id)
    }
}

/// In-memory directory for tests and local harnesses.
#[derive(Debug, Default)]
pub struct MemoryOrders {
    orders: RwLock<HashMap<String, OrderRecord>>,
}

impl MemoryOrders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, order: OrderRecord) {
        self.orders
            .write()
            .expect("order directory lock poisoned")
            .insert(order.order_id.clone(), order);
    }
}

impl OrderDirectory for MemoryOrders {
    fn find_order(&self, order_id: &str) -> Result<Option<OrderRecord>, DossierError> {
        Ok(self
            .orders
            .read()
            .expect("order directory lock poisoned")
            .get(order_id)
            .cloned())
    }
}
