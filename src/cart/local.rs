//! Bag persisted in durable client-side storage under a fixed key.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::warn;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, Product};
use crate::domain::value_objects::Quantity;
use crate::{Error, Result};

/// Storage key for the serialized bag.
pub const CART_STORAGE_KEY: &str = "storefront-bag";

/// Durable key/value storage, synchronous like browser local storage.
pub trait CartStorage: Send + Sync {
    fn load(&self, key: &str) -> io::Result<Option<String>>;
    fn save(&self, key: &str, value: &str) -> io::Result<()>;
}

/// One JSON file per key inside a directory.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }

    fn path(&self, key: &str) -> PathBuf { self.dir.join(format!("{key}.json")) }
}

impl CartStorage for FileStorage {
    fn load(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, key: &str, value: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(tmp, self.path(key))
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let storage = Self::new();
        storage.entries.lock().unwrap_or_else(PoisonError::into_inner).insert(key.to_string(), value.to_string());
        storage
    }
}

impl CartStorage for MemoryStorage {
    fn load(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.entries.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// The shopper's bag. Every mutation is written through to storage before returning.
pub struct LocalCartStore<S> {
    storage: S,
    cart: Cart,
}

impl<S: CartStorage> LocalCartStore<S> {
    /// Loads the stored bag; a missing or malformed entry yields an empty bag.
    pub fn open(storage: S) -> Self {
        let cart = match storage.load(CART_STORAGE_KEY) {
            Ok(Some(raw)) => serde_json::from_str::<Cart>(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "Stored bag is malformed, starting empty");
                Cart::new()
            }),
            Ok(None) => Cart::new(),
            Err(e) => {
                warn!(error = %e, "Could not read stored bag, starting empty");
                Cart::new()
            }
        };
        Self { storage, cart }
    }

    pub fn cart(&self) -> &Cart { &self.cart }
    pub fn total_items(&self) -> u32 { self.cart.total_items() }
    pub fn total_price(&self) -> Decimal { self.cart.total_price() }

    pub fn add(&mut self, product: &Product, quantity: Quantity) -> Result<()> {
        self.cart.add(product, quantity, Utc::now());
        self.persist()
    }

    /// Zero or negative quantities remove the line.
    pub fn set_quantity(&mut self, product_id: &Uuid, quantity: i64) -> Result<()> {
        self.cart.set_quantity(product_id, quantity, Utc::now());
        self.persist()
    }

    pub fn remove(&mut self, product_id: &Uuid) -> Result<()> {
        self.cart.remove(product_id);
        self.persist()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.cart.clear();
        self.persist()
    }

    pub fn replace(&mut self, cart: Cart) -> Result<()> {
        self.cart = cart;
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let raw = serde_json::to_string(&self.cart).map_err(|e| Error::Storage(e.to_string()))?;
        self.storage.save(CART_STORAGE_KEY, &raw).map_err(|e| Error::Storage(e.to_string()))
    }
}
