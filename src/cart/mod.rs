//! Shopper bag: local persistence and remote reconciliation.
mod local;
mod sync;

pub use local::{CartStorage, FileStorage, LocalCartStore, MemoryStorage, CART_STORAGE_KEY};
pub use sync::{reconcile, CartSession, MergePolicy, Reconciled};
