//! Keeps the local bag and the per-user remote bag in step.
//!
//! At session start the two are reconciled once according to a
//! [`MergePolicy`]. After that every mutation lands in local storage first
//! and, for signed-in users, is mirrored to the remote store. Remote failures
//! are logged and never reach the caller: local storage stays authoritative
//! for the session.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::local::{CartStorage, LocalCartStore};
use crate::domain::aggregates::{Cart, Product};
use crate::domain::value_objects::Quantity;
use crate::store::CartStore;
use crate::Result;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// Remote is adopted only when the local bag is empty; otherwise local
    /// overwrites remote.
    #[default]
    LocalWins,
    /// Union of both bags; a product present on both sides keeps the line
    /// with the later `updated_at` (local on ties).
    NewestLineWins,
}

impl FromStr for MergePolicy {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "local-wins" => Ok(Self::LocalWins),
            "newest-line-wins" => Ok(Self::NewestLineWins),
            other => Err(format!("unknown cart merge policy '{other}'")),
        }
    }
}

/// Outcome of reconciling two bags.
#[derive(Clone, Debug, PartialEq)]
pub struct Reconciled {
    pub cart: Cart,
    pub write_local: bool,
    pub write_remote: bool,
}

pub fn reconcile(local: Cart, remote: Cart, policy: MergePolicy) -> Reconciled {
    match policy {
        MergePolicy::LocalWins => {
            if !local.is_empty() {
                Reconciled { cart: local, write_local: false, write_remote: true }
            } else if !remote.is_empty() {
                Reconciled { cart: remote, write_local: true, write_remote: false }
            } else {
                Reconciled { cart: local, write_local: false, write_remote: false }
            }
        }
        MergePolicy::NewestLineWins => {
            let mut lines = local.items().to_vec();
            for theirs in remote.items() {
                match lines.iter_mut().find(|l| l.product_id == theirs.product_id) {
                    Some(ours) if theirs.updated_at > ours.updated_at => *ours = theirs.clone(),
                    Some(_) => {}
                    None => lines.push(theirs.clone()),
                }
            }
            let merged = Cart::from_items(lines);
            Reconciled { write_local: merged != local, write_remote: merged != remote, cart: merged }
        }
    }
}

/// A shopper's bag for one session.
pub struct CartSession<S> {
    local: LocalCartStore<S>,
    remote: Arc<dyn CartStore>,
    user: Option<Uuid>,
    policy: MergePolicy,
}

impl<S: CartStorage> CartSession<S> {
    /// Opens local storage and, for a signed-in user, reconciles with the remote bag.
    pub async fn bootstrap(storage: S, remote: Arc<dyn CartStore>, user: Option<Uuid>, policy: MergePolicy) -> Result<Self> {
        let mut session = Self { local: LocalCartStore::open(storage), remote, user: None, policy };
        if let Some(user) = user {
            session.sign_in(user).await?;
        }
        Ok(session)
    }

    /// Anonymous to signed-in transition: reconciles and then mirrors on every change.
    pub async fn sign_in(&mut self, user: Uuid) -> Result<()> {
        self.user = Some(user);
        let remote = match self.remote.fetch_cart(user).await {
            Ok(items) => Cart::from_items(items),
            Err(e) => {
                warn!(user_id = %user, error = %e, "Could not fetch remote bag, keeping local bag");
                return Ok(());
            }
        };
        let outcome = reconcile(self.local.cart().clone(), remote, self.policy);
        debug!(user_id = %user, write_local = outcome.write_local, write_remote = outcome.write_remote, "Bag reconciled");
        if outcome.write_local {
            self.local.replace(outcome.cart)?;
        }
        if outcome.write_remote {
            self.mirror().await;
        }
        Ok(())
    }

    pub fn cart(&self) -> &Cart { self.local.cart() }
    pub fn total_items(&self) -> u32 { self.local.total_items() }
    pub fn total_price(&self) -> Decimal { self.local.total_price() }

    pub async fn add(&mut self, product: &Product, quantity: Quantity) -> Result<()> {
        self.local.add(product, quantity)?;
        self.mirror().await;
        Ok(())
    }

    pub async fn set_quantity(&mut self, product_id: &Uuid, quantity: i64) -> Result<()> {
        self.local.set_quantity(product_id, quantity)?;
        self.mirror().await;
        Ok(())
    }

    pub async fn remove(&mut self, product_id: &Uuid) -> Result<()> {
        self.local.remove(product_id)?;
        self.mirror().await;
        Ok(())
    }

    pub async fn clear(&mut self) -> Result<()> {
        self.local.clear()?;
        if let Some(user) = self.user {
            if let Err(e) = self.remote.clear_cart(user).await {
                warn!(user_id = %user, error = %e, "Failed to clear remote bag");
            }
        }
        Ok(())
    }

    async fn mirror(&self) {
        let Some(user) = self.user else { return };
        if let Err(e) = self.remote.replace_cart(user, self.local.cart().items()).await {
            warn!(user_id = %user, error = %e, "Failed to mirror bag to remote store");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::local::MemoryStorage;
    use crate::domain::aggregates::CartLineItem;
    use crate::store::MemoryStore;
    use chrono::{Duration, Utc};

    fn product(name: &str, price: i64) -> Product { Product::new(name, Uuid::new_v4(), Decimal::new(price, 0)) }

    fn pairs(items: &[CartLineItem]) -> Vec<(Uuid, u32)> {
        let mut v: Vec<_> = items.iter().map(|i| (i.product_id, i.quantity.value())).collect();
        v.sort();
        v
    }

    #[tokio::test]
    async fn test_empty_local_adopts_remote() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let mut remote = Cart::new();
        remote.add(&product("a", 5), Quantity::new(2).unwrap(), Utc::now());
        remote.add(&product("b", 7), Quantity::ONE, Utc::now());
        store.replace_cart(user, remote.items()).await.unwrap();

        let session = CartSession::bootstrap(MemoryStorage::new(), store.clone(), Some(user), MergePolicy::LocalWins).await.unwrap();
        assert_eq!(pairs(session.cart().items()), pairs(remote.items()));
        assert_eq!(session.total_price(), Decimal::new(17, 0));
    }

    #[tokio::test]
    async fn test_non_empty_local_overwrites_remote() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let mut remote = Cart::new();
        remote.add(&product("old", 5), Quantity::ONE, Utc::now());
        store.replace_cart(user, remote.items()).await.unwrap();

        let mut anon = CartSession::bootstrap(MemoryStorage::new(), store.clone(), None, MergePolicy::LocalWins).await.unwrap();
        anon.add(&product("new", 9), Quantity::new(3).unwrap()).await.unwrap();
        assert_eq!(store.fetch_cart(user).await.unwrap().len(), 1);

        anon.sign_in(user).await.unwrap();
        assert_eq!(pairs(&store.fetch_cart(user).await.unwrap()), pairs(anon.cart().items()));
    }

    #[tokio::test]
    async fn test_anonymous_never_touches_remote() {
        let store = Arc::new(MemoryStore::new());
        store.fail_writes(true).await;
        let mut session = CartSession::bootstrap(MemoryStorage::new(), store.clone(), None, MergePolicy::LocalWins).await.unwrap();
        session.add(&product("a", 1), Quantity::ONE).await.unwrap();
        assert_eq!(session.total_items(), 1);
    }

    #[tokio::test]
    async fn test_remote_failures_are_swallowed() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let mut session = CartSession::bootstrap(MemoryStorage::new(), store.clone(), Some(user), MergePolicy::LocalWins).await.unwrap();
        store.fail_writes(true).await;
        let p = product("a", 10);
        session.add(&p, Quantity::ONE).await.unwrap();
        session.set_quantity(&p.id, 4).await.unwrap();
        assert_eq!(session.total_items(), 4);
        assert!(store.fetch_cart(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_fetch_failure_keeps_local_bag() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let mut remote = Cart::new();
        remote.add(&product("remote", 8), Quantity::ONE, Utc::now());
        store.replace_cart(user, remote.items()).await.unwrap();

        let mut session = CartSession::bootstrap(MemoryStorage::new(), store.clone(), None, MergePolicy::LocalWins).await.unwrap();
        let p = product("local", 3);
        session.add(&p, Quantity::new(2).unwrap()).await.unwrap();

        store.fail_reads(true).await;
        session.sign_in(user).await.unwrap();
        assert_eq!(pairs(session.cart().items()), vec![(p.id, 2)]);
        store.fail_reads(false).await;
        assert_eq!(pairs(&store.fetch_cart(user).await.unwrap()), pairs(remote.items()));
    }

    #[tokio::test]
    async fn test_mutations_mirror_including_removals() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let mut session = CartSession::bootstrap(MemoryStorage::new(), store.clone(), Some(user), MergePolicy::LocalWins).await.unwrap();
        let (a, b) = (product("a", 2), product("b", 3));
        session.add(&a, Quantity::ONE).await.unwrap();
        session.add(&b, Quantity::ONE).await.unwrap();
        session.remove(&a.id).await.unwrap();
        assert_eq!(pairs(&store.fetch_cart(user).await.unwrap()), vec![(b.id, 1)]);
        session.clear().await.unwrap();
        assert!(store.fetch_cart(user).await.unwrap().is_empty());
        assert!(session.cart().is_empty());
    }

    #[test]
    fn test_newest_line_wins_unions() {
        let now = Utc::now();
        let (a, b, c) = (product("a", 1), product("b", 1), product("c", 1));
        let mut local = Cart::new();
        local.add(&a, Quantity::ONE, now);
        local.add(&b, Quantity::ONE, now - Duration::minutes(5));
        let mut remote = Cart::new();
        remote.add(&b, Quantity::new(4).unwrap(), now);
        remote.add(&c, Quantity::new(2).unwrap(), now);

        let out = reconcile(local, remote, MergePolicy::NewestLineWins);
        assert!(out.write_local && out.write_remote);
        assert_eq!(pairs(out.cart.items()), {
            let mut v = vec![(a.id, 1), (b.id, 4), (c.id, 2)];
            v.sort();
            v
        });
    }

    #[test]
    fn test_both_empty_is_noop() {
        for policy in [MergePolicy::LocalWins, MergePolicy::NewestLineWins] {
            let out = reconcile(Cart::new(), Cart::new(), policy);
            assert!(!out.write_local && !out.write_remote);
        }
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("newest-line-wins".parse::<MergePolicy>().unwrap(), MergePolicy::NewestLineWins);
        assert!("remote".parse::<MergePolicy>().is_err());
    }
}
