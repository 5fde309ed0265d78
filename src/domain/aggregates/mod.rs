//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod account;

pub use product::{Category, Product};
pub use order::{Customization, Milestones, NewLineItem, Order, OrderError, OrderLineItem, OrderStatus};
pub use cart::{Cart, CartLineItem, ProductSnapshot};
pub use account::{Address, Profile, WishlistEntry};
