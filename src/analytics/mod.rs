//! Read-side rollups over already-fetched rows: bestseller ranking and the
//! back-office dashboard. Nothing here touches the store.

use std::collections::HashMap;

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderStatus, Product};
use crate::store::OrderItemFact;

/// Order statuses whose lines count as sold.
pub const SOLD_STATUSES: [OrderStatus; 2] = [OrderStatus::Completed, OrderStatus::Delivered];

pub const DAILY_WINDOW_DAYS: u64 = 30;
pub const TOP_PRODUCTS: usize = 5;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BestSellerProjection {
    #[serde(flatten)]
    pub product: Product,
    pub total_quantity_sold: u64,
    pub total_revenue: Decimal,
    pub rank: u32,
}

struct Tally {
    product: Product,
    quantity: u64,
    revenue: Decimal,
}

fn tally_by_product<'a>(facts: impl Iterator<Item = &'a OrderItemFact>) -> Vec<Tally> {
    let mut by_id: HashMap<Uuid, Tally> = HashMap::new();
    for fact in facts {
        let Some(product) = &fact.product else { continue };
        let entry = by_id.entry(product.id).or_insert_with(|| Tally { product: product.clone(), quantity: 0, revenue: Decimal::ZERO });
        entry.quantity += u64::from(fact.quantity.value());
        entry.revenue += fact.item_total * fact.quantity.as_decimal();
    }
    by_id.into_values().collect()
}

/// Ranks available products by units sold in completed or delivered orders,
/// breaking ties on revenue. Ranks start at 1.
pub fn bestsellers(facts: &[OrderItemFact], limit: usize) -> Vec<BestSellerProjection> {
    let sold = facts.iter().filter(|f| {
        SOLD_STATUSES.contains(&f.order_status) && f.product.as_ref().is_some_and(|p| p.is_available)
    });
    let mut tallies = tally_by_product(sold);
    tallies.sort_by(|a, b| {
        b.quantity.cmp(&a.quantity)
            .then_with(|| b.revenue.cmp(&a.revenue))
            .then_with(|| a.product.name.cmp(&b.product.name))
    });
    tallies.into_iter().take(limit).enumerate().map(|(i, t)| BestSellerProjection {
        product: t.product,
        total_quantity_sold: t.quantity,
        total_revenue: t.revenue,
        rank: i as u32 + 1,
    }).collect()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub orders: u64,
    pub revenue: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TopProduct {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: u64,
    pub revenue: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_orders: u64,
    /// `pending` plus `reviewing`.
    pub pending_orders: u64,
    pub completed_orders: u64,
    /// Sum over every order regardless of status.
    pub total_revenue: Decimal,
    /// Sum over completed and delivered orders only.
    pub realized_revenue: Decimal,
    /// One entry per day, oldest first, ending on `today`.
    pub daily: Vec<DailyRevenue>,
    pub top_products: Vec<TopProduct>,
}

pub fn dashboard_stats(orders: &[Order], facts: &[OrderItemFact], today: NaiveDate) -> DashboardStats {
    let count = |pred: fn(OrderStatus) -> bool| orders.iter().filter(|o| pred(o.status())).count() as u64;
    let pending_orders = count(|s| matches!(s, OrderStatus::Pending | OrderStatus::Reviewing));
    let completed_orders = count(|s| s == OrderStatus::Completed);
    let total_revenue = orders.iter().map(|o| o.total_amount).sum();
    let realized_revenue = orders.iter().filter(|o| o.status().is_sold()).map(|o| o.total_amount).sum();

    let start = today.checked_sub_days(Days::new(DAILY_WINDOW_DAYS - 1)).unwrap_or(today);
    let mut daily: Vec<DailyRevenue> = start.iter_days().take_while(|d| *d <= today)
        .map(|date| DailyRevenue { date, orders: 0, revenue: Decimal::ZERO })
        .collect();
    for order in orders {
        let day = order.created_at.date_naive();
        if day < start || day > today { continue; }
        let slot = &mut daily[(day - start).num_days() as usize];
        slot.orders += 1;
        slot.revenue += order.total_amount;
    }

    let mut tallies = tally_by_product(facts.iter());
    tallies.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| b.quantity.cmp(&a.quantity)));
    let top_products = tallies.into_iter().take(TOP_PRODUCTS).map(|t| TopProduct {
        product_id: t.product.id,
        name: t.product.name,
        quantity: t.quantity,
        revenue: t.revenue,
    }).collect();

    DashboardStats {
        total_orders: orders.len() as u64,
        pending_orders,
        completed_orders,
        total_revenue,
        realized_revenue,
        daily,
        top_products,
    }
}
