//! Customer-facing message bodies.

use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::format_amount;
use crate::store::OrderDetails;

const PAYMENT_NOTE: &str = "Payment is collected in cash or by card on delivery.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Template {
    OrderConfirmed,
    OrderReady,
}

impl Template {
    /// Only confirmed and ready orders produce a message.
    pub fn for_status(status: OrderStatus) -> Option<Self> {
        match status {
            OrderStatus::Confirmed => Some(Self::OrderConfirmed),
            OrderStatus::Ready => Some(Self::OrderReady),
            _ => None,
        }
    }

    /// Key under which a sent message is recorded.
    pub fn key(&self) -> &'static str {
        match self {
            Self::OrderConfirmed => "order_confirmed",
            Self::OrderReady => "order_ready",
        }
    }

    pub fn render(&self, details: &OrderDetails) -> String {
        match self {
            Self::OrderConfirmed => render_confirmed(details),
            Self::OrderReady => render_ready(details),
        }
    }
}

fn greeting(details: &OrderDetails) -> String {
    let name = details.customer.name.as_deref().map(str::trim).filter(|n| !n.is_empty()).unwrap_or("there");
    format!("Hello {name},")
}

/// Appends `text` and a newline.
fn line(out: &mut String, text: &str) {
    out.push_str(text);
    out.push('\n');
}

fn render_confirmed(details: &OrderDetails) -> String {
    let order = &details.order;
    let mut out = String::new();
    line(&mut out, &format!("{}\n", greeting(details)));
    line(&mut out, &format!("Your order {} has been confirmed.\n", order.reference()));
    line(&mut out, "Items:");
    for (n, detail) in details.items.iter().enumerate() {
        let item = &detail.item;
        let name = detail.product_name.as_deref().unwrap_or("Custom item");
        line(&mut out, &format!("{}. {} x{}", n + 1, name, item.quantity));
        if let Some(customization) = &item.customization {
            for (key, value) in customization.pairs() {
                line(&mut out, &format!("   {key}: {value}"));
            }
        }
        line(&mut out, &format!("   Item total: {}", format_amount(item.line_total())));
    }
    line(&mut out, &format!("\nOrder total: {}\n", format_amount(order.total_amount)));
    line(&mut out, "We will message you again when your order is ready for delivery.");
    out.push_str(PAYMENT_NOTE);
    out
}

fn render_ready(details: &OrderDetails) -> String {
    let order = &details.order;
    let mut out = String::new();
    line(&mut out, &format!("{}\n", greeting(details)));
    line(&mut out, &format!("Your order {} is ready and on its way to you.\n", order.reference()));
    line(&mut out, &format!("Amount due: {}", format_amount(order.total_amount)));
    line(&mut out, &format!("{PAYMENT_NOTE}\n"));
    line(&mut out, "Delivery address:");
    match details.customer.address.as_ref().map(|a| a.formatted()).filter(|a| !a.is_empty()) {
        Some(address) => out.push_str(&address),
        None => out.push_str("No address on file. We will call you to arrange delivery."),
    }
    out
}
