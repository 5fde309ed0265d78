//! Database webhook payloads for the `orders` table.

use serde::Deserialize;
use uuid::Uuid;

use super::StatusChange;

/// Only the columns the dispatcher reads; the rest of the row is ignored.
#[derive(Clone, Debug, Deserialize)]
pub struct OrderRecord {
    pub id: Uuid,
    pub status: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OrderWebhookPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    pub record: OrderRecord,
    #[serde(default)]
    pub old_record: Option<OrderRecord>,
}

impl OrderWebhookPayload {
    /// `None` for anything other than an update of an order row.
    pub fn status_change(&self) -> Option<StatusChange> {
        if !self.kind.eq_ignore_ascii_case("update") || self.table != "orders" {
            return None;
        }
        Some(StatusChange {
            order_id: self.record.id,
            status: self.record.status.clone(),
            previous_status: self.old_record.as_ref().map(|r| r.status.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_payload() {
        let id = Uuid::new_v4();
        let payload: OrderWebhookPayload = serde_json::from_value(json!({
            "type": "UPDATE",
            "table": "orders",
            "schema": "public",
            "record": {"id": id, "status": "confirmed", "total_amount": 300, "notes": null},
            "old_record": {"id": id, "status": "pending"}
        })).unwrap();
        let change = payload.status_change().unwrap();
        assert_eq!(change.status, "confirmed");
        assert_eq!(change.previous_status.as_deref(), Some("pending"));
    }

    #[test]
    fn test_insert_is_ignored() {
        let payload: OrderWebhookPayload = serde_json::from_value(json!({
            "type": "INSERT", "table": "orders", "record": {"id": Uuid::new_v4(), "status": "pending"}
        })).unwrap();
        assert!(payload.status_change().is_none());
    }
}
