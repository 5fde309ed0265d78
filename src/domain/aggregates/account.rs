//! Customer-owned records: profile and wishlist

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    #[serde(default)]
    pub building: Option<String>,
    pub city: String,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Address {
    /// Multi-line form used in delivery messages; empty parts are skipped.
    pub fn formatted(&self) -> String {
        let first = [Some(self.street.as_str()), self.building.as_deref()]
            .into_iter().flatten().map(str::trim).filter(|s| !s.is_empty()).collect::<Vec<_>>().join(", ");
        let second = [self.district.as_deref(), Some(self.city.as_str()), self.postal_code.as_deref()]
            .into_iter().flatten().map(str::trim).filter(|s| !s.is_empty()).collect::<Vec<_>>().join(", ");
        let mut lines: Vec<String> = [first, second].into_iter().filter(|l| !l.is_empty()).collect();
        if let Some(notes) = self.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            lines.push(format!("Notes: {notes}"));
        }
        lines.join("\n")
    }
}

/// Shares its id with the auth identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<Address>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WishlistEntry {
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub created_at: DateTime<Utc>,
}
