use serde::{Deserialize, Serialize};

use crate::domain::order::OrderItem;

// ============================================================================
// Availability Check - wire types shared by the oracle and its client
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AvailabilityCheckItem {
    pub product_id: String,
    pub quantity: u32,
}

impl From<&OrderItem> for AvailabilityCheckItem {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id.clone(),
            quantity: item.quantity,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AvailabilityCheckRequest {
    pub items: Vec<AvailabilityCheckItem>,
}

impl AvailabilityCheckRequest {
    pub fn for_items(items: &[OrderItem]) -> Self {
        Self {
            items: items.iter().map(AvailabilityCheckItem::from).collect(),
        }
    }
}

/// An item that cannot be fulfilled. `available_quantity` is 0 for unknown
/// products.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UnavailableItem {
    pub product_id: String,
    pub requested_quantity: u32,
    pub available_quantity: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AvailabilityCheckResult {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unavailable_items: Option<Vec<UnavailableItem>>,
}

impl AvailabilityCheckResult {
    pub fn all_available() -> Self {
        Self {
            available: true,
            unavailable_items: None,
        }
    }

    pub fn from_unavailable(items: Vec<UnavailableItem>) -> Self {
        if items.is_empty() {
            Self::all_available()
        } else {
            Self {
                available: false,
                unavailable_items: Some(items),
            }
        }
    }

    pub fn into_unavailable_items(self) -> Vec<UnavailableItem> {
        self.unavailable_items.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_available_result_omits_item_list() {
        let json = serde_json::to_value(AvailabilityCheckResult::all_available()).unwrap();
        assert_eq!(json, json!({"available": true}));
    }

    #[test]
    fn test_unavailable_result_shape() {
        let result = AvailabilityCheckResult::from_unavailable(vec![UnavailableItem {
            product_id: "p1".into(),
            requested_quantity: 5,
            available_quantity: 2,
        }]);

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "available": false,
                "unavailable_items": [
                    {"product_id": "p1", "requested_quantity": 5, "available_quantity": 2}
                ]
            })
        );
    }
}
