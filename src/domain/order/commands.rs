use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::OrderError;
use super::value_objects::OrderItem;

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================
//
// Requests arrive loosely typed (straight from a JSON body). Any field of the
// wrong shape, `items` included, is reported as a validation failure naming
// the field rather than as an opaque decode error.
//
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub customer_id: Option<Value>,
    #[serde(default)]
    pub items: Option<Value>,
}

/// A request that passed local validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedOrder {
    pub customer_id: String,
    pub items: Vec<OrderItem>,
}

impl CreateOrderRequest {
    pub fn new(customer_id: impl Into<String>, items: Vec<OrderItem>) -> Self {
        Self {
            customer_id: Some(Value::String(customer_id.into())),
            items: Some(Value::Array(
                items
                    .into_iter()
                    .map(|item| serde_json::json!({ "product_id": item.product_id, "quantity": item.quantity }))
                    .collect(),
            )),
        }
    }

    pub fn validate(self) -> Result<ValidatedOrder, OrderError> {
        let customer_id = match self.customer_id.as_ref().and_then(non_blank) {
            Some(id) => id,
            _ => return Err(OrderError::Validation("customer_id is required".into())),
        };

        let inputs = match self.items {
            Some(Value::Array(items)) if !items.is_empty() => items,
            _ => {
                return Err(OrderError::Validation(
                    "items array is required and must not be empty".into(),
                ))
            }
        };

        let mut items = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let product_id = match input.get("product_id").and_then(non_blank) {
                Some(id) => id,
                _ => {
                    return Err(OrderError::Validation(format!(
                        "items[{index}].product_id is required"
                    )))
                }
            };

            let quantity = input.get("quantity").and_then(positive_quantity).ok_or_else(|| {
                OrderError::Validation(format!(
                    "items[{index}].quantity must be a positive integer"
                ))
            })?;

            items.push(OrderItem { product_id, quantity });
        }

        Ok(ValidatedOrder { customer_id, items })
    }
}

fn non_blank(value: &Value) -> Option<String> {
    value.as_str().filter(|s| !s.trim().is_empty()).map(str::to_string)
}

/// Accepts JSON integers (including `2.0`) in `1..=u32::MAX`.
fn positive_quantity(value: &Value) -> Option<u32> {
    let Value::Number(number) = value else {
        return None;
    };
    let whole = if let Some(n) = number.as_u64() {
        n
    } else {
        let f = number.as_f64()?;
        if f.fract() != 0.0 || f < 1.0 || f > f64::from(u32::MAX) {
            return None;
        }
        f as u64
    };
    u32::try_from(whole).ok().filter(|q| *q >= 1)
}
