use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::db::OrderStore;
use crate::inventory::InventoryGateway;
use crate::messaging::{BrokerClient, BrokerError, Line, PublishOutcome};
use crate::metrics::Metrics;

use super::aggregate::{NewOrder, Order};
use super::commands::CreateOrderRequest;
use super::errors::OrderError;
use super::events::{DeliveryStatusUpdateEvent, OrderCreatedEvent};
use super::value_objects::OrderStatus;

// ============================================================================
// Order Lifecycle Coordinator
// ============================================================================
//
// Orchestrates: validate -> check availability -> persist -> publish
// and, asynchronously, delivery status event -> persist new status.
//
// Holds no order state between calls; every operation re-reads the store.
// The only failure swallowed here is the publish after a successful create.
//
// ============================================================================

pub struct OrderCoordinator {
    store: Arc<dyn OrderStore>,
    inventory: Arc<dyn InventoryGateway>,
    broker: Arc<BrokerClient>,
    metrics: Arc<Metrics>,
}

impl OrderCoordinator {
    pub fn new(
        store: Arc<dyn OrderStore>,
        inventory: Arc<dyn InventoryGateway>,
        broker: Arc<BrokerClient>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            inventory,
            broker,
            metrics,
        }
    }

    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order, OrderError> {
        let validated = request.validate().map_err(|e| {
            self.metrics.record_order_rejected("validation");
            e
        })?;

        tracing::info!(
            customer_id = %validated.customer_id,
            item_count = validated.items.len(),
            "Creating order"
        );

        let availability = self
            .inventory
            .check_availability(&validated.items)
            .await
            .map_err(|e| {
                self.metrics.record_order_rejected("inventory_error");
                OrderError::from(e)
            })?;

        if !availability.available {
            let items = availability.into_unavailable_items();
            tracing::warn!(
                customer_id = %validated.customer_id,
                unavailable_count = items.len(),
                "Order rejected, products unavailable"
            );
            self.metrics.record_order_rejected("unavailable");
            return Err(OrderError::Unavailable { items });
        }

        let order = self
            .store
            .create(NewOrder::pending(validated.customer_id, validated.items))
            .await?;
        self.metrics.record_order_created();

        tracing::info!(order_id = %order.id, customer_id = %order.customer_id, "Order created");

        // Best effort: the order stands even if the event never leaves
        match self.broker.publish(Line::OrderCreated, &OrderCreatedEvent::from(&order)).await {
            Ok(PublishOutcome::Sent { message_id }) => {
                tracing::debug!(order_id = %order.id, message_id = %message_id, "Order created event published");
            }
            Ok(PublishOutcome::Skipped) => {}
            Err(e) => {
                tracing::error!(order_id = %order.id, error = %e, "Failed to publish order created event");
            }
        }

        Ok(order)
    }

    /// `None` is a valid answer, not an error
    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, OrderError> {
        Ok(self.store.get_by_id(order_id).await?)
    }

    /// Any existing status may move to Shipped or Delivered.
    pub async fn handle_delivery_status_update(&self, order_id: Uuid, status: OrderStatus) -> Result<(), OrderError> {
        if !status.is_delivery_status() {
            return Err(OrderError::InvalidStatus(status));
        }

        let Some(current) = self.store.get_by_id(order_id).await? else {
            return Err(OrderError::NotFound(order_id));
        };

        if !self.store.update_status(order_id, status).await? {
            return Err(OrderError::NotFound(order_id));
        }

        self.metrics.record_status_update(status.as_str());
        tracing::info!(
            order_id = %order_id,
            previous_status = %current.status,
            new_status = %status,
            "Order status updated from delivery event"
        );
        Ok(())
    }

    /// Drain the delivery-status line into `handle_delivery_status_update`.
    /// Handler errors become nacks in the broker client.
    pub async fn subscribe_delivery_updates(self: &Arc<Self>) -> Result<Option<JoinHandle<()>>, BrokerError> {
        let coordinator = self.clone();

        self.broker
            .consume(Line::DeliveryStatus, move |event: DeliveryStatusUpdateEvent| {
                let coordinator = coordinator.clone();
                async move {
                    tracing::info!(order_id = %event.order_id, status = %event.status, "Received delivery status update");
                    coordinator
                        .handle_delivery_status_update(event.order_id, event.status)
                        .await?;
                    tracing::info!(
                        order_id = %event.order_id,
                        status = %event.status,
                        "Successfully processed delivery status update"
                    );
                    anyhow::Ok(())
                }
            })
            .await
    }
}
