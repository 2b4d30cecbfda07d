use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::order::{DeliveryStatusUpdateEvent, OrderCreatedEvent, OrderStatus};
use crate::messaging::{BrokerClient, BrokerError, Line, PublishOutcome};

// ============================================================================
// Delivery Status Publisher
// ============================================================================
//
// Receives order-created events (log only) and turns external status commands
// into DeliveryStatusUpdateEvents on the delivery-status line.
//
// ============================================================================

pub struct DeliveryService {
    broker: Arc<BrokerClient>,
}

impl DeliveryService {
    pub fn new(broker: Arc<BrokerClient>) -> Self {
        Self { broker }
    }

    pub async fn handle_order_created(&self, event: OrderCreatedEvent) {
        tracing::info!(
            order_id = %event.order_id,
            customer_id = %event.customer_id,
            item_count = event.items.len(),
            "Received order created event"
        );
    }

    /// Stamps the event with the current time. A disconnected broker is a
    /// logged no-op; any other publish failure is returned.
    pub async fn publish_status_update(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<DeliveryStatusUpdateEvent, BrokerError> {
        tracing::info!(order_id = %order_id, status = %status, "Publishing delivery status update");

        let event = DeliveryStatusUpdateEvent::now(order_id, status);

        match self.broker.publish(Line::DeliveryStatus, &event).await {
            Ok(PublishOutcome::Sent { message_id }) => {
                tracing::info!(order_id = %order_id, status = %status, message_id = %message_id, "Delivery status update published");
                Ok(event)
            }
            Ok(PublishOutcome::Skipped) => Ok(event),
            Err(e) => {
                tracing::error!(order_id = %order_id, status = %status, error = %e, "Failed to publish delivery status update");
                Err(e)
            }
        }
    }

    pub async fn subscribe_order_created(self: &Arc<Self>) -> Result<Option<JoinHandle<()>>, BrokerError> {
        let service = self.clone();

        self.broker
            .consume(Line::OrderCreated, move |event: OrderCreatedEvent| {
                let service = service.clone();
                async move {
                    service.handle_order_created(event).await;
                    anyhow::Ok(())
                }
            })
            .await
    }
}
