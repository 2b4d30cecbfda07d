use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use order_fulfillment::db::{InMemoryOrderStore, OrderStore};
use order_fulfillment::domain::inventory::{AvailabilityCheckItem, AvailabilityCheckResult, ProductCatalog, UnavailableItem};
use order_fulfillment::domain::order::{
    CreateOrderRequest, DeliveryStatusUpdateEvent, OrderCoordinator, OrderError, OrderItem, OrderStatus,
};
use order_fulfillment::inventory::{InventoryError, InventoryGateway};
use order_fulfillment::messaging::{BrokerClient, InMemoryTransport, LineNames, OutboundMessage};
use order_fulfillment::metrics::Metrics;
use order_fulfillment::services::DeliveryService;

// Sales and delivery wired to one in-process broker, the way the two
// services meet on a real one.

struct CatalogGateway(ProductCatalog);

#[async_trait]
impl InventoryGateway for CatalogGateway {
    async fn check_availability(&self, items: &[OrderItem]) -> Result<AvailabilityCheckResult, InventoryError> {
        let items: Vec<AvailabilityCheckItem> = items.iter().map(AvailabilityCheckItem::from).collect();
        Ok(self.0.check_availability(&items))
    }
}

struct Pipeline {
    transport: InMemoryTransport,
    store: Arc<InMemoryOrderStore>,
    coordinator: Arc<OrderCoordinator>,
    delivery: Arc<DeliveryService>,
}

async fn broker(transport: &InMemoryTransport) -> Arc<BrokerClient> {
    let broker = Arc::new(BrokerClient::new(
        Arc::new(transport.clone()),
        LineNames::default(),
        Arc::new(Metrics::new().unwrap()),
    ));
    broker.connect().await.unwrap();
    broker
}

async fn pipeline() -> Pipeline {
    let transport = InMemoryTransport::default();
    let store = Arc::new(InMemoryOrderStore::new());

    let sales_broker = broker(&transport).await;
    let coordinator = Arc::new(OrderCoordinator::new(
        store.clone(),
        Arc::new(CatalogGateway(ProductCatalog::default())),
        sales_broker,
        Arc::new(Metrics::new().unwrap()),
    ));
    coordinator.subscribe_delivery_updates().await.unwrap().unwrap();

    let delivery = Arc::new(DeliveryService::new(broker(&transport).await));
    delivery.subscribe_order_created().await.unwrap().unwrap();

    Pipeline {
        transport,
        store,
        coordinator,
        delivery,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_order_flows_from_creation_to_delivered() {
    let p = pipeline().await;

    let order = p
        .coordinator
        .create_order(CreateOrderRequest::new("c1", vec![OrderItem::new("product-1", 2)]))
        .await
        .unwrap();
    settle().await;

    // order.created was consumed and acknowledged by delivery
    let stats = p.transport.stats().await;
    assert_eq!(stats.sent, 1);
    assert_eq!(stats.acked, 1);

    p.delivery.publish_status_update(order.id, OrderStatus::Shipped).await.unwrap();
    settle().await;
    assert_eq!(p.coordinator.get_order(order.id).await.unwrap().unwrap().status, OrderStatus::Shipped);

    p.delivery.publish_status_update(order.id, OrderStatus::Delivered).await.unwrap();
    settle().await;

    let stored = p.coordinator.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Delivered);
    assert_eq!(stored.items, vec![OrderItem::new("product-1", 2)]);

    let history: Vec<OrderStatus> = p
        .store
        .status_history(order.id)
        .await
        .unwrap()
        .into_iter()
        .map(|h| h.status)
        .collect();
    assert_eq!(
        history,
        vec![OrderStatus::PendingShipment, OrderStatus::Shipped, OrderStatus::Delivered]
    );
    assert_eq!(p.transport.stats().await.nacked, 0);
}

#[tokio::test]
async fn test_unavailable_items_leave_no_trace() {
    let p = pipeline().await;

    let err = p
        .coordinator
        .create_order(CreateOrderRequest::new(
            "c1",
            vec![OrderItem::new("product-8", 16), OrderItem::new("ghost", 1)],
        ))
        .await
        .unwrap_err();

    match err {
        OrderError::Unavailable { items } => assert_eq!(
            items,
            vec![
                UnavailableItem {
                    product_id: "product-8".into(),
                    requested_quantity: 16,
                    available_quantity: 15
                },
                UnavailableItem {
                    product_id: "ghost".into(),
                    requested_quantity: 1,
                    available_quantity: 0
                },
            ]
        ),
        other => panic!("expected unavailable, got {other:?}"),
    }

    assert!(p.store.is_empty().await);
    assert_eq!(p.transport.stats().await.sent, 0);
}

#[tokio::test]
async fn test_status_update_for_unknown_order_is_rejected() {
    let p = pipeline().await;
    let unknown = uuid::Uuid::new_v4();

    p.delivery.publish_status_update(unknown, OrderStatus::Shipped).await.unwrap();
    settle().await;

    let stats = p.transport.stats().await;
    assert_eq!(stats.nacked, 1);
    assert_eq!(stats.requeued, 0);
    assert!(p.store.is_empty().await);
}

#[tokio::test]
async fn test_duplicate_message_is_consumed_once() {
    let p = pipeline().await;
    let order = p
        .coordinator
        .create_order(CreateOrderRequest::new("c1", vec![OrderItem::new("product-2", 1)]))
        .await
        .unwrap();
    settle().await;

    let payload = serde_json::to_vec(&DeliveryStatusUpdateEvent::now(order.id, OrderStatus::Shipped)).unwrap();
    for _ in 0..2 {
        p.transport
            .inject("delivery.updates", OutboundMessage::persistent("dup-1", payload.clone()))
            .await
            .unwrap();
    }
    settle().await;

    let stats = p.transport.stats().await;
    assert_eq!(stats.duplicates_dropped, 1);
    assert_eq!(p.store.status_history(order.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_malformed_messages_are_rejected_on_both_lines() {
    let p = pipeline().await;

    p.transport
        .inject("order.created", OutboundMessage::persistent("bad-1", b"not json".to_vec()))
        .await
        .unwrap();
    p.transport
        .inject("delivery.updates", OutboundMessage::persistent("bad-2", vec![0xff, 0xfe]))
        .await
        .unwrap();
    settle().await;

    let stats = p.transport.stats().await;
    assert_eq!(stats.nacked, 2);
    assert_eq!(stats.requeued, 0);

    // Both loops are still running
    let order = p
        .coordinator
        .create_order(CreateOrderRequest::new("c1", vec![OrderItem::new("product-3", 1)]))
        .await
        .unwrap();
    p.delivery.publish_status_update(order.id, OrderStatus::Shipped).await.unwrap();
    settle().await;

    assert_eq!(p.coordinator.get_order(order.id).await.unwrap().unwrap().status, OrderStatus::Shipped);
    assert_eq!(p.transport.stats().await.acked, 2);
}

#[tokio::test]
async fn test_orders_survive_a_broker_outage() {
    let p = pipeline().await;
    p.transport.drop_link().await;
    settle().await;

    let order = p
        .coordinator
        .create_order(CreateOrderRequest::new("c1", vec![OrderItem::new("product-4", 1)]))
        .await
        .unwrap();

    assert_eq!(p.coordinator.get_order(order.id).await.unwrap().unwrap().status, OrderStatus::PendingShipment);
    assert_eq!(p.transport.stats().await.sent, 0);
}
