mod handler;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::utils::CircuitState;

pub use handler::metrics_handler;

// ============================================================================
// Metrics Module - Prometheus metrics for the order pipeline
// ============================================================================
//
// One registry per process, rendered by GET /metrics on every service:
// - Order creation outcomes and availability-check latency
// - Events published / consumed per delivery line
// - Broker connection flag and publish circuit breaker state
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub orders_created: IntCounter,
    pub orders_rejected: IntCounterVec,
    pub order_status_updates: IntCounterVec,
    pub availability_check_duration: HistogramVec,

    pub events_published: IntCounterVec,
    pub events_consumed: IntCounterVec,

    pub broker_connected: IntGauge,
    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Orders persisted by the sales service")?;
        registry.register(Box::new(orders_created.clone()))?;

        let orders_rejected = IntCounterVec::new(
            Opts::new("orders_rejected_total", "Order creation requests that did not produce an order"),
            &["reason"],
        )?;
        registry.register(Box::new(orders_rejected.clone()))?;

        let order_status_updates = IntCounterVec::new(
            Opts::new("order_status_updates_total", "Delivery status updates applied to orders"),
            &["status"],
        )?;
        registry.register(Box::new(order_status_updates.clone()))?;

        let availability_check_duration = HistogramVec::new(
            HistogramOpts::new(
                "inventory_availability_check_duration_seconds",
                "Latency of the synchronous inventory availability check",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(availability_check_duration.clone()))?;

        let events_published = IntCounterVec::new(
            Opts::new("broker_events_published_total", "Publish attempts by delivery line and outcome"),
            &["line", "outcome"],
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let events_consumed = IntCounterVec::new(
            Opts::new("broker_events_consumed_total", "Consumed messages by delivery line and outcome"),
            &["line", "outcome"],
        )?;
        registry.register(Box::new(events_consumed.clone()))?;

        let broker_connected = IntGauge::new("broker_connected", "Broker connection flag (1=connected)")?;
        registry.register(Box::new(broker_connected.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "broker_publish_circuit_state",
            "Publish circuit breaker state (0=Closed, 1=HalfOpen, 2=Open)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            orders_rejected,
            order_status_updates,
            availability_check_duration,
            events_published,
            events_consumed,
            broker_connected,
            circuit_breaker_state,
        })
    }

    pub fn record_order_created(&self) {
        self.orders_created.inc();
    }

    pub fn record_order_rejected(&self, reason: &str) {
        self.orders_rejected.with_label_values(&[reason]).inc();
    }

    pub fn record_status_update(&self, status: &str) {
        self.order_status_updates.with_label_values(&[status]).inc();
    }

    pub fn observe_availability_check(&self, outcome: &str, seconds: f64) {
        self.availability_check_duration
            .with_label_values(&[outcome])
            .observe(seconds);
    }

    pub fn record_publish(&self, line: &str, outcome: &str) {
        self.events_published.with_label_values(&[line, outcome]).inc();
    }

    pub fn record_consume(&self, line: &str, outcome: &str) {
        self.events_consumed.with_label_values(&[line, outcome]).inc();
    }

    pub fn set_broker_connected(&self, connected: bool) {
        self.broker_connected.set(i64::from(connected));
    }

    pub fn set_circuit_state(&self, state: CircuitState) {
        self.circuit_breaker_state.set(state.as_gauge());
    }

    /// Text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
