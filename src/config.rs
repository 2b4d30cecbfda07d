use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Configuration - environment driven, one loader for all three services
// ============================================================================

pub const DEFAULT_INVENTORY_TOKEN: &str = "inventory-service-secret-token-12345";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("missing required setting {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Sales,
    Inventory,
    Delivery,
}

impl ServiceKind {
    pub fn name(self) -> &'static str {
        match self {
            ServiceKind::Sales => "sales-service",
            ServiceKind::Inventory => "inventory-service",
            ServiceKind::Delivery => "delivery-service",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            ServiceKind::Sales => 3000,
            ServiceKind::Inventory => 3001,
            ServiceKind::Delivery => 3002,
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Production treats broker and database connect failures as fatal
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct InventoryClientConfig {
    pub base_url: String,
    /// `None` when the configured timeout is <= 0
    pub timeout: Option<Duration>,
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Redpanda,
    Memory,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub transport: TransportKind,
    pub brokers: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub consumer_group: String,
    pub order_created_line: String,
    pub delivery_updates_line: String,
    pub dedup_capacity: usize,
    pub dedup_ttl: Duration,
    pub connect_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceKind,
    pub environment: Environment,
    pub port: u16,
    /// Required by the sales service only
    pub database: Option<DatabaseConfig>,
    pub inventory: InventoryClientConfig,
    /// Shared secret the inventory service expects in the `token` header
    pub auth_token: String,
    pub broker: BrokerConfig,
}

impl Config {
    pub fn from_env(service: ServiceKind) -> Result<Self, ConfigError> {
        Self::from_lookup(service, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(service: ServiceKind, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let environment = match get("APP_ENV").as_deref() {
            Some("production") => Environment::Production,
            _ => Environment::Development,
        };

        let port = parse_or(&get, "PORT", service.default_port())?;

        let database = match get("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", 5)?,
                acquire_timeout_secs: parse_or(&get, "DB_ACQUIRE_TIMEOUT_SECS", 5)?,
            }),
            None if service == ServiceKind::Sales && environment.is_production() => {
                return Err(ConfigError::Missing("DATABASE_URL"));
            }
            None => None,
        };

        let timeout_ms: i64 = parse_or(&get, "INVENTORY_SERVICE_TIMEOUT", 5000)?;
        let inventory = InventoryClientConfig {
            base_url: get("INVENTORY_SERVICE_URL")
                .unwrap_or_else(|| "http://localhost:3001".to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms as u64)),
            token: get("INVENTORY_SERVICE_TOKEN").unwrap_or_else(|| DEFAULT_INVENTORY_TOKEN.to_string()),
        };

        let auth_token = get("AUTH_TOKEN").unwrap_or_else(|| DEFAULT_INVENTORY_TOKEN.to_string());

        let transport = match get("MQ_TRANSPORT").as_deref() {
            None | Some("redpanda") | Some("kafka") => TransportKind::Redpanda,
            Some("memory") => TransportKind::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "MQ_TRANSPORT",
                    value: other.to_string(),
                })
            }
        };

        let broker = BrokerConfig {
            transport,
            brokers: get("MQ_BROKERS").unwrap_or_else(|| "localhost:9092".to_string()),
            username: get("MQ_USERNAME"),
            password: get("MQ_PASSWORD"),
            consumer_group: get("MQ_CONSUMER_GROUP").unwrap_or_else(|| service.name().to_string()),
            order_created_line: get("MQ_ORDER_CREATED_QUEUE").unwrap_or_else(|| "order.created".to_string()),
            delivery_updates_line: get("MQ_DELIVERY_UPDATES_QUEUE")
                .unwrap_or_else(|| "delivery.updates".to_string()),
            dedup_capacity: parse_or(&get, "MQ_DEDUP_CAPACITY", 10_000)?,
            dedup_ttl: Duration::from_secs(parse_or(&get, "MQ_DEDUP_TTL_SECS", 86_400)?),
            connect_attempts: parse_or(&get, "MQ_CONNECT_ATTEMPTS", 3)?,
        };

        Ok(Self {
            service,
            environment,
            port,
            database,
            inventory,
            auth_token,
            broker,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
