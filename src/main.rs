use clap::{Parser, Subcommand};

use order_fulfillment::app;
use order_fulfillment::config::{Config, ServiceKind};

#[derive(Parser)]
#[command(name = "order_fulfillment", about = "Order fulfillment services", version)]
struct Cli {
    #[command(subcommand)]
    service: Service,
}

#[derive(Subcommand, Clone, Copy)]
enum Service {
    /// Order API on PORT (default 3000)
    Sales,
    /// Availability oracle on PORT (default 3001)
    Inventory,
    /// Delivery status API on PORT (default 3002)
    Delivery,
}

impl From<Service> for ServiceKind {
    fn from(service: Service) -> Self {
        match service {
            Service::Sales => ServiceKind::Sales,
            Service::Inventory => ServiceKind::Inventory,
            Service::Delivery => ServiceKind::Delivery,
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    app::init_tracing();

    let cli = Cli::parse();
    let kind = ServiceKind::from(cli.service);
    let config = Config::from_env(kind)?;

    match kind {
        ServiceKind::Sales => app::sales::run(config).await,
        ServiceKind::Inventory => app::inventory::run(config).await,
        ServiceKind::Delivery => app::delivery::run(config).await,
    }
}
