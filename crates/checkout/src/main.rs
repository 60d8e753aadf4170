//! Checkout demo binary.
//!
//! With the default `memory` backend it seeds a small catalog and runs a few checkouts,
//! including failing and concurrent ones. With `CHECKOUT_BACKEND=postgres` (built with
//! the `postgres` feature) it checks out the JSON request given as first argument:
//!
//! ```bash
//! CHECKOUT_BACKEND=postgres DATABASE_URL=postgres://localhost/shop \
//!     cargo run -p checkout --features postgres -- '{"userID":1,"items":[{"productID":1,"quantity":2}]}'
//! ```

use anyhow::{bail, Context};
use checkout::checkout::{CheckoutItem, CheckoutRequest};
use checkout::lifecycle::{Backend, CheckoutSystem, SystemConfig};
use rust_decimal::Decimal;
use store_gateway::model::{ProductCreate, ProductId, StockCreate, UserId, WarehouseId};
use store_gateway::tracing::setup_tracing;
use store_gateway::StoreGateway;
use tracing::{error, info, Instrument};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SystemConfig::from_env().context("Invalid configuration")?;
    setup_tracing(config.log_format);
    info!(backend = ?config.backend, "Starting checkout");

    match config.backend {
        Backend::Memory => run_memory_demo().await,
        Backend::Postgres => run_postgres(&config).await,
    }
}

async fn run_memory_demo() -> anyhow::Result<()> {
    let system = CheckoutSystem::new();

    let keyboard = system
        .store
        .create_product(ProductCreate::new("Keyboard", Decimal::new(4999, 2)))
        .await?;
    let mouse = system
        .store
        .create_product(ProductCreate::new("Mouse", Decimal::new(1950, 2)))
        .await?;
    for (product_id, warehouse, quantity) in [
        (keyboard.id, 1, 1),
        (keyboard.id, 2, 4),
        (mouse.id, 1, 10),
    ] {
        system
            .store
            .create_stock(StockCreate {
                product_id,
                warehouse_id: WarehouseId(warehouse),
                quantity,
            })
            .await?;
    }
    info!("Catalog seeded");

    let requests = [
        CheckoutRequest::new(
            UserId(1),
            vec![
                CheckoutItem::new(keyboard.id, 2),
                CheckoutItem::new(mouse.id, 1),
            ],
        ),
        CheckoutRequest::new(UserId(2), vec![CheckoutItem::new(ProductId(999), 1)]),
        CheckoutRequest::new(UserId(3), vec![CheckoutItem::new(keyboard.id, 50)]),
    ];
    for request in requests {
        let span = tracing::info_span!("demo_checkout", user_id = %request.user_id);
        match system.checkout.checkout(request).instrument(span).await {
            Ok(order) => info!(order = %serde_json::to_string(&order)?, "Order placed"),
            Err(e) => error!(error = %e, "Checkout rejected"),
        }
    }

    // Five buyers race for the last three keyboards.
    let mut tasks = Vec::new();
    for user in 10..15 {
        let service = system.checkout.clone();
        let request = CheckoutRequest::new(UserId(user), vec![CheckoutItem::new(keyboard.id, 1)]);
        tasks.push(tokio::spawn(async move { service.checkout(request).await }));
    }
    let mut placed = 0;
    for task in tasks {
        if task.await?.is_ok() {
            placed += 1;
        }
    }
    let remaining: u32 = system
        .store
        .stocks_for_product(keyboard.id)
        .await?
        .iter()
        .map(|stock| stock.quantity)
        .sum();
    info!(placed, remaining, "Concurrent checkouts finished");

    system.shutdown().await.map_err(anyhow::Error::msg)?;
    info!("Demo completed");
    Ok(())
}

#[cfg(feature = "postgres")]
async fn run_postgres(config: &SystemConfig) -> anyhow::Result<()> {
    use checkout::checkout::CheckoutService;
    use store_gateway::PgGateway;

    let Some(payload) = std::env::args().nth(1) else {
        bail!("Usage: checkout '<checkout request JSON>'");
    };
    let request: CheckoutRequest =
        serde_json::from_str(&payload).context("Malformed checkout request")?;
    request.validate()?;

    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set")?;
    let gateway = PgGateway::connect(url, config.max_connections).await?;
    let service = CheckoutService::new(gateway);

    let order = service.checkout(request).await?;
    println!("{}", serde_json::to_string_pretty(&order)?);
    Ok(())
}

#[cfg(not(feature = "postgres"))]
async fn run_postgres(_config: &SystemConfig) -> anyhow::Result<()> {
    bail!("This binary was built without the `postgres` feature")
}
