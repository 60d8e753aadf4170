use crate::checkout::CheckoutService;
use store_gateway::{StoreActor, StoreClient};
use tokio::task::JoinHandle;
use tracing::info;

/// The in-memory checkout system: one store task and the service in front of it.
pub struct CheckoutSystem {
    /// Direct handle to the store, for seeding and read-backs.
    pub store: StoreClient,
    pub checkout: CheckoutService<StoreClient>,
    handle: JoinHandle<()>,
}

impl CheckoutSystem {
    /// Spawns the store task. Must be called inside a Tokio runtime.
    pub fn new() -> Self {
        let (actor, store) = StoreActor::new();
        let handle = tokio::spawn(actor.run());
        let checkout = CheckoutService::new(store.clone());
        info!("Checkout system started");

        Self {
            store,
            checkout,
            handle,
        }
    }

    pub async fn shutdown(self) -> Result<(), String> {
        let Self {
            store,
            checkout,
            handle,
        } = self;
        drop(checkout);
        drop(store);

        handle
            .await
            .map_err(|e| format!("Store task failed: {e}"))?;
        info!("Checkout system stopped");
        Ok(())
    }
}

impl Default for CheckoutSystem {
    fn default() -> Self {
        Self::new()
    }
}
