use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use substruct_order::OrderService;
use tracing::{error, info};

/// Periodically deletes carts left over from previous days.
pub async fn start_cart_sweeper(orders: Arc<OrderService>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Cart sweeper started, running every {}s", every.as_secs());

    loop {
        ticker.tick().await;
        match orders.destroy_old_carts().await {
            Ok(0) => {}
            Ok(deleted) => info!("Cart sweeper removed {} stale carts", deleted),
            Err(e) => error!("Cart sweep failed: {}", e),
        }
    }
}
