//! Background polling pass.
//!
//! The station only learns about trains entering sections, hand-thrown
//! points and failed lamps by reading every device. `spawn_refresh_loop`
//! does that on a fixed interval. Each pass runs on the blocking pool since
//! controller reads may block.
//!
//! ```ignore
//! let handle = spawn_refresh_loop(Arc::clone(&station), config.events.refresh_interval());
//! // ...
//! handle.abort();
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::station::StationManager;
use crate::traits::StationController;

/// Run [`StationManager::refresh_station_status`] every `interval` until the
/// returned handle is aborted.
pub fn spawn_refresh_loop<C>(station: Arc<StationManager<C>>, interval: Duration) -> JoinHandle<()>
where
    C: StationController + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_ms = interval.as_millis() as u64, "refresh loop started");

        loop {
            ticker.tick().await;
            let pass = Arc::clone(&station);
            match tokio::task::spawn_blocking(move || pass.refresh_station_status()).await {
                Ok(0) => {}
                Ok(changes) => tracing::debug!(changes, "refresh pass"),
                Err(err) => tracing::error!(error = %err, "refresh pass failed"),
            }
        }
    })
}
