use research_session::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Periodically remove expired sessions from `store`.
///
/// The first sweep happens one full `period` after spawning. Abort the
/// returned handle to stop sweeping.
pub fn spawn_cleanup_task(store: Arc<Mutex<SessionStore>>, period: Duration) -> JoinHandle<()> {
    info!("Starting expired-session sweeper every {:?}", period);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let removed = store.lock().await.cleanup_expired_sessions();
            debug!("Sweeper removed {} sessions", removed);
        }
    })
}
