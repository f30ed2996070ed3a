use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{playback_store::PlaybackStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the storage backend, hydrate the coordinator from it, and keep the shared
/// state in degraded mode whenever it is unavailable.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn PlaybackStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        let store = match connect().await {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
                continue;
            }
        };

        if let Err(err) = state.install_store(store.clone()).await {
            warn!(error = %err, "failed to load persisted playback state; retrying");
            sleep(delay).await;
            delay = (delay * 2).min(MAX_DELAY);
            continue;
        }
        info!("storage connection established; leaving degraded mode");
        delay = INITIAL_DELAY;

        supervise(&state, store.as_ref()).await;
        state.storage().clear().await;

        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// Poll the installed store until it is lost for good.
async fn supervise(state: &SharedState, store: &dyn PlaybackStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("storage healthy again; leaving degraded mode");
                    state.storage().update_degraded(false);
                }
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(_) => {
                let mut attempt = 0;
                let mut reconnect_delay = INITIAL_DELAY;
                let mut reconnected = false;

                while attempt < MAX_RECONNECT_ATTEMPTS {
                    match store.try_reconnect().await {
                        Ok(()) => {
                            info!("storage reconnection succeeded after health check failure");
                            reconnected = true;
                            break;
                        }
                        Err(reconnect_err) => {
                            if attempt == 0 {
                                warn!(
                                    attempt, error = %reconnect_err,
                                    "storage reconnect first attempt failed; entering in degraded mode"
                                );
                                state.storage().update_degraded(true);
                            } else {
                                warn!(attempt, error = %reconnect_err, "storage reconnect attempt failed");
                            };
                            attempt += 1;
                            sleep(reconnect_delay).await;
                            reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
                        }
                    }
                }

                if !reconnected {
                    warn!("exhausted storage reconnect attempts; staying in degraded mode");
                    return;
                }
                state.storage().update_degraded(false);
                sleep(HEALTH_POLL_INTERVAL).await;
            }
        }
    }
}
