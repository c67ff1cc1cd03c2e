use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use crate::client::reconcile::{RideView, Source};
use crate::error::AppError;
use crate::models::ride::Ride;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Owns a running status poll. Cancelling is idempotent, and dropping the
/// handle cancels too, so a poll never outlives the view that started it.
pub struct PollerHandle {
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Polls `fetch` every `period` and forwards each ride state that differs
/// from the last one seen. Stops on its own once the ride is terminal or the
/// receiver is gone. Fetch errors are logged and retried on the next tick.
pub fn spawn_status_poller<F, Fut>(
    period: Duration,
    mut fetch: F,
    updates: mpsc::Sender<Ride>,
) -> PollerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Ride, AppError>> + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut view = RideView::new();

        loop {
            ticker.tick().await;
            let ride = match fetch().await {
                Ok(ride) => ride,
                Err(err) => {
                    warn!(error = %err, "ride status poll failed");
                    continue;
                }
            };

            let terminal = ride.status.is_terminal();
            if view.apply(ride.clone(), Source::Poll) && updates.send(ride).await.is_err() {
                debug!("status receiver dropped; poller stopping");
                break;
            }
            if terminal {
                break;
            }
        }
    });

    PollerHandle { task }
}
