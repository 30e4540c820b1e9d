//! Cancellable periodic tasks
//!
//! Each cycle runs on its own tokio task driven by an interval. Cancelling the
//! scheduler stops every cycle at once: a tick that is mid-flight is dropped
//! rather than allowed to finish.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct Scheduler {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Run `tick` every `period`, first run one period from now.
    ///
    /// Ticks of one cycle never overlap; if a tick overruns its period the
    /// next one is delayed rather than bunched up.
    pub fn spawn_periodic<F, Fut>(&mut self, name: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.child_token();
        let handle = tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(cycle = name, ?period, "cycle started");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = timer.tick() => {
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tick() => {}
                        }
                    }
                }
            }

            debug!(cycle = name, "cycle stopped");
        });
        self.tasks.push(handle);
    }

    pub fn cancel(&mut self) {
        self.shutdown.cancel();
        self.tasks.clear();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
