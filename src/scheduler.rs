use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::registry::ScopeRegistry;

/// Periodic write-back task.
///
/// Coalesces dirty-mapping state into fixed-interval flushes against the
/// persistence backend, independent of request timing, and runs the idle
/// eviction sweep on the same cadence. Mutators never wait on it; a mapping
/// dirtied during a flush is simply written on the next tick.
pub struct WriteScheduler {
    registry: ScopeRegistry,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl WriteScheduler {
    /// Spawns the flush task on the current tokio runtime, ticking at the
    /// registry's configured flush interval.
    pub fn spawn(registry: ScopeRegistry) -> Self {
        let (shutdown, mut signal) = watch::channel(false);
        let task_registry = registry.clone();
        let interval = registry.flush_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        task_registry.flush_dirty();
                        task_registry.evict_idle();
                    }
                    changed = signal.changed() => {
                        if changed.is_err() || *signal.borrow() {
                            break;
                        }
                    }
                }
            }
        });
        Self {
            registry,
            shutdown,
            handle,
        }
    }

    /// Stops the periodic task, then performs one final blocking flush so
    /// shutdown never loses dirty mutations.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
        self.registry.shutdown();
    }
}
