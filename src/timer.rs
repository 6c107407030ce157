use crate::platform::{TimerHandle, TimerScheduler};
use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use log::warn;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

type FireCallback = Arc<dyn Fn(TimerHandle) + Send + Sync>;

/// One-shot timers backed by a sleeping thread each.
///
/// Each armed timer waits on a channel with a timeout. Cancelling drops the
/// sender, which wakes the thread without firing.
pub struct ThreadTimer {
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, Sender<()>>>>,
    on_fire: FireCallback,
}

impl ThreadTimer {
    pub fn new<F>(on_fire: F) -> Self
    where
        F: Fn(TimerHandle) + Send + Sync + 'static,
    {
        ThreadTimer {
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            on_fire: Arc::new(on_fire),
        }
    }

    /// Timers armed and not yet fired or cancelled
    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl TimerScheduler for ThreadTimer {
    fn arm(&self, after: Duration) -> Option<TimerHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = TimerHandle(id);
        let (cancel_tx, cancel_rx) = bounded::<()>(1);

        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id, cancel_tx);
        }

        let pending = Arc::clone(&self.pending);
        let on_fire = Arc::clone(&self.on_fire);
        let spawned = thread::Builder::new()
            .name(format!("keepalive-timer-{}", id))
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(after) {
                    // Still registered means nobody cancelled in the meantime
                    let armed = pending
                        .lock()
                        .map(|mut p| p.remove(&id).is_some())
                        .unwrap_or(false);
                    if armed {
                        on_fire(handle);
                    }
                }
            });

        match spawned {
            Ok(_) => Some(handle),
            Err(e) => {
                warn!("failed to spawn timer thread for {:?}: {}", handle, e);
                if let Ok(mut pending) = self.pending.lock() {
                    pending.remove(&id);
                }
                None
            }
        }
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&handle.0);
        }
    }
}
