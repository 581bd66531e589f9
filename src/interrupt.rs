use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use log::{debug, info};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::line::EdgeTrigger;

#[derive(Debug, Clone, Serialize)]
pub struct EdgeNotification {
    pub line: u32,
    pub trigger: EdgeTrigger,
    pub timestamp_ms: u64,
}

// The debounce gate is global across all lines, not per line: concurrent
// edges on different lines share one clock.
#[derive(Debug)]
pub struct EdgeNotifier {
    event_tx: broadcast::Sender<EdgeNotification>,
    epoch: Instant,
    debounce_window_ms: u64,
    last_event_ms: AtomicU64,
}

impl EdgeNotifier {
    pub fn new(debounce_window_ms: u64, broadcast_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(broadcast_capacity);

        Self {
            event_tx,
            epoch: Instant::now(),
            debounce_window_ms,
            last_event_ms: AtomicU64::new(0),
        }
    }

    fn millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    // Runs in the edge-notification context: one atomic gate and a lock-free
    // send, nothing that can suspend.
    pub fn dispatch(&self, line: u32, trigger: EdgeTrigger) {
        let now = self.millis();
        let last = self.last_event_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) < self.debounce_window_ms {
            debug!("Ignored edge on line {line}");
            return;
        }
        self.last_event_ms.store(now, Ordering::Relaxed);

        info!("Edge on line {line} was triggered");
        let _ = self.event_tx.send(EdgeNotification {
            line,
            trigger,
            timestamp_ms: now,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EdgeNotification> {
        self.event_tx.subscribe()
    }
}

pub type EdgeSink = Arc<EdgeNotifier>;
