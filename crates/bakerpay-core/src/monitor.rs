// Cycle monitor: polls the chain head and emits the number of each
// newly completed cycle exactly once, a configurable number of blocks
// past the boundary. Transient RPC errors back off exponentially up to
// 60 s. Cancellation closes the stream after the in-flight poll.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::Notify;

use crate::engines::CollectorEngine;
use crate::MONITOR_BACKOFF_CAP_SECS;

#[derive(Debug, Clone, Copy)]
pub struct CycleMonitorOptions {
    /// Blocks past the cycle boundary to wait before emitting.
    pub notification_delay: i64,
    /// Poll interval in seconds, clamped to [10, 600].
    pub check_frequency_secs: u64,
}

impl Default for CycleMonitorOptions {
    fn default() -> Self {
        CycleMonitorOptions {
            notification_delay: 1,
            check_frequency_secs: 30,
        }
    }
}

struct CancelToken {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    fn cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

pub struct CycleMonitor {
    receiver: mpsc::Receiver<i64>,
    cancel: Arc<CancelToken>,
}

impl CycleMonitor {
    /// Start monitoring in an independent task. The returned monitor owns
    /// the event stream; the task ends when cancelled or when the monitor
    /// is dropped.
    pub fn spawn(collector: Arc<dyn CollectorEngine>, options: CycleMonitorOptions) -> CycleMonitor {
        let interval = options.check_frequency_secs.clamp(10, 600);
        let cancel = Arc::new(CancelToken {
            flag: AtomicBool::new(false),
            notify: Notify::new(),
        });
        let (sender, receiver) = mpsc::channel(1);
        let token = Arc::clone(&cancel);

        tokio::spawn(async move {
            let mut last_notified: Option<i64> = None;
            let mut backoff = interval;
            loop {
                if token.cancelled() {
                    break;
                }
                match collector.get_head().await {
                    Ok(head) => {
                        backoff = interval;
                        let completed = head.cycle - 1;
                        let past_delay = head.cycle_position >= options.notification_delay;
                        if past_delay && last_notified.map_or(true, |n| n < completed) {
                            log::info!("cycle {} completed", completed);
                            if sender.send(completed).await.is_err() {
                                break; // consumer gone
                            }
                            last_notified = Some(completed);
                        }
                    }
                    Err(err) => {
                        log::warn!("failed to poll chain head - {}, retrying...", err);
                        backoff = (backoff * 2).min(MONITOR_BACKOFF_CAP_SECS);
                    }
                }
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(backoff)) => {},
                    _ = token.notify.notified() => break,
                }
            }
            log::debug!("cycle monitor stopped");
        });

        CycleMonitor { receiver, cancel }
    }

    /// Next completed-cycle event; `None` once the monitor is cancelled.
    pub async fn next_completed_cycle(&mut self) -> Option<i64> {
        self.receiver.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Detached cancel handle for signal handlers.
    pub fn cancel_handle(&self) -> impl Fn() + Send + 'static {
        let token = Arc::clone(&self.cancel);
        move || token.cancel()
    }
}
