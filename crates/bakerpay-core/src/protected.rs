// Critical-region abstraction for the execution loop. An OS interrupt
// only sets a flag while the section is active; poll points consult the
// flag between batches. While the section is paused (the confirmation
// wait) the signal preempts the wait immediately.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

const STATE_IDLE: u8 = 0;
const STATE_ACTIVE: u8 = 1;
const STATE_PAUSED: u8 = 2;
const STATE_STOPPED: u8 = 3;

pub struct ProtectedSection {
    state: AtomicU8,
    signaled: AtomicBool,
    notify: Notify,
}

impl Default for ProtectedSection {
    fn default() -> Self {
        ProtectedSection::new()
    }
}

impl ProtectedSection {
    pub fn new() -> ProtectedSection {
        ProtectedSection {
            state: AtomicU8::new(STATE_IDLE),
            signaled: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn start(&self) {
        self.state.store(STATE_ACTIVE, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        self.state.store(STATE_PAUSED, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.state.store(STATE_ACTIVE, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.state.store(STATE_STOPPED, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_ACTIVE
    }

    pub fn signaled(&self) -> bool {
        self.signaled.load(Ordering::SeqCst)
    }

    /// Record an interrupt. The stored permit wakes a paused wait even if
    /// the signal lands just before the wait registers.
    pub fn signal(&self) {
        self.signaled.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Run `fut` with the section paused. Returns `None` when the signal
    /// preempted the future.
    pub async fn interruptible<F>(&self, fut: F) -> Option<F::Output>
    where
        F: std::future::Future,
    {
        self.pause();
        let result = if self.signaled() {
            None
        } else {
            tokio::select! {
                out = fut => Some(out),
                _ = self.notify.notified() => None,
            }
        };
        self.resume();
        result
    }

    /// Install the process signal handler. The handler only flags the
    /// section; termination is deferred to the loop's poll points.
    pub fn install_os_handler(self: &Arc<Self>) {
        let section = Arc::clone(self);
        tokio::spawn(async move {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = match signal(SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(e) => {
                        log::error!("cannot install SIGTERM handler: {}", e);
                        return;
                    }
                };
                let mut sigint = match signal(SignalKind::interrupt()) {
                    Ok(s) => s,
                    Err(e) => {
                        log::error!("cannot install SIGINT handler: {}", e);
                        return;
                    }
                };
                tokio::select! {
                    _ = sigterm.recv() => {},
                    _ = sigint.recv() => {},
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
            log::warn!("interrupt received; finishing the current confirmation before stopping");
            section.signal();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_interruptible_completes_without_signal() {
        let section = ProtectedSection::new();
        section.start();
        let out = section.interruptible(async { 42 }).await;
        assert_eq!(out, Some(42));
        assert!(section.is_active(), "section resumes after the wait");
    }

    #[tokio::test]
    async fn test_signal_before_pause_preempts_immediately() {
        let section = ProtectedSection::new();
        section.start();
        section.signal();
        let out = section
            .interruptible(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                42
            })
            .await;
        assert_eq!(out, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_during_pause_preempts_wait() {
        let section = Arc::new(ProtectedSection::new());
        section.start();
        let waiter = Arc::clone(&section);
        let handle = tokio::spawn(async move {
            waiter
                .interruptible(async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        section.signal();
        let out = handle.await.unwrap();
        assert!(out.is_none());
        assert!(section.signaled());
    }

    #[tokio::test]
    async fn test_flag_is_sticky_between_batches() {
        let section = ProtectedSection::new();
        section.start();
        assert!(!section.signaled());
        section.signal();
        assert!(section.signaled());
        // consuming one wait does not clear the flag
        let _ = section.interruptible(async { 1 }).await;
        assert!(section.signaled());
    }
}
