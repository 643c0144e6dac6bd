use std::time::Duration;
use tokio::sync::Mutex;

use super::interval_timer::{IntervalTimer, TickFn};

/// # Polling Session
///
/// The shared on/off state of a polling channel. It is owned by the channel,
/// not by any connection, so a stop from one client ends the stream for all
/// of them. Every transition goes through one async mutex.
pub struct PollingSession {
    timer: Mutex<IntervalTimer>,
    tick: TickFn,
}

impl PollingSession {
    /// Creates an inert session that runs `tick` every `period` once armed.
    pub fn new(period: Duration, tick: TickFn) -> Self {
        Self {
            timer: Mutex::new(IntervalTimer::new(period)),
            tick,
        }
    }

    /// Arms the timer unless it is already running. Returns whether this call
    /// armed it.
    pub async fn arm(&self) -> bool {
        let mut timer = self.timer.lock().await;
        let armed = timer.arm(self.tick.clone());
        if armed {
            tracing::info!(period_ms = timer.period().as_millis() as u64, "polling armed");
        }
        armed
    }

    /// Disarms the timer. Returns whether it was running.
    pub async fn disarm(&self) -> bool {
        let disarmed = self.timer.lock().await.disarm();
        if disarmed {
            tracing::info!("polling disarmed");
        }
        disarmed
    }

    pub async fn is_active(&self) -> bool {
        self.timer.lock().await.is_armed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::interval_timer::TickFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_session_lifecycle() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let session = PollingSession::new(
            Duration::from_millis(500),
            Arc::new(move || -> TickFuture {
                let c = c.clone();
                Box::pin(async move {
                    c.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );

        assert!(!session.is_active().await);
        assert!(session.arm().await);
        assert!(!session.arm().await);
        assert!(session.is_active().await);

        tokio::time::sleep(Duration::from_millis(1001)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        assert!(session.disarm().await);
        assert!(!session.disarm().await);
        assert!(!session.is_active().await);

        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
