//! # Interval Timer
//!
//! A single recurring task that can be armed and disarmed any number of times.
//! Arming an armed timer and disarming an inert one are both no-ops, so there
//! is never more than one tick loop per timer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// The work performed on every tick.
pub type TickFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Produces one [`TickFuture`] per tick.
pub type TickFn = Arc<dyn Fn() -> TickFuture + Send + Sync>;

struct Running {
    token: CancellationToken,
    _handle: JoinHandle<()>,
}

pub struct IntervalTimer {
    period: Duration,
    running: Option<Running>,
}

impl IntervalTimer {
    pub fn new(period: Duration) -> Self {
        Self { period, running: None }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_armed(&self) -> bool {
        self.running.is_some()
    }

    /// Starts the tick loop. The first tick fires one period from now.
    ///
    /// Returns `false` without doing anything if the timer is already armed.
    pub fn arm(&mut self, tick: TickFn) -> bool {
        if self.running.is_some() {
            return false;
        }
        let token = CancellationToken::new();
        let handle = tokio::spawn(tick_loop(self.period, token.clone(), tick));
        self.running = Some(Running { token, _handle: handle });
        true
    }

    /// Stops the tick loop. A tick already running may finish, but no new one
    /// starts after this returns.
    ///
    /// Returns `false` if the timer was not armed.
    pub fn disarm(&mut self) -> bool {
        match self.running.take() {
            Some(running) => {
                running.token.cancel();
                true
            }
            None => false,
        }
    }
}

impl Drop for IntervalTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}

async fn tick_loop(period: Duration, token: CancellationToken, tick: TickFn) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if token.is_cancelled() {
            break;
        }
        tracing::trace!("interval tick");
        tick().await;
    }
    tracing::trace!("interval loop exited");
}
