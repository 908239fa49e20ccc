//! # Polling Scheduler
//!
//! Re-runs the dashboard pipeline once per interval while auto refresh is
//! on, and exposes a countdown until the next poll.
//!
//! The countdown restarts at the full interval as soon as a poll completes,
//! whether the poll got live or synthetic data. Turning auto refresh off
//! stops polling and clears the countdown; turning it back on polls
//! immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

/// Something the scheduler polls.
#[async_trait]
pub trait PollTarget: Send + Sync {
    async fn poll(&self);
}

/// Time left until the next poll.
#[derive(Clone, Debug)]
pub struct Countdown {
    interval: Duration,
    deadline: Arc<Mutex<Option<Instant>>>,
}

impl Countdown {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: Arc::new(Mutex::new(None)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start a full interval from now and return its deadline.
    pub fn restart(&self) -> Instant {
        let deadline = Instant::now() + self.interval;
        *self.deadline.lock() = Some(deadline);
        deadline
    }

    pub fn stop(&self) {
        *self.deadline.lock() = None;
    }

    /// `None` while polling is paused.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .lock()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Whole seconds left, rounded up.
    pub fn seconds_remaining(&self) -> Option<u64> {
        self.remaining()
            .map(|left| left.as_secs() + u64::from(left.subsec_nanos() > 0))
    }
}

/// Interval-driven poller.
#[derive(Debug)]
pub struct PollingScheduler {
    interval: Duration,
    auto_refresh: watch::Receiver<bool>,
    countdown: Countdown,
    polls: watch::Sender<u64>,
}

impl PollingScheduler {
    pub fn new(interval: Duration, auto_refresh: watch::Receiver<bool>) -> Self {
        let (polls, _) = watch::channel(0);
        Self {
            interval,
            auto_refresh,
            countdown: Countdown::new(interval),
            polls,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Shared countdown handle.
    pub fn countdown(&self) -> Countdown {
        self.countdown.clone()
    }

    /// Receiver of the number of completed polls.
    pub fn subscribe_polls(&self) -> watch::Receiver<u64> {
        self.polls.subscribe()
    }

    /// Poll `target` until `shutdown` turns true or its sender goes away.
    pub async fn run<T>(self, target: Arc<T>, mut shutdown: watch::Receiver<bool>)
    where
        T: PollTarget + ?Sized,
    {
        let mut auto_refresh = self.auto_refresh.clone();
        let mut completed = 0u64;
        info!(interval_secs = self.interval.as_secs(), "Polling scheduler started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            if !*auto_refresh.borrow_and_update() {
                self.countdown.stop();
                debug!("Auto refresh off, waiting");
                tokio::select! {
                    changed = auto_refresh.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            }

            target.poll().await;
            let deadline = self.countdown.restart();
            completed += 1;
            self.polls.send_replace(completed);
            debug!(completed, "Poll completed");

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                changed = auto_refresh.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.countdown.stop();
        info!(polls = completed, "Polling scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTarget {
        polls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl PollTarget for CountingTarget {
        async fn poll(&self) {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.polls.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn advance(duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_once_per_interval() {
        let (_auto_tx, auto_rx) = watch::channel(true);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = PollingScheduler::new(Duration::from_secs(12), auto_rx);
        let countdown = scheduler.countdown();
        let target = Arc::new(CountingTarget::default());

        let handle = tokio::spawn(scheduler.run(target.clone(), shutdown_rx));

        advance(Duration::from_millis(1)).await;
        assert_eq!(target.polls.load(Ordering::SeqCst), 1);
        assert_eq!(countdown.seconds_remaining(), Some(12));

        advance(Duration::from_secs(6)).await;
        assert_eq!(countdown.seconds_remaining(), Some(6));

        advance(Duration::from_secs(6)).await;
        assert_eq!(target.polls.load(Ordering::SeqCst), 2);
        assert_eq!(countdown.seconds_remaining(), Some(12));

        advance(Duration::from_secs(12)).await;
        assert_eq!(target.polls.load(Ordering::SeqCst), 3);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(countdown.remaining(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_polling_while_auto_refresh_off() {
        let (auto_tx, auto_rx) = watch::channel(false);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = PollingScheduler::new(Duration::from_secs(12), auto_rx);
        let countdown = scheduler.countdown();
        let target = Arc::new(CountingTarget::default());

        let handle = tokio::spawn(scheduler.run(target.clone(), shutdown_rx));

        advance(Duration::from_secs(60)).await;
        assert_eq!(target.polls.load(Ordering::SeqCst), 0);
        assert_eq!(countdown.seconds_remaining(), None);

        auto_tx.send(true).unwrap();
        advance(Duration::from_millis(1)).await;
        assert_eq!(target.polls.load(Ordering::SeqCst), 1);

        auto_tx.send(false).unwrap();
        advance(Duration::from_secs(60)).await;
        assert_eq!(target.polls.load(Ordering::SeqCst), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_restarts_after_slow_poll() {
        let (_auto_tx, auto_rx) = watch::channel(true);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = PollingScheduler::new(Duration::from_secs(12), auto_rx);
        let countdown = scheduler.countdown();
        let mut polls = scheduler.subscribe_polls();
        let target = Arc::new(CountingTarget {
            delay: Duration::from_secs(3),
            ..Default::default()
        });

        let handle = tokio::spawn(scheduler.run(target, shutdown_rx));

        polls.changed().await.unwrap();
        assert_eq!(*polls.borrow(), 1);
        assert_eq!(countdown.seconds_remaining(), Some(12));

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn test_countdown_idle_by_default() {
        let countdown = Countdown::new(Duration::from_secs(12));
        assert_eq!(countdown.remaining(), None);
        assert_eq!(countdown.interval(), Duration::from_secs(12));
    }
}
