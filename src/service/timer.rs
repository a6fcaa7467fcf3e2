use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Single pending stop, replaced by every `set`
///
/// The fire instant is kept as an absolute deadline so the remaining time is
/// always `deadline - now`. Each `set` bumps a generation; a firing message
/// carrying an older generation is stale and must be ignored.
#[derive(Default)]
pub struct StopTimer {
    deadline: Option<Instant>,
    stop_at: Option<DateTime<Utc>>,
    task: Option<JoinHandle<()>>,
    generation: u64,
}

impl StopTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a stop after `duration`, cancelling any pending one.
    ///
    /// `fired` receives the generation of this timer when it elapses.
    pub fn set(&mut self, duration: Duration, fired: UnboundedSender<u64>) -> DateTime<Utc> {
        self.cancel_task();
        self.generation += 1;
        let generation = self.generation;

        let now = Instant::now();
        let deadline = now
            .checked_add(duration)
            .unwrap_or_else(|| now + Duration::from_secs(100 * 365 * 24 * 3600));
        let stop_at = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = fired.send(generation);
        }));
        self.deadline = Some(deadline);
        self.stop_at = Some(stop_at);
        stop_at
    }

    /// Cancel the pending stop; returns whether one was pending
    pub fn clear(&mut self) -> bool {
        let pending = self.deadline.is_some();
        self.cancel_task();
        self.generation += 1;
        self.deadline = None;
        self.stop_at = None;
        pending
    }

    /// Accept a firing message; false when it belongs to a replaced timer
    pub fn take_fired(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.deadline.is_none() {
            return false;
        }
        self.task = None;
        self.deadline = None;
        self.stop_at = None;
        true
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn stop_at(&self) -> Option<DateTime<Utc>> {
        self.stop_at
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    fn cancel_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for StopTimer {
    fn drop(&mut self) {
        self.cancel_task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_remaining_is_deadline_minus_now() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timer = StopTimer::new();
        timer.set(Duration::from_secs(300), tx);

        let remaining = timer.remaining().unwrap();
        assert!(Duration::from_secs(300) - remaining < Duration::from_millis(10));

        tokio::time::advance(Duration::from_secs(100)).await;
        let remaining = timer.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(200));
        assert!(remaining > Duration::from_secs(199));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_with_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = StopTimer::new();
        timer.set(Duration::from_secs(5), tx);

        let generation = rx.recv().await.unwrap();
        assert!(timer.take_fired(generation));
        assert!(!timer.is_pending());
        assert_eq!(timer.stop_at(), None);
        assert_eq!(timer.remaining(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacing_cancels_previous() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = StopTimer::new();
        timer.set(Duration::from_secs(5), tx.clone());
        timer.set(Duration::from_secs(60), tx);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
        assert!(timer.is_pending());

        let generation = rx.recv().await.unwrap();
        assert!(timer.take_fired(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_without_firing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = StopTimer::new();
        timer.set(Duration::from_secs(5), tx);

        assert!(timer.clear());
        assert!(!timer.clear());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stale_generation_is_rejected() {
        let mut timer = StopTimer::new();
        assert!(!timer.take_fired(0));
        timer.clear();
        assert!(!timer.take_fired(1));
    }
}
