use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

use crate::Result;

/// Tick period for a target frame rate, truncated to whole milliseconds
/// (30 fps gives 33 ms). Never shorter than 1 ms.
pub fn frame_interval(fps: u32) -> Duration {
    Duration::from_millis(u64::from((1000 / fps.max(1)).max(1)))
}

/// Periodic render timer running on its own thread.
///
/// Ticks are best-effort: a slow tick delays the next one and missed ticks
/// are not made up.
pub struct RenderScheduler {
    interval: Duration,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    ticks: Arc<AtomicU64>,
}

impl RenderScheduler {
    pub fn start<F>(interval: Duration, mut tick: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = ticks.clone();

        let handle = thread::Builder::new()
            .name("render-scheduler".to_string())
            .spawn(move || {
                tracing::debug!(?interval, "render scheduler started");
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            tick();
                            counter.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::debug!("render scheduler stopped");
            })?;

        Ok(Self {
            interval,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            ticks,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Cancels future ticks and waits for an in-flight tick to finish.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.try_send(());
        }
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            // Called from inside a tick; the loop exits once it returns.
            return;
        }
        if handle.join().is_err() {
            tracing::error!("render scheduler thread panicked");
        }
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for RenderScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderScheduler")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .field("ticks", &self.tick_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::AtomicBool,
        time::Instant,
    };

    #[test]
    fn interval_truncates_to_whole_milliseconds() {
        assert_eq!(frame_interval(30), Duration::from_millis(33));
        assert_eq!(frame_interval(60), Duration::from_millis(16));
        assert_eq!(frame_interval(1), Duration::from_millis(1000));
        assert_eq!(frame_interval(0), Duration::from_millis(1000));
        assert_eq!(frame_interval(1000), Duration::from_millis(1));
        assert_eq!(frame_interval(5000), Duration::from_millis(1));
    }

    #[test]
    fn ticks_until_stopped() {
        let ticks = Arc::new(AtomicU64::new(0));
        let seen = ticks.clone();
        let mut scheduler = RenderScheduler::start(Duration::from_millis(2), move || {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while ticks.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        scheduler.stop();
        let after_stop = ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));

        assert!(after_stop >= 3);
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
        assert_eq!(scheduler.tick_count(), after_stop);
        assert!(!scheduler.is_running());
    }

    #[test]
    fn stop_waits_for_in_flight_tick() {
        let entered = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let (entered_tick, finished_tick) = (entered.clone(), finished.clone());
        let mut scheduler = RenderScheduler::start(Duration::from_millis(1), move || {
            entered_tick.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            finished_tick.store(true, Ordering::SeqCst);
        })
        .unwrap();

        while !entered.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
        scheduler.stop();

        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn stop_is_idempotent() {
        let mut scheduler = RenderScheduler::start(Duration::from_millis(5), || {}).unwrap();
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());
    }
}
