// 6.5 scheduler.rs: when to wake, and a stop signal that can cut a sleep short.
// next_wake is pure so cadence is testable without sleeping.

use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::ConfigError;
use crate::types::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScheduleMode {
    /// Tick now, then every `interval`.
    Fixed { interval: Duration },
    /// Tick at each hour boundary plus `offset_secs`.
    Aligned { offset_secs: u32 },
}

impl ScheduleMode {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            ScheduleMode::Fixed { interval } if interval.is_zero() => Err(ConfigError::InvalidValue {
                key: "schedule.interval",
                reason: "must be positive".to_string(),
            }),
            ScheduleMode::Aligned { offset_secs } if *offset_secs >= 3600 => {
                Err(ConfigError::InvalidValue {
                    key: "schedule.offset_secs",
                    reason: "must be below 3600".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    pub fn first_wake(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ScheduleMode::Fixed { .. } => now,
            ScheduleMode::Aligned { .. } => next_wake(now, self),
        }
    }
}

// 6.5.1: next wake strictly after `now`.
// aligned: this hour's boundary + offset, or the next hour's if that already passed.
pub fn next_wake(now: DateTime<Utc>, mode: &ScheduleMode) -> DateTime<Utc> {
    match mode {
        ScheduleMode::Fixed { interval } => {
            let step = ChronoDuration::from_std(*interval).unwrap_or(ChronoDuration::hours(1));
            now + step
        }
        ScheduleMode::Aligned { offset_secs } => {
            let hour = ChronoDuration::hours(1);
            let boundary = now.duration_trunc(hour).unwrap_or(now);
            let offset = ChronoDuration::seconds(i64::from(*offset_secs));
            let target = boundary + offset;
            if target > now {
                target
            } else {
                boundary + hour + offset
            }
        }
    }
}

// 6.5.2: cooperative cancellation. stop() wakes any waiter immediately.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let (lock, cvar) = &*self.inner;
        let mut stopped = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *stopped = true;
        cvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Blocks for up to `timeout`. Returns true if stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, cvar) = &*self.inner;
        let mut stopped = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = cvar
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            stopped = guard;
        }
        *stopped
    }

    /// Blocks until the wall clock reaches `at`. Returns true if stopped first.
    pub fn wait_until(&self, at: DateTime<Utc>) -> bool {
        let remaining = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        self.wait_timeout(remaining)
    }
}

/** 6.5.3: drives ticks on a cadence until stopped */
#[derive(Debug, Clone)]
pub struct Scheduler {
    mode: ScheduleMode,
    stop: StopSignal,
}

impl Scheduler {
    pub fn new(mode: ScheduleMode) -> Self {
        Self {
            mode,
            stop: StopSignal::new(),
        }
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn mode(&self) -> ScheduleMode {
        self.mode
    }

    /// Runs on the calling thread. `tick` owns error reporting; nothing it does ends the loop.
    pub fn run<F>(&self, mut tick: F)
    where
        F: FnMut(Timestamp),
    {
        let mut wake = self.mode.first_wake(Utc::now());
        loop {
            debug!(wake = %wake, "scheduler sleeping");
            if self.stop.wait_until(wake) {
                break;
            }
            tick(Timestamp::now());
            wake = next_wake(Utc::now(), &self.mode);
        }
        info!("scheduler stopped");
    }

    pub fn spawn<F>(self, tick: F) -> SchedulerHandle
    where
        F: FnMut(Timestamp) + Send + 'static,
    {
        let stop = self.stop.clone();
        let thread = std::thread::spawn(move || self.run(tick));
        SchedulerHandle { stop, thread }
    }
}

#[derive(Debug)]
pub struct SchedulerHandle {
    stop: StopSignal,
    thread: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn shutdown(self) {
        self.stop.stop();
        self.join();
    }

    pub fn join(self) {
        if self.thread.join().is_err() {
            tracing::error!("scheduler thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn aligned_targets_this_hour_when_not_passed() {
        let mode = ScheduleMode::Aligned { offset_secs: 60 };
        assert_eq!(next_wake(at(10, 0, 30), &mode), at(10, 1, 0));
    }

    #[test]
    fn aligned_rolls_to_next_hour_when_passed() {
        let mode = ScheduleMode::Aligned { offset_secs: 60 };
        assert_eq!(next_wake(at(10, 1, 0), &mode), at(11, 1, 0));
        assert_eq!(next_wake(at(10, 45, 0), &mode), at(11, 1, 0));
    }

    #[test]
    fn aligned_zero_offset_on_boundary() {
        let mode = ScheduleMode::Aligned { offset_secs: 0 };
        assert_eq!(next_wake(at(23, 0, 0), &mode), at(23, 0, 0) + ChronoDuration::hours(1));
    }

    #[test]
    fn fixed_adds_interval() {
        let mode = ScheduleMode::Fixed {
            interval: Duration::from_secs(300),
        };
        assert_eq!(next_wake(at(10, 0, 0), &mode), at(10, 5, 0));
        assert_eq!(mode.first_wake(at(10, 0, 0)), at(10, 0, 0));
    }

    #[test]
    fn invalid_modes_rejected() {
        assert!(ScheduleMode::Fixed { interval: Duration::ZERO }.validate().is_err());
        assert!(ScheduleMode::Aligned { offset_secs: 3600 }.validate().is_err());
        assert!(ScheduleMode::Aligned { offset_secs: 59 }.validate().is_ok());
    }

    #[test]
    fn stop_interrupts_wait() {
        let stop = StopSignal::new();
        let waiter = stop.clone();
        let handle = std::thread::spawn(move || waiter.wait_timeout(Duration::from_secs(30)));
        std::thread::sleep(Duration::from_millis(20));
        stop.stop();
        assert!(handle.join().unwrap());
        assert!(stop.is_stopped());
    }

    #[test]
    fn wait_times_out_without_stop() {
        let stop = StopSignal::new();
        assert!(!stop.wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn spawned_scheduler_ticks_until_shutdown() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let scheduler = Scheduler::new(ScheduleMode::Fixed {
            interval: Duration::from_millis(5),
        });
        let handle = scheduler.spawn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(60));
        handle.shutdown();
        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 1);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }
}
