extern crate std;

use embassy_time::Duration;
use std::sync::Mutex;
use std::vec::Vec;

use crate::buttons::{TimerId, TimerMode, TimerQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveTimer {
    pub id: TimerId,
    pub key_index: usize,
    pub period: Duration,
    pub mode: TimerMode,
}

#[derive(Default)]
struct TimersInner {
    next_id: u32,
    live: Vec<LiveTimer>,
    started: usize,
}

/// Records the timers the state machine asks for. Tests fire them by hand.
#[derive(Default)]
pub struct TestTimers {
    inner: Mutex<TimersInner>,
    /// Refuse to start timers when set.
    pub exhausted: core::sync::atomic::AtomicBool,
}
impl TestTimers {
    fn lock(&self) -> std::sync::MutexGuard<'_, TimersInner> {
        self.inner.lock().unwrap()
    }

    pub fn live(&self) -> Vec<LiveTimer> {
        self.lock().live.clone()
    }

    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    pub fn started_count(&self) -> usize {
        self.lock().started
    }

    pub fn live_for(&self, key_index: usize) -> Option<LiveTimer> {
        self.lock()
            .live
            .iter()
            .find(|t| t.key_index == key_index)
            .copied()
    }

    /// Forget a timer the way the hardware does once a one-shot has fired or a periodic
    /// callback declined to continue.
    pub fn retire(&self, id: TimerId) {
        self.lock().live.retain(|t| t.id != id);
    }
}
impl TimerQueue for TestTimers {
    fn start(&self, key_index: usize, period: Duration, mode: TimerMode) -> Option<TimerId> {
        if self.exhausted.load(core::sync::atomic::Ordering::Relaxed) {
            return None;
        }
        let mut inner = self.lock();
        inner.next_id += 1;
        inner.started += 1;
        let id = TimerId(inner.next_id);
        inner.live.push(LiveTimer {
            id,
            key_index,
            period,
            mode,
        });
        Some(id)
    }

    fn cancel(&self, id: TimerId) {
        self.retire(id);
    }
}
