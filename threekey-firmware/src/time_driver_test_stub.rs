extern crate std;

use core::{cell::Cell, task::Waker};
use embassy_time_driver::Driver;
use std::time::SystemTime;

struct TestTimeDriver;

impl Driver for TestTimeDriver {
    fn now(&self) -> u64 {
        NOW.with(|now| match now.get() {
            0 => SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_micros() as u64)
                .unwrap_or(1),
            t => t,
        })
    }

    fn schedule_wake(&self, at: u64, waker: &Waker) {
        // jump straight to the alarm so timers complete without real sleeping
        NOW.with(|now| {
            if now.get() != 0 && at > now.get() {
                now.set(at);
            }
        });

        waker.wake_by_ref();
    }
}

std::thread_local! {
    static NOW: Cell<u64> = const { Cell::new(0) };
}

embassy_time_driver::time_driver_impl!(static TIME_DRIVER: TestTimeDriver = TestTimeDriver);

/// Pin the clock for the current thread, in microseconds. `0` reverts to the system clock.
pub fn set_time(t: u64) {
    NOW.with(|now| now.set(t));
}

pub fn set_time_ms(ms: u64) {
    set_time(ms * 1000);
}

pub fn advance_ms(ms: u64) {
    NOW.with(|now| now.set(now.get() + ms * 1000));
}
