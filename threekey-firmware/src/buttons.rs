//! Interrupt and timer driven button debouncing.
//!
//! A falling edge disables the pin's edge interrupt and arms a one-shot debounce timer. When it
//! fires the pin is sampled once: released means the edge was a short press (or bounce), held
//! means a periodic timer keeps sampling until the button is released (short press) or held past
//! the long press threshold (long press). Either way the edge interrupt is re-enabled, the timer
//! is dropped, and the button waits in the pending state until [InputStateMachine::take_pending_event]
//! collects it.

use core::{
    cell::RefCell,
    sync::atomic::{self, AtomicU32},
};

use embassy_sync::{
    blocking_mutex::{raw::CriticalSectionRawMutex, CriticalSectionMutex},
    signal::Signal,
};
use embassy_time::{Duration, Instant};
use embedded_hal::digital::InputPin;
use threekey_common::{
    color::Color,
    globals::{DEBOUNCE_MS, LONG_PRESS_TICK_MS},
    keycodes::KeyValue,
};

/// Per-key settings supplied by the board at start up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonConfig {
    pub id: u8,
    pub gpio: u8,
    pub value: KeyValue,
    pub color: Color,
    pub enabled: bool,
}

/// A debounced press collected by the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonEvent {
    pub key_id: u8,
    pub is_long_press: bool,
}

/// Falling edge interrupt control for an input pin.
pub trait EdgeInterrupt {
    fn set_edge_interrupt(&mut self, enabled: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerMode {
    OneShot,
    Periodic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerId(pub u32);

/// Hardware alarm facility.
///
/// When a timer started for `key_index` expires the platform calls
/// [InputStateMachine::on_timer] with that index and the id `start` returned. A periodic timer
/// keeps firing for as long as `on_timer` returns `true`. `cancel` must accept ids of timers that
/// have already expired. A callback already queued when its timer is cancelled may still arrive.
pub trait TimerQueue: Sync {
    fn start(&self, key_index: usize, period: Duration, mode: TimerMode) -> Option<TimerId>;
    fn cancel(&self, id: TimerId);
}

/// A running timer. Dropping the handle cancels the timer.
pub struct TimerHandle<'t> {
    timers: &'t dyn TimerQueue,
    id: TimerId,
}
impl Drop for TimerHandle<'_> {
    fn drop(&mut self) {
        self.timers.cancel(self.id);
    }
}
impl<'t> TimerHandle<'t> {
    pub fn start(
        timers: &'t dyn TimerQueue,
        key_index: usize,
        period: Duration,
        mode: TimerMode,
    ) -> Option<Self> {
        let id = timers.start(key_index, period, mode)?;
        Some(Self { timers, id })
    }

    pub fn id(&self) -> TimerId {
        self.id
    }
}

#[derive(Default)]
struct ButtonState<'t> {
    is_debouncing: bool,
    is_pending_handle: bool,
    is_long_press: bool,
    /// Set while a held button is being watched for a long press.
    long_press_start: Option<Instant>,
    timer: Option<TimerHandle<'t>>,
}

struct Buttons<'t, P, const N: usize> {
    configs: [ButtonConfig; N],
    pins: [P; N],
    states: [ButtonState<'t>; N],
}

impl<P: InputPin + EdgeInterrupt, const N: usize> Buttons<'_, P, N> {
    fn index_of_gpio(&self, gpio: u8) -> Option<usize> {
        self.configs.iter().position(|c| c.gpio == gpio)
    }

    fn index_of_key(&self, key_id: u8) -> Option<usize> {
        self.configs.iter().position(|c| c.id == key_id)
    }

    fn is_low(&mut self, idx: usize) -> bool {
        self.pins[idx].is_low().unwrap_or(false)
    }

    /// Finish the debounce/long press cycle for `idx` and publish an event.
    fn settle(&mut self, idx: usize, is_long_press: bool) {
        let state = &mut self.states[idx];
        state.timer = None;
        state.long_press_start = None;
        state.is_debouncing = false;
        state.is_long_press = is_long_press;
        state.is_pending_handle = true;
        self.pins[idx].set_edge_interrupt(true);
    }

    /// Abandon the cycle without an event; used when no timer could be started.
    fn abort(&mut self, idx: usize) {
        let state = &mut self.states[idx];
        state.timer = None;
        state.long_press_start = None;
        state.is_debouncing = false;
        self.pins[idx].set_edge_interrupt(true);
    }
}

pub struct InputStateMachine<'t, P, const N: usize> {
    buttons: CriticalSectionMutex<RefCell<Buttons<'t, P, N>>>,
    timers: &'t dyn TimerQueue,
    long_press_ms: &'t AtomicU32,
    pending: Signal<CriticalSectionRawMutex, ()>,
}

impl<'t, P: InputPin + EdgeInterrupt, const N: usize> InputStateMachine<'t, P, N> {
    pub fn new(
        configs: [ButtonConfig; N],
        pins: [P; N],
        timers: &'t dyn TimerQueue,
        long_press_ms: &'t AtomicU32,
    ) -> Self {
        Self {
            buttons: CriticalSectionMutex::new(RefCell::new(Buttons {
                configs,
                pins,
                states: core::array::from_fn(|_| ButtonState::default()),
            })),
            timers,
            long_press_ms,
            pending: Signal::new(),
        }
    }

    fn with_buttons<R>(&self, f: impl FnOnce(&mut Buttons<'t, P, N>) -> R) -> R {
        self.buttons.lock(|b| f(&mut b.borrow_mut()))
    }

    /// Reset every button to idle and listen for presses on the enabled ones.
    pub fn init(&self) {
        self.with_buttons(|b| {
            for idx in 0..N {
                b.states[idx] = ButtonState::default();
                let enabled = b.configs[idx].enabled;
                b.pins[idx].set_edge_interrupt(enabled);
            }
        });
    }

    /// Falling edge interrupt handler. Unknown pins are ignored.
    pub fn on_edge(&self, gpio: u8) {
        self.with_buttons(|b| {
            let Some(idx) = b.index_of_gpio(gpio) else {
                return;
            };
            let state = &b.states[idx];
            if !b.configs[idx].enabled || state.is_debouncing || state.is_pending_handle {
                return;
            }

            b.pins[idx].set_edge_interrupt(false);
            let timer = TimerHandle::start(
                self.timers,
                idx,
                Duration::from_millis(DEBOUNCE_MS),
                TimerMode::OneShot,
            );
            let state = &mut b.states[idx];
            state.is_debouncing = true;
            state.timer = timer;
            if state.timer.is_none() {
                crate::warn!("button {}: no debounce timer available", idx);
                b.abort(idx);
            }
        });
    }

    /// Timer callback for the button at `key_index`. Returns `true` while a periodic timer should
    /// keep running. Callbacks for any timer other than the one the button currently holds are
    /// ignored.
    pub fn on_timer(&self, key_index: usize, id: TimerId) -> bool {
        let now = Instant::now();
        let threshold =
            Duration::from_millis(self.long_press_ms.load(atomic::Ordering::Relaxed) as u64);
        let published = self.with_buttons(|b| {
            let Some(state) = b.states.get(key_index) else {
                crate::debug!("timer for unknown button {}", key_index);
                return None;
            };
            if !state.is_debouncing || state.timer.as_ref().map(TimerHandle::id) != Some(id) {
                crate::debug!("stale timer {:?} for button {}", id, key_index);
                return None;
            }

            let pressed = b.is_low(key_index);
            let long_press_start = b.states[key_index].long_press_start;
            match long_press_start {
                None if pressed => {
                    let state = &mut b.states[key_index];
                    state.long_press_start = Some(now);
                    state.timer = None;
                    state.timer = TimerHandle::start(
                        self.timers,
                        key_index,
                        Duration::from_millis(LONG_PRESS_TICK_MS),
                        TimerMode::Periodic,
                    );
                    if state.timer.is_none() {
                        crate::warn!("button {}: no long press timer available", key_index);
                        b.settle(key_index, false);
                        return Some(false);
                    }
                    None
                }
                None => {
                    b.settle(key_index, false);
                    Some(false)
                }
                Some(_) if !pressed => {
                    b.settle(key_index, false);
                    Some(false)
                }
                Some(start) if now.saturating_duration_since(start) < threshold => Some(true),
                Some(_) => {
                    b.settle(key_index, true);
                    Some(false)
                }
            }
        });

        match published {
            Some(true) => true,
            Some(false) => {
                self.pending.signal(());
                false
            }
            None => false,
        }
    }

    /// Return the first pending event in key order, resetting that button to idle.
    pub fn take_pending_event(&self) -> Option<ButtonEvent> {
        self.with_buttons(|b| {
            let idx = b.states.iter().position(|s| s.is_pending_handle)?;
            let state = &mut b.states[idx];
            let event = ButtonEvent {
                key_id: b.configs[idx].id,
                is_long_press: state.is_long_press,
            };
            state.is_pending_handle = false;
            state.is_long_press = false;
            state.is_debouncing = false;
            Some(event)
        })
    }

    pub async fn wait_event(&self) -> ButtonEvent {
        loop {
            if let Some(event) = self.take_pending_event() {
                return event;
            }
            self.pending.wait().await;
        }
    }

    pub fn key_count(&self) -> usize {
        N
    }

    pub fn config(&self, key_id: u8) -> Option<ButtonConfig> {
        self.with_buttons(|b| b.index_of_key(key_id).map(|idx| b.configs[idx]))
    }

    pub fn set_key_value(&self, key_id: u8, value: KeyValue) {
        self.with_buttons(|b| {
            if let Some(idx) = b.index_of_key(key_id) {
                b.configs[idx].value = value;
            }
        });
    }

    pub fn set_key_color(&self, key_id: u8, color: Color) {
        self.with_buttons(|b| {
            if let Some(idx) = b.index_of_key(key_id) {
                b.configs[idx].color = color;
            }
        });
    }

    /// Current (undebounced) level of a key.
    pub fn is_pressed(&self, key_id: u8) -> bool {
        self.with_buttons(|b| match b.index_of_key(key_id) {
            Some(idx) => b.configs[idx].enabled && b.is_low(idx),
            None => false,
        })
    }

    /// The key code of the first held button mapped to a key.
    pub fn pressed_key(&self) -> Option<u8> {
        self.with_buttons(|b| {
            (0..N).find_map(|idx| {
                let config = b.configs[idx];
                let code = config.value.key_code()?;
                (config.enabled && b.is_low(idx)).then_some(code)
            })
        })
    }

    /// The modifier flags of all held buttons mapped to modifiers.
    pub fn modifier_flags(&self) -> u8 {
        self.with_buttons(|b| {
            (0..N).fold(0, |flags, idx| {
                let config = b.configs[idx];
                if config.enabled && config.value.modifier_flags() != 0 && b.is_low(idx) {
                    flags | config.value.modifier_flags()
                } else {
                    flags
                }
            })
        })
    }
}

/// The keypad as seen by the key configuration and the features.
pub trait ButtonInput {
    fn take_pending_event(&self) -> Option<ButtonEvent>;
    fn pressed_key(&self) -> Option<u8>;
    fn modifier_flags(&self) -> u8;
    fn is_pressed(&self, key_id: u8) -> bool;
    fn set_key_value(&self, key_id: u8, value: KeyValue);
    fn set_key_color(&self, key_id: u8, color: Color);
}

impl<P: InputPin + EdgeInterrupt, const N: usize> ButtonInput for InputStateMachine<'_, P, N> {
    fn take_pending_event(&self) -> Option<ButtonEvent> {
        InputStateMachine::take_pending_event(self)
    }

    fn pressed_key(&self) -> Option<u8> {
        InputStateMachine::pressed_key(self)
    }

    fn modifier_flags(&self) -> u8 {
        InputStateMachine::modifier_flags(self)
    }

    fn is_pressed(&self, key_id: u8) -> bool {
        InputStateMachine::is_pressed(self, key_id)
    }

    fn set_key_value(&self, key_id: u8, value: KeyValue) {
        InputStateMachine::set_key_value(self, key_id, value)
    }

    fn set_key_color(&self, key_id: u8, color: Color) {
        InputStateMachine::set_key_color(self, key_id, color)
    }
}

#[cfg(test)]
#[path = "buttons_test.rs"]
mod test;
