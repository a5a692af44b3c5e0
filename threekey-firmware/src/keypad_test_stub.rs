extern crate std;

use core::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::vec::Vec;

use threekey_common::{color::Color, datetime::DateTime, keycodes::KeyValue};

use crate::{
    buttons::{ButtonEvent, ButtonInput},
    features::{Calendar, KeyLeds, KeyReporter, LedsMode},
};

/// Scripted keypad: tests queue events and set levels directly.
#[derive(Default)]
pub struct FakeInput {
    pub events: RefCell<VecDeque<ButtonEvent>>,
    pub pressed_key: Cell<Option<u8>>,
    pub modifier_flags: Cell<u8>,
    pub values: RefCell<Vec<(u8, KeyValue)>>,
    pub colors: RefCell<Vec<(u8, Color)>>,
}
impl FakeInput {
    pub fn push(&self, key_id: u8, is_long_press: bool) {
        self.events.borrow_mut().push_back(ButtonEvent {
            key_id,
            is_long_press,
        });
    }

    pub fn value_of(&self, key_id: u8) -> Option<KeyValue> {
        self.values
            .borrow()
            .iter()
            .rev()
            .find(|(id, _)| *id == key_id)
            .map(|(_, v)| *v)
    }
}
impl ButtonInput for FakeInput {
    fn take_pending_event(&self) -> Option<ButtonEvent> {
        self.events.borrow_mut().pop_front()
    }

    fn pressed_key(&self) -> Option<u8> {
        self.pressed_key.get()
    }

    fn modifier_flags(&self) -> u8 {
        self.modifier_flags.get()
    }

    fn is_pressed(&self, _key_id: u8) -> bool {
        false
    }

    fn set_key_value(&self, key_id: u8, value: KeyValue) {
        self.values.borrow_mut().push((key_id, value));
    }

    fn set_key_color(&self, key_id: u8, color: Color) {
        self.colors.borrow_mut().push((key_id, color));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedAction {
    Mode(LedsMode),
    Enable(u8, Color),
    Disable(u8),
    Blink(u8, u32, u32, Color),
}

#[derive(Default)]
pub struct RecordingLeds {
    pub actions: RefCell<Vec<LedAction>>,
}
impl RecordingLeds {
    pub fn take(&self) -> Vec<LedAction> {
        self.actions.take()
    }
}
impl KeyLeds for RecordingLeds {
    fn set_mode(&self, mode: LedsMode) {
        self.actions.borrow_mut().push(LedAction::Mode(mode));
    }

    fn enable(&self, key_id: u8, color: Color) {
        self.actions
            .borrow_mut()
            .push(LedAction::Enable(key_id, color));
    }

    fn disable(&self, key_id: u8) {
        self.actions.borrow_mut().push(LedAction::Disable(key_id));
    }

    fn blink(&self, key_id: u8, period_ms: u32, count: u32, color: Color) {
        self.actions
            .borrow_mut()
            .push(LedAction::Blink(key_id, period_ms, count, color));
    }
}

pub struct RecordingReporter {
    pub ready: Cell<bool>,
    pub reports: RefCell<Vec<(u8, [u8; 6])>>,
}
impl Default for RecordingReporter {
    fn default() -> Self {
        Self {
            ready: Cell::new(true),
            reports: RefCell::default(),
        }
    }
}
impl KeyReporter for RecordingReporter {
    fn is_ready(&self) -> bool {
        self.ready.get()
    }

    fn keyboard_report(&self, modifier: u8, keycodes: [u8; 6]) {
        self.reports.borrow_mut().push((modifier, keycodes));
    }
}

#[derive(Default)]
pub struct FixedCalendar(pub Cell<DateTime>);
impl FixedCalendar {
    pub fn at(year: u16, month: u8, day: u8, hour: u8) -> Self {
        Self(Cell::new(DateTime {
            year,
            month,
            day,
            hour,
            minute: 0,
            second: 0,
        }))
    }
}
impl Calendar for FixedCalendar {
    fn now(&self) -> DateTime {
        self.0.get()
    }
}
