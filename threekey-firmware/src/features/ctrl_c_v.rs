use threekey_common::{
    color::Color,
    keycodes::{key, modifier, KeyValue},
};

use super::{Feature, KeyLeds, KeyReporter, LedsMode, LogLine};
use crate::{buttons::ButtonInput, keys_config::KeysConfigStore};

const KEYS: [(u8, KeyValue, Color); 3] = [
    (0, KeyValue::Key(key::V), Color::Red),
    (1, KeyValue::Key(key::C), Color::Green),
    (2, KeyValue::Modifier(modifier::LEFT_GUI), Color::Blue),
];

/// Copy and paste keys: V, C and a held modifier.
pub struct CtrlCV<'a> {
    keys: &'a KeysConfigStore<'a>,
    leds: &'a dyn KeyLeds,
    reporter: &'a dyn KeyReporter,
    has_keyboard_key: bool,
}

impl<'a> CtrlCV<'a> {
    pub fn new(
        keys: &'a KeysConfigStore<'a>,
        leds: &'a dyn KeyLeds,
        reporter: &'a dyn KeyReporter,
    ) -> Self {
        Self {
            keys,
            leds,
            reporter,
            has_keyboard_key: false,
        }
    }

    fn send_keys(&mut self, key: Option<u8>, modifiers: u8) {
        if !self.reporter.is_ready() {
            return;
        }

        match key {
            Some(key) => {
                self.reporter
                    .keyboard_report(modifiers, [key, 0, 0, 0, 0, 0]);
                self.has_keyboard_key = true;
            }
            None => {
                if self.has_keyboard_key {
                    self.reporter.keyboard_report(0, [0; 6]);
                }
                self.has_keyboard_key = false;
            }
        }
    }
}

impl Feature for CtrlCV<'_> {
    fn init(&mut self) {
        for (key_id, value, color) in KEYS {
            if let Err(err) = self.keys.set_key_value(key_id, value) {
                crate::warn!("ctrl_c_v: key {} value {:?}", key_id, err);
            }
            if let Err(err) = self.keys.set_key_color(key_id, color) {
                crate::warn!("ctrl_c_v: key {} color {:?}", key_id, err);
            }
        }
        self.leds.set_mode(LedsMode::WhenButtonPressed);
    }

    fn deinit(&mut self) {
        self.send_keys(None, 0);
    }

    fn factory_init(&mut self) {}

    fn handle(&mut self, input: &dyn ButtonInput) {
        // levels drive the reports; drain events so the buttons return to idle
        while input.take_pending_event().is_some() {}

        self.send_keys(input.pressed_key(), input.modifier_flags());
    }

    fn log(&self, _log_id: u32) -> LogLine {
        LogLine::new()
    }
}
