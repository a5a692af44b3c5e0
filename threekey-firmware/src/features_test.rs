use core::{cell::Cell, sync::atomic::AtomicU32};

use threekey_common::keycodes::{key, modifier, KeyValue};

use super::*;

use crate::blob_storage::test::{TestFlash, TestStorage};
use crate::buttons::ButtonConfig;
use crate::flash_test_stub::Action;
use crate::keypad_test_stub::{
    FakeInput, FixedCalendar, LedAction, RecordingLeds, RecordingReporter,
};
use crate::keys_config::KeysConfigStore;

fn board() -> [ButtonConfig; 3] {
    [0, 1, 2].map(|id| ButtonConfig {
        id,
        gpio: id,
        value: KeyValue::NONE,
        color: Color::White,
        enabled: true,
    })
}

macro_rules! setup {
    ($stub:ident, $storage:ident, $handler:ident, $input:ident, $leds:ident, $reporter:ident $b:block) => {{
        let $storage = TestStorage::new(&mut $stub).unwrap();
        let $input = FakeInput::default();
        let long_press_ms = AtomicU32::new(0);
        let keys = KeysConfigStore::load(&$storage, &$input, &long_press_ms, &board());
        let $leds = RecordingLeds::default();
        let $reporter = RecordingReporter::default();
        let calendar = FixedCalendar::at(2025, 1, 6, 8);
        let mut $handler = FeaturesHandler::new(
            &$storage,
            CtrlCV::new(&keys, &$leds, &$reporter),
            TimeTracker::new(&$storage, &keys, &$leds, &calendar),
        );
        $handler.init();
        $b
    }};
}

#[test]
fn factory_init_selects_ctrl_c_v() {
    let mut stub = TestFlash::default();
    setup!(stub, storage, handler, input, leds, _reporter {
        assert_eq!(handler.current_feature(), FeatureType::CtrlCV);
        assert_eq!(handler.current_feature_name(), "ctrl_c_v");

        assert_eq!(input.value_of(0), Some(KeyValue::Key(key::V)));
        assert_eq!(input.value_of(1), Some(KeyValue::Key(key::C)));
        assert_eq!(input.value_of(2), Some(KeyValue::Modifier(modifier::LEFT_GUI)));
        assert_eq!(input.colors.borrow().last(), Some(&(2, Color::Blue)));
        assert_eq!(
            leds.take().last(),
            Some(&LedAction::Mode(LedsMode::WhenButtonPressed))
        );

        let storage: &dyn BlobStorage = &storage;
        let config = storage
            .get::<FeaturesHandlerConfig>(BlobType::FeaturesHandlerConfig)
            .unwrap();
        assert_eq!(
            config,
            FeaturesHandlerConfig {
                magic: BLOB_MAGIC,
                current_feature: FeatureType::CtrlCV,
                is_feature_set: true,
            }
        );
        // the time tracker wrote its factory record too
        let tt = storage
            .get::<time_tracker::TimeTrackerData>(BlobType::TimeTrackerData)
            .unwrap();
        assert_eq!(tt.magic, BLOB_MAGIC);
    });
}

#[test]
fn active_feature_survives_reboot() {
    let mut stub = TestFlash::default();
    setup!(stub, _storage, handler, _input, leds, _reporter {
        leds.take();
        handler.switch_to_feature(FeatureType::TimeTracker);
        assert_eq!(handler.current_feature(), FeatureType::TimeTracker);
        assert_eq!(
            leds.take().last(),
            Some(&LedAction::Mode(LedsMode::HandledByFeature))
        );
    });

    setup!(stub, _storage, handler, _input, leds, _reporter {
        assert_eq!(handler.current_feature(), FeatureType::TimeTracker);
        assert_eq!(
            leds.take().last(),
            Some(&LedAction::Mode(LedsMode::HandledByFeature))
        );
    });
}

#[test]
fn unchanged_reboot_does_not_touch_flash() {
    let erases = Cell::new(0);
    let observer = |a: Action, _buf: &mut [u8]| {
        if let Action::Erase(..) = a {
            erases.set(erases.get() + 1);
        }
        Ok(())
    };
    let mut stub = TestFlash::default();
    setup!(stub, _storage, _handler, _input, _leds, _reporter {});

    stub.observer = Some(&observer);
    setup!(stub, _storage, handler, input, _leds, _reporter {
        assert_eq!(handler.current_feature(), FeatureType::CtrlCV);
        assert_eq!(input.value_of(1), Some(KeyValue::Key(key::C)));
    });
    assert_eq!(erases.get(), 0);
}

#[test]
fn switching_deinits_old_feature() {
    let mut stub = TestFlash::default();
    setup!(stub, _storage, handler, _input, leds, _reporter {
        handler.switch_to_feature(FeatureType::TimeTracker);
        leds.take();

        handler.switch_to_feature(FeatureType::CtrlCV);
        let actions = leds.take();
        assert_eq!(actions[0], LedAction::Mode(LedsMode::WhenButtonPressed));
        assert_eq!(actions.last(), Some(&LedAction::Mode(LedsMode::WhenButtonPressed)));
    });
}

#[test]
fn unknown_feature_id_is_ignored() {
    let mut stub = TestFlash::default();
    setup!(stub, _storage, handler, _input, _leds, _reporter {
        assert!(!handler.switch_to_feature_id(9));
        assert_eq!(handler.current_feature(), FeatureType::CtrlCV);

        assert!(handler.switch_to_feature_id(FeatureType::TimeTracker as u8));
        assert_eq!(handler.current_feature(), FeatureType::TimeTracker);
    });
}

#[test]
fn no_feature_ignores_input() {
    let mut stub = TestFlash::default();
    setup!(stub, _storage, handler, input, _leds, reporter {
        handler.switch_to_feature(FeatureType::None);
        assert_eq!(handler.current_feature(), FeatureType::None);
        assert_eq!(handler.current_feature_name(), "none");

        input.push(0, false);
        input.pressed_key.set(Some(key::V));
        handler.handle(&input);
        handler.on_tick();
        assert_eq!(input.events.borrow().len(), 1);
        assert!(reporter.reports.borrow().is_empty());
    });
}

#[test]
fn ctrl_c_v_reports_keys() {
    let mut stub = TestFlash::default();
    setup!(stub, _storage, handler, input, _leds, reporter {
        input.push(1, false);
        input.pressed_key.set(Some(key::C));
        input.modifier_flags.set(modifier::LEFT_GUI);
        handler.handle(&input);
        assert!(input.events.borrow().is_empty());

        input.pressed_key.set(None);
        input.modifier_flags.set(0);
        handler.handle(&input);
        handler.handle(&input);

        reporter.ready.set(false);
        input.pressed_key.set(Some(key::V));
        handler.handle(&input);

        assert_eq!(
            *reporter.reports.borrow(),
            [
                (modifier::LEFT_GUI, [key::C, 0, 0, 0, 0, 0]),
                (0, [0; 6]),
            ]
        );
    });
}

#[test]
fn time_tracker_runs_through_handler() {
    let mut stub = TestFlash::default();
    setup!(stub, _storage, handler, input, _leds, _reporter {
        handler.switch_to_feature(FeatureType::TimeTracker);
        input.push(0, false);
        handler.handle(&input);
        for _ in 0..8 {
            handler.on_tick();
        }

        assert_eq!(handler.time_tracker().entry(0).unwrap().work_us, 2_000_000);
        assert_eq!(
            handler.feature_log(FeatureType::TimeTracker, 0).as_str(),
            "2025-01-06 08:00:00 Work: 0h 0min 2s"
        );
        assert_eq!(
            handler.feature_log(FeatureType::TimeTracker, 2).as_str(),
            "Current session ID: 0"
        );
        assert!(handler.feature_log(FeatureType::CtrlCV, 0).is_empty());
        assert!(handler.feature_log(FeatureType::None, 0).is_empty());

        handler.switch_to_feature(FeatureType::CtrlCV);
        handler.on_tick();
        assert_eq!(handler.time_tracker().entry(0).unwrap().work_us, 2_000_000);
    });
}

#[test]
fn config_decode_rejects_unknown_feature() {
    let mut buf = [0; FeaturesHandlerConfig::SIZE];
    FeaturesHandlerConfig {
        magic: BLOB_MAGIC,
        current_feature: FeatureType::TimeTracker,
        is_feature_set: true,
    }
    .encode(&mut buf);
    assert_eq!(
        FeaturesHandlerConfig::decode(&buf).current_feature,
        FeatureType::TimeTracker
    );

    buf[4] = 0x42;
    let config = FeaturesHandlerConfig::decode(&buf);
    assert_eq!(config.current_feature, FeatureType::None);
    assert!(!config.is_feature_set);

    assert_eq!(FeatureType::from_name("time-tracker"), Some(FeatureType::TimeTracker));
    assert_eq!(FeatureType::from_name("time_tracker"), Some(FeatureType::TimeTracker));
    assert_eq!(FeatureType::from_name(FeatureType::TimeTracker.name()), Some(FeatureType::TimeTracker));
    assert_eq!(FeatureType::from_name("macro"), None);
}
