use core::sync::atomic::AtomicU32;

use threekey_common::keycodes::{key, KeyValue};

use super::*;

use crate::blob_storage::test::{TestFlash, TestStorage};
use crate::buttons::ButtonConfig;
use crate::keypad_test_stub::{FakeInput, FixedCalendar, LedAction, RecordingLeds};

fn board() -> [ButtonConfig; 3] {
    [
        (0, Color::Green),
        (1, Color::Blue),
        (2, Color::White),
    ]
    .map(|(id, color)| ButtonConfig {
        id,
        gpio: id + 20,
        value: KeyValue::Key(key::A + id),
        color,
        enabled: true,
    })
}

macro_rules! setup {
    ($stub:ident, $storage:ident, $tracker:ident, $input:ident, $leds:ident, $calendar:ident $b:block) => {{
        let $storage = TestStorage::new(&mut $stub).unwrap();
        let $input = FakeInput::default();
        let long_press_ms = AtomicU32::new(0);
        let keys = KeysConfigStore::load(&$storage, &$input, &long_press_ms, &board());
        let $leds = RecordingLeds::default();
        let $calendar = FixedCalendar::at(2025, 5, 1, 9);
        #[allow(unused_mut)]
        let mut $tracker = TimeTracker::new(&$storage, &keys, &$leds, &$calendar);
        $tracker.init();
        $b
    }};
}

fn ticks(tracker: &mut TimeTracker, n: usize) {
    for _ in 0..n {
        tracker.on_tick();
    }
}

#[test]
fn init_on_fresh_flash() {
    let mut stub = TestFlash::default();
    setup!(stub, _storage, tracker, _input, leds, _calendar {
        assert_eq!(tracker.data().magic, BLOB_MAGIC);
        assert_eq!(tracker.active_session(), 0);
        assert_eq!(tracker.data().medium_threshold_ms, MEDIUM_THRESHOLD_MS_DEFAULT);
        assert_eq!(tracker.data().long_threshold_ms, LONG_THRESHOLD_MS_DEFAULT);
        assert_eq!(
            tracker.entry(0).unwrap().date,
            DateTime { year: 2025, month: 5, day: 1, hour: 9, minute: 0, second: 0 }
        );
        assert_eq!(tracker.entry(MAX_ENTRIES_COUNT as u32), None);

        assert_eq!(
            leds.take(),
            [
                LedAction::Disable(0),
                LedAction::Disable(1),
                LedAction::Disable(2),
                LedAction::Mode(LedsMode::HandledByFeature),
            ]
        );
    });
}

#[test]
fn work_and_meeting_keys_toggle() {
    let mut stub = TestFlash::default();
    setup!(stub, _storage, tracker, input, leds, _calendar {
        leds.take();

        input.push(0, false);
        tracker.handle(&input);
        assert!(tracker.entry(0).unwrap().tracking_work);
        assert_eq!(leds.take(), [LedAction::Enable(0, Color::Green)]);

        input.push(1, false);
        tracker.handle(&input);
        let entry = tracker.entry(0).unwrap();
        assert!(!entry.tracking_work);
        assert!(entry.tracking_meetings);
        assert_eq!(
            leds.take(),
            [LedAction::Disable(0), LedAction::Enable(1, Color::Blue)]
        );

        input.push(1, false);
        tracker.handle(&input);
        assert!(!tracker.entry(0).unwrap().tracking_meetings);
        assert_eq!(leds.take(), [LedAction::Disable(1)]);

        // long presses on the tracking keys and unknown keys do nothing
        input.push(0, true);
        input.push(7, false);
        tracker.handle(&input);
        assert!(!tracker.entry(0).unwrap().tracking_work);
        assert!(leds.take().is_empty());
    });
}

#[test]
fn ticks_accumulate_and_save() {
    let mut stub = TestFlash::default();
    setup!(stub, storage, tracker, input, _leds, _calendar {
        ticks(&mut tracker, 4);
        assert_eq!(tracker.entry(0).unwrap().work_us, 0);

        input.push(0, false);
        tracker.handle(&input);
        ticks(&mut tracker, 3);
        assert_eq!(tracker.entry(0).unwrap().work_us, 750_000);

        let storage: &dyn BlobStorage = &storage;
        let stored = storage.get::<TimeTrackerData>(BlobType::TimeTrackerData).unwrap();
        assert_eq!(stored.entries[0].work_us, 0);

        tracker.on_tick();
        let stored = storage.get::<TimeTrackerData>(BlobType::TimeTrackerData).unwrap();
        assert_eq!(stored.entries[0].work_us, 1_000_000);
        assert!(stored.entries[0].tracking_work);

        input.push(1, false);
        tracker.handle(&input);
        ticks(&mut tracker, 2);
        let entry = tracker.entry(0).unwrap();
        assert_eq!(entry.work_us, 1_000_000);
        assert_eq!(entry.meeting_us, 500_000);
        assert_eq!(entry.tracked_ms(), 1500);
    });
}

#[test]
fn threshold_colours_raised_once() {
    let mut stub = TestFlash::default();
    setup!(stub, _storage, tracker, input, leds, _calendar {
        tracker.set_medium_threshold_ms(500).unwrap();
        tracker.set_long_threshold_ms(1000).unwrap();
        input.push(0, false);
        tracker.handle(&input);
        leds.take();

        ticks(&mut tracker, 2);
        assert_eq!(leds.take(), [LedAction::Enable(2, Color::Yellow)]);
        ticks(&mut tracker, 2);
        assert_eq!(leds.take(), [LedAction::Enable(2, Color::Red)]);
        ticks(&mut tracker, 8);
        assert!(leds.take().is_empty());

        let entry = tracker.entry(0).unwrap();
        assert!(entry.medium_threshold_reached);
        assert!(entry.long_threshold_reached);

        // hours are not shown over a threshold colour
        input.push(2, false);
        tracker.handle(&input);
        assert!(leds.take().is_empty());
    });
}

#[test]
fn function_key_blinks_hours() {
    let mut stub = TestFlash::default();
    setup!(stub, _storage, tracker, input, leds, _calendar {
        input.push(2, false);
        tracker.handle(&input);
        assert_eq!(
            leds.take().last(),
            Some(&LedAction::Blink(2, HOURS_BLINK_MS, 1, Color::White))
        );

        input.push(0, false);
        tracker.handle(&input);
        // 2h 15min of work
        ticks(&mut tracker, 4 * 3600 * 2 + 4 * 900);
        leds.take();

        input.push(2, false);
        tracker.handle(&input);
        assert_eq!(
            leds.take(),
            [LedAction::Blink(2, HOURS_BLINK_MS, 2, Color::White)]
        );
    });
}

#[test]
fn long_press_starts_next_session() {
    let mut stub = TestFlash::default();
    setup!(stub, storage, tracker, input, leds, calendar {
        input.push(0, false);
        tracker.handle(&input);
        ticks(&mut tracker, 4);
        leds.take();

        calendar.0.set(DateTime { year: 2025, month: 5, day: 2, hour: 8, minute: 30, second: 0 });
        input.push(2, true);
        tracker.handle(&input);

        assert_eq!(tracker.active_session(), 1);
        let old = tracker.entry(0).unwrap();
        assert!(!old.tracking_work);
        assert_eq!(old.work_us, 1_000_000);
        let new = tracker.entry(1).unwrap();
        assert_eq!(new.date.day, 2);
        assert_eq!(new.work_us, 0);
        assert!(!new.tracking_work);
        assert_eq!(
            leds.take(),
            [
                LedAction::Disable(0),
                LedAction::Disable(2),
                LedAction::Blink(2, NEXT_SESSION_BLINK_MS, NEXT_SESSION_BLINK_COUNT, Color::White),
            ]
        );

        let storage: &dyn BlobStorage = &storage;
        let stored = storage.get::<TimeTrackerData>(BlobType::TimeTrackerData).unwrap();
        assert_eq!(stored.active_session, 1);
        assert_eq!(stored.entries[0].work_us, 1_000_000);
    });
}

#[test]
fn sessions_wrap() {
    let mut stub = TestFlash::default();
    setup!(stub, _storage, tracker, _input, _leds, _calendar {
        for _ in 0..MAX_ENTRIES_COUNT - 1 {
            tracker.new_session().unwrap();
        }
        assert_eq!(tracker.active_session(), MAX_ENTRIES_COUNT as u32 - 1);
        tracker.new_session().unwrap();
        assert_eq!(tracker.active_session(), 0);
    });
}

#[test]
fn reload_stops_tracking() {
    let mut stub = TestFlash::default();
    setup!(stub, _storage, tracker, input, _leds, _calendar {
        input.push(1, false);
        tracker.handle(&input);
        ticks(&mut tracker, 8);
        tracker.new_session().unwrap();
        input.push(0, false);
        tracker.handle(&input);
        ticks(&mut tracker, 4);
    });

    setup!(stub, _storage, tracker, _input, _leds, _calendar {
        assert_eq!(tracker.active_session(), 1);
        assert_eq!(tracker.entry(0).unwrap().meeting_us, 2_000_000);
        let entry = tracker.entry(1).unwrap();
        assert_eq!(entry.work_us, 1_000_000);
        assert!(!entry.tracking_work);
    });
}

#[test]
fn deinit_stops_ticks() {
    let mut stub = TestFlash::default();
    setup!(stub, storage, tracker, input, leds, _calendar {
        input.push(0, false);
        tracker.handle(&input);
        tracker.on_tick();
        leds.take();

        tracker.deinit();
        assert_eq!(leds.take()[0], LedAction::Mode(LedsMode::WhenButtonPressed));
        tracker.on_tick();
        assert_eq!(tracker.entry(0).unwrap().work_us, 250_000);

        let storage: &dyn BlobStorage = &storage;
        let stored = storage.get::<TimeTrackerData>(BlobType::TimeTrackerData).unwrap();
        assert_eq!(stored.entries[0].work_us, 250_000);
    });
}

#[test]
fn logs() {
    let mut stub = TestFlash::default();
    setup!(stub, _storage, tracker, input, _leds, _calendar {
        input.push(0, false);
        tracker.handle(&input);
        ticks(&mut tracker, 4 * 3725);
        input.push(1, false);
        tracker.handle(&input);
        ticks(&mut tracker, 6);

        assert_eq!(
            tracker.log(TimeTrackerLog::WorkTime as u32).as_str(),
            "2025-05-01 09:00:00 Work: 1h 2min 5s"
        );
        assert_eq!(
            tracker.log(TimeTrackerLog::MeetingTime as u32).as_str(),
            "2025-05-01 09:00:00 Meetings: 0h 0min 1s"
        );
        assert_eq!(tracker.log(2).as_str(), "Current session ID: 0");
        assert_eq!(tracker.log(3).as_str(), "Invalid log ID");
    });
}

#[test]
fn data_fits_slot() {
    assert_eq!(TrackingEntry::ENCODED_SIZE, 24);
    assert_eq!(TimeTrackerData::SIZE, 768);

    let mut data = TimeTrackerData::factory();
    data.active_session = 40;
    let mut buf = [0; TimeTrackerData::SIZE];
    data.encode(&mut buf);
    assert_eq!(TimeTrackerData::decode(&buf).active_session, 0);
}
