//! Work / meeting time tracking.
//!
//! Key 0 toggles work tracking and key 1 meeting tracking; only one runs at a time. A short press
//! on key 2 blinks its LED once per tracked hour, a long press closes the session and starts the
//! next one. Sessions are kept in a ring of [MAX_ENTRIES_COUNT] entries.

use core::fmt::Write;

use threekey_common::{
    color::Color,
    datetime::DateTime,
    globals::{
        time_tracker::{
            FUNCTION_KEY_ID, LONG_THRESHOLD_MS_DEFAULT, MAX_ENTRIES_COUNT, MEDIUM_THRESHOLD_MS_DEFAULT,
            MEETING_KEY_ID, SAVE_INTERVALS_COUNT, TRACKING_INTERVAL_MS, WORK_KEY_ID,
        },
        BLOB_MAGIC,
    },
};

use super::{Calendar, Feature, KeyLeds, LedsMode, LogLine};
use crate::{
    blob_storage::{read_u32, read_u64, Blob, BlobStorage, BlobType, StorageError},
    buttons::{ButtonEvent, ButtonInput},
    keys_config::KeysConfigStore,
};

const HOURS_BLINK_MS: u32 = 800;
const NEXT_SESSION_BLINK_MS: u32 = 200;
const NEXT_SESSION_BLINK_COUNT: u32 = 3;

const US_PER_MS: u64 = 1000;
const MS_PER_HOUR: u64 = 3600 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum TimeTrackerLog {
    WorkTime = 0,
    MeetingTime = 1,
    SessionId = 2,
}

impl TimeTrackerLog {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => TimeTrackerLog::WorkTime,
            1 => TimeTrackerLog::MeetingTime,
            2 => TimeTrackerLog::SessionId,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TrackingEntry {
    pub work_us: u64,
    pub meeting_us: u64,
    pub date: DateTime,
    pub tracking_work: bool,
    pub tracking_meetings: bool,
    pub medium_threshold_reached: bool,
    pub long_threshold_reached: bool,
}

impl TrackingEntry {
    const ENCODED_SIZE: usize = 16 + DateTime::ENCODED_SIZE + 1;

    pub fn tracked_ms(&self) -> u64 {
        (self.work_us + self.meeting_us) / US_PER_MS
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.work_us.to_le_bytes());
        buf[8..16].copy_from_slice(&self.meeting_us.to_le_bytes());
        buf[16..23].copy_from_slice(&self.date.to_bytes());
        buf[23] = self.tracking_work as u8
            | (self.tracking_meetings as u8) << 1
            | (self.medium_threshold_reached as u8) << 2
            | (self.long_threshold_reached as u8) << 3;
    }

    fn decode(buf: &[u8]) -> Self {
        let flags = buf[23];
        Self {
            work_us: read_u64(buf, 0),
            meeting_us: read_u64(buf, 8),
            date: DateTime::from_bytes(&buf[16..23]),
            tracking_work: flags & 1 != 0,
            tracking_meetings: flags & 2 != 0,
            medium_threshold_reached: flags & 4 != 0,
            long_threshold_reached: flags & 8 != 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeTrackerData {
    pub magic: u32,
    pub entries: [TrackingEntry; MAX_ENTRIES_COUNT],
    pub active_session: u32,
    pub medium_threshold_ms: u64,
    pub long_threshold_ms: u64,
}

impl TimeTrackerData {
    pub fn factory() -> Self {
        Self {
            magic: BLOB_MAGIC,
            entries: [TrackingEntry::default(); MAX_ENTRIES_COUNT],
            active_session: 0,
            medium_threshold_ms: MEDIUM_THRESHOLD_MS_DEFAULT,
            long_threshold_ms: LONG_THRESHOLD_MS_DEFAULT,
        }
    }
}

const ENTRIES_OFFSET: usize = 4;
const TAIL_OFFSET: usize = ENTRIES_OFFSET + MAX_ENTRIES_COUNT * TrackingEntry::ENCODED_SIZE;

impl Blob for TimeTrackerData {
    const SIZE: usize = TAIL_OFFSET + 4 + 8 + 8;

    fn encode(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.magic.to_le_bytes());
        for (entry, out) in self.entries.iter().zip(
            buf[ENTRIES_OFFSET..TAIL_OFFSET].chunks_exact_mut(TrackingEntry::ENCODED_SIZE),
        ) {
            entry.encode(out);
        }
        buf[TAIL_OFFSET..TAIL_OFFSET + 4].copy_from_slice(&self.active_session.to_le_bytes());
        buf[TAIL_OFFSET + 4..TAIL_OFFSET + 12]
            .copy_from_slice(&self.medium_threshold_ms.to_le_bytes());
        buf[TAIL_OFFSET + 12..TAIL_OFFSET + 20]
            .copy_from_slice(&self.long_threshold_ms.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        let mut entries = [TrackingEntry::default(); MAX_ENTRIES_COUNT];
        for (entry, b) in entries.iter_mut().zip(
            buf[ENTRIES_OFFSET..TAIL_OFFSET].chunks_exact(TrackingEntry::ENCODED_SIZE),
        ) {
            *entry = TrackingEntry::decode(b);
        }
        let active_session = read_u32(buf, TAIL_OFFSET);
        Self {
            magic: read_u32(buf, 0),
            entries,
            active_session: if (active_session as usize) < MAX_ENTRIES_COUNT {
                active_session
            } else {
                0
            },
            medium_threshold_ms: read_u64(buf, TAIL_OFFSET + 4),
            long_threshold_ms: read_u64(buf, TAIL_OFFSET + 12),
        }
    }
}

pub struct TimeTracker<'a> {
    storage: &'a dyn BlobStorage,
    keys: &'a KeysConfigStore<'a>,
    leds: &'a dyn KeyLeds,
    calendar: &'a dyn Calendar,
    data: TimeTrackerData,
    intervals_count: u32,
    is_running: bool,
}

impl<'a> TimeTracker<'a> {
    pub fn new(
        storage: &'a dyn BlobStorage,
        keys: &'a KeysConfigStore<'a>,
        leds: &'a dyn KeyLeds,
        calendar: &'a dyn Calendar,
    ) -> Self {
        Self {
            storage,
            keys,
            leds,
            calendar,
            data: TimeTrackerData::factory(),
            intervals_count: 0,
            is_running: false,
        }
    }

    pub fn data(&self) -> &TimeTrackerData {
        &self.data
    }

    pub fn active_session(&self) -> u32 {
        self.data.active_session
    }

    pub fn entry(&self, session_id: u32) -> Option<TrackingEntry> {
        self.data.entries.get(session_id as usize).copied()
    }

    fn active_entry(&self) -> &TrackingEntry {
        &self.data.entries[self.data.active_session as usize]
    }

    fn save(&self) -> Result<(), StorageError> {
        self.storage
            .save(BlobType::TimeTrackerData, &self.data)
            .inspect_err(|err| crate::warn!("time tracker save failed {:?}", err))
    }

    fn load(&mut self) {
        match self
            .storage
            .get::<TimeTrackerData>(BlobType::TimeTrackerData)
        {
            Ok(data) if data.magic == BLOB_MAGIC => self.data = data,
            Ok(_) => self.factory_init(),
            Err(err) => {
                crate::warn!("time tracker read failed {:?}", err);
                self.factory_init();
            }
        }
    }

    pub fn set_medium_threshold_ms(&mut self, ms: u64) -> Result<(), StorageError> {
        self.data.medium_threshold_ms = ms;
        self.save()
    }

    pub fn set_long_threshold_ms(&mut self, ms: u64) -> Result<(), StorageError> {
        self.data.long_threshold_ms = ms;
        self.save()
    }

    /// Close the active session and start tracking into the next one.
    pub fn new_session(&mut self) -> Result<(), StorageError> {
        self.stop_tracking();
        self.leds.disable(FUNCTION_KEY_ID);

        self.data.active_session = (self.data.active_session + 1) % MAX_ENTRIES_COUNT as u32;
        let date = self.calendar.now();
        self.data.entries[self.data.active_session as usize] = TrackingEntry {
            date,
            ..Default::default()
        };
        crate::info!("time tracker: session {}", self.data.active_session);
        self.save()
    }

    fn stop_tracking(&mut self) {
        let entry = &mut self.data.entries[self.data.active_session as usize];
        if entry.tracking_work {
            entry.tracking_work = false;
            self.leds.disable(WORK_KEY_ID);
        } else if entry.tracking_meetings {
            entry.tracking_meetings = false;
            self.leds.disable(MEETING_KEY_ID);
        }
    }

    fn set_tracking_date(&mut self) {
        let entry = &mut self.data.entries[self.data.active_session as usize];
        if entry.date.is_empty() {
            entry.date = self.calendar.now();
        }
    }

    fn toggle(&mut self, work: bool) {
        let (key_id, other_id) = if work {
            (WORK_KEY_ID, MEETING_KEY_ID)
        } else {
            (MEETING_KEY_ID, WORK_KEY_ID)
        };
        let color = self.keys.key_color(key_id);
        let entry = &mut self.data.entries[self.data.active_session as usize];
        let (this, other) = if work {
            (&mut entry.tracking_work, &mut entry.tracking_meetings)
        } else {
            (&mut entry.tracking_meetings, &mut entry.tracking_work)
        };

        if *this {
            *this = false;
            self.leds.disable(key_id);
        } else {
            if *other {
                *other = false;
                self.leds.disable(other_id);
            }
            *this = true;
            self.leds.enable(key_id, color);
        }
    }

    fn function_key(&mut self, is_long_press: bool) {
        let color = self.keys.key_color(FUNCTION_KEY_ID);
        if is_long_press {
            self.new_session().ok();
            self.leds.blink(
                FUNCTION_KEY_ID,
                NEXT_SESSION_BLINK_MS,
                NEXT_SESSION_BLINK_COUNT,
                color,
            );
            return;
        }

        let entry = self.active_entry();
        if !entry.medium_threshold_reached && !entry.long_threshold_reached {
            let hours = (entry.tracked_ms() / MS_PER_HOUR) as u32;
            self.leds
                .blink(FUNCTION_KEY_ID, HOURS_BLINK_MS, hours.max(1), color);
        }
    }

    fn tracker(&mut self, event: ButtonEvent) {
        self.set_tracking_date();

        match event.key_id {
            WORK_KEY_ID if !event.is_long_press => self.toggle(true),
            MEETING_KEY_ID if !event.is_long_press => self.toggle(false),
            FUNCTION_KEY_ID => self.function_key(event.is_long_press),
            _ => {}
        }
    }

    fn write_duration(line: &mut LogLine, date: DateTime, label: &str, us: u64) {
        let total_seconds = us / (US_PER_MS * 1000);
        write!(
            line,
            "{} {}: {}h {}min {}s",
            date,
            label,
            total_seconds / 3600,
            (total_seconds % 3600) / 60,
            total_seconds % 60
        )
        .ok();
    }
}

impl Feature for TimeTracker<'_> {
    fn init(&mut self) {
        self.load();

        for key_id in [WORK_KEY_ID, MEETING_KEY_ID, FUNCTION_KEY_ID] {
            self.leds.disable(key_id);
        }
        self.stop_tracking();
        self.leds.set_mode(LedsMode::HandledByFeature);
        self.set_tracking_date();

        self.intervals_count = 0;
        self.is_running = true;
    }

    fn deinit(&mut self) {
        self.is_running = false;
        self.leds.set_mode(LedsMode::WhenButtonPressed);
        for key_id in [WORK_KEY_ID, MEETING_KEY_ID, FUNCTION_KEY_ID] {
            self.leds.disable(key_id);
        }
        self.save().ok();
    }

    fn factory_init(&mut self) {
        crate::info!("time tracker: factory init");
        self.data = TimeTrackerData::factory();
        self.save().ok();
    }

    fn handle(&mut self, input: &dyn ButtonInput) {
        while let Some(event) = input.take_pending_event() {
            self.tracker(event);
        }
    }

    fn on_tick(&mut self) {
        if !self.is_running {
            return;
        }

        let elapsed_us = TRACKING_INTERVAL_MS * US_PER_MS;
        let medium = self.data.medium_threshold_ms;
        let long = self.data.long_threshold_ms;
        let entry = &mut self.data.entries[self.data.active_session as usize];
        if entry.tracking_work {
            entry.work_us += elapsed_us;
        } else if entry.tracking_meetings {
            entry.meeting_us += elapsed_us;
        } else {
            return;
        }

        let tracked_ms = entry.tracked_ms();
        if tracked_ms >= medium && !entry.medium_threshold_reached {
            entry.medium_threshold_reached = true;
            self.leds.enable(FUNCTION_KEY_ID, Color::Yellow);
        } else if tracked_ms >= long && !entry.long_threshold_reached {
            entry.long_threshold_reached = true;
            self.leds.enable(FUNCTION_KEY_ID, Color::Red);
        }

        self.intervals_count += 1;
        if self.intervals_count >= SAVE_INTERVALS_COUNT {
            self.intervals_count = 0;
            self.save().ok();
        }
    }

    fn log(&self, log_id: u32) -> LogLine {
        let mut line = LogLine::new();
        let entry = self.active_entry();
        match TimeTrackerLog::from_u32(log_id) {
            Some(TimeTrackerLog::WorkTime) => {
                Self::write_duration(&mut line, self.calendar.now(), "Work", entry.work_us)
            }
            Some(TimeTrackerLog::MeetingTime) => Self::write_duration(
                &mut line,
                self.calendar.now(),
                "Meetings",
                entry.meeting_us,
            ),
            Some(TimeTrackerLog::SessionId) => {
                write!(line, "Current session ID: {}", self.data.active_session).ok();
            }
            None => {
                line.push_str("Invalid log ID").ok();
            }
        }
        line
    }
}

#[cfg(test)]
#[path = "time_tracker_test.rs"]
mod test;
