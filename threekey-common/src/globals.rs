/// Marks a blob slot as holding a valid record. Absence means factory defaults are needed.
pub const BLOB_MAGIC: u32 = 0xdead_beef;

/// Size of every blob slot in the storage region.
pub const BLOB_SLOT_SIZE: usize = 1024;

/// Quiet window after a falling edge before the pin is trusted.
pub const DEBOUNCE_MS: u64 = 100;
/// Period of the timer sampling a held button.
pub const LONG_PRESS_TICK_MS: u64 = 100;
pub const LONG_PRESS_MS_DEFAULT: u32 = 1000;

/// Capacity of the persisted key table.
pub const MAX_KEYS: usize = 8;

pub mod time_tracker {
    pub const TRACKING_INTERVAL_MS: u64 = 250;
    pub const SAVE_INTERVALS_COUNT: u32 = 4;
    pub const MAX_ENTRIES_COUNT: usize = 31;
    pub const MEDIUM_THRESHOLD_MS_DEFAULT: u64 = 6 * 3600 * 1000;
    pub const LONG_THRESHOLD_MS_DEFAULT: u64 = 7 * 3600 * 1000 + 1800 * 1000;

    pub const WORK_KEY_ID: u8 = 0;
    pub const MEETING_KEY_ID: u8 = 1;
    pub const FUNCTION_KEY_ID: u8 = 2;
}
