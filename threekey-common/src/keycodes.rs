/// HID keyboard usage ids used by the keypad.
pub mod key {
    pub const NONE: u8 = 0x00;
    pub const A: u8 = 0x04;
    pub const C: u8 = 0x06;
    pub const V: u8 = 0x19;
    pub const X: u8 = 0x1b;
    pub const Z: u8 = 0x1d;
    pub const ENTER: u8 = 0x28;
    pub const ESCAPE: u8 = 0x29;
    pub const SPACE: u8 = 0x2c;
}

/// HID keyboard modifier bits (byte 0 of the boot keyboard report).
pub mod modifier {
    pub const LEFT_CTRL: u8 = 1 << 0;
    pub const LEFT_SHIFT: u8 = 1 << 1;
    pub const LEFT_ALT: u8 = 1 << 2;
    pub const LEFT_GUI: u8 = 1 << 3;
    pub const RIGHT_CTRL: u8 = 1 << 4;
    pub const RIGHT_SHIFT: u8 = 1 << 5;
    pub const RIGHT_ALT: u8 = 1 << 6;
    pub const RIGHT_GUI: u8 = 1 << 7;
}

const TAG_KEY: u8 = 0;
const TAG_MODIFIER: u8 = 1;

/// What a physical button produces: a plain key or a modifier flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyValue {
    Key(u8),
    Modifier(u8),
}

impl KeyValue {
    pub const NONE: KeyValue = KeyValue::Key(key::NONE);

    pub fn key_code(&self) -> Option<u8> {
        match *self {
            KeyValue::Key(key::NONE) => None,
            KeyValue::Key(code) => Some(code),
            KeyValue::Modifier(_) => None,
        }
    }

    pub fn modifier_flags(&self) -> u8 {
        match *self {
            KeyValue::Modifier(flags) => flags,
            KeyValue::Key(_) => 0,
        }
    }

    /// Two byte encoding used in persisted key tables: `[tag, code]`.
    pub fn to_bytes(self) -> [u8; 2] {
        match self {
            KeyValue::Key(code) => [TAG_KEY, code],
            KeyValue::Modifier(flags) => [TAG_MODIFIER, flags],
        }
    }

    pub fn from_bytes(bytes: [u8; 2]) -> Option<Self> {
        match bytes[0] {
            TAG_KEY => Some(KeyValue::Key(bytes[1])),
            TAG_MODIFIER => Some(KeyValue::Modifier(bytes[1])),
            _ => None,
        }
    }
}
