#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Color {
    Red = 0,
    Green = 1,
    Blue = 2,
    Yellow = 3,
    White = 4,
    None = 0xff,
}

impl Color {
    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            Color::Red => (0xff, 0, 0),
            Color::Green => (0, 0xff, 0),
            Color::Blue => (0, 0, 0xff),
            Color::Yellow => (0xff, 0xa0, 0),
            Color::White => (0xff, 0xff, 0xff),
            Color::None => (0, 0, 0),
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Color::Red,
            1 => Color::Green,
            2 => Color::Blue,
            3 => Color::Yellow,
            4 => Color::White,
            _ => Color::None,
        }
    }

    /// Parses the colour names accepted by the host terminal.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "red" => Color::Red,
            "green" => Color::Green,
            "blue" => Color::Blue,
            "yellow" => Color::Yellow,
            "white" => Color::White,
            "none" => Color::None,
            _ => return None,
        })
    }
}
