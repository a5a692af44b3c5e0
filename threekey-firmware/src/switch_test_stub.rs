extern crate std;

use core::cell::Cell;
use embedded_hal::digital::{Error, ErrorType, InputPin};
use std::rc::Rc;

use crate::buttons::EdgeInterrupt;

#[derive(Debug)]
pub struct TestError;

/// An active-low switch input. Clones share the same level so a test can hold one while the
/// state machine owns another.
#[derive(Clone)]
pub struct Pin(Rc<PinShared>);
impl core::fmt::Debug for Pin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pin")
            .field("n", &self.0.n)
            .field("is_down", &self.0.is_down.get())
            .field("irq", &self.0.irq_enabled.get())
            .finish()
    }
}
impl Pin {
    pub fn new(n: u8) -> Self {
        Self(Rc::new(PinShared {
            n,
            is_down: Cell::new(false),
            irq_enabled: Cell::new(false),
            irq_changes: Cell::new(0),
        }))
    }

    pub fn num(&self) -> u8 {
        self.0.n
    }

    pub fn down(&self) {
        self.0.is_down.set(true);
    }

    pub fn up(&self) {
        self.0.is_down.set(false);
    }

    pub fn irq_enabled(&self) -> bool {
        self.0.irq_enabled.get()
    }

    /// Number of times the edge interrupt has been switched on or off.
    pub fn irq_changes(&self) -> usize {
        self.0.irq_changes.get()
    }
}

struct PinShared {
    n: u8,
    is_down: Cell<bool>,
    irq_enabled: Cell<bool>,
    irq_changes: Cell<usize>,
}

impl Error for TestError {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

impl ErrorType for Pin {
    type Error = TestError;
}

impl InputPin for Pin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.is_down.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.is_down.get())
    }
}

impl EdgeInterrupt for Pin {
    fn set_edge_interrupt(&mut self, enabled: bool) {
        self.0.irq_enabled.set(enabled);
        self.0.irq_changes.set(self.0.irq_changes.get() + 1);
    }
}
