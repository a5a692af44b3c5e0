use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

extern crate std;

#[derive(Debug)]
pub enum FlashStubError {
    Unknown,
    NotAligned,
    OutOfBounds,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Erase(u32, u32),
    Write(u32, std::vec::Vec<u8>),
}

/// RAM backed NOR flash. A fresh stub reads as erased (all `0xff`); writes can only clear bits.
pub struct NorFlashStub<'f, const FLASH_SIZE: usize, const SECTOR: usize> {
    pub buf: std::boxed::Box<[u8; FLASH_SIZE]>,
    #[allow(clippy::type_complexity)]
    pub observer: Option<&'f dyn Fn(Action, &mut [u8]) -> Result<(), FlashStubError>>,
}
impl NorFlashError for FlashStubError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            FlashStubError::Unknown => NorFlashErrorKind::Other,
            FlashStubError::NotAligned => NorFlashErrorKind::NotAligned,
            FlashStubError::OutOfBounds => NorFlashErrorKind::OutOfBounds,
        }
    }
}
impl<const FLASH_SIZE: usize, const SECTOR: usize> ErrorType
    for NorFlashStub<'_, FLASH_SIZE, SECTOR>
{
    type Error = FlashStubError;
}
impl<const FLASH_SIZE: usize, const SECTOR: usize> ReadNorFlash
    for NorFlashStub<'_, FLASH_SIZE, SECTOR>
{
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let offset = offset as usize;
        if offset + bytes.len() > FLASH_SIZE {
            return Err(FlashStubError::OutOfBounds);
        }

        bytes.copy_from_slice(&self.buf[offset..offset + bytes.len()]);

        Ok(())
    }

    fn capacity(&self) -> usize {
        FLASH_SIZE
    }
}
impl<const FLASH_SIZE: usize, const SECTOR: usize> NorFlash for NorFlashStub<'_, FLASH_SIZE, SECTOR> {
    const WRITE_SIZE: usize = 1;

    const ERASE_SIZE: usize = SECTOR;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if let Some(observer) = self.observer {
            observer(Action::Erase(from, to), &mut self.buf[..])?;
        }
        let from = from as usize;
        let to = to as usize;
        if from % SECTOR != 0 || to % SECTOR != 0 {
            return Err(FlashStubError::NotAligned);
        }
        if to > FLASH_SIZE || from > to {
            return Err(FlashStubError::OutOfBounds);
        }
        self.buf[from..to].fill(0xff);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if let Some(observer) = self.observer {
            observer(Action::Write(offset, bytes.into()), &mut self.buf[..])?;
        }
        let offset = offset as usize;
        if offset + bytes.len() > FLASH_SIZE {
            return Err(FlashStubError::OutOfBounds);
        }

        for (t, f) in self.buf[offset..offset + bytes.len()]
            .iter_mut()
            .zip(bytes.iter())
        {
            *t &= *f;
        }

        Ok(())
    }
}
impl<const FLASH_SIZE: usize, const SECTOR: usize> Default for NorFlashStub<'_, FLASH_SIZE, SECTOR> {
    fn default() -> Self {
        Self {
            buf: std::boxed::Box::new([0xff; FLASH_SIZE]),
            observer: None,
        }
    }
}
