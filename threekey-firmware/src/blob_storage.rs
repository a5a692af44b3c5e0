//! Fixed-slot blob store on raw NOR flash.
//!
//! The storage region is split into [BLOB_SLOT_SIZE] slots, one per [BlobType]. Flash can only be
//! erased a whole sector at a time, so saving a blob reads every slot sharing its sector into a
//! sector sized cache, patches the target slot and then erases and reprograms the sector.
//!
//! A power loss between the erase and the program leaves every blob in that sector erased or
//! partially written. Consumers detect this the same way they detect fresh flash: the record's
//! leading magic value no longer matches [BLOB_MAGIC](threekey_common::globals::BLOB_MAGIC).

use core::{cell::RefCell, marker::PhantomData};

use embedded_storage::nor_flash::{self, NorFlash};
use threekey_common::globals::{BLOB_MAGIC, BLOB_SLOT_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// Blob index or sector id outside the storage region.
    InvalidId,
    /// Empty, short or over-long buffer.
    InvalidInput,
    /// The storage region does not fit the flash device.
    Geometry,
    NotAligned,
    OutOfBounds,
    Flash,
}

/// The logical records kept in flash. The discriminant is the blob index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BlobType {
    StorageConfig = 0,
    KeysConfig = 1,
    FeaturesHandlerConfig = 2,
    TimeTrackerData = 3,
}

impl BlobType {
    pub const COUNT: usize = 4;

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// A record that can be stored in a blob slot.
///
/// `encode` is handed a buffer of exactly `SIZE` bytes and `decode` receives the same. Records
/// are always encoded field by field; nothing is reinterpreted from raw memory.
pub trait Blob: Sized {
    const SIZE: usize;

    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

struct SlotFit<T>(PhantomData<T>);
impl<T: Blob> SlotFit<T> {
    const OK: () = assert!(T::SIZE <= BLOB_SLOT_SIZE, "blob record exceeds the slot size");
}

pub trait BlobStorage {
    fn slot_size(&self) -> usize {
        BLOB_SLOT_SIZE
    }

    fn slot_count(&self) -> usize;
    fn sector_size(&self) -> usize;

    /// Copy the `slot_size` bytes of slot `index` into the start of `buf`.
    fn read_slot(&self, index: usize, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Replace the contents of slot `index` with `data`, padding the rest of the slot with
    /// `0xff`. The other slots in the same sector are preserved.
    fn write_slot(&self, index: usize, data: &[u8]) -> Result<(), StorageError>;

    fn erase_all(&self) -> Result<(), StorageError>;
    fn erase_sector(&self, sector_id: usize) -> Result<(), StorageError>;
}

impl dyn BlobStorage + '_ {
    pub fn get<T: Blob>(&self, blob_type: BlobType) -> Result<T, StorageError> {
        let () = SlotFit::<T>::OK;
        let mut buf = [0xff; BLOB_SLOT_SIZE];
        self.read_slot(blob_type.index(), &mut buf)?;
        Ok(T::decode(&buf[..T::SIZE]))
    }

    pub fn save<T: Blob>(&self, blob_type: BlobType, blob: &T) -> Result<(), StorageError> {
        let () = SlotFit::<T>::OK;
        let mut buf = [0xff; BLOB_SLOT_SIZE];
        let buf = &mut buf[..T::SIZE];
        blob.encode(buf);
        self.write_slot(blob_type.index(), buf)
    }
}

/// Housekeeping record kept in blob 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StorageConfig {
    pub magic: u32,
    /// Number of successful [NorflashBlobStorage::init] calls. Wraps around.
    pub init_count: u32,
}

impl StorageConfig {
    pub const fn factory() -> Self {
        Self {
            magic: BLOB_MAGIC,
            init_count: 0,
        }
    }
}

impl Blob for StorageConfig {
    const SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.init_count.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            magic: read_u32(buf, 0),
            init_count: read_u32(buf, 4),
        }
    }
}

/// Outcome of [NorflashBlobStorage::init].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageInit {
    /// The housekeeping magic was missing; defaults were written.
    Factory,
    Existing,
}

pub(crate) fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

pub(crate) fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

pub struct NorflashBlobStorage<
    'd,
    F: NorFlash,
    const BASE: usize,
    const SLOT_COUNT: usize,
    const SECTOR_SIZE: usize,
> {
    inner: RefCell<NorflashBlobStorageInner<'d, F, BASE, SLOT_COUNT, SECTOR_SIZE>>,
}

struct NorflashBlobStorageInner<
    'd,
    F: NorFlash,
    const BASE: usize,
    const SLOT_COUNT: usize,
    const SECTOR_SIZE: usize,
> {
    flash: &'d mut F,
    /// Sector cache. Only meaningful during a single `write_slot` call.
    sector: [u8; SECTOR_SIZE],
    config: StorageConfig,
}

const fn assert_storage_params<const BASE: usize, const SLOT_COUNT: usize, const SECTOR_SIZE: usize>(
    erase_size: usize,
    write_size: usize,
) -> usize {
    assert!(SLOT_COUNT >= BlobType::COUNT);
    assert!(SECTOR_SIZE == erase_size);
    assert!(SECTOR_SIZE % BLOB_SLOT_SIZE == 0);
    assert!(SECTOR_SIZE % write_size == 0);
    assert!((SLOT_COUNT * BLOB_SLOT_SIZE) % SECTOR_SIZE == 0);
    assert!(BASE % SECTOR_SIZE == 0);
    SECTOR_SIZE / BLOB_SLOT_SIZE
}

fn map_flash_error(err: impl nor_flash::NorFlashError) -> StorageError {
    match err.kind() {
        nor_flash::NorFlashErrorKind::NotAligned => StorageError::NotAligned,
        nor_flash::NorFlashErrorKind::OutOfBounds => StorageError::OutOfBounds,
        _ => StorageError::Flash,
    }
}

impl<'d, F: NorFlash, const BASE: usize, const SLOT_COUNT: usize, const SECTOR_SIZE: usize>
    NorflashBlobStorage<'d, F, BASE, SLOT_COUNT, SECTOR_SIZE>
{
    pub fn new(flash: &'d mut F) -> Result<Self, StorageError> {
        Ok(Self {
            inner: RefCell::new(NorflashBlobStorageInner::new(flash)?),
        })
    }

    /// Check the housekeeping record, writing factory defaults when its magic is missing, and
    /// bump the boot counter.
    pub fn init(&self) -> Result<StorageInit, StorageError> {
        let storage: &dyn BlobStorage = self;
        let mut config: StorageConfig = storage.get(BlobType::StorageConfig)?;

        let outcome = if config.magic != BLOB_MAGIC {
            crate::info!("storage: no housekeeping record, writing factory defaults");
            config = StorageConfig::factory();
            StorageInit::Factory
        } else {
            StorageInit::Existing
        };

        config.init_count = config.init_count.wrapping_add(1);
        storage.save(BlobType::StorageConfig, &config)?;
        self.inner.borrow_mut().config = config;

        Ok(outcome)
    }

    pub fn init_count(&self) -> u32 {
        self.inner.borrow().config.init_count
    }
}

impl<F: NorFlash, const BASE: usize, const SLOT_COUNT: usize, const SECTOR_SIZE: usize> BlobStorage
    for NorflashBlobStorage<'_, F, BASE, SLOT_COUNT, SECTOR_SIZE>
{
    fn slot_count(&self) -> usize {
        SLOT_COUNT
    }

    fn sector_size(&self) -> usize {
        SECTOR_SIZE
    }

    fn read_slot(&self, index: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        self.inner.borrow_mut().read_slot(index, buf)
    }

    fn write_slot(&self, index: usize, data: &[u8]) -> Result<(), StorageError> {
        let result = self.inner.borrow_mut().write_slot(index, data);
        if let Err(err) = result {
            crate::warn!("storage: write of slot {} failed: {:?}", index, err);
        }
        result
    }

    fn erase_all(&self) -> Result<(), StorageError> {
        self.inner.borrow_mut().erase_region()
    }

    fn erase_sector(&self, sector_id: usize) -> Result<(), StorageError> {
        self.inner.borrow_mut().erase_sector(sector_id)
    }
}

impl<'d, F: NorFlash, const BASE: usize, const SLOT_COUNT: usize, const SECTOR_SIZE: usize>
    NorflashBlobStorageInner<'d, F, BASE, SLOT_COUNT, SECTOR_SIZE>
{
    const BLOBS_PER_SECTOR: usize =
        assert_storage_params::<BASE, SLOT_COUNT, SECTOR_SIZE>(F::ERASE_SIZE, F::WRITE_SIZE);
    const REGION_SIZE: usize = SLOT_COUNT * BLOB_SLOT_SIZE;
    const SECTOR_COUNT: usize = Self::REGION_SIZE / SECTOR_SIZE;
    const GEOMETRY_OK: () = assert!(Self::BLOBS_PER_SECTOR > 0);

    fn new(flash: &'d mut F) -> Result<Self, StorageError> {
        let () = Self::GEOMETRY_OK;
        if BASE + Self::REGION_SIZE > flash.capacity() {
            crate::warn!(
                "storage: region {:#x}+{:#x} exceeds flash capacity {:#x}",
                BASE,
                Self::REGION_SIZE,
                flash.capacity()
            );
            return Err(StorageError::Geometry);
        }

        Ok(Self {
            flash,
            sector: [0xff; SECTOR_SIZE],
            config: StorageConfig {
                magic: u32::MAX,
                init_count: u32::MAX,
            },
        })
    }

    const fn slot_address(index: usize) -> u32 {
        (BASE + index * BLOB_SLOT_SIZE) as u32
    }

    fn read_slot(&mut self, index: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        Self::read_flash_slot(self.flash, index, buf)
    }

    fn read_flash_slot(flash: &mut F, index: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        if index >= SLOT_COUNT {
            return Err(StorageError::InvalidId);
        }
        if buf.len() < BLOB_SLOT_SIZE {
            return Err(StorageError::InvalidInput);
        }
        flash
            .read(Self::slot_address(index), &mut buf[..BLOB_SLOT_SIZE])
            .map_err(map_flash_error)
    }

    fn read_sector(&mut self, sector_id: usize) -> Result<(), StorageError> {
        let first = sector_id * Self::BLOBS_PER_SECTOR;
        for (i, slot) in self.sector.chunks_exact_mut(BLOB_SLOT_SIZE).enumerate() {
            Self::read_flash_slot(self.flash, first + i, slot)?;
        }
        Ok(())
    }

    fn write_slot(&mut self, index: usize, data: &[u8]) -> Result<(), StorageError> {
        if index >= SLOT_COUNT {
            return Err(StorageError::InvalidId);
        }
        if data.is_empty() || data.len() > BLOB_SLOT_SIZE {
            return Err(StorageError::InvalidInput);
        }

        let sector_id = index / Self::BLOBS_PER_SECTOR;
        self.read_sector(sector_id)?;

        let start = (index % Self::BLOBS_PER_SECTOR) * BLOB_SLOT_SIZE;
        let (blob, tail) = self.sector[start..start + BLOB_SLOT_SIZE].split_at_mut(data.len());
        blob.copy_from_slice(data);
        tail.fill(0xff);

        self.program_sector(sector_id)
    }

    /// Erase the sector and write the cache back. Interrupts stay masked for the duration since
    /// flash reads are undefined while the bank is busy.
    fn program_sector(&mut self, sector_id: usize) -> Result<(), StorageError> {
        let from = (BASE + sector_id * SECTOR_SIZE) as u32;
        let flash = &mut *self.flash;
        let sector = &self.sector;
        critical_section::with(|_| {
            flash.erase(from, from + SECTOR_SIZE as u32)?;
            flash.write(from, sector)
        })
        .map_err(map_flash_error)
    }

    fn erase_region(&mut self) -> Result<(), StorageError> {
        self.erase(0, Self::REGION_SIZE)
    }

    fn erase_sector(&mut self, sector_id: usize) -> Result<(), StorageError> {
        if sector_id >= Self::SECTOR_COUNT {
            return Err(StorageError::InvalidId);
        }
        let start = sector_id * SECTOR_SIZE;
        self.erase(start, start + SECTOR_SIZE)
    }

    fn erase(&mut self, from: usize, to: usize) -> Result<(), StorageError> {
        let flash = &mut *self.flash;
        critical_section::with(|_| flash.erase((BASE + from) as u32, (BASE + to) as u32))
            .map_err(map_flash_error)
    }
}

#[cfg(test)]
#[path = "blob_storage_test.rs"]
pub(crate) mod test;
