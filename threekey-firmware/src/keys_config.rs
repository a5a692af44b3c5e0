use core::{
    cell::RefCell,
    sync::atomic::{self, AtomicU32},
};

use threekey_common::{
    color::Color,
    globals::{BLOB_MAGIC, LONG_PRESS_MS_DEFAULT, MAX_KEYS},
    keycodes::KeyValue,
};

use crate::{
    blob_storage::{read_u32, Blob, BlobStorage, BlobType, StorageError},
    buttons::{ButtonConfig, ButtonInput},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyEntry {
    pub value: KeyValue,
    pub color: Color,
}

impl KeyEntry {
    pub const UNSET: Self = Self {
        value: KeyValue::NONE,
        color: Color::None,
    };
}

/// The persisted key table, indexed by key id.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeysConfig {
    pub magic: u32,
    pub long_press_ms: u32,
    pub key_count: u8,
    pub keys: [KeyEntry; MAX_KEYS],
}

impl KeysConfig {
    pub fn factory(defaults: &[ButtonConfig]) -> Self {
        let mut keys = [KeyEntry::UNSET; MAX_KEYS];
        for cfg in defaults {
            if let Some(entry) = keys.get_mut(cfg.id as usize) {
                *entry = KeyEntry {
                    value: cfg.value,
                    color: cfg.color,
                };
            }
        }
        Self {
            magic: BLOB_MAGIC,
            long_press_ms: LONG_PRESS_MS_DEFAULT,
            key_count: defaults.len().min(MAX_KEYS) as u8,
            keys,
        }
    }

    fn entry(&self, key_id: u8) -> Option<&KeyEntry> {
        if key_id >= self.key_count {
            return None;
        }
        self.keys.get(key_id as usize)
    }
}

const KEY_ENTRY_SIZE: usize = 3;
const KEYS_OFFSET: usize = 9;

impl Blob for KeysConfig {
    const SIZE: usize = KEYS_OFFSET + MAX_KEYS * KEY_ENTRY_SIZE;

    fn encode(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.long_press_ms.to_le_bytes());
        buf[8] = self.key_count;
        for (entry, out) in self
            .keys
            .iter()
            .zip(buf[KEYS_OFFSET..].chunks_exact_mut(KEY_ENTRY_SIZE))
        {
            out[..2].copy_from_slice(&entry.value.to_bytes());
            out[2] = entry.color as u8;
        }
    }

    fn decode(buf: &[u8]) -> Self {
        let mut keys = [KeyEntry::UNSET; MAX_KEYS];
        for (entry, b) in keys
            .iter_mut()
            .zip(buf[KEYS_OFFSET..].chunks_exact(KEY_ENTRY_SIZE))
        {
            *entry = KeyEntry {
                value: KeyValue::from_bytes([b[0], b[1]]).unwrap_or(KeyValue::NONE),
                color: Color::from_u8(b[2]),
            };
        }
        Self {
            magic: read_u32(buf, 0),
            long_press_ms: read_u32(buf, 4),
            key_count: buf[8].min(MAX_KEYS as u8),
            keys,
        }
    }
}

/// Key values, colours and the long press threshold, kept in flash and mirrored into the input
/// state machine.
pub struct KeysConfigStore<'a> {
    storage: &'a dyn BlobStorage,
    input: &'a dyn ButtonInput,
    long_press_ms: &'a AtomicU32,
    config: RefCell<KeysConfig>,
}

impl<'a> KeysConfigStore<'a> {
    /// Read the key table from flash, writing the board defaults when none is stored.
    pub fn load(
        storage: &'a dyn BlobStorage,
        input: &'a dyn ButtonInput,
        long_press_ms: &'a AtomicU32,
        defaults: &[ButtonConfig],
    ) -> Self {
        let config = match storage.get::<KeysConfig>(BlobType::KeysConfig) {
            Ok(config) if config.magic == BLOB_MAGIC => config,
            Ok(_) => {
                crate::info!("keys config: writing factory defaults");
                let config = KeysConfig::factory(defaults);
                if let Err(err) = storage.save(BlobType::KeysConfig, &config) {
                    crate::warn!("keys config save failed {:?}", err);
                }
                config
            }
            Err(err) => {
                crate::warn!("keys config read failed {:?}", err);
                KeysConfig::factory(defaults)
            }
        };

        let me = Self {
            storage,
            input,
            long_press_ms,
            config: RefCell::new(config),
        };
        me.apply();
        me
    }

    fn apply(&self) {
        let config = self.config.borrow();
        self.long_press_ms
            .store(config.long_press_ms, atomic::Ordering::Relaxed);
        for (key_id, entry) in config.keys[..config.key_count as usize].iter().enumerate() {
            self.input.set_key_value(key_id as u8, entry.value);
            self.input.set_key_color(key_id as u8, entry.color);
        }
    }

    fn update(&self, key_id: u8, f: impl FnOnce(&mut KeyEntry)) -> Result<(), StorageError> {
        let mut config = self.config.borrow_mut();
        if key_id >= config.key_count {
            return Err(StorageError::InvalidId);
        }
        let entry = &mut config.keys[key_id as usize];
        let before = *entry;
        f(entry);
        if *entry == before {
            return Ok(());
        }
        self.storage.save(BlobType::KeysConfig, &*config)
    }

    pub fn config(&self) -> KeysConfig {
        self.config.borrow().clone()
    }

    pub fn key_count(&self) -> u8 {
        self.config.borrow().key_count
    }

    pub fn key_color(&self, key_id: u8) -> Color {
        self.config
            .borrow()
            .entry(key_id)
            .map_or(Color::None, |e| e.color)
    }

    pub fn key_value(&self, key_id: u8) -> KeyValue {
        self.config
            .borrow()
            .entry(key_id)
            .map_or(KeyValue::NONE, |e| e.value)
    }

    pub fn set_key_color(&self, key_id: u8, color: Color) -> Result<(), StorageError> {
        self.update(key_id, |e| e.color = color)?;
        self.input.set_key_color(key_id, color);
        Ok(())
    }

    pub fn set_key_value(&self, key_id: u8, value: KeyValue) -> Result<(), StorageError> {
        self.update(key_id, |e| e.value = value)?;
        self.input.set_key_value(key_id, value);
        Ok(())
    }

    pub fn long_press_ms(&self) -> u32 {
        self.config.borrow().long_press_ms
    }

    pub fn set_long_press_ms(&self, ms: u32) -> Result<(), StorageError> {
        let mut config = self.config.borrow_mut();
        self.long_press_ms.store(ms, atomic::Ordering::Relaxed);
        if config.long_press_ms == ms {
            return Ok(());
        }
        config.long_press_ms = ms;
        self.storage.save(BlobType::KeysConfig, &*config)
    }
}

#[cfg(test)]
#[path = "keys_config_test.rs"]
mod test;
