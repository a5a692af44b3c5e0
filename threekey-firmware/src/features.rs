//! Dispatch of button input to the active keypad feature.

pub mod ctrl_c_v;
pub mod time_tracker;

use threekey_common::{color::Color, datetime::DateTime, globals::BLOB_MAGIC};

use crate::{
    blob_storage::{read_u32, Blob, BlobStorage, BlobType},
    buttons::ButtonInput,
};

pub use ctrl_c_v::CtrlCV;
pub use time_tracker::TimeTracker;

pub type LogLine = heapless::String<64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FeatureType {
    CtrlCV = 0,
    TimeTracker = 1,
    None = 2,
}

impl FeatureType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => FeatureType::CtrlCV,
            1 => FeatureType::TimeTracker,
            2 => FeatureType::None,
            _ => return None,
        })
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "ctrl_c_v" => FeatureType::CtrlCV,
            "time-tracker" | "time_tracker" => FeatureType::TimeTracker,
            "none" => FeatureType::None,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            FeatureType::CtrlCV => "ctrl_c_v",
            FeatureType::TimeTracker => "time-tracker",
            FeatureType::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LedsMode {
    /// The LED driver lights a key while it is held.
    WhenButtonPressed,
    /// Only the feature drives the LEDs.
    HandledByFeature,
}

pub trait KeyLeds {
    fn set_mode(&self, mode: LedsMode);
    fn enable(&self, key_id: u8, color: Color);
    fn disable(&self, key_id: u8);
    fn blink(&self, key_id: u8, period_ms: u32, count: u32, color: Color);
}

/// HID boot keyboard output.
pub trait KeyReporter {
    fn is_ready(&self) -> bool;
    fn keyboard_report(&self, modifier: u8, keycodes: [u8; 6]);
}

pub trait Calendar {
    fn now(&self) -> DateTime;
}

pub trait Feature {
    fn init(&mut self);
    fn deinit(&mut self);
    fn factory_init(&mut self);
    fn handle(&mut self, input: &dyn ButtonInput);
    /// Called every [TRACKING_INTERVAL_MS](threekey_common::globals::time_tracker::TRACKING_INTERVAL_MS)
    /// while the feature is active.
    fn on_tick(&mut self) {}
    fn log(&self, log_id: u32) -> LogLine;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FeaturesHandlerConfig {
    pub magic: u32,
    pub current_feature: FeatureType,
    pub is_feature_set: bool,
}

impl Blob for FeaturesHandlerConfig {
    const SIZE: usize = 6;

    fn encode(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4] = self.current_feature as u8;
        buf[5] = self.is_feature_set as u8;
    }

    fn decode(buf: &[u8]) -> Self {
        let current_feature = FeatureType::from_u8(buf[4]);
        Self {
            magic: read_u32(buf, 0),
            current_feature: current_feature.unwrap_or(FeatureType::None),
            is_feature_set: current_feature.is_some() && buf[5] == 1,
        }
    }
}

pub struct FeaturesHandler<'a> {
    storage: &'a dyn BlobStorage,
    config: FeaturesHandlerConfig,
    ctrl_c_v: CtrlCV<'a>,
    time_tracker: TimeTracker<'a>,
}

impl<'a> FeaturesHandler<'a> {
    pub fn new(
        storage: &'a dyn BlobStorage,
        ctrl_c_v: CtrlCV<'a>,
        time_tracker: TimeTracker<'a>,
    ) -> Self {
        Self {
            storage,
            config: FeaturesHandlerConfig {
                magic: 0,
                current_feature: FeatureType::None,
                is_feature_set: false,
            },
            ctrl_c_v,
            time_tracker,
        }
    }

    fn feature(&self, feature_type: FeatureType) -> Option<&dyn Feature> {
        match feature_type {
            FeatureType::CtrlCV => Some(&self.ctrl_c_v),
            FeatureType::TimeTracker => Some(&self.time_tracker),
            FeatureType::None => None,
        }
    }

    fn feature_mut(&mut self, feature_type: FeatureType) -> Option<&mut dyn Feature> {
        match feature_type {
            FeatureType::CtrlCV => Some(&mut self.ctrl_c_v),
            FeatureType::TimeTracker => Some(&mut self.time_tracker),
            FeatureType::None => None,
        }
    }

    fn active(&mut self) -> Option<&mut dyn Feature> {
        if !self.config.is_feature_set {
            return None;
        }
        self.feature_mut(self.config.current_feature)
    }

    /// Load the active feature record and start that feature.
    pub fn init(&mut self) {
        match self
            .storage
            .get::<FeaturesHandlerConfig>(BlobType::FeaturesHandlerConfig)
        {
            Ok(config) if config.magic == BLOB_MAGIC => {
                self.config = config;
                if let Some(feature) = self.active() {
                    feature.init();
                }
            }
            Ok(_) => self.factory_init(),
            Err(err) => {
                crate::warn!("features config read failed {:?}", err);
                self.factory_init();
            }
        }
    }

    pub fn factory_init(&mut self) {
        crate::info!("features: factory init");
        self.ctrl_c_v.factory_init();
        self.time_tracker.factory_init();
        self.config = FeaturesHandlerConfig {
            magic: BLOB_MAGIC,
            current_feature: FeatureType::None,
            is_feature_set: false,
        };
        self.switch_to_feature(FeatureType::CtrlCV);
    }

    pub fn switch_to_feature(&mut self, feature_type: FeatureType) {
        if let Some(feature) = self.active() {
            feature.deinit();
        }

        self.config.current_feature = feature_type;
        self.config.is_feature_set = feature_type != FeatureType::None;
        if let Some(feature) = self.feature_mut(feature_type) {
            feature.init();
        }

        if let Err(err) = self
            .storage
            .save(BlobType::FeaturesHandlerConfig, &self.config)
        {
            crate::warn!("features config save failed {:?}", err);
        }
    }

    /// Switch by the id a host sends. Unknown ids leave the current feature running.
    pub fn switch_to_feature_id(&mut self, id: u8) -> bool {
        match FeatureType::from_u8(id) {
            Some(feature_type) => {
                self.switch_to_feature(feature_type);
                true
            }
            None => false,
        }
    }

    pub fn handle(&mut self, input: &dyn ButtonInput) {
        if let Some(feature) = self.active() {
            feature.handle(input);
        }
    }

    pub fn on_tick(&mut self) {
        if let Some(feature) = self.active() {
            feature.on_tick();
        }
    }

    pub fn feature_log(&self, feature_type: FeatureType, log_id: u32) -> LogLine {
        self.feature(feature_type)
            .map(|f| f.log(log_id))
            .unwrap_or_default()
    }

    pub fn current_feature(&self) -> FeatureType {
        if self.config.is_feature_set {
            self.config.current_feature
        } else {
            FeatureType::None
        }
    }

    pub fn current_feature_name(&self) -> &'static str {
        self.current_feature().name()
    }

    pub fn time_tracker(&mut self) -> &mut TimeTracker<'a> {
        &mut self.time_tracker
    }
}

#[cfg(test)]
#[path = "features_test.rs"]
mod test;
