#![no_std]
pub mod blob_storage;
pub mod buttons;
pub mod features;
pub mod keys_config;

#[cfg(any(test, feature = "test-utils"))]
pub mod flash_test_stub;
#[cfg(any(test, feature = "test-utils"))]
pub mod keypad_test_stub;
#[cfg(any(test, feature = "test-utils"))]
pub mod switch_test_stub;
#[cfg(any(test, feature = "test-utils"))]
pub mod time_driver_test_stub;
#[cfg(any(test, feature = "test-utils"))]
pub mod timer_test_stub;

#[macro_use]
mod macros;

#[cfg(test)]
#[path = "lib_test.rs"]
mod test;
