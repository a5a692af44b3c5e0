#![no_std]
pub mod color;
pub mod datetime;
pub mod globals;
pub mod keycodes;

#[cfg(test)]
#[path = "lib_test.rs"]
mod test;
