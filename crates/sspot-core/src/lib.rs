//! Hardware-independent core library for the SSPOT soil logger
//!
//! This crate contains all platform-agnostic logic: the Modbus frame codec,
//! reading decoding and validation, the capacity pruner, the Firebase REST
//! client (HTTP framing, streaming JSON scanning, session state machine),
//! SNTP packet handling and wall-clock/timezone arithmetic.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod app_state;
pub mod cloud;
pub mod config;
pub mod metrics;
pub mod modbus;
pub mod pipeline;
pub mod sensors;
pub mod storage;
pub mod time;

#[cfg(test)]
mod testing;
